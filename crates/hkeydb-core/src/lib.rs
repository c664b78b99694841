//! Core runtime for hkeydb: hierarchical keys, row types, the cursor
//! lifecycle, and the storage adapter that maps co-located table groups onto
//! an ordered key-value transaction.
#![warn(unreachable_pub)]

// public exports are one module level down
pub mod adapter;
pub mod codec;
pub mod config;
pub mod cursor;
pub mod direction;
pub mod error;
pub mod hkey;
pub mod kv;
pub mod obs;
pub mod row;
pub mod rowtype;
pub mod schema;
pub mod value;

// test
#[cfg(test)]
pub(crate) mod test_support;

///
/// CONSTANTS
///

/// Maximum number of key columns declared on one table.
///
/// HKey segments store their value count in a single byte.
pub const MAX_KEY_COLUMNS: usize = u8::MAX as usize;

/// Maximum number of columns addressable by a `ColumnSelector`.
pub const MAX_SELECTOR_COLUMNS: usize = 64;

///
/// Prelude
///
/// Prelude contains only domain vocabulary.
/// No errors, adapters, stores, or helpers are re-exported here.
///

pub mod prelude {
    pub use crate::{
        cursor::Cursor,
        direction::Direction,
        hkey::HKey,
        row::Row,
        rowtype::RowType,
        value::{ColumnType, Value},
    };
}
