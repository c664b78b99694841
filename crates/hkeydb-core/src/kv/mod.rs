//! Module: kv
//! Responsibility: the ordered key-value transaction contract consumed by the
//! storage adapter, plus an in-memory reference implementation.
//! Does not own: row encoding, hierarchy keys, or error translation.

mod memory;


use crate::direction::Direction;
use std::{
    io,
    ops::Bound,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};
use thiserror::Error as ThisError;

// re-exports
pub use memory::{InjectedFailure, KvOp, MemoryStore, MemoryTransaction};

/// One physical key/value pair.
pub type KvEntry = (Vec<u8>, Vec<u8>);

///
/// StoreError
///
/// Failures raised by the underlying ordered store. Translated into the
/// engine taxonomy by the adapter; never surfaced to callers raw.
///

#[derive(Debug, ThisError)]
pub enum StoreError {
    #[error("duplicate key: {key}")]
    DuplicateKey { key: String },

    #[error("storage call interrupted")]
    Interrupted,

    #[error("storage i/o failure: {0}")]
    Io(#[from] io::Error),

    #[error("transaction is not active")]
    TransactionInactive,

    #[error("storage failure: {message}")]
    Failed { message: String },
}

impl StoreError {
    /// True when the failure came from an interrupted blocking call, either
    /// directly or through a wrapped interruption cause.
    #[must_use]
    pub fn is_from_interruption(&self) -> bool {
        match self {
            Self::Interrupted => true,
            Self::Io(err) => {
                err.kind() == io::ErrorKind::Interrupted
                    || err
                        .get_ref()
                        .and_then(|inner| inner.downcast_ref::<Self>())
                        .is_some_and(Self::is_from_interruption)
            }
            _ => false,
        }
    }
}

///
/// KeyRange
///
/// Byte-key range with independent start/end bounds.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct KeyRange {
    pub start: Bound<Vec<u8>>,
    pub end: Bound<Vec<u8>>,
}

impl KeyRange {
    #[must_use]
    pub const fn new(start: Bound<Vec<u8>>, end: Bound<Vec<u8>>) -> Self {
        Self { start, end }
    }

    /// Range covering every key that starts with `prefix`.
    #[must_use]
    pub fn prefix(prefix: &[u8]) -> Self {
        let end = prefix_end(prefix).map_or(Bound::Unbounded, Bound::Excluded);

        Self {
            start: Bound::Included(prefix.to_vec()),
            end,
        }
    }

    #[must_use]
    pub fn contains(&self, key: &[u8]) -> bool {
        let after_start = match &self.start {
            Bound::Included(start) => key >= start.as_slice(),
            Bound::Excluded(start) => key > start.as_slice(),
            Bound::Unbounded => true,
        };
        let before_end = match &self.end {
            Bound::Included(end) => key <= end.as_slice(),
            Bound::Excluded(end) => key < end.as_slice(),
            Bound::Unbounded => true,
        };

        after_start && before_end
    }

    /// Narrow the range past one emitted key in traversal order.
    pub fn advance_past(&mut self, key: &[u8], direction: Direction) {
        match direction {
            Direction::Asc => self.start = Bound::Excluded(key.to_vec()),
            Direction::Desc => self.end = Bound::Excluded(key.to_vec()),
        }
    }

    /// True when no key can satisfy both bounds.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        let (start, start_inclusive) = match &self.start {
            Bound::Included(start) => (start, true),
            Bound::Excluded(start) => (start, false),
            Bound::Unbounded => return false,
        };
        let (end, end_inclusive) = match &self.end {
            Bound::Included(end) => (end, true),
            Bound::Excluded(end) => (end, false),
            Bound::Unbounded => return false,
        };

        match start.cmp(end) {
            std::cmp::Ordering::Greater => true,
            std::cmp::Ordering::Equal => !(start_inclusive && end_inclusive),
            std::cmp::Ordering::Less => false,
        }
    }

    #[must_use]
    pub fn as_ref_bounds(&self) -> (Bound<&[u8]>, Bound<&[u8]>) {
        (as_ref_bound(&self.start), as_ref_bound(&self.end))
    }
}

fn as_ref_bound(bound: &Bound<Vec<u8>>) -> Bound<&[u8]> {
    match bound {
        Bound::Included(key) => Bound::Included(key.as_slice()),
        Bound::Excluded(key) => Bound::Excluded(key.as_slice()),
        Bound::Unbounded => Bound::Unbounded,
    }
}

/// Smallest byte string greater than every key carrying `prefix`.
///
/// Returns `None` when the prefix is empty or all `0xFF`.
#[must_use]
pub fn prefix_end(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.pop() {
        if last < u8::MAX {
            end.push(last + 1);
            return Some(end);
        }
    }

    None
}

///
/// KvTransaction
///
/// One live transaction against the ordered store. Owned by the session;
/// the only mutable shared state touched by the adapter layer.
///
/// Reads observe the transaction's own writes made at steps less than or
/// equal to the current step.
///

pub trait KvTransaction {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError>;

    /// Remove one key, returning whether a visible value was present.
    fn delete(&self, key: &[u8]) -> Result<bool, StoreError>;

    /// First visible entry in `range` for `direction` (last entry for `Desc`).
    /// May block; interruption surfaces as an interruption-class error.
    fn seek(&self, range: &KeyRange, direction: Direction) -> Result<Option<KvEntry>, StoreError>;

    fn step(&self) -> u32;

    fn set_step(&self, step: u32);

    /// Advance the step by one and return the new value.
    fn increment_step(&self) -> u32;

    /// Highest step at which this transaction has written.
    fn max_write_step(&self) -> u32;

    fn is_active(&self) -> bool;

    fn is_rollback_pending(&self) -> bool;

    fn commit(&self) -> Result<(), StoreError>;

    fn rollback(&self);

    fn sequence_next(&self, name: &str, start: i64, increment: i64) -> Result<i64, StoreError>;

    fn sequence_current(&self, name: &str) -> Result<Option<i64>, StoreError>;
}

///
/// InterruptHandle
///
/// Cooperative cancellation flag observed by blocking store calls.
/// Cloned handles share the same flag.
///

#[derive(Clone, Debug, Default)]
pub struct InterruptHandle(Arc<AtomicBool>);

impl InterruptHandle {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request interruption of the next blocking call.
    pub fn interrupt(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Consume a pending interruption request.
    pub(crate) fn take(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }
}
