//! Module: codec
//! Responsibility: physical record encoding for stored rows.
//! Does not own: key encoding, which is ordered and lives with `value` and
//! `hkey`.

mod cbor;
mod json;

#[cfg(test)]
mod tests;

use crate::{error::InternalError, schema::TableId, value::Value};
use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;

///
/// SerializeError
///

#[derive(Debug, ThisError)]
pub enum SerializeError {
    #[error("serialize error: {0}")]
    Serialize(String),
    #[error("deserialize error: {0}")]
    Deserialize(String),
}

impl From<SerializeError> for InternalError {
    fn from(err: SerializeError) -> Self {
        match err {
            SerializeError::Serialize(_) => Self::serialize_internal(err.to_string()),
            SerializeError::Deserialize(_) => Self::serialize_corruption(err.to_string()),
        }
    }
}

///
/// RowEncoding
///
/// Physical value representation of a stored record. Chosen per call by the
/// caller's `use_current` flag; the first record byte names the encoding so
/// either form decodes regardless of the caller's current choice.
///

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum RowEncoding {
    /// JSON payload kept for records written before the binary format.
    Legacy,
    /// CBOR payload.
    Current,
}

impl RowEncoding {
    const LEGACY_TAG: u8 = 1;
    const CURRENT_TAG: u8 = 2;

    #[must_use]
    pub const fn select(use_current: bool) -> Self {
        if use_current {
            Self::Current
        } else {
            Self::Legacy
        }
    }

    #[must_use]
    pub const fn tag(self) -> u8 {
        match self {
            Self::Legacy => Self::LEGACY_TAG,
            Self::Current => Self::CURRENT_TAG,
        }
    }

    #[must_use]
    pub const fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            Self::LEGACY_TAG => Some(Self::Legacy),
            Self::CURRENT_TAG => Some(Self::Current),
            _ => None,
        }
    }
}

#[derive(Serialize)]
struct RecordRef<'a> {
    table: u32,
    values: &'a [Value],
}

#[derive(Deserialize)]
struct Record {
    table: u32,
    values: Vec<Value>,
}

///
/// DecodedRecord
///

#[derive(Clone, Debug, PartialEq)]
pub struct DecodedRecord {
    pub table: TableId,
    pub values: Vec<Value>,
    pub encoding: RowEncoding,
}

/// Encode one table row as `[encoding tag][payload]`.
pub fn encode_record(
    table: TableId,
    values: &[Value],
    encoding: RowEncoding,
    max_bytes: usize,
) -> Result<Vec<u8>, InternalError> {
    let record = RecordRef {
        table: table.get(),
        values,
    };
    let payload = match encoding {
        RowEncoding::Legacy => json::serialize(&record)?,
        RowEncoding::Current => cbor::serialize(&record)?,
    };

    let len = payload.len() + 1;
    if len > max_bytes {
        return Err(InternalError::serialize_internal(format!(
            "record for table {table} is {len} bytes (limit {max_bytes})"
        )));
    }

    let mut out = Vec::with_capacity(len);
    out.push(encoding.tag());
    out.extend_from_slice(&payload);

    Ok(out)
}

/// Decode bytes written by [`encode_record`].
pub fn decode_record(bytes: &[u8], max_bytes: usize) -> Result<DecodedRecord, InternalError> {
    let (&tag, payload) = bytes
        .split_first()
        .ok_or_else(|| InternalError::serialize_corruption("empty record"))?;
    let encoding = RowEncoding::from_tag(tag).ok_or_else(|| {
        InternalError::serialize_corruption(format!("unknown record encoding tag {tag:#04x}"))
    })?;
    if bytes.len() > max_bytes {
        return Err(InternalError::serialize_corruption(format!(
            "record is {} bytes (limit {max_bytes})",
            bytes.len()
        )));
    }

    let record: Record = match encoding {
        RowEncoding::Legacy => json::deserialize(payload)?,
        RowEncoding::Current => cbor::deserialize(payload)?,
    };

    Ok(DecodedRecord {
        table: TableId::new(record.table),
        values: record.values,
        encoding,
    })
}
