mod compare;
mod ordered;
mod tag;

#[cfg(test)]
mod tests;

use crate::error::InternalError;
use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::fmt;

// re-exports
pub use compare::canonical_cmp;
pub(crate) use ordered::{decode_ordered_value, encode_ordered_value, push_inverted};
pub use tag::ValueTag;

///
/// Value
///
/// Runtime scalar carried by rows, hierarchy keys and index entries.
///

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Uint(u64),
    Float64(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl Value {
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Stable canonical tag for this variant.
    #[must_use]
    pub const fn canonical_tag(&self) -> ValueTag {
        match self {
            Self::Null => ValueTag::Null,
            Self::Bool(_) => ValueTag::Bool,
            Self::Int(_) => ValueTag::Int,
            Self::Uint(_) => ValueTag::Uint,
            Self::Float64(_) => ValueTag::Float64,
            Self::Text(_) => ValueTag::Text,
            Self::Blob(_) => ValueTag::Blob,
        }
    }

    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Uint(v) => write!(f, "{v}"),
            Self::Float64(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "'{v}'"),
            Self::Blob(v) => write!(f, "<{} bytes>", v.len()),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Self::Uint(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float64(v)
    }
}

///
/// ColumnType
///
/// Declared scalar type of one column. Drives record encoding and the
/// minimal conversion applied when a foreign row is written into a table.
///

#[derive(Clone, Copy, Debug, Deserialize, Display, Eq, Hash, PartialEq, Serialize)]
pub enum ColumnType {
    #[display("bool")]
    Bool,
    #[display("int")]
    Int,
    #[display("uint")]
    Uint,
    #[display("float64")]
    Float64,
    #[display("text")]
    Text,
    #[display("blob")]
    Blob,
}

impl ColumnType {
    /// Convert `value` into this column type.
    ///
    /// Identity and lossless integer conversions are accepted, as is
    /// widening integers to floats. Nulls pass through; nullability is
    /// checked by the caller.
    pub fn coerce(self, value: Value) -> Result<Value, InternalError> {
        let converted = match (self, value) {
            (_, Value::Null) => Some(Value::Null),
            (Self::Bool, v @ Value::Bool(_))
            | (Self::Int, v @ Value::Int(_))
            | (Self::Uint, v @ Value::Uint(_))
            | (Self::Float64, v @ Value::Float64(_))
            | (Self::Text, v @ Value::Text(_))
            | (Self::Blob, v @ Value::Blob(_)) => Some(v),
            (Self::Int, Value::Uint(v)) => i64::try_from(v).ok().map(Value::Int),
            (Self::Uint, Value::Int(v)) => u64::try_from(v).ok().map(Value::Uint),
            (Self::Float64, Value::Int(v)) => Some(Value::Float64(widen_i64(v))),
            (Self::Float64, Value::Uint(v)) => Some(Value::Float64(widen_u64(v))),
            (_, other) => {
                return Err(InternalError::row_invariant(format!(
                    "value {other} cannot be converted to {self}"
                )));
            }
        };

        converted.ok_or_else(|| {
            InternalError::row_invariant(format!("integer value out of range for {self}"))
        })
    }
}

#[expect(clippy::cast_precision_loss)]
const fn widen_i64(v: i64) -> f64 {
    v as f64
}

#[expect(clippy::cast_precision_loss)]
const fn widen_u64(v: u64) -> f64 {
    v as f64
}
