use crate::{
    error::InternalError,
    value::{Value, ValueTag},
};
use thiserror::Error as ThisError;

const TERMINATOR: [u8; 2] = [0, 0];
const ESCAPED_ZERO: u8 = 0xFF;

///
/// OrderedValueDecodeError
///
/// Failures while reading one ordered value component back from key bytes.
///

#[derive(Debug, ThisError)]
pub(crate) enum OrderedValueDecodeError {
    #[error("unexpected end of key at offset {offset}")]
    Truncated { offset: usize },

    #[error("unknown value tag {tag:#04x} at offset {offset}")]
    UnknownTag { tag: u8, offset: usize },

    #[error("invalid escape byte {byte:#04x} at offset {offset}")]
    InvalidEscape { byte: u8, offset: usize },

    #[error("text component is not valid utf-8")]
    InvalidText,
}

impl From<OrderedValueDecodeError> for InternalError {
    fn from(err: OrderedValueDecodeError) -> Self {
        Self::hkey_corruption(format!("ordered key component is malformed: {err}"))
    }
}

/// Append one value so lexicographic byte order matches `canonical_cmp`.
///
/// Every encoding is self-delimiting, so a sequence of encoded values is
/// prefix-free and concatenations compare value by value.
pub(crate) fn encode_ordered_value(out: &mut Vec<u8>, value: &Value) {
    out.push(value.canonical_tag().to_u8());

    match value {
        Value::Null => {}
        Value::Bool(v) => out.push(u8::from(*v)),
        Value::Int(v) => out.extend_from_slice(&ordered_i64_bytes(*v)),
        Value::Uint(v) => out.extend_from_slice(&v.to_be_bytes()),
        Value::Float64(v) => out.extend_from_slice(&ordered_f64_bytes(*v)),
        Value::Text(v) => push_terminated_bytes(out, v.as_bytes()),
        Value::Blob(v) => push_terminated_bytes(out, v),
    }
}

/// Decode one value starting at `offset`, returning it with the offset just
/// past its encoding.
pub(crate) fn decode_ordered_value(
    bytes: &[u8],
    offset: usize,
) -> Result<(Value, usize), OrderedValueDecodeError> {
    let tag_byte = *bytes
        .get(offset)
        .ok_or(OrderedValueDecodeError::Truncated { offset })?;
    let tag = ValueTag::from_u8(tag_byte).ok_or(OrderedValueDecodeError::UnknownTag {
        tag: tag_byte,
        offset,
    })?;
    let at = offset + 1;

    match tag {
        ValueTag::Null => Ok((Value::Null, at)),
        ValueTag::Bool => {
            let byte = *bytes
                .get(at)
                .ok_or(OrderedValueDecodeError::Truncated { offset: at })?;
            Ok((Value::Bool(byte != 0), at + 1))
        }
        ValueTag::Int => {
            let raw = read_fixed::<8>(bytes, at)?;
            let value = (u64::from_be_bytes(raw) ^ (1u64 << 63)).cast_signed();
            Ok((Value::Int(value), at + 8))
        }
        ValueTag::Uint => {
            let raw = read_fixed::<8>(bytes, at)?;
            Ok((Value::Uint(u64::from_be_bytes(raw)), at + 8))
        }
        ValueTag::Float64 => {
            let raw = read_fixed::<8>(bytes, at)?;
            Ok((Value::Float64(float_from_ordered(raw)), at + 8))
        }
        ValueTag::Text => {
            let (raw, next) = read_terminated_bytes(bytes, at)?;
            let text = String::from_utf8(raw).map_err(|_| OrderedValueDecodeError::InvalidText)?;
            Ok((Value::Text(text), next))
        }
        ValueTag::Blob => {
            let (raw, next) = read_terminated_bytes(bytes, at)?;
            Ok((Value::Blob(raw), next))
        }
    }
}

/// Append `bytes` with every byte complemented, reversing their order.
pub(crate) fn push_inverted(out: &mut Vec<u8>, bytes: &[u8]) {
    for &byte in bytes {
        out.push(!byte);
    }
}

fn push_terminated_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    for &byte in bytes {
        if byte == 0 {
            out.extend_from_slice(&[0, ESCAPED_ZERO]);
        } else {
            out.push(byte);
        }
    }

    out.extend_from_slice(&TERMINATOR);
}

fn read_terminated_bytes(
    bytes: &[u8],
    mut offset: usize,
) -> Result<(Vec<u8>, usize), OrderedValueDecodeError> {
    let mut out = Vec::new();

    loop {
        let byte = *bytes
            .get(offset)
            .ok_or(OrderedValueDecodeError::Truncated { offset })?;
        if byte != 0 {
            out.push(byte);
            offset += 1;
            continue;
        }

        let marker = *bytes
            .get(offset + 1)
            .ok_or(OrderedValueDecodeError::Truncated { offset: offset + 1 })?;
        match marker {
            0 => return Ok((out, offset + 2)),
            ESCAPED_ZERO => {
                out.push(0);
                offset += 2;
            }
            other => {
                return Err(OrderedValueDecodeError::InvalidEscape {
                    byte: other,
                    offset: offset + 1,
                });
            }
        }
    }
}

fn read_fixed<const N: usize>(
    bytes: &[u8],
    offset: usize,
) -> Result<[u8; N], OrderedValueDecodeError> {
    bytes
        .get(offset..offset + N)
        .and_then(|slice| <[u8; N]>::try_from(slice).ok())
        .ok_or(OrderedValueDecodeError::Truncated { offset })
}

const fn ordered_i64_bytes(value: i64) -> [u8; 8] {
    let biased = value.cast_unsigned() ^ (1u64 << 63);
    biased.to_be_bytes()
}

const fn ordered_f64_bytes(value: f64) -> [u8; 8] {
    let bits = value.to_bits();
    let ordered = if bits & 0x8000_0000_0000_0000 == 0 {
        bits ^ 0x8000_0000_0000_0000
    } else {
        !bits
    };

    ordered.to_be_bytes()
}

const fn float_from_ordered(raw: [u8; 8]) -> f64 {
    let ordered = u64::from_be_bytes(raw);
    let bits = if ordered & 0x8000_0000_0000_0000 == 0 {
        !ordered
    } else {
        ordered ^ 0x8000_0000_0000_0000
    };

    f64::from_bits(bits)
}
