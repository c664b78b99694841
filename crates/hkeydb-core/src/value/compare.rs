use crate::value::Value;
use std::cmp::Ordering;

/// Total canonical comparator used by hierarchy keys, index keys and sorts.
///
/// Ordering rules:
/// 1. Canonical variant tag
/// 2. Variant-specific comparison for same-tagged values
///
/// This order is exactly the byte order of the ordered key encoding.
#[must_use]
pub fn canonical_cmp(left: &Value, right: &Value) -> Ordering {
    let tag = left.canonical_tag().cmp(&right.canonical_tag());
    if tag != Ordering::Equal {
        return tag;
    }

    match (left, right) {
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        (Value::Int(a), Value::Int(b)) => a.cmp(b),
        (Value::Uint(a), Value::Uint(b)) => a.cmp(b),
        (Value::Float64(a), Value::Float64(b)) => a.total_cmp(b),
        (Value::Text(a), Value::Text(b)) => a.as_bytes().cmp(b.as_bytes()),
        (Value::Blob(a), Value::Blob(b)) => a.cmp(b),
        _ => Ordering::Equal,
    }
}
