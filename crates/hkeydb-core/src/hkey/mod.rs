//! Module: hkey
//! Responsibility: hierarchical row keys, their ordering, truncation and
//! self-describing byte encoding.
//! Does not own: derivation of a row's HKey from its parent, which needs the
//! store and lives in the adapter.

mod cache;

#[cfg(test)]
mod tests;

use crate::{
    error::InternalError,
    schema::TableId,
    value::{Value, canonical_cmp, decode_ordered_value, encode_ordered_value},
};
use std::{cmp::Ordering, fmt};

// re-exports
pub use cache::HKeyCache;

///
/// HKeySegment
///
/// One ancestor level: the table ordinal and that table's key values.
///

#[derive(Clone, Debug, PartialEq)]
pub struct HKeySegment {
    pub ordinal: TableId,
    pub values: Vec<Value>,
}

impl HKeySegment {
    #[must_use]
    pub const fn new(ordinal: TableId, values: Vec<Value>) -> Self {
        Self { ordinal, values }
    }

    fn cmp_segment(&self, other: &Self) -> Ordering {
        self.ordinal
            .cmp(&other.ordinal)
            .then_with(|| self.values.len().cmp(&other.values.len()))
            .then_with(|| {
                self.values
                    .iter()
                    .zip(&other.values)
                    .map(|(a, b)| canonical_cmp(a, b))
                    .find(|order| order.is_ne())
                    .unwrap_or(Ordering::Equal)
            })
    }
}

///
/// HKey
///
/// Ordered path from the group root to one row. Comparison is segment-wise
/// and agrees with the byte order of [`HKey::encode`], so storage order is
/// HKey order and every row sorts directly after its ancestors.
///

#[derive(Clone, Debug, Default)]
pub struct HKey {
    segments: Vec<HKeySegment>,
}

impl HKey {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            segments: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_capacity(segments: usize) -> Self {
        Self {
            segments: Vec::with_capacity(segments),
        }
    }

    #[must_use]
    pub fn from_segments(segments: Vec<HKeySegment>) -> Self {
        Self { segments }
    }

    #[must_use]
    pub fn segments(&self) -> &[HKeySegment] {
        &self.segments
    }

    #[must_use]
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn push_segment(&mut self, ordinal: TableId, values: Vec<Value>) {
        self.segments.push(HKeySegment::new(ordinal, values));
    }

    /// Ordinal of the deepest segment: the table of the row this key names.
    #[must_use]
    pub fn table(&self) -> Option<TableId> {
        self.segments.last().map(|segment| segment.ordinal)
    }

    /// Keep only the first `segments` segments.
    pub fn use_segments(&mut self, segments: usize) {
        self.segments.truncate(segments);
    }

    /// Copy of this key cut to its first `segments` segments.
    #[must_use]
    pub fn truncated(&self, segments: usize) -> Self {
        Self {
            segments: self.segments[..segments.min(self.segments.len())].to_vec(),
        }
    }

    /// Overwrite `target` with this key, reusing its allocations.
    pub fn copy_to(&self, target: &mut Self) {
        target.segments.truncate(self.segments.len());
        for (i, segment) in self.segments.iter().enumerate() {
            match target.segments.get_mut(i) {
                Some(existing) => {
                    existing.ordinal = segment.ordinal;
                    existing.values.clone_from(&segment.values);
                }
                None => target.segments.push(segment.clone()),
            }
        }
    }

    /// Number of key values across all segments.
    #[must_use]
    pub fn value_count(&self) -> usize {
        self.segments.iter().map(|segment| segment.values.len()).sum()
    }

    /// Key value at flattened position `i`, root segment first.
    #[must_use]
    pub fn eval(&self, i: usize) -> Option<&Value> {
        let mut remaining = i;
        for segment in &self.segments {
            if remaining < segment.values.len() {
                return segment.values.get(remaining);
            }
            remaining -= segment.values.len();
        }

        None
    }

    /// True when `self` names `other` or one of its ancestors.
    #[must_use]
    pub fn is_prefix_of(&self, other: &Self) -> bool {
        self.segments.len() <= other.segments.len()
            && self
                .segments
                .iter()
                .zip(&other.segments)
                .all(|(a, b)| a.cmp_segment(b).is_eq())
    }

    /// Append the byte form: per segment `[ordinal u32 BE][count u8][values]`.
    pub fn encode(&self, out: &mut Vec<u8>) -> Result<(), InternalError> {
        for segment in &self.segments {
            let count = u8::try_from(segment.values.len()).map_err(|_| {
                InternalError::hkey_invariant(format!(
                    "segment for table {} carries {} values",
                    segment.ordinal,
                    segment.values.len()
                ))
            })?;
            out.extend_from_slice(&segment.ordinal.get().to_be_bytes());
            out.push(count);
            for value in &segment.values {
                encode_ordered_value(out, value);
            }
        }

        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, InternalError> {
        let mut out = Vec::new();
        self.encode(&mut out)?;

        Ok(out)
    }

    /// Parse a key written by [`HKey::encode`]; the whole slice is consumed.
    pub fn decode(bytes: &[u8]) -> Result<Self, InternalError> {
        let mut segments = Vec::new();
        let mut offset = 0;

        while offset < bytes.len() {
            let header = bytes.get(offset..offset + 5).ok_or_else(|| {
                InternalError::hkey_corruption(format!(
                    "truncated hkey segment header at offset {offset}"
                ))
            })?;
            let ordinal = TableId::new(u32::from_be_bytes([
                header[0], header[1], header[2], header[3],
            ]));
            let count = usize::from(header[4]);
            offset += 5;

            let mut values = Vec::with_capacity(count);
            for _ in 0..count {
                let (value, next) = decode_ordered_value(bytes, offset)?;
                values.push(value);
                offset = next;
            }
            segments.push(HKeySegment { ordinal, values });
        }

        Ok(Self { segments })
    }
}

impl PartialEq for HKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other).is_eq()
    }
}

impl Eq for HKey {}

impl Ord for HKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.segments
            .iter()
            .zip(&other.segments)
            .map(|(a, b)| a.cmp_segment(b))
            .find(|order| order.is_ne())
            .unwrap_or_else(|| self.segments.len().cmp(&other.segments.len()))
    }
}

impl PartialOrd for HKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for HKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{},(", segment.ordinal)?;
            for (j, value) in segment.values.iter().enumerate() {
                if j > 0 {
                    write!(f, ",")?;
                }
                write!(f, "{value}")?;
            }
            write!(f, ")")?;
        }
        write!(f, "}}")
    }
}
