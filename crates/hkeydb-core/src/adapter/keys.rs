//! Physical key layout: group rows under `[GROUP][group id][hkey]`, index
//! entries under `[INDEX][index id][ordered values][hkey]`.

use crate::{
    error::InternalError,
    hkey::HKey,
    schema::{GroupId, IndexId},
    value::{Value, decode_ordered_value, encode_ordered_value},
};

pub(crate) const GROUP_SPACE: u8 = 0x01;
pub(crate) const INDEX_SPACE: u8 = 0x02;

const SPACE_PREFIX_LEN: usize = 5;

pub(crate) fn group_prefix(group: GroupId) -> Vec<u8> {
    let mut out = Vec::with_capacity(SPACE_PREFIX_LEN);
    out.push(GROUP_SPACE);
    out.extend_from_slice(&group.get().to_be_bytes());

    out
}

pub(crate) fn group_key(group: GroupId, hkey: &HKey) -> Result<Vec<u8>, InternalError> {
    let mut out = group_prefix(group);
    hkey.encode(&mut out)?;

    Ok(out)
}

/// HKey stored in a group key.
pub(crate) fn decode_group_key(key: &[u8]) -> Result<HKey, InternalError> {
    let suffix = key.get(SPACE_PREFIX_LEN..).ok_or_else(|| {
        InternalError::store_corruption(format!("group key of {} bytes is truncated", key.len()))
    })?;

    HKey::decode(suffix)
}

/// Prefix of every entry of `index` whose leading columns equal `values`.
pub(crate) fn index_prefix(index: IndexId, values: &[Value]) -> Vec<u8> {
    let mut out = Vec::with_capacity(SPACE_PREFIX_LEN + values.len() * 9);
    out.push(INDEX_SPACE);
    out.extend_from_slice(&index.get().to_be_bytes());
    for value in values {
        encode_ordered_value(&mut out, value);
    }

    out
}

pub(crate) fn index_key(
    index: IndexId,
    values: &[Value],
    hkey: &HKey,
) -> Result<Vec<u8>, InternalError> {
    let mut out = index_prefix(index, values);
    hkey.encode(&mut out)?;

    Ok(out)
}

/// Split an index key into its `width` column values and the indexed row's
/// HKey, appending the values to `values`.
pub(crate) fn decode_index_key(
    key: &[u8],
    width: usize,
    values: &mut Vec<Value>,
) -> Result<HKey, InternalError> {
    if key.len() < SPACE_PREFIX_LEN {
        return Err(InternalError::store_corruption(format!(
            "index key of {} bytes is truncated",
            key.len()
        )));
    }

    let mut offset = SPACE_PREFIX_LEN;
    for _ in 0..width {
        let (value, next) = decode_ordered_value(key, offset)?;
        values.push(value);
        offset = next;
    }

    HKey::decode(&key[offset..])
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::TableId;

    #[test]
    fn index_key_splits_back_into_values_and_hkey() {
        let mut hkey = HKey::new();
        hkey.push_segment(TableId::new(0), vec![Value::Int(1)]);
        hkey.push_segment(TableId::new(1), vec![Value::Int(10)]);
        let values = vec![Value::from("Oslo"), Value::Null];

        let index = IndexId::new(4);
        let key = index_key(index, &values, &hkey).expect("encode index key");
        assert!(key.starts_with(&index_prefix(index, &values[..1])));

        let mut decoded = Vec::new();
        let decoded_hkey = decode_index_key(&key, 2, &mut decoded).expect("decode index key");
        assert_eq!(decoded, values);
        assert_eq!(decoded_hkey, hkey);
    }

    #[test]
    fn truncated_group_key_is_corruption() {
        let err = decode_group_key(&[GROUP_SPACE, 0]).expect_err("truncated key");

        assert_eq!(err.class, crate::error::ErrorClass::Corruption);
    }
}
