mod step;

use crate::{
    adapter::{IndexKeyRange, IndexScanSelector},
    cursor::Cursor,
    direction::Direction,
    hkey::HKey,
    schema::{IndexId, TableId},
    test_support::{Fixture, drain},
    value::Value,
};

pub(super) const AMT: IndexId = IndexId::new(4);
pub(super) const NAME_SKU: IndexId = IndexId::new(5);
pub(super) const CITY: IndexId = IndexId::new(6);

/// HKey built from (table, single int key) segments.
pub(super) fn hkey(segments: &[(TableId, i64)]) -> HKey {
    let mut hkey = HKey::with_capacity(segments.len());
    for &(table, id) in segments {
        hkey.push_segment(table, vec![Value::Int(id)]);
    }

    hkey
}

/// Values of every entry an index scan yields, in scan order.
pub(super) fn index_entries(
    fx: &Fixture,
    index: IndexId,
    range: IndexKeyRange,
    direction: Direction,
    selector: IndexScanSelector,
) -> Vec<Vec<Value>> {
    let mut cursor = fx
        .adapter
        .new_index_cursor(index, range, direction, selector)
        .expect("index cursor should build");
    cursor.open().expect("index cursor should open");

    drain(&mut cursor)
        .iter()
        .map(|row| row.to_values().expect("index row values"))
        .collect()
}

/// Order amounts in `amt` index order.
pub(super) fn amounts(fx: &Fixture) -> Vec<i64> {
    index_entries(
        fx,
        AMT,
        IndexKeyRange::all(),
        Direction::Asc,
        IndexScanSelector::LeafOnly,
    )
    .iter()
    .map(|values| values[0].as_int().expect("integer amount"))
    .collect()
}
