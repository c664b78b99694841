//! Process-wide pool of index rows keyed by (adapter id, index row type).
//!
//! A pooled row is owned by exactly one holder at a time: it is either in
//! the pool, checked out as a bare `IndexRow`, or behind an `Rc` that a
//! cursor only reclaims once the consumer has dropped every clone.

use crate::{
    obs::sink::{MetricsEvent, record},
    row::IndexRow,
    rowtype::{RowType, RowTypeId},
};
use parking_lot::Mutex;
use std::{
    collections::HashMap,
    sync::{Arc, LazyLock},
};

type PoolKey = (u64, RowTypeId);

static INDEX_ROW_POOL: LazyLock<Mutex<HashMap<PoolKey, Vec<IndexRow>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// Check out a row of `row_type` for `adapter`.
pub(crate) fn take(adapter: u64, row_type: &Arc<RowType>) -> IndexRow {
    let pooled = INDEX_ROW_POOL
        .lock()
        .get_mut(&(adapter, row_type.id()))
        .and_then(Vec::pop);
    record(MetricsEvent::IndexRowPool {
        hit: pooled.is_some(),
    });

    pooled.unwrap_or_else(|| IndexRow::new(row_type.clone()))
}

/// Return a row; dropped instead when the slot already holds `capacity`.
pub(crate) fn give_back(adapter: u64, row: IndexRow, capacity: usize) {
    let mut pool = INDEX_ROW_POOL.lock();
    let slot = pool.entry((adapter, row.row_type().id())).or_default();
    if slot.len() < capacity {
        slot.push(row);
    }
}

/// Drop every row pooled for `adapter`.
pub(crate) fn purge(adapter: u64) {
    INDEX_ROW_POOL
        .lock()
        .retain(|&(owner, _), _| owner != adapter);
}

#[cfg(test)]
pub(crate) fn pooled(adapter: u64, row_type: RowTypeId) -> usize {
    INDEX_ROW_POOL
        .lock()
        .get(&(adapter, row_type))
        .map_or(0, Vec::len)
}
