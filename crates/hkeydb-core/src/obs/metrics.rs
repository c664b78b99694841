use crate::schema::TableId;
use serde::{Deserialize, Serialize};
use std::{cell::RefCell, collections::BTreeMap};

///
/// EventState
/// Ephemeral, in-memory counters for adapter and cursor operations.
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub(crate) struct EventState {
    pub(crate) ops: EventOps,
    pub(crate) tables: BTreeMap<u32, TableCounters>,
}

///
/// EventOps
///

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct EventOps {
    // Cursor opens by kind
    pub group_cursor_opens: u64,
    pub index_cursor_opens: u64,
    pub sort_cursor_opens: u64,

    // Rows touched
    pub rows_scanned: u64,
    pub rows_written: u64,
    pub rows_updated: u64,
    pub rows_deleted: u64,
    pub rows_altered: u64,

    // Index maintenance
    pub index_inserts: u64,
    pub index_removes: u64,

    // Failure handling
    pub rollbacks: u64,
    pub rollbacks_duplicate_key: u64,
    pub cancellations: u64,
    pub step_restores_skipped: u64,

    // Sorting
    pub sorts_completed: u64,
    pub rows_sorted: u64,
    pub sort_runs: u64,

    // Index-row pool
    pub index_row_pool_hits: u64,
    pub index_row_pool_misses: u64,
}

///
/// TableCounters
///

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct TableCounters {
    pub rows_scanned: u64,
    pub rows_written: u64,
    pub rows_updated: u64,
    pub rows_deleted: u64,
    pub rows_altered: u64,
}

///
/// EventReport
/// Point-in-time snapshot of the counters.
///

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct EventReport {
    pub counters: Option<EventOps>,
    pub tables: BTreeMap<u32, TableCounters>,
}

impl EventReport {
    /// Counters for one table, or zeros when it was never touched.
    #[must_use]
    pub fn table(&self, table: TableId) -> TableCounters {
        self.tables.get(&table.get()).cloned().unwrap_or_default()
    }
}

thread_local! {
    static EVENT_STATE: RefCell<EventState> = RefCell::new(EventState::default());
}

/// Borrow metrics immutably.
pub(crate) fn with_state<R>(f: impl FnOnce(&EventState) -> R) -> R {
    EVENT_STATE.with(|m| f(&m.borrow()))
}

/// Borrow metrics mutably.
pub(crate) fn with_state_mut<R>(f: impl FnOnce(&mut EventState) -> R) -> R {
    EVENT_STATE.with(|m| f(&mut m.borrow_mut()))
}

/// Reset all counters (useful in tests).
pub(crate) fn reset_all() {
    with_state_mut(|m| *m = EventState::default());
}

/// Snapshot the current state.
pub(crate) fn report() -> EventReport {
    with_state(|m| EventReport {
        counters: Some(m.ops.clone()),
        tables: m.tables.clone(),
    })
}
