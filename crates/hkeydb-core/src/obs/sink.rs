//! Metrics sink boundary.
//!
//! Adapter and cursor logic MUST NOT depend on obs::metrics directly.
//! All instrumentation flows through MetricsEvent and MetricsSink.
//!
//! This module is the only allowed bridge between execution logic
//! and the thread-local metrics state.
use crate::{error::ErrorClass, obs::metrics, schema::TableId};
use std::{cell::RefCell, rc::Rc};

thread_local! {
    static SINK_OVERRIDE: RefCell<Option<Rc<dyn MetricsSink>>> = RefCell::new(None);
}

///
/// ScanKind
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ScanKind {
    Group,
    Index,
    Sort,
}

///
/// MutationKind
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MutationKind {
    Write,
    Update,
    Delete,
    Alter,
}

///
/// MetricsEvent
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MetricsEvent {
    CursorOpened {
        kind: ScanKind,
    },
    RowsScanned {
        table: TableId,
        rows: u64,
    },
    RowMutation {
        table: TableId,
        kind: MutationKind,
    },
    IndexDelta {
        inserts: u64,
        removes: u64,
    },
    Rollback {
        class: ErrorClass,
    },
    Cancelled,
    StepRestoreSkipped,
    SortCompleted {
        rows: u64,
        runs: u64,
    },
    IndexRowPool {
        hit: bool,
    },
}

///
/// MetricsSink
///

pub trait MetricsSink {
    fn record(&self, event: MetricsEvent);
}

/// GlobalMetricsSink
/// Default sink that writes into the thread-local metrics state.
/// Acts as the concrete sink when no scoped override is installed.

pub(crate) struct GlobalMetricsSink;

impl MetricsSink for GlobalMetricsSink {
    fn record(&self, event: MetricsEvent) {
        match event {
            MetricsEvent::CursorOpened { kind } => {
                metrics::with_state_mut(|m| match kind {
                    ScanKind::Group => {
                        m.ops.group_cursor_opens = m.ops.group_cursor_opens.saturating_add(1);
                    }
                    ScanKind::Index => {
                        m.ops.index_cursor_opens = m.ops.index_cursor_opens.saturating_add(1);
                    }
                    ScanKind::Sort => {
                        m.ops.sort_cursor_opens = m.ops.sort_cursor_opens.saturating_add(1);
                    }
                });
            }

            MetricsEvent::RowsScanned { table, rows } => {
                metrics::with_state_mut(|m| {
                    m.ops.rows_scanned = m.ops.rows_scanned.saturating_add(rows);
                    let entry = m.tables.entry(table.get()).or_default();
                    entry.rows_scanned = entry.rows_scanned.saturating_add(rows);
                });
            }

            MetricsEvent::RowMutation { table, kind } => {
                metrics::with_state_mut(|m| {
                    let entry = m.tables.entry(table.get()).or_default();
                    match kind {
                        MutationKind::Write => {
                            m.ops.rows_written = m.ops.rows_written.saturating_add(1);
                            entry.rows_written = entry.rows_written.saturating_add(1);
                        }
                        MutationKind::Update => {
                            m.ops.rows_updated = m.ops.rows_updated.saturating_add(1);
                            entry.rows_updated = entry.rows_updated.saturating_add(1);
                        }
                        MutationKind::Delete => {
                            m.ops.rows_deleted = m.ops.rows_deleted.saturating_add(1);
                            entry.rows_deleted = entry.rows_deleted.saturating_add(1);
                        }
                        MutationKind::Alter => {
                            m.ops.rows_altered = m.ops.rows_altered.saturating_add(1);
                            entry.rows_altered = entry.rows_altered.saturating_add(1);
                        }
                    }
                });
            }

            MetricsEvent::IndexDelta { inserts, removes } => {
                metrics::with_state_mut(|m| {
                    m.ops.index_inserts = m.ops.index_inserts.saturating_add(inserts);
                    m.ops.index_removes = m.ops.index_removes.saturating_add(removes);
                });
            }

            MetricsEvent::Rollback { class } => {
                metrics::with_state_mut(|m| {
                    m.ops.rollbacks = m.ops.rollbacks.saturating_add(1);
                    if class == ErrorClass::DuplicateKey {
                        m.ops.rollbacks_duplicate_key =
                            m.ops.rollbacks_duplicate_key.saturating_add(1);
                    }
                });
            }

            MetricsEvent::Cancelled => {
                metrics::with_state_mut(|m| {
                    m.ops.cancellations = m.ops.cancellations.saturating_add(1);
                });
            }

            MetricsEvent::StepRestoreSkipped => {
                metrics::with_state_mut(|m| {
                    m.ops.step_restores_skipped = m.ops.step_restores_skipped.saturating_add(1);
                });
            }

            MetricsEvent::SortCompleted { rows, runs } => {
                metrics::with_state_mut(|m| {
                    m.ops.sorts_completed = m.ops.sorts_completed.saturating_add(1);
                    m.ops.rows_sorted = m.ops.rows_sorted.saturating_add(rows);
                    m.ops.sort_runs = m.ops.sort_runs.saturating_add(runs);
                });
            }

            MetricsEvent::IndexRowPool { hit } => {
                metrics::with_state_mut(|m| {
                    if hit {
                        m.ops.index_row_pool_hits = m.ops.index_row_pool_hits.saturating_add(1);
                    } else {
                        m.ops.index_row_pool_misses =
                            m.ops.index_row_pool_misses.saturating_add(1);
                    }
                });
            }
        }
    }
}

pub(crate) const GLOBAL_METRICS_SINK: GlobalMetricsSink = GlobalMetricsSink;

pub(crate) fn record(event: MetricsEvent) {
    let override_sink = SINK_OVERRIDE.with(|cell| cell.borrow().clone());
    match override_sink {
        Some(sink) => sink.record(event),
        None => GLOBAL_METRICS_SINK.record(event),
    }
}

/// Snapshot the current metrics state for test and diagnostic plumbing.
#[must_use]
pub fn metrics_report() -> metrics::EventReport {
    metrics::report()
}

/// Reset all metrics state.
pub fn metrics_reset_all() {
    metrics::reset_all();
}

/// Run a closure with a temporary metrics sink override.
pub fn with_metrics_sink<T>(sink: Rc<dyn MetricsSink>, f: impl FnOnce() -> T) -> T {
    struct Guard(Option<Rc<dyn MetricsSink>>);

    impl Drop for Guard {
        fn drop(&mut self) {
            let prev = self.0.take();
            SINK_OVERRIDE.with(|cell| {
                *cell.borrow_mut() = prev;
            });
        }
    }

    let prev = SINK_OVERRIDE.with(|cell| cell.borrow_mut().replace(sink));
    let _guard = Guard(prev);

    f()
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct CapturingSink {
        events: RefCell<Vec<MetricsEvent>>,
    }

    impl MetricsSink for CapturingSink {
        fn record(&self, event: MetricsEvent) {
            self.events.borrow_mut().push(event);
        }
    }

    #[test]
    fn override_captures_events_and_is_restored() {
        metrics_reset_all();
        let sink = Rc::new(CapturingSink::default());

        with_metrics_sink(sink.clone(), || {
            record(MetricsEvent::Cancelled);
        });
        record(MetricsEvent::Cancelled);

        assert_eq!(sink.events.borrow().as_slice(), &[MetricsEvent::Cancelled]);
        let report = metrics_report();
        assert_eq!(report.counters.expect("counters").cancellations, 1);
    }

    #[test]
    fn row_mutations_are_counted_per_table() {
        metrics_reset_all();
        let table = TableId::new(3);

        record(MetricsEvent::RowMutation {
            table,
            kind: MutationKind::Write,
        });
        record(MetricsEvent::RowMutation {
            table,
            kind: MutationKind::Delete,
        });

        let report = metrics_report();
        let counters = report.table(table);
        assert_eq!(counters.rows_written, 1);
        assert_eq!(counters.rows_deleted, 1);
    }
}
