//! Observability: runtime telemetry (metrics) and sink abstractions.
//!
//! This module does not access storage internals directly.
//! Diagnostic log lines are emitted through `tracing` at the call sites.

pub(crate) mod metrics;
pub(crate) mod sink;

// re-exports
pub use metrics::{EventOps, EventReport, TableCounters};
pub use sink::{
    MetricsEvent, MetricsSink, MutationKind, ScanKind, metrics_report, metrics_reset_all,
    with_metrics_sink,
};
