use crate::{
    adapter::AdapterHandle,
    error::InternalError,
    obs::sink::{MetricsEvent, record},
    row::Row,
    schema::Table,
};
use tracing::warn;

impl AdapterHandle {
    /// Central failure hook for every adapter call that touched the store.
    ///
    /// Cancellation is counted, and failures whose class demands it roll the
    /// transaction back. The error is returned unchanged for propagation.
    pub(crate) fn handle_error(&self, err: InternalError) -> InternalError {
        if err.is_cancelled() {
            record(MetricsEvent::Cancelled);
            warn!(adapter = self.id(), error = %err, "query canceled");
        }
        self.rollback_if_needed(&err);

        err
    }

    /// `handle_error` for a mutation of `row`: the failing table, and the
    /// row's HKey when it has one, are attached to the returned error.
    pub(crate) fn handle_row_error(
        &self,
        err: InternalError,
        table: &Table,
        row: &Row,
    ) -> InternalError {
        let hkey = row.hkey().map(ToString::to_string);

        self.handle_error(err).with_table(table.name(), hkey)
    }

    /// Roll back when `err` belongs to a rollback class and the transaction
    /// is still open. Other failures may originate above this layer and leave
    /// the transaction to the caller.
    pub(crate) fn rollback_if_needed(&self, err: &InternalError) {
        if !err.requires_rollback() || !self.txn().is_active() {
            return;
        }

        self.txn().rollback();
        record(MetricsEvent::Rollback { class: err.class });
        warn!(
            adapter = self.id(),
            class = %err.class,
            error = %err,
            "transaction rolled back"
        );
    }
}
