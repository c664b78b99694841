use crate::{
    kv::KvTransaction,
    obs::sink::{MetricsEvent, record},
};
use tracing::debug;

///
/// UpdateStep
///
/// Scoped step bracket around one mutation.
///
/// Entering records the transaction's step and advances it when the step is
/// already non-zero (or when forced). Dropping restores the recorded step,
/// unless the transaction has ended or a rollback is pending, in which case
/// the step is left where the failed mutation put it.
///

pub struct UpdateStep<'a> {
    txn: &'a dyn KvTransaction,
    saved: u32,
}

impl<'a> UpdateStep<'a> {
    pub(crate) fn enter(txn: &'a dyn KvTransaction, even_if_zero: bool, step_changing: bool) -> Self {
        let saved = txn.step();
        if (even_if_zero || saved > 0) && step_changing {
            txn.increment_step();
        }

        Self { txn, saved }
    }

    /// Step that will be restored.
    #[must_use]
    pub const fn saved_step(&self) -> u32 {
        self.saved
    }
}

impl Drop for UpdateStep<'_> {
    fn drop(&mut self) {
        if self.txn.is_active() && !self.txn.is_rollback_pending() {
            self.txn.set_step(self.saved);
            return;
        }

        record(MetricsEvent::StepRestoreSkipped);
        debug!(
            saved = self.saved,
            step = self.txn.step(),
            "step restore skipped: transaction inactive or rolling back"
        );
    }
}
