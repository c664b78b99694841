//! Module: adapter
//! Responsibility: the bridge between cursors/rows and the ordered key-value
//! transaction. Opens group and index scans, translates rows to physical
//! records, brackets every mutation in a step guard, and decides rollback.
//! Does not own: the transaction itself, which belongs to the session.

mod context;
mod group_cursor;
mod index_cursor;
mod keys;
mod pool;
mod row_store;
mod sort;
mod step;
mod translate;

#[cfg(test)]
mod tests;

use crate::{
    codec::RowEncoding,
    config::AdapterConfig,
    cursor::Cursor,
    direction::Direction,
    error::{ErrorClass, ErrorOrigin, InternalError},
    hkey::HKey,
    kv::KvTransaction,
    obs::sink::{MetricsEvent, MutationKind, record},
    row::{IndexRow, Row},
    rowtype::RowType,
    schema::{GroupId, IndexId, Schema, Table, TableId},
    value::{Value, encode_ordered_value},
};
use std::{
    cell::Cell,
    rc::Rc,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};
use xxhash_rust::xxh3::xxh3_64;

// re-exports
pub use context::QueryContext;
pub use group_cursor::GroupCursor;
pub use index_cursor::{IndexBound, IndexCursor, IndexKeyRange, IndexScanSelector};
pub use sort::{SortCursor, SortKey, SortOption, SortOrdering, SortedCursor, Sorter};
pub use step::UpdateStep;

static NEXT_ADAPTER_ID: AtomicU64 = AtomicU64::new(1);

///
/// AdapterHandle
///
/// State shared by an adapter and every cursor it opened.
///

pub(crate) struct AdapterHandle {
    id: u64,
    schema: Arc<Schema>,
    txn: Rc<dyn KvTransaction>,
    config: AdapterConfig,
    with_step_changing: Cell<bool>,
}

impl AdapterHandle {
    pub(crate) const fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn schema(&self) -> &Schema {
        &self.schema
    }

    pub(crate) fn txn(&self) -> &dyn KvTransaction {
        self.txn.as_ref()
    }

    pub(crate) const fn config(&self) -> &AdapterConfig {
        &self.config
    }
}

impl Drop for AdapterHandle {
    fn drop(&mut self) {
        pool::purge(self.id);
    }
}

///
/// StoreAdapter
///
/// One session's view of the store. Cloning shares the same handle.
///

#[derive(Clone)]
pub struct StoreAdapter {
    handle: Rc<AdapterHandle>,
}

impl StoreAdapter {
    pub fn new(
        schema: Arc<Schema>,
        txn: Rc<dyn KvTransaction>,
        config: AdapterConfig,
    ) -> Result<Self, InternalError> {
        config.validate()?;
        let with_step_changing = Cell::new(config.with_step_changing);

        Ok(Self {
            handle: Rc::new(AdapterHandle {
                id: NEXT_ADAPTER_ID.fetch_add(1, Ordering::Relaxed),
                schema,
                txn,
                config,
                with_step_changing,
            }),
        })
    }

    /// Process-unique adapter id; keys this adapter's index-row pool.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.handle.id
    }

    #[must_use]
    pub fn schema(&self) -> &Arc<Schema> {
        &self.handle.schema
    }

    #[must_use]
    pub fn transaction(&self) -> &Rc<dyn KvTransaction> {
        &self.handle.txn
    }

    #[must_use]
    pub fn config(&self) -> &AdapterConfig {
        &self.handle.config
    }

    #[must_use]
    pub fn with_step_changing(&self) -> bool {
        self.handle.with_step_changing.get()
    }

    pub fn set_with_step_changing(&self, enabled: bool) {
        self.handle.with_step_changing.set(enabled);
    }

    /// Encoding flag for callers that do not thread their own.
    #[must_use]
    pub fn use_current_encoding(&self) -> bool {
        self.handle.config.use_current_encoding
    }

    // ─────────────────────────────────────────────
    // SCANS
    // ─────────────────────────────────────────────

    /// Scan of every row of `group` in HKey order.
    #[must_use]
    pub fn new_group_cursor(&self, group: GroupId) -> GroupCursor {
        GroupCursor::new(self.handle.clone(), group)
    }

    /// Scan of `index` within `range`. `selector` picks which spanned tables'
    /// entries are yielded.
    pub fn new_index_cursor(
        &self,
        index: IndexId,
        range: IndexKeyRange,
        ordering: Direction,
        selector: IndexScanSelector,
    ) -> Result<IndexCursor, InternalError> {
        IndexCursor::new(self.handle.clone(), index, range, ordering, selector)
    }

    /// External sort of `input` behind the cursor contract.
    pub fn sort<C: Cursor>(
        &self,
        input: C,
        row_type: Arc<RowType>,
        ordering: SortOrdering,
        option: SortOption,
    ) -> Result<SortCursor<C>, InternalError> {
        SortCursor::new(
            input,
            row_type,
            ordering,
            option,
            self.handle.config.sort_run_rows,
        )
    }

    /// Empty HKey sized for rows of `table`.
    pub fn new_hkey(&self, table: TableId) -> Result<HKey, InternalError> {
        let depth = self.handle.schema.try_table(table)?.depth();

        Ok(HKey::with_capacity(depth + 1))
    }

    // ─────────────────────────────────────────────
    // MUTATIONS
    // ─────────────────────────────────────────────

    pub fn write_row(&self, row: &Row, use_current: bool) -> Result<(), InternalError> {
        let table = self.handle.table_of(row)?;
        let values = row.to_values()?;

        let _step = self.enter_update_step(false);
        self.handle
            .insert_row(table, values, RowEncoding::select(use_current))
            .map_err(|err| self.handle.handle_row_error(err, table, row))?;
        record_mutation(table, MutationKind::Write);

        Ok(())
    }

    /// Replace `old` with `new`; both must be rows of the same table.
    pub fn update_row(&self, old: &Row, new: &Row, use_current: bool) -> Result<(), InternalError> {
        let table = self.handle.check_same_table(old, new)?;
        let new_values = new.to_values()?;

        let _step = self.enter_update_step(false);
        self.handle
            .update_stored_row(table, old, new_values, RowEncoding::select(use_current))
            .map_err(|err| self.handle.handle_row_error(err, table, old))?;
        record_mutation(table, MutationKind::Update);

        Ok(())
    }

    /// Remove `row`. With `cascade` every descendant goes too; otherwise
    /// descendants stay and are re-keyed as orphans.
    pub fn delete_row(&self, row: &Row, use_current: bool, cascade: bool) -> Result<(), InternalError> {
        let table = self.handle.table_of(row)?;

        let _step = self.enter_update_step(false);
        self.handle
            .delete_stored_row(table, row, RowEncoding::select(use_current), cascade)
            .map_err(|err| self.handle.handle_row_error(err, table, row))?;
        record_mutation(table, MutationKind::Delete);

        Ok(())
    }

    /// Update used when a row's key columns may have changed.
    ///
    /// A moved row is deleted outside the step bracket and inserted inside
    /// it; otherwise the row is rewritten in place and only `indexes` are
    /// maintained.
    pub fn alter_row(
        &self,
        old: &Row,
        new: &Row,
        indexes: &[IndexId],
        hkey_changed: bool,
        use_current: bool,
    ) -> Result<(), InternalError> {
        let table = self.handle.check_same_table(old, new)?;
        let new_values = new.to_values()?;
        let encoding = RowEncoding::select(use_current);

        if hkey_changed {
            self.handle
                .delete_footprint(table, old)
                .map_err(|err| self.handle.handle_row_error(err, table, old))?;

            let _step = self.enter_update_step(false);
            self.handle
                .insert_row(table, new_values, encoding)
                .map_err(|err| self.handle.handle_row_error(err, table, new))?;
        } else {
            let _step = self.enter_update_step(false);
            self.handle
                .rewrite_in_place(table, old, new_values, encoding, indexes)
                .map_err(|err| self.handle.handle_row_error(err, table, old))?;
        }
        record_mutation(table, MutationKind::Alter);

        Ok(())
    }

    // ─────────────────────────────────────────────
    // STEPS
    // ─────────────────────────────────────────────

    /// Record the current step and advance it for one mutation. The returned
    /// guard restores the recorded step when dropped.
    #[must_use]
    pub fn enter_update_step(&self, even_if_zero: bool) -> UpdateStep<'_> {
        UpdateStep::enter(
            self.handle.txn(),
            even_if_zero,
            self.handle.with_step_changing.get(),
        )
    }

    /// Make this statement's own writes visible to its later reads.
    pub fn advance_past_writes(&self) {
        let txn = self.handle.txn();
        let step = txn.step().max(txn.max_write_step());
        txn.set_step(step);
    }

    // ─────────────────────────────────────────────
    // SEQUENCES
    // ─────────────────────────────────────────────

    pub fn sequence_next_value(&self, name: &str) -> Result<i64, InternalError> {
        let sequence = self
            .handle
            .schema
            .sequence(name)
            .ok_or_else(|| InternalError::no_such_sequence(name))?;

        self.handle
            .txn()
            .sequence_next(name, sequence.start, sequence.increment)
            .map_err(|err| self.handle.handle_error(err.into()))
    }

    /// Last value handed out by `name` in this store.
    pub fn sequence_current_value(&self, name: &str) -> Result<i64, InternalError> {
        if self.handle.schema.sequence(name).is_none() {
            return Err(InternalError::no_such_sequence(name));
        }

        self.handle
            .txn()
            .sequence_current(name)
            .map_err(|err| self.handle.handle_error(err.into()))?
            .ok_or_else(|| {
                InternalError::new(
                    ErrorClass::NotFound,
                    ErrorOrigin::Sequence,
                    format!("sequence '{name}' has not produced a value yet"),
                )
            })
    }

    // ─────────────────────────────────────────────
    // VALUES
    // ─────────────────────────────────────────────

    /// Stable 64-bit hash of a value's ordered encoding.
    #[must_use]
    pub fn hash(&self, value: &Value) -> u64 {
        let mut bytes = Vec::new();
        encode_ordered_value(&mut bytes, value);

        xxh3_64(&bytes)
    }

    // ─────────────────────────────────────────────
    // INDEX ROW POOL
    // ─────────────────────────────────────────────

    /// Check out an index row of `row_type`, reusing a pooled one if present.
    #[must_use]
    pub fn take_index_row(&self, row_type: &Arc<RowType>) -> IndexRow {
        pool::take(self.handle.id, row_type)
    }

    pub fn return_index_row(&self, row: IndexRow) {
        pool::give_back(self.handle.id, row, self.handle.config.index_row_pool_capacity);
    }

    /// Return an index row handed out through a `Row`. Fails when any other
    /// clone of the row is still alive.
    pub fn return_shared_index_row(&self, row: Row) -> Result<(), InternalError> {
        let Row::Index(shared) = row else {
            return Err(InternalError::adapter_invariant(format!(
                "row of type {} is not an index row",
                row.row_type().id()
            )));
        };
        let row = Rc::try_unwrap(shared).map_err(|shared| {
            InternalError::adapter_invariant(format!(
                "index row {} is still shared by {} holders",
                shared.hkey(),
                Rc::strong_count(&shared)
            ))
        })?;
        self.return_index_row(row);

        Ok(())
    }
}

fn record_mutation(table: &Table, kind: MutationKind) {
    record(MetricsEvent::RowMutation {
        table: table.id(),
        kind,
    });
}
