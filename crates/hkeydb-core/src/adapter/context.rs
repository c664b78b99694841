use crate::{
    adapter::StoreAdapter,
    error::InternalError,
    hkey::{HKey, HKeyCache},
    row::Row,
    schema::TableId,
};

///
/// QueryContext
///
/// Per-query execution state: the adapter the query runs against and the
/// scratch HKeys used for ancestor lookups.
///

pub struct QueryContext {
    adapter: StoreAdapter,
    hkeys: HKeyCache,
}

impl QueryContext {
    #[must_use]
    pub fn new(adapter: StoreAdapter) -> Self {
        Self {
            adapter,
            hkeys: HKeyCache::new(),
        }
    }

    #[must_use]
    pub const fn adapter(&self) -> &StoreAdapter {
        &self.adapter
    }

    /// HKey of `row`'s ancestor in `table`, held in this context's cache slot
    /// for that table until the next lookup of the same table.
    pub fn ancestor_hkey(&mut self, row: &Row, table: TableId) -> Result<&HKey, InternalError> {
        let table = self.adapter.schema().try_table(table)?.table_ref();

        row.ancestor_hkey(table, &mut self.hkeys)
    }

    /// Number of tables with a cached scratch key.
    #[must_use]
    pub fn cached_tables(&self) -> usize {
        self.hkeys.len()
    }
}
