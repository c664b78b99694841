use crate::{hkey::HKey, schema::TableId};
use std::collections::HashMap;

///
/// HKeyCache
///
/// Scratch HKeys keyed by target table, owned by a query context so that
/// ancestor lookups reuse one buffer per table instead of allocating.
///

#[derive(Debug, Default)]
pub struct HKeyCache {
    slots: HashMap<TableId, HKey>,
}

impl HKeyCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Scratch key for `table`, created empty on first use.
    pub fn slot(&mut self, table: TableId) -> &mut HKey {
        self.slots.entry(table).or_default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
