//! Row <-> physical record translation and the write primitives behind
//! `write_row`, `update_row`, `delete_row` and `alter_row`.

use crate::{
    adapter::{
        AdapterHandle,
        keys::{decode_group_key, decode_index_key, group_key, index_key, index_prefix},
    },
    codec::{RowEncoding, decode_record, encode_record},
    direction::Direction,
    error::InternalError,
    hkey::HKey,
    kv::{KeyRange, StoreError},
    obs::sink::{MetricsEvent, MutationKind, record},
    row::Row,
    schema::{Index, IndexId, Table, TableId},
    value::Value,
};

///
/// StoredImage
///
/// A row as it currently sits in the group tree.
///

#[derive(Debug)]
struct StoredImage {
    table: TableId,
    hkey: HKey,
    values: Vec<Value>,
}

///
/// AncestorValues
///
/// Ancestor rows of one HKey, read lazily while building index entries.
///

struct AncestorValues<'h> {
    hkey: &'h HKey,
    loaded: Vec<(TableId, Option<Vec<Value>>)>,
}

impl<'h> AncestorValues<'h> {
    const fn new(hkey: &'h HKey) -> Self {
        Self {
            hkey,
            loaded: Vec::new(),
        }
    }

    fn value(
        &mut self,
        handle: &AdapterHandle,
        ancestor: &Table,
        position: usize,
    ) -> Result<Value, InternalError> {
        let at = match self.loaded.iter().position(|(id, _)| *id == ancestor.id()) {
            Some(at) => at,
            None => {
                let values = handle.read_ancestor(self.hkey, ancestor)?;
                self.loaded.push((ancestor.id(), values));
                self.loaded.len() - 1
            }
        };

        Ok(self.loaded[at]
            .1
            .as_ref()
            .and_then(|values| values.get(position).cloned())
            .unwrap_or(Value::Null))
    }
}

impl AdapterHandle {
    // ─────────────────────────────────────────────
    // ROW VALIDATION
    // ─────────────────────────────────────────────

    /// The user table a written row belongs to.
    pub(crate) fn table_of(&self, row: &Row) -> Result<&Table, InternalError> {
        let table = row.row_type().user_table().ok_or_else(|| {
            InternalError::adapter_invariant(format!(
                "row of type {} does not belong to a user table",
                row.row_type().id()
            ))
        })?;

        self.schema().try_table(table)
    }

    /// The table shared by the two sides of an update.
    pub(crate) fn check_same_table(&self, old: &Row, new: &Row) -> Result<&Table, InternalError> {
        let old_table = self.table_of(old)?;
        let new_table = self.table_of(new)?;
        if old_table.id() != new_table.id() {
            return Err(InternalError::adapter_invariant(format!(
                "cannot update a '{}' row with a '{}' row",
                old_table.name(),
                new_table.name()
            )));
        }

        Ok(old_table)
    }

    fn prepare_values(&self, table: &Table, values: Vec<Value>) -> Result<Vec<Value>, InternalError> {
        if values.len() != table.columns().len() {
            return Err(InternalError::row_invariant(format!(
                "table '{}' has {} columns, got {} values",
                table.name(),
                table.columns().len(),
                values.len()
            )));
        }

        values
            .into_iter()
            .zip(table.columns())
            .map(|(value, column)| {
                let value = column.ty.coerce(value)?;
                if value.is_null() && !column.nullable {
                    return Err(InternalError::adapter_invariant(format!(
                        "column '{}.{}' is not nullable",
                        table.name(),
                        column.name
                    )));
                }

                Ok(value)
            })
            .collect()
    }

    // ─────────────────────────────────────────────
    // HKEYS
    // ─────────────────────────────────────────────

    /// HKey of a row of `table` holding `values`.
    ///
    /// The parent's stored HKey is found through its PRIMARY index. A row
    /// whose parent does not exist is an orphan: its parent segment carries
    /// the join values and every higher segment carries nulls.
    pub(crate) fn derive_hkey(&self, table: &Table, values: &[Value]) -> Result<HKey, InternalError> {
        let own = table.key_values(values);
        let Some(parent_id) = table.parent() else {
            let mut hkey = HKey::with_capacity(1);
            hkey.push_segment(table.id(), own);
            return Ok(hkey);
        };

        let parent = self.schema().table(parent_id);
        let join = table.join_values(values);
        let mut hkey = match self.find_by_primary(parent, &join)? {
            Some(found) => found,
            None => self.orphan_prefix(parent, join),
        };
        hkey.push_segment(table.id(), own);

        Ok(hkey)
    }

    fn find_by_primary(&self, table: &Table, key: &[Value]) -> Result<Option<HKey>, InternalError> {
        if key.iter().any(Value::is_null) {
            return Ok(None);
        }

        let prefix = index_prefix(table.primary_index(), key);
        let Some((entry, _)) = self.txn().seek(&KeyRange::prefix(&prefix), Direction::Asc)? else {
            return Ok(None);
        };
        let mut values = Vec::with_capacity(key.len());

        decode_index_key(&entry, key.len(), &mut values).map(Some)
    }

    fn orphan_prefix(&self, parent: &Table, join: Vec<Value>) -> HKey {
        let mut hkey = HKey::with_capacity(parent.depth() + 2);
        for &ancestor in parent.ancestors() {
            if ancestor == parent.id() {
                break;
            }
            let width = self.schema().table(ancestor).key_columns().len();
            hkey.push_segment(ancestor, vec![Value::Null; width]);
        }
        hkey.push_segment(parent.id(), join);

        hkey
    }

    // ─────────────────────────────────────────────
    // READS
    // ─────────────────────────────────────────────

    /// Decode one group entry into a stored row.
    pub(crate) fn stored_row(&self, key: &[u8], value: &[u8]) -> Result<Row, InternalError> {
        let hkey = decode_group_key(key)?;
        let record = decode_record(value, self.config().max_record_bytes)?;
        let table = self.known_table(record.table, &hkey)?;
        let row_type = self.schema().table_row_type(table.id());
        if record.values.len() != row_type.field_count() {
            return Err(InternalError::store_corruption(format!(
                "record at {hkey} has {} values, table {} has {} columns",
                record.values.len(),
                record.table,
                row_type.field_count()
            )));
        }

        Ok(Row::stored(
            row_type.clone(),
            record.values,
            hkey,
            record.encoding,
        ))
    }

    fn known_table(&self, id: TableId, hkey: &HKey) -> Result<&Table, InternalError> {
        self.schema()
            .tables()
            .get(id.get() as usize)
            .ok_or_else(|| {
                InternalError::store_corruption(format!(
                    "record at {hkey} names unknown table {id}"
                ))
            })
    }

    fn read_ancestor(&self, hkey: &HKey, ancestor: &Table) -> Result<Option<Vec<Value>>, InternalError> {
        let ancestor_key = hkey.truncated(ancestor.depth() + 1);
        let key = group_key(ancestor.group(), &ancestor_key)?;
        let Some(bytes) = self.txn().get(&key)? else {
            return Ok(None);
        };

        Ok(Some(decode_record(&bytes, self.config().max_record_bytes)?.values))
    }

    /// Current stored image of `row`. Stored rows are found by their own
    /// HKey; plain rows by the HKey their values derive.
    fn locate(&self, table: &Table, row: &Row) -> Result<StoredImage, InternalError> {
        let hkey = match row.hkey() {
            Some(hkey) if hkey.table() == Some(table.id()) => hkey.clone(),
            _ => {
                let values = self.prepare_values(table, row.to_values()?)?;
                self.derive_hkey(table, &values)?
            }
        };

        let key = group_key(table.group(), &hkey)?;
        let Some(bytes) = self.txn().get(&key)? else {
            return Err(InternalError::store_not_found("row not found")
                .with_row(table.name(), hkey.to_string()));
        };
        let values = decode_record(&bytes, self.config().max_record_bytes)?.values;

        Ok(StoredImage {
            table: table.id(),
            hkey,
            values,
        })
    }

    /// Every stored descendant of the row at `hkey`, in HKey order.
    fn descendants(&self, table: &Table, hkey: &HKey) -> Result<Vec<StoredImage>, InternalError> {
        let own_key = group_key(table.group(), hkey)?;
        let mut range = KeyRange::prefix(&own_key);
        range.advance_past(&own_key, Direction::Asc);

        let mut found = Vec::new();
        while let Some((key, value)) = self.txn().seek(&range, Direction::Asc)? {
            range.advance_past(&key, Direction::Asc);
            let record = decode_record(&value, self.config().max_record_bytes)?;
            let hkey = decode_group_key(&key)?;
            self.known_table(record.table, &hkey)?;
            found.push(StoredImage {
                table: record.table,
                hkey,
                values: record.values,
            });
        }

        Ok(found)
    }

    // ─────────────────────────────────────────────
    // WRITE PRIMITIVES
    // ─────────────────────────────────────────────

    /// Insert a new row, deriving its HKey.
    pub(crate) fn insert_row(
        &self,
        table: &Table,
        values: Vec<Value>,
        encoding: RowEncoding,
    ) -> Result<(), InternalError> {
        let values = self.prepare_values(table, values)?;
        let hkey = self.derive_hkey(table, &values)?;

        self.store_row(table, &values, &hkey, encoding)
    }

    fn store_row(
        &self,
        table: &Table,
        values: &[Value],
        hkey: &HKey,
        encoding: RowEncoding,
    ) -> Result<(), InternalError> {
        let key = group_key(table.group(), hkey)?;
        if self.txn().get(&key)?.is_some() {
            return Err(duplicate(format!("{}{hkey}", table.name())));
        }
        let bytes = encode_record(table.id(), values, encoding, self.config().max_record_bytes)?;
        self.txn().put(&key, &bytes)?;

        let mut ancestors = AncestorValues::new(hkey);
        let mut inserts = 0;
        for &index_id in table.covering_indexes() {
            let index = self.schema().index(index_id);
            self.insert_entry(index, table, values, hkey, &mut ancestors)?;
            inserts += 1;
        }
        record(MetricsEvent::IndexDelta {
            inserts,
            removes: 0,
        });

        Ok(())
    }

    fn remove_row(&self, table: &Table, values: &[Value], hkey: &HKey) -> Result<(), InternalError> {
        let mut ancestors = AncestorValues::new(hkey);
        let mut removes = 0;
        for &index_id in table.covering_indexes() {
            let index = self.schema().index(index_id);
            self.remove_entry(index, table, values, hkey, &mut ancestors)?;
            removes += 1;
        }

        let key = group_key(table.group(), hkey)?;
        self.txn().delete(&key)?;
        record(MetricsEvent::IndexDelta {
            inserts: 0,
            removes,
        });

        Ok(())
    }

    fn entry_values(
        &self,
        index: &Index,
        table: &Table,
        values: &[Value],
        ancestors: &mut AncestorValues<'_>,
    ) -> Result<Vec<Value>, InternalError> {
        index
            .columns()
            .iter()
            .map(|column| {
                if column.table == table.id() {
                    return Ok(values.get(column.position).cloned().unwrap_or(Value::Null));
                }
                if table.ancestors().contains(&column.table) {
                    let ancestor = self.schema().table(column.table);
                    return ancestors.value(self, ancestor, column.position);
                }

                // column of a deeper table than this entry's row
                Ok(Value::Null)
            })
            .collect()
    }

    fn insert_entry(
        &self,
        index: &Index,
        table: &Table,
        values: &[Value],
        hkey: &HKey,
        ancestors: &mut AncestorValues<'_>,
    ) -> Result<(), InternalError> {
        let entry = self.entry_values(index, table, values, ancestors)?;
        if index.is_unique() && index.leaf() == table.id() && !entry.iter().any(Value::is_null) {
            self.check_unique(index, table, &entry, hkey)?;
        }
        self.txn().put(&index_key(index.id(), &entry, hkey)?, &[])?;

        Ok(())
    }

    fn remove_entry(
        &self,
        index: &Index,
        table: &Table,
        values: &[Value],
        hkey: &HKey,
        ancestors: &mut AncestorValues<'_>,
    ) -> Result<(), InternalError> {
        let entry = self.entry_values(index, table, values, ancestors)?;
        self.txn().delete(&index_key(index.id(), &entry, hkey)?)?;

        Ok(())
    }

    fn check_unique(
        &self,
        index: &Index,
        table: &Table,
        entry: &[Value],
        hkey: &HKey,
    ) -> Result<(), InternalError> {
        let prefix = index_prefix(index.id(), entry);
        let Some((existing, _)) = self.txn().seek(&KeyRange::prefix(&prefix), Direction::Asc)?
        else {
            return Ok(());
        };
        let mut scratch = Vec::with_capacity(entry.len());
        if decode_index_key(&existing, entry.len(), &mut scratch)? == *hkey {
            return Ok(());
        }

        let rendered = entry
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");

        Err(duplicate(format!(
            "{}.{} ({rendered})",
            table.name(),
            index.name()
        )))
    }

    // ─────────────────────────────────────────────
    // MUTATIONS
    // ─────────────────────────────────────────────

    /// Replace the stored image of `old` with `new_values`. Descendants are
    /// re-derived when the row moves or when a column their index entries
    /// read changes.
    pub(crate) fn update_stored_row(
        &self,
        table: &Table,
        old: &Row,
        new_values: Vec<Value>,
        encoding: RowEncoding,
    ) -> Result<(), InternalError> {
        let image = self.locate(table, old)?;
        let new_values = self.prepare_values(table, new_values)?;
        let new_hkey = self.derive_hkey(table, &new_values)?;

        let moved = new_hkey != image.hkey;
        let cascade = moved
            || table
                .cascade_columns()
                .iter()
                .any(|&pos| image.values.get(pos) != new_values.get(pos));
        let descendants = if cascade {
            self.descendants(table, &image.hkey)?
        } else {
            Vec::new()
        };

        self.remove_descendants(&descendants)?;
        self.remove_row(table, &image.values, &image.hkey)?;
        self.store_row(table, &new_values, &new_hkey, encoding)?;
        self.rederive_descendants(descendants, encoding)
    }

    /// Remove `row`; cascade to descendants or leave them as orphans.
    pub(crate) fn delete_stored_row(
        &self,
        table: &Table,
        row: &Row,
        encoding: RowEncoding,
        cascade: bool,
    ) -> Result<(), InternalError> {
        let image = self.locate(table, row)?;
        let descendants = self.descendants(table, &image.hkey)?;

        self.remove_descendants(&descendants)?;
        self.remove_row(table, &image.values, &image.hkey)?;
        if cascade {
            for descendant in &descendants {
                record(MetricsEvent::RowMutation {
                    table: descendant.table,
                    kind: MutationKind::Delete,
                });
            }

            return Ok(());
        }

        self.rederive_descendants(descendants, encoding)
    }

    /// Remove only `old`'s own record and index entries.
    pub(crate) fn delete_footprint(&self, table: &Table, old: &Row) -> Result<(), InternalError> {
        let image = self.locate(table, old)?;

        self.remove_row(table, &image.values, &image.hkey)
    }

    /// Rewrite a row that keeps its HKey, maintaining only `indexes`.
    pub(crate) fn rewrite_in_place(
        &self,
        table: &Table,
        old: &Row,
        new_values: Vec<Value>,
        encoding: RowEncoding,
        indexes: &[IndexId],
    ) -> Result<(), InternalError> {
        let image = self.locate(table, old)?;
        let new_values = self.prepare_values(table, new_values)?;
        if table.key_values(&new_values) != table.key_values(&image.values) {
            return Err(InternalError::adapter_invariant(format!(
                "in-place alter of '{}' row {} changes its key",
                table.name(),
                image.hkey
            )));
        }

        if let Some(&foreign) = indexes
            .iter()
            .find(|id| !table.covering_indexes().contains(id))
        {
            return Err(InternalError::adapter_invariant(format!(
                "index {foreign} has no entries for table '{}'",
                table.name()
            )));
        }

        let key = group_key(table.group(), &image.hkey)?;
        let bytes = encode_record(table.id(), &new_values, encoding, self.config().max_record_bytes)?;
        self.txn().put(&key, &bytes)?;

        let mut ancestors = AncestorValues::new(&image.hkey);
        for &index_id in indexes {
            let index = self.schema().index(index_id);
            self.remove_entry(index, table, &image.values, &image.hkey, &mut ancestors)?;
            self.insert_entry(index, table, &new_values, &image.hkey, &mut ancestors)?;
        }
        record(MetricsEvent::IndexDelta {
            inserts: indexes.len() as u64,
            removes: indexes.len() as u64,
        });

        Ok(())
    }

    // Deepest rows first, so every entry still finds its ancestors.
    fn remove_descendants(&self, descendants: &[StoredImage]) -> Result<(), InternalError> {
        for image in descendants.iter().rev() {
            let table = self.schema().table(image.table);
            self.remove_row(table, &image.values, &image.hkey)?;
        }

        Ok(())
    }

    // Shallowest rows first, so children find their re-inserted parents.
    fn rederive_descendants(
        &self,
        descendants: Vec<StoredImage>,
        encoding: RowEncoding,
    ) -> Result<(), InternalError> {
        for image in descendants {
            let table = self.schema().table(image.table);
            let hkey = self.derive_hkey(table, &image.values)?;
            self.store_row(table, &image.values, &hkey, encoding)?;
        }

        Ok(())
    }
}

fn duplicate(key: String) -> InternalError {
    InternalError::from_store(StoreError::DuplicateKey { key })
}
