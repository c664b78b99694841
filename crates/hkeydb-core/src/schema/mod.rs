//! Module: schema
//! Responsibility: table, group, index and sequence metadata plus the
//! precomputed row types derived from it.
//! Does not own: storage layout, which the adapter derives from these ids.

mod builder;


use crate::{
    error::InternalError,
    rowtype::{RowType, RowTypeId, TableRef},
    value::{ColumnType, Value},
};
use derive_more::Display;
use std::{
    collections::BTreeMap,
    sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    },
};

// re-exports
pub use builder::{IndexDef, SchemaBuilder, TableDef};

/// Name given to every table's automatic key index.
pub const PRIMARY_INDEX_NAME: &str = "PRIMARY";

///
/// TableId
///
/// Stable table ordinal. Also the ordinal written into HKey segments.
///

#[derive(Clone, Copy, Debug, Display, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct TableId(u32);

impl TableId {
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

///
/// IndexId
///

#[derive(Clone, Copy, Debug, Display, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct IndexId(u32);

impl IndexId {
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

///
/// GroupId
///

#[derive(Clone, Copy, Debug, Display, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct GroupId(u32);

impl GroupId {
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

///
/// Column
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Column {
    pub name: String,
    pub ty: ColumnType,
    pub nullable: bool,
}

///
/// Table
///
/// One user table positioned in its group hierarchy.
///

#[derive(Clone, Debug)]
pub struct Table {
    id: TableId,
    name: String,
    columns: Vec<Column>,
    key: Vec<usize>,
    parent: Option<TableId>,
    join: Vec<usize>,
    depth: usize,
    group: GroupId,
    ancestors: Vec<TableId>,
    children: Vec<TableId>,
    primary: IndexId,
    covering_indexes: Vec<IndexId>,
    cascade_columns: Vec<usize>,
}

impl Table {
    #[must_use]
    pub const fn id(&self) -> TableId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    #[must_use]
    pub fn column_position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column.name == name)
    }

    /// Declared key column positions, in key order.
    #[must_use]
    pub fn key_columns(&self) -> &[usize] {
        &self.key
    }

    #[must_use]
    pub const fn parent(&self) -> Option<TableId> {
        self.parent
    }

    /// Positions of this table's columns that reference the parent key.
    #[must_use]
    pub fn join_columns(&self) -> &[usize] {
        &self.join
    }

    /// Root tables are depth 0.
    #[must_use]
    pub const fn depth(&self) -> usize {
        self.depth
    }

    #[must_use]
    pub const fn group(&self) -> GroupId {
        self.group
    }

    /// Ancestor chain from the group root down to and including this table.
    #[must_use]
    pub fn ancestors(&self) -> &[TableId] {
        &self.ancestors
    }

    #[must_use]
    pub fn children(&self) -> &[TableId] {
        &self.children
    }

    #[must_use]
    pub const fn primary_index(&self) -> IndexId {
        self.primary
    }

    /// Indexes that keep an entry for rows of this table.
    #[must_use]
    pub fn covering_indexes(&self) -> &[IndexId] {
        &self.covering_indexes
    }

    /// Columns read by index entries of descendant tables. Changing one of
    /// them forces descendants to be re-derived.
    #[must_use]
    pub fn cascade_columns(&self) -> &[usize] {
        &self.cascade_columns
    }

    #[must_use]
    pub const fn table_ref(&self) -> TableRef {
        TableRef {
            id: self.id,
            depth: self.depth,
            field_count: self.columns.len(),
        }
    }

    #[must_use]
    pub fn is_ancestor_or_self_of(&self, other: &Self) -> bool {
        other.ancestors.get(self.depth) == Some(&self.id)
    }

    #[must_use]
    pub fn key_values(&self, values: &[Value]) -> Vec<Value> {
        pick(values, &self.key)
    }

    #[must_use]
    pub fn join_values(&self, values: &[Value]) -> Vec<Value> {
        pick(values, &self.join)
    }
}

fn pick(values: &[Value], positions: &[usize]) -> Vec<Value> {
    positions
        .iter()
        .map(|&pos| values.get(pos).cloned().unwrap_or(Value::Null))
        .collect()
}

///
/// IndexColumn
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct IndexColumn {
    pub table: TableId,
    pub position: usize,
}

///
/// Index
///
/// Secondary (or primary) index over a leaf table. Columns may be drawn from
/// the leaf or any of its ancestors.
///

#[derive(Clone, Debug)]
pub struct Index {
    id: IndexId,
    name: String,
    leaf: TableId,
    columns: Vec<IndexColumn>,
    unique: bool,
    primary: bool,
    span: Vec<TableId>,
}

impl Index {
    #[must_use]
    pub const fn id(&self) -> IndexId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn leaf(&self) -> TableId {
        self.leaf
    }

    #[must_use]
    pub fn columns(&self) -> &[IndexColumn] {
        &self.columns
    }

    #[must_use]
    pub const fn is_unique(&self) -> bool {
        self.unique
    }

    #[must_use]
    pub const fn is_primary(&self) -> bool {
        self.primary
    }

    /// Tables with entries in this index, from the shallowest indexed table
    /// down to the leaf.
    #[must_use]
    pub fn span(&self) -> &[TableId] {
        &self.span
    }

    #[must_use]
    pub fn spans(&self, table: TableId) -> bool {
        self.span.contains(&table)
    }
}

///
/// Group
///

#[derive(Clone, Debug)]
pub struct Group {
    id: GroupId,
    name: String,
    root: TableId,
}

impl Group {
    #[must_use]
    pub const fn id(&self) -> GroupId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn root(&self) -> TableId {
        self.root
    }
}

///
/// Sequence
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Sequence {
    pub name: String,
    pub start: i64,
    pub increment: i64,
}

///
/// Schema
///
/// Immutable schema snapshot shared by every adapter of a session. Derived
/// row types are minted on demand with fresh ids.
///

#[derive(Debug)]
pub struct Schema {
    tables: Vec<Table>,
    indexes: Vec<Index>,
    groups: Vec<Group>,
    sequences: BTreeMap<String, Sequence>,
    table_row_types: Vec<Arc<RowType>>,
    hkey_row_types: Vec<Arc<RowType>>,
    index_row_types: Vec<Arc<RowType>>,
    next_row_type: AtomicU32,
}

impl Schema {
    #[must_use]
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::new()
    }

    /// Table by id.
    ///
    /// # Panics
    ///
    /// Panics on an id this schema did not mint; use [`Self::try_table`] for
    /// ids that come from outside.
    #[must_use]
    pub fn table(&self, id: TableId) -> &Table {
        &self.tables[id.0 as usize]
    }

    pub fn try_table(&self, id: TableId) -> Result<&Table, InternalError> {
        self.tables
            .get(id.0 as usize)
            .ok_or_else(|| InternalError::schema_invariant(format!("unknown table id {id}")))
    }

    pub fn table_by_name(&self, name: &str) -> Result<&Table, InternalError> {
        self.tables
            .iter()
            .find(|table| table.name == name)
            .ok_or_else(|| InternalError::schema_invariant(format!("unknown table '{name}'")))
    }

    #[must_use]
    pub fn tables(&self) -> &[Table] {
        &self.tables
    }

    /// Index by id.
    ///
    /// # Panics
    ///
    /// Panics on an id this schema did not mint; see [`Self::try_index`].
    #[must_use]
    pub fn index(&self, id: IndexId) -> &Index {
        &self.indexes[id.0 as usize]
    }

    pub fn try_index(&self, id: IndexId) -> Result<&Index, InternalError> {
        self.indexes
            .get(id.0 as usize)
            .ok_or_else(|| InternalError::schema_invariant(format!("unknown index id {id}")))
    }

    #[must_use]
    pub fn indexes(&self) -> &[Index] {
        &self.indexes
    }

    pub fn index_by_name(&self, table: &str, name: &str) -> Result<&Index, InternalError> {
        let leaf = self.table_by_name(table)?.id;
        self.indexes
            .iter()
            .find(|index| index.leaf == leaf && index.name == name)
            .ok_or_else(|| {
                InternalError::schema_invariant(format!("unknown index '{table}.{name}'"))
            })
    }

    /// Group by id.
    ///
    /// # Panics
    ///
    /// Panics on an id this schema did not mint.
    #[must_use]
    pub fn group(&self, id: GroupId) -> &Group {
        &self.groups[id.0 as usize]
    }

    pub fn group_by_name(&self, name: &str) -> Result<&Group, InternalError> {
        self.groups
            .iter()
            .find(|group| group.name == name)
            .ok_or_else(|| InternalError::schema_invariant(format!("unknown group '{name}'")))
    }

    #[must_use]
    pub fn sequence(&self, name: &str) -> Option<&Sequence> {
        self.sequences.get(name)
    }

    /// Built-in row types below panic on ids this schema did not mint.
    #[must_use]
    pub fn table_row_type(&self, id: TableId) -> &Arc<RowType> {
        &self.table_row_types[id.0 as usize]
    }

    #[must_use]
    pub fn hkey_row_type(&self, id: TableId) -> &Arc<RowType> {
        &self.hkey_row_types[id.0 as usize]
    }

    #[must_use]
    pub fn index_row_type(&self, id: IndexId) -> &Arc<RowType> {
        &self.index_row_types[id.0 as usize]
    }

    /// Row type of `parent` joined with `child` on their hierarchy.
    #[must_use]
    pub fn flattened_type(&self, parent: &Arc<RowType>, child: &Arc<RowType>) -> Arc<RowType> {
        RowType::flattened(self.next_row_type_id(), parent.clone(), child.clone())
    }

    /// Product of two branches sharing an ancestor. The branch table is
    /// resolved from the inputs when not supplied.
    pub fn product_type(
        &self,
        left: &Arc<RowType>,
        right: &Arc<RowType>,
        branch: Option<TableId>,
    ) -> Result<Arc<RowType>, InternalError> {
        RowType::product(self.next_row_type_id(), left.clone(), right.clone(), branch)
    }

    fn next_row_type_id(&self) -> RowTypeId {
        RowTypeId::new(self.next_row_type.fetch_add(1, Ordering::Relaxed))
    }
}
