//! Module: rowtype
//! Responsibility: static row shapes, including composite shapes built from
//! two inputs that share an ancestor table.
//! Does not own: the runtime values, which live in `row`.

mod branch;

#[cfg(test)]
mod tests;

use crate::{
    error::InternalError,
    schema::{IndexId, TableId},
    value::ColumnType,
};
use derive_more::Display;
use std::sync::Arc;

// re-exports
pub use branch::resolve_branch;

///
/// RowTypeId
///

#[derive(Clone, Copy, Debug, Display, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct RowTypeId(u32);

impl RowTypeId {
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
/// TableRef
///
/// The parts of a table a row type needs to reason about composition.
///

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct TableRef {
    pub id: TableId,
    pub depth: usize,
    pub field_count: usize,
}

///
/// RowTypeKind
///

#[derive(Clone, Debug)]
pub enum RowTypeKind {
    /// A user table's full column list.
    Table { table: TableRef },

    /// The flattened key values of a table's HKey.
    HKey { table: TableRef },

    /// The declared columns of one index.
    Index { index: IndexId, leaf: TableRef },

    /// A parent row followed by one of its descendants' rows.
    Flattened {
        parent: Arc<RowType>,
        child: Arc<RowType>,
    },

    /// Two branches of the same hierarchy meeting at `branch`; the branch
    /// table's columns appear once.
    Product {
        left: Arc<RowType>,
        right: Arc<RowType>,
        branch: TableRef,
    },
}

///
/// FieldSource
///
/// Where a composite row reads one of its fields.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FieldSource {
    Left(usize),
    Right(usize),
}

///
/// RowType
///

#[derive(Clone, Debug)]
pub struct RowType {
    id: RowTypeId,
    kind: RowTypeKind,
    fields: Vec<ColumnType>,
    tables: Vec<TableRef>,
}

impl RowType {
    pub(crate) fn table(id: RowTypeId, table: TableRef, fields: Vec<ColumnType>) -> Arc<Self> {
        Arc::new(Self {
            id,
            kind: RowTypeKind::Table { table },
            fields,
            tables: vec![table],
        })
    }

    pub(crate) fn hkey(id: RowTypeId, table: TableRef, fields: Vec<ColumnType>) -> Arc<Self> {
        Arc::new(Self {
            id,
            kind: RowTypeKind::HKey { table },
            fields,
            tables: vec![table],
        })
    }

    pub(crate) fn index(
        id: RowTypeId,
        index: IndexId,
        leaf: TableRef,
        fields: Vec<ColumnType>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id,
            kind: RowTypeKind::Index { index, leaf },
            fields,
            tables: vec![leaf],
        })
    }

    /// Concatenate `parent` and `child` shapes.
    #[must_use]
    pub fn flattened(id: RowTypeId, parent: Arc<Self>, child: Arc<Self>) -> Arc<Self> {
        let fields = parent.fields.iter().chain(&child.fields).copied().collect();
        let tables = union(&parent.tables, &child.tables);

        Arc::new(Self {
            id,
            kind: RowTypeKind::Flattened { parent, child },
            fields,
            tables,
        })
    }

    /// Compose two inputs that meet at a shared ancestor.
    ///
    /// When `branch` is `None` it is resolved from the inputs' table sets.
    /// The right input is expected to start with the branch table's
    /// columns, which are not repeated in the product.
    pub fn product(
        id: RowTypeId,
        left: Arc<Self>,
        right: Arc<Self>,
        branch: Option<TableId>,
    ) -> Result<Arc<Self>, InternalError> {
        let branch = match branch {
            None => resolve_branch(&left, &right)?,
            Some(table) => left
                .tables
                .iter()
                .find(|candidate| candidate.id == table && right.contains_table(table))
                .copied()
                .ok_or_else(|| {
                    InternalError::row_type_invariant(format!(
                        "branch table {table} is not shared by row types {} and {}",
                        left.id, right.id
                    ))
                })?,
        };
        if branch.field_count > right.field_count() {
            return Err(InternalError::row_type_invariant(format!(
                "right row type {} has {} fields, fewer than branch table {} with {}",
                right.id,
                right.field_count(),
                branch.id,
                branch.field_count
            )));
        }

        let fields = left
            .fields
            .iter()
            .chain(&right.fields[branch.field_count..])
            .copied()
            .collect();
        let tables = union(&left.tables, &right.tables);

        Ok(Arc::new(Self {
            id,
            kind: RowTypeKind::Product {
                left,
                right,
                branch,
            },
            fields,
            tables,
        }))
    }

    #[must_use]
    pub const fn id(&self) -> RowTypeId {
        self.id
    }

    #[must_use]
    pub const fn kind(&self) -> &RowTypeKind {
        &self.kind
    }

    #[must_use]
    pub const fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Declared type of field `i`, routed through composite inputs.
    #[must_use]
    pub fn field_type(&self, i: usize) -> Option<ColumnType> {
        match (&self.kind, self.route(i)) {
            (RowTypeKind::Flattened { parent, .. }, Some(FieldSource::Left(at)))
            | (RowTypeKind::Product { left: parent, .. }, Some(FieldSource::Left(at))) => {
                parent.field_type(at)
            }
            (RowTypeKind::Flattened { child, .. }, Some(FieldSource::Right(at)))
            | (RowTypeKind::Product { right: child, .. }, Some(FieldSource::Right(at))) => {
                child.field_type(at)
            }
            _ => self.fields.get(i).copied(),
        }
    }

    /// Input side and offset for field `i` of a composite type.
    ///
    /// Products read `i < L` from the left and `i >= L` from the right at
    /// `i - L + B`; flattened rows read the child at `i - P`.
    #[must_use]
    pub fn route(&self, i: usize) -> Option<FieldSource> {
        if i >= self.field_count() {
            return None;
        }

        match &self.kind {
            RowTypeKind::Product { left, branch, .. } => {
                let left_count = left.field_count();
                Some(if i < left_count {
                    FieldSource::Left(i)
                } else {
                    FieldSource::Right(i - left_count + branch.field_count)
                })
            }
            RowTypeKind::Flattened { parent, .. } => {
                let parent_count = parent.field_count();
                Some(if i < parent_count {
                    FieldSource::Left(i)
                } else {
                    FieldSource::Right(i - parent_count)
                })
            }
            _ => None,
        }
    }

    /// Every table whose rows contribute to this shape, ordered by id.
    #[must_use]
    pub fn table_set(&self) -> &[TableRef] {
        &self.tables
    }

    #[must_use]
    pub fn contains_table(&self, table: TableId) -> bool {
        self.tables.iter().any(|candidate| candidate.id == table)
    }

    /// The single table behind a table, hkey or index shape.
    #[must_use]
    pub const fn table_ref(&self) -> Option<TableRef> {
        match &self.kind {
            RowTypeKind::Table { table } | RowTypeKind::HKey { table } => Some(*table),
            RowTypeKind::Index { leaf, .. } => Some(*leaf),
            RowTypeKind::Flattened { .. } | RowTypeKind::Product { .. } => None,
        }
    }

    /// Table written by rows of this shape, if it is a plain table shape.
    #[must_use]
    pub const fn user_table(&self) -> Option<TableId> {
        match &self.kind {
            RowTypeKind::Table { table } => Some(table.id),
            _ => None,
        }
    }

    #[must_use]
    pub const fn left(&self) -> Option<&Arc<Self>> {
        match &self.kind {
            RowTypeKind::Product { left, .. } => Some(left),
            RowTypeKind::Flattened { parent, .. } => Some(parent),
            _ => None,
        }
    }

    #[must_use]
    pub const fn right(&self) -> Option<&Arc<Self>> {
        match &self.kind {
            RowTypeKind::Product { right, .. } => Some(right),
            RowTypeKind::Flattened { child, .. } => Some(child),
            _ => None,
        }
    }

    #[must_use]
    pub const fn branch(&self) -> Option<TableRef> {
        match &self.kind {
            RowTypeKind::Product { branch, .. } => Some(*branch),
            _ => None,
        }
    }
}

impl PartialEq for RowType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for RowType {}

fn union(left: &[TableRef], right: &[TableRef]) -> Vec<TableRef> {
    let mut tables = left.to_vec();
    for table in right {
        if !tables.iter().any(|existing| existing.id == table.id) {
            tables.push(*table);
        }
    }
    tables.sort_by_key(|table| table.id);

    tables
}
