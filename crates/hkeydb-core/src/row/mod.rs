//! Module: row
//! Responsibility: runtime rows conforming to a row type, including rows
//! synthesised from an HKey or from two component rows.
//! Does not own: storage; stored rows are produced by the adapter.


use crate::{
    codec::RowEncoding,
    error::InternalError,
    hkey::{HKey, HKeyCache},
    rowtype::{FieldSource, RowType, RowTypeKind, TableRef},
    schema::TableId,
    value::Value,
};
use std::{rc::Rc, sync::Arc};

///
/// StoredRow
///
/// A table row read from (or just written to) the group tree.
///

#[derive(Debug)]
pub struct StoredRow {
    row_type: Arc<RowType>,
    values: Vec<Value>,
    hkey: HKey,
    encoding: RowEncoding,
}

impl StoredRow {
    #[must_use]
    pub const fn hkey(&self) -> &HKey {
        &self.hkey
    }

    #[must_use]
    pub const fn encoding(&self) -> RowEncoding {
        self.encoding
    }
}

///
/// ValuesRow
///
/// A plain tuple that has no storage position yet.
///

#[derive(Debug)]
pub struct ValuesRow {
    row_type: Arc<RowType>,
    values: Vec<Value>,
}

///
/// HKeyRow
///
/// A row whose fields are the values of an HKey.
///

#[derive(Debug)]
pub struct HKeyRow {
    row_type: Arc<RowType>,
    hkey: HKey,
}

///
/// IndexRow
///
/// One index entry. Pooled per (adapter, index row type); a cursor owns the
/// row it last produced until the consumer drops every clone.
///

#[derive(Debug)]
pub struct IndexRow {
    row_type: Arc<RowType>,
    table: TableId,
    values: Vec<Value>,
    hkey: HKey,
}

impl IndexRow {
    pub(crate) const fn new(row_type: Arc<RowType>) -> Self {
        Self {
            row_type,
            table: TableId::new(0),
            values: Vec::new(),
            hkey: HKey::new(),
        }
    }

    /// Overwrite this row with a decoded entry, keeping its allocations.
    pub(crate) fn fill(&mut self, table: TableId, values: &mut Vec<Value>, hkey: &HKey) {
        self.table = table;
        self.values.clear();
        self.values.append(values);
        hkey.copy_to(&mut self.hkey);
    }

    #[must_use]
    pub const fn row_type(&self) -> &Arc<RowType> {
        &self.row_type
    }

    /// Table whose row this entry indexes.
    #[must_use]
    pub const fn table(&self) -> TableId {
        self.table
    }

    #[must_use]
    pub const fn hkey(&self) -> &HKey {
        &self.hkey
    }
}

///
/// CompositeRow
///
/// Two component rows behind a flattened or product row type.
///

#[derive(Debug)]
pub struct CompositeRow {
    row_type: Arc<RowType>,
    left: Row,
    right: Row,
}

impl CompositeRow {
    #[must_use]
    pub const fn left(&self) -> &Row {
        &self.left
    }

    #[must_use]
    pub const fn right(&self) -> &Row {
        &self.right
    }
}

///
/// Row
///
/// Cheap-to-clone handle over one runtime row.
///

#[derive(Clone, Debug)]
pub enum Row {
    Stored(Rc<StoredRow>),
    Values(Rc<ValuesRow>),
    HKey(Rc<HKeyRow>),
    Index(Rc<IndexRow>),
    Flattened(Rc<CompositeRow>),
    Product(Rc<CompositeRow>),
}

impl Row {
    /// A plain tuple of `row_type`.
    pub fn values(row_type: Arc<RowType>, values: Vec<Value>) -> Result<Self, InternalError> {
        check_width(&row_type, values.len())?;

        Ok(Self::Values(Rc::new(ValuesRow { row_type, values })))
    }

    /// A row exposing the values of `hkey`.
    pub fn hkey_row(row_type: Arc<RowType>, hkey: HKey) -> Result<Self, InternalError> {
        if !matches!(row_type.kind(), RowTypeKind::HKey { .. }) {
            return Err(InternalError::row_invariant(format!(
                "row type {} is not an hkey row type",
                row_type.id()
            )));
        }
        check_width(&row_type, hkey.value_count())?;

        Ok(Self::HKey(Rc::new(HKeyRow { row_type, hkey })))
    }

    /// Join `parent` with one of its descendants.
    pub fn flattened(row_type: Arc<RowType>, parent: Self, child: Self) -> Result<Self, InternalError> {
        if !matches!(row_type.kind(), RowTypeKind::Flattened { .. }) {
            return Err(InternalError::row_invariant(format!(
                "row type {} is not a flattened row type",
                row_type.id()
            )));
        }
        let row = check_components(row_type, parent, child)?;

        Ok(Self::Flattened(Rc::new(row)))
    }

    /// Combine rows from two branches that share the product's branch table.
    pub fn product(row_type: Arc<RowType>, left: Self, right: Self) -> Result<Self, InternalError> {
        if !matches!(row_type.kind(), RowTypeKind::Product { .. }) {
            return Err(InternalError::row_invariant(format!(
                "row type {} is not a product row type",
                row_type.id()
            )));
        }
        let row = check_components(row_type, left, right)?;

        Ok(Self::Product(Rc::new(row)))
    }

    pub(crate) fn stored(
        row_type: Arc<RowType>,
        values: Vec<Value>,
        hkey: HKey,
        encoding: RowEncoding,
    ) -> Self {
        Self::Stored(Rc::new(StoredRow {
            row_type,
            values,
            hkey,
            encoding,
        }))
    }

    #[must_use]
    pub fn row_type(&self) -> &Arc<RowType> {
        match self {
            Self::Stored(row) => &row.row_type,
            Self::Values(row) => &row.row_type,
            Self::HKey(row) => &row.row_type,
            Self::Index(row) => &row.row_type,
            Self::Flattened(row) | Self::Product(row) => &row.row_type,
        }
    }

    #[must_use]
    pub fn field_count(&self) -> usize {
        self.row_type().field_count()
    }

    /// Value of field `i`. Composite rows read from the component the row
    /// type routes `i` to.
    pub fn field(&self, i: usize) -> Result<Value, InternalError> {
        let found = match self {
            Self::Stored(row) => row.values.get(i).cloned(),
            Self::Values(row) => row.values.get(i).cloned(),
            Self::Index(row) => row.values.get(i).cloned(),
            Self::HKey(row) => row.hkey.eval(i).cloned(),
            Self::Flattened(row) | Self::Product(row) => {
                return match row.row_type.route(i) {
                    Some(FieldSource::Left(at)) => row.left.field(at),
                    Some(FieldSource::Right(at)) => row.right.field(at),
                    None => Err(field_out_of_range(&row.row_type, i)),
                };
            }
        };

        found.ok_or_else(|| field_out_of_range(self.row_type(), i))
    }

    /// Every field in order.
    pub fn to_values(&self) -> Result<Vec<Value>, InternalError> {
        (0..self.field_count()).map(|i| self.field(i)).collect()
    }

    /// Storage position of this row. Composite rows report their right
    /// (deeper) component's key; plain tuples have none.
    #[must_use]
    pub fn hkey(&self) -> Option<&HKey> {
        match self {
            Self::Stored(row) => Some(&row.hkey),
            Self::HKey(row) => Some(&row.hkey),
            Self::Index(row) => Some(&row.hkey),
            Self::Values(_) => None,
            Self::Flattened(row) | Self::Product(row) => row.right.hkey(),
        }
    }

    /// Table whose row this is, for single-table rows.
    #[must_use]
    pub fn table(&self) -> Option<TableId> {
        match self {
            Self::Index(row) => Some(row.table),
            Self::Stored(_) | Self::Values(_) | Self::HKey(_) => {
                self.row_type().table_ref().map(|table| table.id)
            }
            Self::Flattened(_) | Self::Product(_) => None,
        }
    }

    /// HKey of this row's ancestor at `table`, written into the cache slot
    /// for that table.
    pub fn ancestor_hkey<'c>(
        &self,
        table: TableRef,
        cache: &'c mut HKeyCache,
    ) -> Result<&'c HKey, InternalError> {
        let hkey = self.hkey().ok_or_else(|| {
            InternalError::row_unsupported(format!(
                "row of type {} has no hkey",
                self.row_type().id()
            ))
        })?;
        let ordinal = hkey.segments().get(table.depth).map(|segment| segment.ordinal);
        if ordinal != Some(table.id) {
            return Err(InternalError::row_invariant(format!(
                "table {} is not an ancestor of row {hkey}",
                table.id
            )));
        }

        let slot = cache.slot(table.id);
        hkey.copy_to(slot);
        slot.use_segments(table.depth + 1);

        Ok(slot)
    }

    /// The component of this row whose type is `row_type`.
    pub fn sub_row(&self, row_type: &RowType) -> Result<Self, InternalError> {
        if let Self::HKey(_) = self {
            return Err(InternalError::row_unsupported(
                "hkey rows have no component rows",
            ));
        }

        self.find_component(row_type).ok_or_else(|| {
            InternalError::row_invariant(format!(
                "row type {} is not a component of row type {}",
                row_type.id(),
                self.row_type().id()
            ))
        })
    }

    fn find_component(&self, row_type: &RowType) -> Option<Self> {
        if self.row_type().id() == row_type.id() {
            return Some(self.clone());
        }

        match self {
            Self::Flattened(row) | Self::Product(row) => row
                .left
                .find_component(row_type)
                .or_else(|| row.right.find_component(row_type)),
            _ => None,
        }
    }
}

fn check_width(row_type: &RowType, width: usize) -> Result<(), InternalError> {
    if width == row_type.field_count() {
        return Ok(());
    }

    Err(InternalError::row_invariant(format!(
        "row type {} has {} fields, got {width} values",
        row_type.id(),
        row_type.field_count()
    )))
}

fn check_components(
    row_type: Arc<RowType>,
    left: Row,
    right: Row,
) -> Result<CompositeRow, InternalError> {
    let expected = row_type.left().zip(row_type.right());
    let Some((left_type, right_type)) = expected else {
        return Err(InternalError::row_invariant(format!(
            "row type {} has no components",
            row_type.id()
        )));
    };
    if left.row_type().id() != left_type.id() || right.row_type().id() != right_type.id() {
        return Err(InternalError::row_invariant(format!(
            "components of types ({}, {}) do not match row type {} over ({}, {})",
            left.row_type().id(),
            right.row_type().id(),
            row_type.id(),
            left_type.id(),
            right_type.id()
        )));
    }

    Ok(CompositeRow {
        row_type,
        left,
        right,
    })
}

fn field_out_of_range(row_type: &RowType, i: usize) -> InternalError {
    InternalError::row_invariant(format!(
        "field {i} is out of range for row type {} with {} fields",
        row_type.id(),
        row_type.field_count()
    ))
}
