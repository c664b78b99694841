use crate::{
    cursor::{Cursor, CursorLifecycle, CursorState},
    error::InternalError,
    row::Row,
    rowtype::{RowType, RowTypeKind},
};
use std::sync::Arc;

///
/// FlattenCursor
///
/// Inner join of a parent table with one of its descendant tables over a
/// single HKey-ordered input (typically a group scan). Each descendant row is
/// paired with the most recent parent row whose HKey prefixes its own; rows of
/// any other table, and descendants without a parent, are skipped.
///

pub struct FlattenCursor<C> {
    input: C,
    row_type: Arc<RowType>,
    parent_type: Arc<RowType>,
    child_type: Arc<RowType>,
    parent: Option<Row>,
    lifecycle: CursorLifecycle,
}

impl<C: Cursor> FlattenCursor<C> {
    /// `row_type` must be a flattened row type.
    pub fn new(input: C, row_type: Arc<RowType>) -> Result<Self, InternalError> {
        let RowTypeKind::Flattened { parent, child } = row_type.kind() else {
            return Err(InternalError::cursor_invariant(format!(
                "flatten cursor needs a flattened row type, got {}",
                row_type.id()
            )));
        };
        let (parent_type, child_type) = (parent.clone(), child.clone());

        Ok(Self {
            input,
            row_type,
            parent_type,
            child_type,
            parent: None,
            lifecycle: CursorLifecycle::new("flatten"),
        })
    }
}

impl<C: Cursor> Cursor for FlattenCursor<C> {
    fn open(&mut self) -> Result<(), InternalError> {
        self.lifecycle.check_open()?;
        self.input.open()?;
        self.parent = None;
        self.lifecycle.opened();

        Ok(())
    }

    fn next(&mut self) -> Result<Option<Row>, InternalError> {
        self.lifecycle.check_idle_or_active("next")?;

        while let Some(row) = self.input.next()? {
            let row_type = row.row_type().id();
            if row_type == self.parent_type.id() {
                self.parent = Some(row);
                continue;
            }
            if row_type != self.child_type.id() {
                continue;
            }

            let Some(parent) = &self.parent else {
                continue;
            };
            let related = match (parent.hkey(), row.hkey()) {
                (Some(parent_key), Some(child_key)) => parent_key.is_prefix_of(child_key),
                _ => false,
            };
            if related {
                let joined = Row::flattened(self.row_type.clone(), parent.clone(), row)?;
                self.lifecycle.advanced(true);

                return Ok(Some(joined));
            }
        }

        self.lifecycle.advanced(false);

        Ok(None)
    }

    fn close(&mut self) {
        if self.lifecycle.close() {
            self.input.close();
            self.parent = None;
        }
    }

    fn destroy(&mut self) {
        self.close();
        self.input.destroy();
        self.lifecycle.destroy();
    }

    fn state(&self) -> CursorState {
        self.lifecycle.state()
    }

    fn kind(&self) -> &'static str {
        "flatten"
    }
}
