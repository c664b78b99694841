use crate::{
    cursor::{Cursor, CursorLifecycle, CursorState},
    error::InternalError,
    hkey::{HKey, HKeyCache},
    row::Row,
    rowtype::{RowType, TableRef},
};
use std::sync::Arc;

///
/// ProductCursor
///
/// Combines two HKey-ordered inputs that meet at the product's branch table.
/// Every left row is paired with each right row under the same branch
/// ancestor; output follows the left input's order. Right rows are buffered
/// one branch group at a time so consecutive left rows of the same branch
/// reuse them.
///

pub struct ProductCursor<L, R> {
    left: L,
    right: R,
    row_type: Arc<RowType>,
    branch: TableRef,
    hkeys: HKeyCache,
    current: Option<Row>,
    group_key: Option<HKey>,
    group: Vec<Row>,
    emitted: usize,
    lookahead: Option<(HKey, Row)>,
    right_done: bool,
    lifecycle: CursorLifecycle,
}

impl<L: Cursor, R: Cursor> ProductCursor<L, R> {
    /// `row_type` must be a product row type.
    pub fn new(left: L, right: R, row_type: Arc<RowType>) -> Result<Self, InternalError> {
        let branch = row_type.branch().ok_or_else(|| {
            InternalError::cursor_invariant(format!(
                "product cursor needs a product row type, got {}",
                row_type.id()
            ))
        })?;

        Ok(Self {
            left,
            right,
            row_type,
            branch,
            hkeys: HKeyCache::new(),
            current: None,
            group_key: None,
            group: Vec::new(),
            emitted: 0,
            lookahead: None,
            right_done: false,
            lifecycle: CursorLifecycle::new("product"),
        })
    }

    fn branch_key(&mut self, row: &Row) -> Result<HKey, InternalError> {
        row.ancestor_hkey(self.branch, &mut self.hkeys).cloned()
    }

    fn next_right(&mut self) -> Result<Option<(HKey, Row)>, InternalError> {
        if let Some(entry) = self.lookahead.take() {
            return Ok(Some(entry));
        }
        if self.right_done {
            return Ok(None);
        }
        match self.right.next()? {
            Some(row) => {
                let key = self.branch_key(&row)?;
                Ok(Some((key, row)))
            }
            None => {
                self.right_done = true;
                Ok(None)
            }
        }
    }

    /// Buffer the right rows under `key`, skipping any that sort before it.
    fn load_group(&mut self, key: HKey) -> Result<(), InternalError> {
        self.group.clear();
        while let Some((right_key, row)) = self.next_right()? {
            if right_key < key {
                continue;
            }
            if right_key > key {
                self.lookahead = Some((right_key, row));
                break;
            }
            self.group.push(row);
        }
        self.group_key = Some(key);

        Ok(())
    }

    fn reset(&mut self) {
        self.current = None;
        self.group_key = None;
        self.group.clear();
        self.emitted = 0;
        self.lookahead = None;
        self.right_done = false;
    }
}

impl<L: Cursor, R: Cursor> Cursor for ProductCursor<L, R> {
    fn open(&mut self) -> Result<(), InternalError> {
        self.lifecycle.check_open()?;
        // The right input may still hold a lookahead row from the last scan.
        self.left.close();
        self.right.close();
        self.left.open()?;
        if let Err(err) = self.right.open() {
            self.left.close();
            return Err(err);
        }
        self.reset();
        self.lifecycle.opened();

        Ok(())
    }

    fn next(&mut self) -> Result<Option<Row>, InternalError> {
        self.lifecycle.check_idle_or_active("next")?;

        loop {
            if let Some(left) = &self.current
                && let Some(right) = self.group.get(self.emitted)
            {
                let row = Row::product(self.row_type.clone(), left.clone(), right.clone())?;
                self.emitted += 1;
                self.lifecycle.advanced(true);

                return Ok(Some(row));
            }

            let Some(left) = self.left.next()? else {
                self.current = None;
                self.lifecycle.advanced(false);

                return Ok(None);
            };
            let key = self.branch_key(&left)?;
            if self.group_key.as_ref() != Some(&key) {
                self.load_group(key)?;
            }
            self.current = Some(left);
            self.emitted = 0;
        }
    }

    fn close(&mut self) {
        if self.lifecycle.close() {
            self.left.close();
            self.right.close();
            self.reset();
        }
    }

    fn destroy(&mut self) {
        self.close();
        self.left.destroy();
        self.right.destroy();
        self.lifecycle.destroy();
    }

    fn state(&self) -> CursorState {
        self.lifecycle.state()
    }

    fn kind(&self) -> &'static str {
        "product"
    }
}
