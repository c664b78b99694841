use crate::{
    cursor::{Cursor, CursorLifecycle, CursorState},
    error::InternalError,
    row::Row,
};

///
/// RowsCursor
///
/// Cursor over rows already held in memory. Reopening restarts the scan.
///

#[derive(Debug)]
pub struct RowsCursor {
    rows: Vec<Row>,
    position: usize,
    lifecycle: CursorLifecycle,
}

impl RowsCursor {
    #[must_use]
    pub const fn new(rows: Vec<Row>) -> Self {
        Self {
            rows,
            position: 0,
            lifecycle: CursorLifecycle::new("rows"),
        }
    }
}

impl Cursor for RowsCursor {
    fn open(&mut self) -> Result<(), InternalError> {
        self.lifecycle.check_open()?;
        self.position = 0;
        self.lifecycle.opened();

        Ok(())
    }

    fn next(&mut self) -> Result<Option<Row>, InternalError> {
        self.lifecycle.check_idle_or_active("next")?;
        let row = self.rows.get(self.position).cloned();
        if row.is_some() {
            self.position += 1;
        }
        self.lifecycle.advanced(row.is_some());

        Ok(row)
    }

    fn close(&mut self) {
        self.lifecycle.close();
    }

    fn destroy(&mut self) {
        self.close();
        self.rows.clear();
        self.lifecycle.destroy();
    }

    fn state(&self) -> CursorState {
        self.lifecycle.state()
    }

    fn kind(&self) -> &'static str {
        "rows"
    }
}
