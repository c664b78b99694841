use crate::{
    cursor::{ColumnSelector, Cursor, CursorState},
    error::InternalError,
    row::Row,
};

///
/// FilterCursor
///
/// Yields the input rows accepted by a predicate.
///

pub struct FilterCursor<C, P> {
    input: C,
    predicate: P,
}

impl<C, P> FilterCursor<C, P>
where
    C: Cursor,
    P: FnMut(&Row) -> Result<bool, InternalError>,
{
    pub const fn new(input: C, predicate: P) -> Self {
        Self { input, predicate }
    }

    pub fn into_input(self) -> C {
        self.input
    }
}

impl<C, P> Cursor for FilterCursor<C, P>
where
    C: Cursor,
    P: FnMut(&Row) -> Result<bool, InternalError>,
{
    fn open(&mut self) -> Result<(), InternalError> {
        self.input.open()
    }

    fn next(&mut self) -> Result<Option<Row>, InternalError> {
        while let Some(row) = self.input.next()? {
            if (self.predicate)(&row)? {
                return Ok(Some(row));
            }
        }

        Ok(None)
    }

    fn jump(&mut self, target: &Row, columns: &ColumnSelector) -> Result<(), InternalError> {
        self.input.jump(target, columns)
    }

    fn close(&mut self) {
        self.input.close();
    }

    fn destroy(&mut self) {
        self.input.destroy();
    }

    fn state(&self) -> CursorState {
        self.input.state()
    }

    fn kind(&self) -> &'static str {
        "filter"
    }
}
