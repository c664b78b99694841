//! Module: cursor
//! Responsibility: the lifecycle contract every row-producing operator
//! implements, and the composite operators that forward it to children.
//! Does not own: storage iterators, which live in the adapter's leaf cursors.

mod filter;
mod flatten;
mod product;
mod rows;

#[cfg(test)]
mod tests;

use crate::{MAX_SELECTOR_COLUMNS, error::InternalError, row::Row};
use derive_more::Display;

// re-exports
pub use filter::FilterCursor;
pub use flatten::FlattenCursor;
pub use product::ProductCursor;
pub use rows::RowsCursor;

///
/// CursorState
///
/// `Closed` before the first open and after close; `Idle` when open with no
/// scan in progress (or the scan is exhausted); `Active` while yielding rows;
/// `Destroyed` is terminal.
///

#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum CursorState {
    #[display("closed")]
    Closed,
    #[display("idle")]
    Idle,
    #[display("active")]
    Active,
    #[display("destroyed")]
    Destroyed,
}

///
/// Cursor
///
/// Row-producing operator. Exhaustion is `Ok(None)`; calls made in the wrong
/// state fail with an `InvariantViolation`.
///
/// Composite cursors forward `open`, `close` and `destroy` to their inputs so
/// the state machine holds transitively: a parent never calls `next` on an
/// input that is not idle or active.
///

pub trait Cursor {
    /// Begin a fresh scan. Fails when active or destroyed.
    fn open(&mut self) -> Result<(), InternalError>;

    /// Next row, or `None` once the scan is exhausted.
    fn next(&mut self) -> Result<Option<Row>, InternalError>;

    /// Reposition to the first row whose selected columns reach `target`.
    fn jump(&mut self, _target: &Row, _columns: &ColumnSelector) -> Result<(), InternalError> {
        Err(InternalError::cursor_unsupported(format!(
            "{} cursor does not support jump",
            self.kind()
        )))
    }

    /// Release the scan. Idempotent; a no-op once destroyed.
    fn close(&mut self);

    /// Close, then refuse every further call.
    fn destroy(&mut self);

    fn state(&self) -> CursorState;

    /// Short operator name used in diagnostics.
    fn kind(&self) -> &'static str;

    fn is_idle(&self) -> bool {
        self.state() == CursorState::Idle
    }

    fn is_active(&self) -> bool {
        self.state() == CursorState::Active
    }

    fn is_destroyed(&self) -> bool {
        self.state() == CursorState::Destroyed
    }
}

impl<C: Cursor + ?Sized> Cursor for Box<C> {
    fn open(&mut self) -> Result<(), InternalError> {
        (**self).open()
    }

    fn next(&mut self) -> Result<Option<Row>, InternalError> {
        (**self).next()
    }

    fn jump(&mut self, target: &Row, columns: &ColumnSelector) -> Result<(), InternalError> {
        (**self).jump(target, columns)
    }

    fn close(&mut self) {
        (**self).close();
    }

    fn destroy(&mut self) {
        (**self).destroy();
    }

    fn state(&self) -> CursorState {
        (**self).state()
    }

    fn kind(&self) -> &'static str {
        (**self).kind()
    }
}

///
/// CursorLifecycle
///
/// State bookkeeping shared by cursor implementations.
///

#[derive(Clone, Copy, Debug)]
pub struct CursorLifecycle {
    state: CursorState,
    kind: &'static str,
}

impl CursorLifecycle {
    #[must_use]
    pub const fn new(kind: &'static str) -> Self {
        Self {
            state: CursorState::Closed,
            kind,
        }
    }

    #[must_use]
    pub const fn state(&self) -> CursorState {
        self.state
    }

    /// Guard `open`: legal from closed or idle.
    pub fn check_open(&self) -> Result<(), InternalError> {
        match self.state {
            CursorState::Closed | CursorState::Idle => Ok(()),
            CursorState::Active | CursorState::Destroyed => Err(self.violation("open")),
        }
    }

    /// Guard `next` and `jump`: legal from idle or active.
    pub fn check_idle_or_active(&self, call: &str) -> Result<(), InternalError> {
        match self.state {
            CursorState::Idle | CursorState::Active => Ok(()),
            CursorState::Closed | CursorState::Destroyed => Err(self.violation(call)),
        }
    }

    pub const fn opened(&mut self) {
        self.state = CursorState::Idle;
    }

    /// Record the outcome of one `next` call.
    pub const fn advanced(&mut self, produced: bool) {
        self.state = if produced {
            CursorState::Active
        } else {
            CursorState::Idle
        };
    }

    /// Move to closed. Returns false when there was nothing to close.
    pub const fn close(&mut self) -> bool {
        match self.state {
            CursorState::Idle | CursorState::Active => {
                self.state = CursorState::Closed;
                true
            }
            CursorState::Closed | CursorState::Destroyed => false,
        }
    }

    pub const fn destroy(&mut self) {
        self.state = CursorState::Destroyed;
    }

    fn violation(&self, call: &str) -> InternalError {
        InternalError::cursor_invariant(format!(
            "{call} called on {} {} cursor",
            self.state, self.kind
        ))
    }
}

///
/// ColumnSelector
///
/// Set of column positions, used by `jump` to name the columns a target row
/// is matched on.
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ColumnSelector {
    mask: u64,
}

impl ColumnSelector {
    /// Every addressable column.
    #[must_use]
    pub const fn all() -> Self {
        Self { mask: u64::MAX }
    }

    /// The first `count` columns.
    #[must_use]
    pub const fn prefix(count: usize) -> Self {
        let mask = if count >= MAX_SELECTOR_COLUMNS {
            u64::MAX
        } else {
            (1u64 << count) - 1
        };

        Self { mask }
    }

    /// The listed columns; positions beyond the selector width are ignored.
    #[must_use]
    pub fn columns(positions: &[usize]) -> Self {
        let mask = positions
            .iter()
            .filter(|&&pos| pos < MAX_SELECTOR_COLUMNS)
            .fold(0u64, |mask, &pos| mask | (1u64 << pos));

        Self { mask }
    }

    #[must_use]
    pub const fn includes(&self, position: usize) -> bool {
        position < MAX_SELECTOR_COLUMNS && self.mask & (1u64 << position) != 0
    }

    /// Number of leading columns selected without a gap.
    #[must_use]
    pub const fn leading_len(&self) -> usize {
        self.mask.trailing_ones() as usize
    }
}
