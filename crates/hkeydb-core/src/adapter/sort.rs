//! External sort behind the cursor contract.
//!
//! `Sorter` is the one-shot "make sorted" step: it drains its input into
//! sorted runs and merges them, and `sort(self)` consumes it. `SortCursor`
//! is the reusable cursor face that builds a fresh sorter on every open.

use crate::{
    cursor::{Cursor, CursorLifecycle, CursorState},
    direction::Direction,
    error::InternalError,
    obs::sink::{MetricsEvent, ScanKind, record},
    row::Row,
    rowtype::RowType,
    value::{encode_ordered_value, push_inverted},
};
use std::{
    cmp::Reverse,
    collections::{BinaryHeap, VecDeque},
    sync::Arc,
};
use tracing::debug;

///
/// SortKey
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SortKey {
    pub field: usize,
    pub direction: Direction,
}

///
/// SortOrdering
///
/// Sort keys in significance order.
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SortOrdering {
    keys: Vec<SortKey>,
}

impl SortOrdering {
    #[must_use]
    pub const fn new() -> Self {
        Self { keys: Vec::new() }
    }

    #[must_use]
    pub fn asc(self, field: usize) -> Self {
        self.then(field, Direction::Asc)
    }

    #[must_use]
    pub fn desc(self, field: usize) -> Self {
        self.then(field, Direction::Desc)
    }

    #[must_use]
    pub fn then(mut self, field: usize, direction: Direction) -> Self {
        self.keys.push(SortKey { field, direction });
        self
    }

    #[must_use]
    pub fn keys(&self) -> &[SortKey] {
        &self.keys
    }

    /// Byte key of `row` under this ordering; byte order is sort order.
    fn encode(&self, row: &Row) -> Result<Vec<u8>, InternalError> {
        let mut out = Vec::new();
        let mut scratch = Vec::new();
        for key in &self.keys {
            let value = row.field(key.field)?;
            match key.direction {
                Direction::Asc => encode_ordered_value(&mut out, &value),
                Direction::Desc => {
                    scratch.clear();
                    encode_ordered_value(&mut scratch, &value);
                    push_inverted(&mut out, &scratch);
                }
            }
        }

        Ok(out)
    }
}

///
/// SortOption
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum SortOption {
    #[default]
    PreserveDuplicates,
    /// Drop rows whose sort key equals the previous row's.
    SuppressDuplicates,
}

///
/// Sorter
///
/// Drains `input` into sorted runs of at most `run_rows` rows and merges
/// them. Equal keys keep their input order.
///

pub struct Sorter<'c, C> {
    input: &'c mut C,
    row_type: &'c Arc<RowType>,
    ordering: &'c SortOrdering,
    option: SortOption,
    run_rows: usize,
}

type Run = VecDeque<(Vec<u8>, Row)>;

impl<'c, C: Cursor> Sorter<'c, C> {
    pub const fn new(
        input: &'c mut C,
        row_type: &'c Arc<RowType>,
        ordering: &'c SortOrdering,
        option: SortOption,
        run_rows: usize,
    ) -> Self {
        Self {
            input,
            row_type,
            ordering,
            option,
            run_rows,
        }
    }

    /// Perform the sort. The sorter is consumed and cannot run again.
    pub fn sort(mut self) -> Result<SortedCursor, InternalError> {
        self.input.open()?;
        let runs = self.build_runs();
        self.input.close();
        let runs = runs?;

        let run_count = runs.len();
        let rows = self.merge(runs);
        record(MetricsEvent::SortCompleted {
            rows: rows.len() as u64,
            runs: run_count as u64,
        });
        debug!(
            rows = rows.len(),
            runs = run_count,
            row_type = %self.row_type.id(),
            "sort completed"
        );

        Ok(SortedCursor::new(rows))
    }

    fn build_runs(&mut self) -> Result<Vec<Run>, InternalError> {
        let mut runs = Vec::new();
        let mut run: Vec<(Vec<u8>, Row)> = Vec::with_capacity(self.run_rows.min(1024));

        while let Some(row) = self.input.next()? {
            if row.row_type().id() != self.row_type.id() {
                return Err(InternalError::sort_invariant(format!(
                    "sort over row type {} received a row of type {}",
                    self.row_type.id(),
                    row.row_type().id()
                )));
            }
            run.push((self.ordering.encode(&row)?, row));
            if run.len() >= self.run_rows {
                runs.push(seal(std::mem::take(&mut run)));
            }
        }
        if !run.is_empty() {
            runs.push(seal(run));
        }

        Ok(runs)
    }

    fn merge(&self, mut runs: Vec<Run>) -> Vec<Row> {
        let mut heads = BinaryHeap::with_capacity(runs.len());
        for (at, run) in runs.iter().enumerate() {
            if let Some((key, _)) = run.front() {
                heads.push(Reverse((key.clone(), at)));
            }
        }

        let mut out = Vec::new();
        let mut last: Option<Vec<u8>> = None;
        while let Some(Reverse((_, at))) = heads.pop() {
            let Some((key, row)) = runs[at].pop_front() else {
                continue;
            };
            if let Some((next, _)) = runs[at].front() {
                heads.push(Reverse((next.clone(), at)));
            }

            if self.option == SortOption::SuppressDuplicates && last.as_ref() == Some(&key) {
                continue;
            }
            out.push(row);
            last = Some(key);
        }

        out
    }
}

fn seal(mut run: Vec<(Vec<u8>, Row)>) -> Run {
    run.sort_by(|a, b| a.0.cmp(&b.0));
    run.into()
}

///
/// SortedCursor
///
/// The output of one sort. Opened once; closing releases the rows.
///

pub struct SortedCursor {
    rows: VecDeque<Row>,
    opened: bool,
    lifecycle: CursorLifecycle,
}

impl SortedCursor {
    fn new(rows: Vec<Row>) -> Self {
        Self {
            rows: rows.into(),
            opened: false,
            lifecycle: CursorLifecycle::new("sorted"),
        }
    }

    /// Rows not yet consumed.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.rows.len()
    }
}

impl Cursor for SortedCursor {
    fn open(&mut self) -> Result<(), InternalError> {
        self.lifecycle.check_open()?;
        if self.opened {
            return Err(InternalError::sort_invariant(
                "sorted output cannot be reopened",
            ));
        }
        self.opened = true;
        self.lifecycle.opened();

        Ok(())
    }

    fn next(&mut self) -> Result<Option<Row>, InternalError> {
        self.lifecycle.check_idle_or_active("next")?;
        let row = self.rows.pop_front();
        self.lifecycle.advanced(row.is_some());

        Ok(row)
    }

    fn close(&mut self) {
        if self.lifecycle.close() {
            self.rows.clear();
        }
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
        "sorted"
    }
}

///
/// SortCursor
///
/// Cursor face of an external sort. Each open runs a fresh `Sorter` over the
/// input; close destroys the sorted output instead of keeping it for reuse.
/// Sorted output is not addressable, so `jump` is unsupported.
///

pub struct SortCursor<C> {
    input: C,
    row_type: Arc<RowType>,
    ordering: SortOrdering,
    option: SortOption,
    run_rows: usize,
    sorted: Option<SortedCursor>,
    lifecycle: CursorLifecycle,
}

impl<C: Cursor> SortCursor<C> {
    pub fn new(
        input: C,
        row_type: Arc<RowType>,
        ordering: SortOrdering,
        option: SortOption,
        run_rows: usize,
    ) -> Result<Self, InternalError> {
        if ordering.keys().is_empty() {
            return Err(InternalError::sort_invariant("sort ordering has no keys"));
        }
        if let Some(key) = ordering
            .keys()
            .iter()
            .find(|key| key.field >= row_type.field_count())
        {
            return Err(InternalError::sort_invariant(format!(
                "sort key field {} is out of range for row type {} with {} fields",
                key.field,
                row_type.id(),
                row_type.field_count()
            )));
        }
        if run_rows == 0 {
            return Err(InternalError::sort_invariant("sort runs must hold at least one row"));
        }

        Ok(Self {
            input,
            row_type,
            ordering,
            option,
            run_rows,
            sorted: None,
            lifecycle: CursorLifecycle::new("sort"),
        })
    }

    fn discard_sorted(&mut self) {
        if let Some(mut sorted) = self.sorted.take() {
            sorted.close();
            sorted.destroy();
        }
    }
}

impl<C: Cursor> Cursor for SortCursor<C> {
    fn open(&mut self) -> Result<(), InternalError> {
        self.lifecycle.check_open()?;
        self.discard_sorted();

        let sorter = Sorter::new(
            &mut self.input,
            &self.row_type,
            &self.ordering,
            self.option,
            self.run_rows,
        );
        let mut sorted = sorter.sort()?;
        sorted.open()?;
        self.sorted = Some(sorted);
        self.lifecycle.opened();

        record(MetricsEvent::CursorOpened {
            kind: ScanKind::Sort,
        });

        Ok(())
    }

    fn next(&mut self) -> Result<Option<Row>, InternalError> {
        self.lifecycle.check_idle_or_active("next")?;
        let sorted = self
            .sorted
            .as_mut()
            .ok_or_else(|| InternalError::sort_invariant("sort cursor has no sorted output"))?;
        let row = sorted.next()?;
        self.lifecycle.advanced(row.is_some());

        Ok(row)
    }

    fn close(&mut self) {
        if self.lifecycle.close() {
            self.discard_sorted();
        }
    }

    fn destroy(&mut self) {
        self.close();
        self.discard_sorted();
        self.input.destroy();
        self.lifecycle.destroy();
    }

    fn state(&self) -> CursorState {
        self.lifecycle.state()
    }

    fn kind(&self) -> &'static str {
        "sort"
    }
}
