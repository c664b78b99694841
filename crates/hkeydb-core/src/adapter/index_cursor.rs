use crate::{
    adapter::{
        AdapterHandle,
        keys::{decode_index_key, index_prefix},
        pool,
    },
    cursor::{ColumnSelector, Cursor, CursorLifecycle, CursorState},
    direction::Direction,
    error::InternalError,
    kv::{KeyRange, prefix_end},
    obs::sink::{MetricsEvent, ScanKind, record},
    row::{IndexRow, Row},
    rowtype::RowType,
    schema::{IndexId, TableId},
    value::Value,
};
use std::{ops::Bound, rc::Rc, sync::Arc};
use tracing::debug;

///
/// IndexBound
///
/// One end of an index range: a prefix of the index columns.
///

#[derive(Clone, Debug, PartialEq)]
pub struct IndexBound {
    pub values: Vec<Value>,
    pub inclusive: bool,
}

impl IndexBound {
    #[must_use]
    pub const fn inclusive(values: Vec<Value>) -> Self {
        Self {
            values,
            inclusive: true,
        }
    }

    #[must_use]
    pub const fn exclusive(values: Vec<Value>) -> Self {
        Self {
            values,
            inclusive: false,
        }
    }
}

///
/// IndexKeyRange
///
/// Range over index column values; a missing end is unbounded.
///

#[derive(Clone, Debug, Default, PartialEq)]
pub struct IndexKeyRange {
    pub lo: Option<IndexBound>,
    pub hi: Option<IndexBound>,
}

impl IndexKeyRange {
    /// Every entry of the index.
    #[must_use]
    pub const fn all() -> Self {
        Self { lo: None, hi: None }
    }

    /// Entries whose leading columns equal `values`.
    #[must_use]
    pub fn equal_to(values: Vec<Value>) -> Self {
        Self {
            lo: Some(IndexBound::inclusive(values.clone())),
            hi: Some(IndexBound::inclusive(values)),
        }
    }

    #[must_use]
    pub const fn between(lo: IndexBound, hi: IndexBound) -> Self {
        Self {
            lo: Some(lo),
            hi: Some(hi),
        }
    }

    // Byte bounds within the index's key space.
    fn to_key_range(&self, index: IndexId) -> KeyRange {
        let space = index_prefix(index, &[]);
        let start = match &self.lo {
            None => Bound::Included(space.clone()),
            Some(bound) => {
                let key = index_prefix(index, &bound.values);
                if bound.inclusive {
                    Bound::Included(key)
                } else {
                    // past every entry that starts with the bound values
                    prefix_end(&key).map_or(Bound::Excluded(key), Bound::Included)
                }
            }
        };
        let end = match &self.hi {
            None => prefix_end(&space).map_or(Bound::Unbounded, Bound::Excluded),
            Some(bound) => {
                let key = index_prefix(index, &bound.values);
                if bound.inclusive {
                    prefix_end(&key).map_or(Bound::Unbounded, Bound::Excluded)
                } else {
                    Bound::Excluded(key)
                }
            }
        };

        KeyRange::new(start, end)
    }
}

///
/// IndexScanSelector
///
/// Which tables' entries an index scan yields. Indexes whose columns come
/// from ancestors keep entries for every table of their span.
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub enum IndexScanSelector {
    /// Entries of the index's leaf table only.
    #[default]
    LeafOnly,
    /// Entries of every spanned table.
    All,
    /// Entries of the listed tables.
    Tables(Vec<TableId>),
}

impl IndexScanSelector {
    fn selects(&self, leaf: TableId, table: TableId) -> bool {
        match self {
            Self::LeafOnly => table == leaf,
            Self::All => true,
            Self::Tables(tables) => tables.contains(&table),
        }
    }
}

///
/// IndexCursor
///
/// Leaf scan over one index range in either direction. Produced rows come
/// from the adapter's index-row pool: the row handed out last is reused for
/// the next entry once the consumer has dropped it.
///

pub struct IndexCursor {
    handle: Rc<AdapterHandle>,
    index: IndexId,
    leaf: TableId,
    width: usize,
    row_type: Arc<RowType>,
    key_range: IndexKeyRange,
    direction: Direction,
    selector: IndexScanSelector,
    bounds: KeyRange,
    range: Option<KeyRange>,
    current: Option<Rc<IndexRow>>,
    scratch: Vec<Value>,
    lifecycle: CursorLifecycle,
}

impl IndexCursor {
    pub(crate) fn new(
        handle: Rc<AdapterHandle>,
        index: IndexId,
        key_range: IndexKeyRange,
        direction: Direction,
        selector: IndexScanSelector,
    ) -> Result<Self, InternalError> {
        let schema = handle.schema();
        let definition = schema.try_index(index)?;
        let width = definition.columns().len();

        for bound in [&key_range.lo, &key_range.hi].into_iter().flatten() {
            if bound.values.len() > width {
                return Err(InternalError::adapter_invariant(format!(
                    "index '{}' has {width} columns, range bound has {}",
                    definition.name(),
                    bound.values.len()
                )));
            }
        }
        if let IndexScanSelector::Tables(tables) = &selector
            && let Some(outside) = tables.iter().find(|&&table| !definition.spans(table))
        {
            return Err(InternalError::adapter_invariant(format!(
                "index '{}' has no entries for table {outside}",
                definition.name()
            )));
        }

        let leaf = definition.leaf();
        let row_type = schema.index_row_type(index).clone();
        let bounds = key_range.to_key_range(index);

        Ok(Self {
            handle,
            index,
            leaf,
            width,
            row_type,
            key_range,
            direction,
            selector,
            bounds,
            range: None,
            current: None,
            scratch: Vec::with_capacity(width),
            lifecycle: CursorLifecycle::new("index"),
        })
    }

    #[must_use]
    pub const fn index(&self) -> IndexId {
        self.index
    }

    #[must_use]
    pub const fn key_range(&self) -> &IndexKeyRange {
        &self.key_range
    }

    #[must_use]
    pub const fn direction(&self) -> Direction {
        self.direction
    }

    // Reclaim the last produced row if the consumer let go of it.
    fn reclaim(&mut self) -> IndexRow {
        match self.current.take().map(Rc::try_unwrap) {
            Some(Ok(row)) => {
                record(MetricsEvent::IndexRowPool { hit: true });
                row
            }
            _ => pool::take(self.handle.id(), &self.row_type),
        }
    }

    fn release(&mut self) {
        if let Some(Ok(row)) = self.current.take().map(Rc::try_unwrap) {
            pool::give_back(
                self.handle.id(),
                row,
                self.handle.config().index_row_pool_capacity,
            );
        }
    }
}

impl Cursor for IndexCursor {
    fn open(&mut self) -> Result<(), InternalError> {
        self.lifecycle.check_open()?;
        self.range = Some(self.bounds.clone());
        self.lifecycle.opened();

        record(MetricsEvent::CursorOpened {
            kind: ScanKind::Index,
        });
        debug!(
            adapter = self.handle.id(),
            index = %self.index,
            direction = ?self.direction,
            "index cursor opened"
        );

        Ok(())
    }

    fn next(&mut self) -> Result<Option<Row>, InternalError> {
        self.lifecycle.check_idle_or_active("next")?;

        loop {
            let Some(range) = self.range.as_mut() else {
                self.lifecycle.advanced(false);
                return Ok(None);
            };
            let found = self
                .handle
                .txn()
                .seek(range, self.direction)
                .map_err(|err| self.handle.handle_error(err.into()))?;
            let Some((key, _)) = found else {
                self.lifecycle.advanced(false);
                return Ok(None);
            };
            range.advance_past(&key, self.direction);

            self.scratch.clear();
            let hkey = decode_index_key(&key, self.width, &mut self.scratch)?;
            let table = hkey.table().ok_or_else(|| {
                InternalError::store_corruption(format!(
                    "index {} entry carries an empty hkey",
                    self.index
                ))
            })?;
            if !self.selector.selects(self.leaf, table) {
                continue;
            }

            let mut row = self.reclaim();
            row.fill(table, &mut self.scratch, &hkey);
            let row = Rc::new(row);
            self.current = Some(row.clone());
            record(MetricsEvent::RowsScanned { table, rows: 1 });
            self.lifecycle.advanced(true);

            return Ok(Some(Row::Index(row)));
        }
    }

    /// Position at the first entry whose selected leading columns reach
    /// `target`'s (mirrored for descending scans), never leaving the range
    /// the cursor was opened with.
    fn jump(&mut self, target: &Row, columns: &ColumnSelector) -> Result<(), InternalError> {
        self.lifecycle.check_idle_or_active("jump")?;
        let leading = columns.leading_len().min(self.width);
        let values = (0..leading)
            .map(|i| target.field(i))
            .collect::<Result<Vec<_>, _>>()?;
        let key = index_prefix(self.index, &values);

        let mut range = self.bounds.clone();
        match self.direction {
            Direction::Asc => {
                if !starts_at_or_after(&range.start, &key) {
                    range.start = Bound::Included(key);
                }
            }
            Direction::Desc => {
                if let Some(end) = prefix_end(&key)
                    && !ends_at_or_before(&range.end, &end)
                {
                    range.end = Bound::Excluded(end);
                }
            }
        }
        self.range = Some(range);

        Ok(())
    }

    fn close(&mut self) {
        if self.lifecycle.close() {
            self.range = None;
            self.release();
        }
    }

    fn destroy(&mut self) {
        self.close();
        self.release();
        self.lifecycle.destroy();
    }

    fn state(&self) -> CursorState {
        self.lifecycle.state()
    }

    fn kind(&self) -> &'static str {
        "index"
    }
}

fn starts_at_or_after(start: &Bound<Vec<u8>>, key: &[u8]) -> bool {
    match start {
        Bound::Included(start) | Bound::Excluded(start) => start.as_slice() >= key,
        Bound::Unbounded => false,
    }
}

fn ends_at_or_before(end: &Bound<Vec<u8>>, key: &[u8]) -> bool {
    match end {
        Bound::Included(end) => end.as_slice() < key,
        Bound::Excluded(end) => end.as_slice() <= key,
        Bound::Unbounded => false,
    }
}
