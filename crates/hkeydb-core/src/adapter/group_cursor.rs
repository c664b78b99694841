use crate::{
    adapter::{
        AdapterHandle,
        keys::{group_key, group_prefix},
    },
    cursor::{ColumnSelector, Cursor, CursorLifecycle, CursorState},
    direction::Direction,
    error::InternalError,
    hkey::HKey,
    kv::KeyRange,
    obs::sink::{MetricsEvent, ScanKind, record},
    row::Row,
    schema::GroupId,
};
use std::{ops::Bound, rc::Rc};
use tracing::debug;

///
/// GroupCursor
///
/// Leaf scan over one group in HKey order: every table of the hierarchy,
/// parents immediately followed by their descendants.
///
/// Each `next` re-seeks from the last emitted key, so rows become visible
/// or invisible exactly as the transaction's current step dictates.
///

pub struct GroupCursor {
    handle: Rc<AdapterHandle>,
    group: GroupId,
    binding: Option<(HKey, bool)>,
    bounds: Option<KeyRange>,
    range: Option<KeyRange>,
    lifecycle: CursorLifecycle,
}

impl GroupCursor {
    pub(crate) const fn new(handle: Rc<AdapterHandle>, group: GroupId) -> Self {
        Self {
            handle,
            group,
            binding: None,
            bounds: None,
            range: None,
            lifecycle: CursorLifecycle::new("group"),
        }
    }

    #[must_use]
    pub const fn group(&self) -> GroupId {
        self.group
    }

    /// Restrict the next scan to the row at `hkey`, plus its descendants when
    /// `deep`. Only legal while no scan is in progress.
    pub fn rebind(&mut self, hkey: HKey, deep: bool) -> Result<(), InternalError> {
        match self.lifecycle.state() {
            CursorState::Closed | CursorState::Idle => {
                self.binding = Some((hkey, deep));
                Ok(())
            }
            state => Err(InternalError::cursor_invariant(format!(
                "rebind called on {state} group cursor"
            ))),
        }
    }

    fn scan_bounds(&self) -> Result<KeyRange, InternalError> {
        match &self.binding {
            None => Ok(KeyRange::prefix(&group_prefix(self.group))),
            Some((hkey, true)) => Ok(KeyRange::prefix(&group_key(self.group, hkey)?)),
            Some((hkey, false)) => {
                let key = group_key(self.group, hkey)?;
                Ok(KeyRange::new(Bound::Included(key.clone()), Bound::Included(key)))
            }
        }
    }
}

impl Cursor for GroupCursor {
    fn open(&mut self) -> Result<(), InternalError> {
        self.lifecycle.check_open()?;
        let bounds = self.scan_bounds()?;
        self.range = Some(bounds.clone());
        self.bounds = Some(bounds);
        self.lifecycle.opened();

        record(MetricsEvent::CursorOpened {
            kind: ScanKind::Group,
        });
        debug!(
            adapter = self.handle.id(),
            group = %self.group,
            bound = self.binding.is_some(),
            "group cursor opened"
        );

        Ok(())
    }

    fn next(&mut self) -> Result<Option<Row>, InternalError> {
        self.lifecycle.check_idle_or_active("next")?;
        let Some(range) = self.range.as_mut() else {
            self.lifecycle.advanced(false);
            return Ok(None);
        };

        let found = self
            .handle
            .txn()
            .seek(range, Direction::Asc)
            .map_err(|err| self.handle.handle_error(err.into()))?;
        let Some((key, value)) = found else {
            self.lifecycle.advanced(false);
            return Ok(None);
        };
        range.advance_past(&key, Direction::Asc);

        let row = self.handle.stored_row(&key, &value)?;
        if let Some(table) = row.table() {
            record(MetricsEvent::RowsScanned { table, rows: 1 });
        }
        self.lifecycle.advanced(true);

        Ok(Some(row))
    }

    /// Position at the first row whose HKey is at or after `target`'s,
    /// within the opened bounds. Column selection is implied by the HKey.
    fn jump(&mut self, target: &Row, _columns: &ColumnSelector) -> Result<(), InternalError> {
        self.lifecycle.check_idle_or_active("jump")?;
        let hkey = target.hkey().ok_or_else(|| {
            InternalError::cursor_invariant("group cursor jump target has no hkey")
        })?;
        let key = group_key(self.group, hkey)?;
        let Some(bounds) = &self.bounds else {
            return Err(InternalError::cursor_invariant(
                "group cursor jump before open",
            ));
        };

        let mut range = bounds.clone();
        if !matches!(&range.start, Bound::Included(start) | Bound::Excluded(start) if start >= &key)
        {
            range.start = Bound::Included(key);
        }
        self.range = Some(range);

        Ok(())
    }

    fn close(&mut self) {
        if self.lifecycle.close() {
            self.range = None;
        }
    }

    fn destroy(&mut self) {
        self.close();
        self.bounds = None;
        self.binding = None;
        self.lifecycle.destroy();
    }

    fn state(&self) -> CursorState {
        self.lifecycle.state()
    }

    fn kind(&self) -> &'static str {
        "group"
    }
}
