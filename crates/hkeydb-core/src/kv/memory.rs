use crate::{
    direction::Direction,
    kv::{InterruptHandle, KeyRange, KvEntry, KvTransaction, StoreError},
};
use parking_lot::{Mutex, RwLock};
use std::{
    cell::RefCell,
    cmp::Ordering,
    collections::{BTreeMap, HashMap},
    io,
    iter::Peekable,
    rc::Rc,
    sync::Arc,
};

///
/// MemoryStore
///
/// Process-local ordered store. Committed data is shared by every
/// transaction begun from the same store handle; sequences are
/// non-transactional and survive rollback.
///

#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    data: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
    sequences: Mutex<HashMap<String, i64>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin a transaction at step 0.
    #[must_use]
    pub fn begin(&self) -> Rc<MemoryTransaction> {
        Rc::new(MemoryTransaction {
            store: self.clone(),
            state: RefCell::new(TxnState::default()),
            interrupt: InterruptHandle::new(),
        })
    }

    /// Number of committed keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.data.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

///
/// KvOp
///
/// Store primitives addressable by fault injection.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum KvOp {
    Get,
    Put,
    Delete,
    Seek,
    Sequence,
    Commit,
}

///
/// InjectedFailure
///
/// One-shot failure armed on a [`KvOp`].
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum InjectedFailure {
    Interrupted,
    InterruptedIo,
    Io,
    DuplicateKey,
}

impl InjectedFailure {
    fn into_error(self) -> StoreError {
        match self {
            Self::Interrupted => StoreError::Interrupted,
            Self::InterruptedIo => StoreError::Io(io::Error::other(StoreError::Interrupted)),
            Self::Io => StoreError::Io(io::Error::other("injected i/o failure")),
            Self::DuplicateKey => StoreError::DuplicateKey {
                key: "injected".to_string(),
            },
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
enum TxnStatus {
    #[default]
    Active,
    RollbackPending,
    Committed,
    RolledBack,
}

#[derive(Clone, Debug)]
struct PendingWrite {
    step: u32,
    value: Option<Vec<u8>>,
}

#[derive(Default)]
struct TxnState {
    pending: BTreeMap<Vec<u8>, Vec<PendingWrite>>,
    step: u32,
    max_write_step: u32,
    status: TxnStatus,
    failures: Vec<(KvOp, InjectedFailure)>,
}

impl TxnState {
    fn check_active(&self) -> Result<(), StoreError> {
        match self.status {
            TxnStatus::Active | TxnStatus::RollbackPending => Ok(()),
            TxnStatus::Committed | TxnStatus::RolledBack => Err(StoreError::TransactionInactive),
        }
    }

    fn take_failure(&mut self, op: KvOp) -> Result<(), StoreError> {
        let Some(pos) = self.failures.iter().position(|(armed, _)| *armed == op) else {
            return Ok(());
        };
        let (_, failure) = self.failures.remove(pos);

        Err(failure.into_error())
    }
}

// Latest own write visible at `step`; `Some(None)` is a visible delete.
fn visible_write(writes: &[PendingWrite], step: u32) -> Option<Option<&Vec<u8>>> {
    writes
        .iter()
        .rev()
        .find(|write| write.step <= step)
        .map(|write| write.value.as_ref())
}

///
/// MemoryTransaction
///
/// Step-tagged pending writes over the shared committed map.
///

pub struct MemoryTransaction {
    store: MemoryStore,
    state: RefCell<TxnState>,
    interrupt: InterruptHandle,
}

impl MemoryTransaction {
    /// Handle used to interrupt blocking calls of this transaction.
    #[must_use]
    pub fn interrupt_handle(&self) -> InterruptHandle {
        self.interrupt.clone()
    }

    /// Arm a one-shot failure for the next call of `op`.
    pub fn fail_next(&self, op: KvOp, failure: InjectedFailure) {
        self.state.borrow_mut().failures.push((op, failure));
    }

    /// Request rollback without ending the transaction.
    pub fn mark_rollback_pending(&self) {
        let mut state = self.state.borrow_mut();
        if state.status == TxnStatus::Active {
            state.status = TxnStatus::RollbackPending;
        }
    }

    #[must_use]
    pub fn is_committed(&self) -> bool {
        self.state.borrow().status == TxnStatus::Committed
    }

    #[must_use]
    pub fn is_rolled_back(&self) -> bool {
        self.state.borrow().status == TxnStatus::RolledBack
    }

    fn check_interrupt(&self) -> Result<(), StoreError> {
        if self.interrupt.take() {
            return Err(StoreError::Interrupted);
        }

        Ok(())
    }
}

impl KvTransaction for MemoryTransaction {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        self.check_interrupt()?;
        let mut state = self.state.borrow_mut();
        state.check_active()?;
        state.take_failure(KvOp::Get)?;

        let step = state.step;
        if let Some(visible) = state
            .pending
            .get(key)
            .and_then(|writes| visible_write(writes, step))
        {
            return Ok(visible.cloned());
        }

        Ok(self.store.inner.data.read().get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        let mut state = self.state.borrow_mut();
        state.check_active()?;
        state.take_failure(KvOp::Put)?;

        let step = state.step;
        state.max_write_step = state.max_write_step.max(step);
        state
            .pending
            .entry(key.to_vec())
            .or_default()
            .push(PendingWrite {
                step,
                value: Some(value.to_vec()),
            });

        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<bool, StoreError> {
        let existed = self.get(key)?.is_some();

        let mut state = self.state.borrow_mut();
        state.take_failure(KvOp::Delete)?;

        let step = state.step;
        state.max_write_step = state.max_write_step.max(step);
        state
            .pending
            .entry(key.to_vec())
            .or_default()
            .push(PendingWrite { step, value: None });

        Ok(existed)
    }

    fn seek(&self, range: &KeyRange, direction: Direction) -> Result<Option<KvEntry>, StoreError> {
        self.check_interrupt()?;
        let mut state = self.state.borrow_mut();
        state.check_active()?;
        state.take_failure(KvOp::Seek)?;
        if range.is_empty() {
            return Ok(None);
        }

        let step = state.step;
        let data = self.store.inner.data.read();
        let bounds = range.as_ref_bounds();
        let committed = data.range::<[u8], _>(bounds);
        let pending = state.pending.range::<[u8], _>(bounds);

        let found = match direction {
            Direction::Asc => first_visible(committed, pending, step, direction),
            Direction::Desc => {
                first_visible(committed.rev(), pending.rev(), step, direction)
            }
        };

        Ok(found)
    }

    fn step(&self) -> u32 {
        self.state.borrow().step
    }

    fn set_step(&self, step: u32) {
        self.state.borrow_mut().step = step;
    }

    fn increment_step(&self) -> u32 {
        let mut state = self.state.borrow_mut();
        state.step = state.step.saturating_add(1);
        state.step
    }

    fn max_write_step(&self) -> u32 {
        self.state.borrow().max_write_step
    }

    fn is_active(&self) -> bool {
        self.state.borrow().check_active().is_ok()
    }

    fn is_rollback_pending(&self) -> bool {
        self.state.borrow().status == TxnStatus::RollbackPending
    }

    fn commit(&self) -> Result<(), StoreError> {
        let mut state = self.state.borrow_mut();
        state.check_active()?;
        state.take_failure(KvOp::Commit)?;
        if state.status == TxnStatus::RollbackPending {
            return Err(StoreError::Failed {
                message: "commit requested while rollback is pending".to_string(),
            });
        }

        let pending = std::mem::take(&mut state.pending);
        let mut data = self.store.inner.data.write();
        for (key, writes) in pending {
            match writes.into_iter().last().and_then(|write| write.value) {
                Some(value) => {
                    data.insert(key, value);
                }
                None => {
                    data.remove(&key);
                }
            }
        }
        state.status = TxnStatus::Committed;

        Ok(())
    }

    fn rollback(&self) {
        let mut state = self.state.borrow_mut();
        state.pending.clear();
        state.status = TxnStatus::RolledBack;
    }

    fn sequence_next(&self, name: &str, start: i64, increment: i64) -> Result<i64, StoreError> {
        self.check_interrupt()?;
        let mut state = self.state.borrow_mut();
        state.check_active()?;
        state.take_failure(KvOp::Sequence)?;

        let mut sequences = self.store.inner.sequences.lock();
        let next = match sequences.get(name) {
            Some(current) => current
                .checked_add(increment)
                .ok_or_else(|| StoreError::Failed {
                    message: format!("sequence '{name}' overflowed"),
                })?,
            None => start,
        };
        sequences.insert(name.to_string(), next);

        Ok(next)
    }

    fn sequence_current(&self, name: &str) -> Result<Option<i64>, StoreError> {
        self.check_interrupt()?;
        let mut state = self.state.borrow_mut();
        state.check_active()?;
        state.take_failure(KvOp::Sequence)?;

        Ok(self.store.inner.sequences.lock().get(name).copied())
    }
}

// Merge committed and pending entries in traversal order and return the
// first entry visible at `step`.
fn first_visible<'a, C, P>(
    committed: C,
    pending: P,
    step: u32,
    direction: Direction,
) -> Option<KvEntry>
where
    C: Iterator<Item = (&'a Vec<u8>, &'a Vec<u8>)>,
    P: Iterator<Item = (&'a Vec<u8>, &'a Vec<PendingWrite>)>,
{
    let mut committed: Peekable<C> = committed.peekable();
    let mut pending: Peekable<P> = pending.peekable();

    loop {
        let order = match (committed.peek(), pending.peek()) {
            (None, None) => return None,
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (Some((left, _)), Some((right, _))) => direction.apply(left.cmp(right)),
        };

        match order {
            Ordering::Less => {
                let (key, value) = committed.next()?;
                return Some((key.clone(), value.clone()));
            }
            Ordering::Greater => {
                let (key, writes) = pending.next()?;
                if let Some(Some(value)) = visible_write(writes, step) {
                    return Some((key.clone(), value.clone()));
                }
            }
            Ordering::Equal => {
                let (key, value) = committed.next()?;
                let (_, writes) = pending.next()?;
                match visible_write(writes, step) {
                    Some(Some(own)) => return Some((key.clone(), own.clone())),
                    Some(None) => {}
                    None => return Some((key.clone(), value.clone())),
                }
            }
        }
    }
}
