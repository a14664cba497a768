//! The slot table owned by every resource manager.
//!
//! Ids handed out to callers name *slots*. A slot never holds a payload by
//! itself, it refers to a *record*, which may live in the table of another
//! manager. Records carry the payload, the load in flight, the number of
//! strong slots referring to them and the list of weak slots observing them.
//! Linking always targets the record, so chains of links are never formed.
//!
//! A table is only ever touched under its manager's lock, and no code path
//! holds the locks of two managers at the same time.

use std::sync::Arc;

use smallvec::SmallVec;

use super::id::{ManagerId, Mark, RecordHandle, ResourceId, ResourceKind, ResourceState};
use super::load::LoadTask;
use super::payload::Payload;
use crate::errors::*;
use crate::utils::prelude::ObjectPool;

/// The record a slot refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct Target {
    pub manager: ManagerId,
    pub record: RecordHandle,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Slot {
    pub target: Target,
    pub strong: bool,
    pub stale: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RecordState {
    Loading,
    Loaded,
    Failed,
}

pub(crate) struct Record {
    pub kind: ResourceKind,
    pub state: RecordState,
    pub payload: Option<Payload>,
    pub strong: u32,
    pub weak: SmallVec<[(ManagerId, ResourceId); 2]>,
    pub task: Option<Arc<LoadTask>>,
    pub mark: Mark,
}

impl Record {
    /// A record which is usable right away.
    pub fn loaded(payload: Payload) -> Self {
        Record {
            kind: payload.kind(),
            state: RecordState::Loaded,
            payload: Some(payload),
            strong: 1,
            weak: SmallVec::new(),
            task: None,
            mark: 0,
        }
    }

    /// A record waiting for `task`, issued while `mark` was current.
    pub fn loading(kind: ResourceKind, task: Arc<LoadTask>, mark: Mark) -> Self {
        Record {
            kind,
            state: RecordState::Loading,
            payload: None,
            strong: 1,
            weak: SmallVec::new(),
            task: Some(task),
            mark,
        }
    }

    pub fn state(&self) -> ResourceState {
        match self.state {
            RecordState::Loading => ResourceState::Loading,
            RecordState::Loaded => ResourceState::Loaded,
            RecordState::Failed => ResourceState::Failed,
        }
    }
}

pub(crate) struct SlotTable {
    pub id: ManagerId,
    slots: ObjectPool<ResourceId, Slot>,
    records: ObjectPool<RecordHandle, Record>,
    mark: Mark,
    destroyed: bool,
}

impl SlotTable {
    pub fn new(id: ManagerId, capacity: usize) -> Self {
        SlotTable {
            id,
            slots: ObjectPool::with_capacity(capacity),
            records: ObjectPool::with_capacity(capacity),
            mark: 0,
            destroyed: false,
        }
    }

    /// Returns the current mark and advances the counter.
    #[inline]
    pub fn mark(&mut self) -> Mark {
        let v = self.mark;
        self.mark += 1;
        v
    }

    /// The mark loads issued now are tagged with.
    #[inline]
    pub fn current_mark(&self) -> Mark {
        self.mark
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    pub fn slot_ids(&self) -> Vec<ResourceId> {
        self.slots.iter().collect()
    }

    #[inline]
    pub fn slot(&self, id: ResourceId) -> Option<&Slot> {
        self.slots.get(id)
    }

    /// Resolves a slot to its record, failing distinctly for stale slots.
    pub fn target(&self, id: ResourceId) -> Result<Target> {
        match self.slots.get(id) {
            Some(slot) if slot.stale => Err(Error::Stale(id)),
            Some(slot) => Ok(slot.target),
            None => Err(Error::InvalidHandle(id)),
        }
    }

    pub fn add_slot(&mut self, target: Target, strong: bool) -> Result<ResourceId> {
        if self.destroyed {
            return Err(Error::Malformed(format!("{} has been destroyed", self.id)));
        }

        let slot = Slot {
            target,
            strong,
            stale: false,
        };

        self.slots
            .try_create(slot)
            .map_err(|_| Error::OutOfMemory(::std::mem::size_of::<Slot>()))
    }

    /// A weak slot which observes nothing anymore.
    pub fn add_stale_slot(&mut self) -> Result<ResourceId> {
        let target = Target {
            manager: self.id,
            record: RecordHandle::nil(),
        };

        let id = self.add_slot(target, false)?;
        self.mark_stale(id);
        Ok(id)
    }

    #[inline]
    pub fn remove_slot(&mut self, id: ResourceId) -> Option<Slot> {
        self.slots.free(id)
    }

    /// Turns a weak slot stale. Strong slots are left alone.
    pub fn mark_stale(&mut self, id: ResourceId) {
        if let Some(slot) = self.slots.get_mut(id) {
            if !slot.strong {
                slot.stale = true;
            }
        }
    }

    /// Creates a record owned by this table, together with the first strong
    /// slot referring to it. On failure the record is handed back so its
    /// payload could be released.
    pub fn add(&mut self, record: Record) -> ::std::result::Result<ResourceId, (Record, Error)> {
        if self.destroyed {
            let err = Error::Malformed(format!("{} has been destroyed", self.id));
            return Err((record, err));
        }

        let handle = match self.records.try_create(record) {
            Ok(handle) => handle,
            Err(record) => {
                let err = Error::OutOfMemory(::std::mem::size_of::<Record>());
                return Err((record, err));
            }
        };

        let target = Target {
            manager: self.id,
            record: handle,
        };

        match self.add_slot(target, true) {
            Ok(id) => Ok(id),
            Err(err) => match self.records.free(handle) {
                Some(record) => Err((record, err)),
                None => unreachable!("record vanished while locked."),
            },
        }
    }

    #[inline]
    pub fn record(&self, handle: RecordHandle) -> Option<&Record> {
        self.records.get(handle)
    }

    #[inline]
    pub fn record_mut(&mut self, handle: RecordHandle) -> Option<&mut Record> {
        self.records.get_mut(handle)
    }

    #[inline]
    pub fn records_len(&self) -> usize {
        self.records.len()
    }

    /// Adds a strong reference. Returns false if the record is gone.
    pub fn retain(&mut self, handle: RecordHandle) -> bool {
        match self.records.get_mut(handle) {
            Some(record) => {
                record.strong += 1;
                true
            }
            None => false,
        }
    }

    /// Drops a strong reference. The record is removed and returned once the
    /// last one is gone.
    pub fn release(&mut self, handle: RecordHandle) -> Option<Record> {
        let record = self.records.get_mut(handle)?;
        debug_assert!(record.strong > 0, "strong reference count underflow.");

        record.strong = record.strong.saturating_sub(1);
        if record.strong > 0 {
            return None;
        }

        self.records.free(handle)
    }

    /// Registers a weak observer. Returns false if the record is gone.
    pub fn attach_weak(&mut self, handle: RecordHandle, manager: ManagerId, id: ResourceId) -> bool {
        match self.records.get_mut(handle) {
            Some(record) => {
                record.weak.push((manager, id));
                true
            }
            None => false,
        }
    }

    pub fn detach_weak(&mut self, handle: RecordHandle, manager: ManagerId, id: ResourceId) {
        if let Some(record) = self.records.get_mut(handle) {
            record.weak.retain(|v| *v != (manager, id));
        }
    }

    /// Collects the loads issued at or before `mark` which are still pending.
    pub fn pending(&self, mark: Mark) -> Vec<(RecordHandle, Arc<LoadTask>)> {
        self.records
            .iter()
            .filter_map(|handle| {
                let record = self.records.get(handle)?;
                if record.mark > mark {
                    return None;
                }

                record.task.as_ref().map(|task| (handle, task.clone()))
            })
            .collect()
    }

    /// Stores the outcome of `task` into its record. If the record has been
    /// released meanwhile the payload is handed back.
    pub fn install(
        &mut self,
        handle: RecordHandle,
        task: &Arc<LoadTask>,
        outcome: Result<Payload>,
    ) -> Option<Payload> {
        let record = match self.records.get_mut(handle) {
            Some(record) => record,
            None => return outcome.ok(),
        };

        match record.task {
            Some(ref v) if Arc::ptr_eq(v, task) => {}
            _ => return outcome.ok(),
        }

        record.task = None;
        match outcome {
            Ok(payload) => {
                record.state = RecordState::Loaded;
                record.payload = Some(payload);
            }
            Err(_) => {
                record.state = RecordState::Failed;
            }
        }

        None
    }

    /// Forgets every slot and gives the slot storage back. The records stay
    /// until the last strong link from other managers is freed.
    pub fn destroy(&mut self) {
        self.destroyed = true;
        self.slots.reset();
        if self.records.is_empty() {
            self.records.reset();
        }
    }
}
