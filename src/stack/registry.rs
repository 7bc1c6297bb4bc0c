//! Slot registry: which threads currently hold a context for one stack.
//!
//! A thread's own storage cannot be walked from outside, so the registry keeps
//! a handle to every storage it filed a context in. That lets the lifecycle
//! tracker and stack teardown clear another thread's slot. Every operation runs
//! under one mutex.

use crate::context::Context;
use crate::thread::{SlotKey, ThreadHandle, ThreadStorage};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

pub struct SlotRegistry {
    key: SlotKey,
    slots: Mutex<HashMap<ThreadHandle, Arc<ThreadStorage>>>,
}

impl SlotRegistry {
    pub fn new(key: SlotKey) -> Self {
        Self {
            key,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn key(&self) -> SlotKey {
        self.key
    }

    /// File `context` in `thread`'s storage and track the storage.
    /// Returns the context it displaced, if any.
    pub fn register(
        &self,
        thread: ThreadHandle,
        storage: Arc<ThreadStorage>,
        context: Context,
    ) -> Option<Context> {
        let mut slots = self.slots.lock();
        let displaced = storage.insert(self.key, context);
        slots.insert(thread, storage);
        displaced
    }

    pub fn lookup(&self, thread: ThreadHandle) -> Option<Context> {
        let mut slots = self.slots.lock();
        let storage = slots.get(&thread)?;
        match storage.get(self.key) {
            Some(context) => Some(context),
            None => {
                // Slot was cleared behind our back; stop tracking it.
                slots.remove(&thread);
                None
            }
        }
    }

    /// Clear `thread`'s slot and stop tracking it.
    pub fn unregister(&self, thread: ThreadHandle) -> Option<Context> {
        let mut slots = self.slots.lock();
        let storage = slots.remove(&thread)?;
        storage.remove(self.key)
    }

    pub fn all_registered_handles(&self) -> BTreeSet<ThreadHandle> {
        self.slots.lock().keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clear every tracked slot. Returns how many contexts were removed.
    pub fn purge(&self) -> usize {
        let mut slots = self.slots.lock();
        slots
            .drain()
            .filter_map(|(_, storage)| storage.remove(self.key))
            .count()
    }
}
