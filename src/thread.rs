//! Thread identity, per-thread storage, and the host capability that supplies them.
//!
//! The stack never talks to OS threads directly. It asks a [`ThreadHost`] who
//! the current thread is, where that thread's storage lives, and how to get work
//! onto the primary thread. [`os::OsThreadHost`] backs this with real threads;
//! [`simulated::SimulatedThreads`] runs everything cooperatively on the caller.

pub mod os;
pub mod simulated;

pub use os::{settle_thread_exits, MainQueue, OsThreadHost};
pub use simulated::SimulatedThreads;

use crate::context::Context;
use crate::notification::EventChannel;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Unit of work shipped to the primary thread.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Opaque thread identity, stable for the life of the thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThreadHandle(u64);

impl ThreadHandle {
    pub const fn from_raw(raw: u64) -> Self {
        ThreadHandle(raw)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ThreadHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "thread-{}", self.0)
    }
}

/// Key under which one stack files its context in a thread's storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotKey(u64);

impl SlotKey {
    /// Allocate a key no other stack in this process holds.
    pub fn next() -> Self {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        SlotKey(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

/// A thread's own key-value storage: one context per stack.
///
/// Owned by the thread through its host, shared with slot registries so a
/// non-owning thread can clear an entry.
#[derive(Default)]
pub struct ThreadStorage {
    slots: Mutex<HashMap<SlotKey, Context>>,
}

impl ThreadStorage {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn get(&self, key: SlotKey) -> Option<Context> {
        self.slots.lock().get(&key).cloned()
    }

    pub fn insert(&self, key: SlotKey, context: Context) -> Option<Context> {
        self.slots.lock().insert(key, context)
    }

    pub fn remove(&self, key: SlotKey) -> Option<Context> {
        self.slots.lock().remove(&key)
    }

    pub fn contains(&self, key: SlotKey) -> bool {
        self.slots.lock().contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Posted when a thread terminates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadWillExit {
    pub thread: ThreadHandle,
}

/// Capability interface over the threading environment.
pub trait ThreadHost: Send + Sync {
    /// Identity of the calling thread.
    fn current(&self) -> ThreadHandle;

    /// Identity of the designated primary thread.
    fn primary(&self) -> ThreadHandle;

    fn is_primary(&self) -> bool {
        self.current() == self.primary()
    }

    /// Storage belonging to the calling thread.
    fn local_storage(&self) -> Arc<ThreadStorage>;

    /// Run `job` on the primary thread and block until it has finished.
    /// Runs inline when already on the primary thread.
    fn run_on_primary_sync(&self, job: Job);

    /// Queue `job` for the primary thread without waiting. Jobs run in the
    /// order they were queued.
    fn run_on_primary_async(&self, job: Job);

    /// Stream of thread-termination events.
    fn thread_exits(&self) -> Arc<EventChannel<ThreadWillExit>>;

    /// Block until exits of threads that already terminated have been posted.
    /// Hosts that post exits synchronously need not override this.
    fn settle_thread_exits(&self) {}
}
