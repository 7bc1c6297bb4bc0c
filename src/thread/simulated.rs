//! Cooperative stand-in for OS threads.
//!
//! All "threads" run on the caller's real thread. [`SimulatedThreads::enter`]
//! switches the current identity for the duration of a closure, primary jobs
//! wait in a FIFO until [`SimulatedThreads::drain_primary`], and
//! [`SimulatedThreads::terminate`] injects a thread-exit event. Use it from one
//! real thread at a time.

use super::{Job, ThreadHandle, ThreadHost, ThreadStorage, ThreadWillExit};
use crate::notification::EventChannel;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Arc;

const PRIMARY: ThreadHandle = ThreadHandle::from_raw(0);

struct SimState {
    current: ThreadHandle,
    next: u64,
    storages: HashMap<ThreadHandle, Arc<ThreadStorage>>,
    live: BTreeSet<ThreadHandle>,
    queue: VecDeque<Job>,
}

pub struct SimulatedThreads {
    state: Mutex<SimState>,
    exits: Arc<EventChannel<ThreadWillExit>>,
}

impl SimulatedThreads {
    /// New environment whose current thread is the primary thread.
    pub fn new() -> Arc<Self> {
        let mut live = BTreeSet::new();
        live.insert(PRIMARY);
        Arc::new(Self {
            state: Mutex::new(SimState {
                current: PRIMARY,
                next: 1,
                storages: HashMap::new(),
                live,
                queue: VecDeque::new(),
            }),
            exits: EventChannel::new(),
        })
    }

    /// Create a new worker thread identity.
    pub fn spawn(&self) -> ThreadHandle {
        let mut state = self.state.lock();
        let handle = ThreadHandle::from_raw(state.next);
        state.next += 1;
        state.live.insert(handle);
        handle
    }

    /// Run `f` as if on `thread`, restoring the previous identity afterwards.
    pub fn enter<R>(&self, thread: ThreadHandle, f: impl FnOnce() -> R) -> R {
        let previous = std::mem::replace(&mut self.state.lock().current, thread);
        let _restore = Restore {
            threads: self,
            previous,
        };
        f()
    }

    /// Run queued primary jobs, including any they enqueue, in FIFO order.
    pub fn drain_primary(&self) -> usize {
        let mut ran = 0;
        loop {
            let job = self.state.lock().queue.pop_front();
            match job {
                Some(job) => {
                    self.enter(PRIMARY, job);
                    ran += 1;
                }
                None => return ran,
            }
        }
    }

    pub fn pending_primary_jobs(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Post the exit event for `thread`, then drop its storage.
    pub fn terminate(&self, thread: ThreadHandle) {
        self.exits.post(&ThreadWillExit { thread });
        let mut state = self.state.lock();
        state.storages.remove(&thread);
        state.live.remove(&thread);
    }

    pub fn live_threads(&self) -> BTreeSet<ThreadHandle> {
        self.state.lock().live.clone()
    }
}

struct Restore<'a> {
    threads: &'a SimulatedThreads,
    previous: ThreadHandle,
}

impl Drop for Restore<'_> {
    fn drop(&mut self) {
        self.threads.state.lock().current = self.previous;
    }
}

impl ThreadHost for SimulatedThreads {
    fn current(&self) -> ThreadHandle {
        self.state.lock().current
    }

    fn primary(&self) -> ThreadHandle {
        PRIMARY
    }

    fn local_storage(&self) -> Arc<ThreadStorage> {
        let mut state = self.state.lock();
        let current = state.current;
        state
            .storages
            .entry(current)
            .or_insert_with(ThreadStorage::new)
            .clone()
    }

    fn run_on_primary_sync(&self, job: Job) {
        self.enter(PRIMARY, job);
    }

    fn run_on_primary_async(&self, job: Job) {
        self.state.lock().queue.push_back(job);
    }

    fn thread_exits(&self) -> Arc<EventChannel<ThreadWillExit>> {
        self.exits.clone()
    }
}
