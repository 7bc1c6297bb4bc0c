//! Real OS threads.
//!
//! Each thread lazily gets a handle and a [`ThreadStorage`] held in a
//! `thread_local!`. When the thread exits, the destructor hands its handle to
//! a reaper thread, which posts [`ThreadWillExit`] on the process-wide exit
//! channel. Subscribers therefore never run inside TLS teardown, and an exit
//! is observed shortly after the thread is gone; [`settle_thread_exits`] waits
//! for every exit queued so far. The primary thread is whichever thread
//! created the [`MainQueue`]; it must pump the queue for cross-thread work to
//! make progress.

use super::{Job, ThreadHandle, ThreadHost, ThreadStorage, ThreadWillExit};
use crate::notification::EventChannel;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, SyncSender};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use tracing::{trace, warn};

static NEXT_THREAD: AtomicU64 = AtomicU64::new(1);
static REAPER: OnceLock<Sender<ReaperMessage>> = OnceLock::new();

enum ReaperMessage {
    Exited(ThreadHandle),
    Settle(SyncSender<()>),
}

fn reaper() -> &'static Sender<ReaperMessage> {
    REAPER.get_or_init(|| {
        let (sender, receiver) = mpsc::channel();
        let spawned = std::thread::Builder::new()
            .name("ctxstack-exits".to_string())
            .spawn(move || run_reaper(receiver));
        if let Err(e) = spawned {
            warn!(error = %e, "thread-exit reaper failed to start; exits will not be observed");
        }
        sender
    })
}

fn run_reaper(receiver: Receiver<ReaperMessage>) {
    for message in receiver {
        match message {
            ReaperMessage::Exited(thread) => {
                let delivered = thread_exits().post(&ThreadWillExit { thread });
                trace!(%thread, delivered, "thread exit posted");
            }
            ReaperMessage::Settle(done) => {
                let _ = done.send(());
            }
        }
    }
}

struct LocalThread {
    handle: ThreadHandle,
    storage: Arc<ThreadStorage>,
}

impl LocalThread {
    fn new() -> Self {
        // Start the reaper now; the destructor must not spawn threads.
        reaper();
        Self {
            handle: ThreadHandle::from_raw(NEXT_THREAD.fetch_add(1, Ordering::Relaxed)),
            storage: ThreadStorage::new(),
        }
    }
}

impl Drop for LocalThread {
    fn drop(&mut self) {
        // TLS teardown: hand off only. No logging or subscriber callbacks here.
        if let Some(reaper) = REAPER.get() {
            let _ = reaper.send(ReaperMessage::Exited(self.handle));
        }
    }
}

thread_local! {
    static LOCAL: LocalThread = LocalThread::new();
}

/// Handle of the calling OS thread.
pub fn current() -> ThreadHandle {
    LOCAL.with(|local| local.handle)
}

/// Storage of the calling OS thread.
pub fn current_storage() -> Arc<ThreadStorage> {
    LOCAL.with(|local| local.storage.clone())
}

/// Process-wide channel carrying OS thread exits.
pub fn thread_exits() -> Arc<EventChannel<ThreadWillExit>> {
    static EXITS: OnceLock<Arc<EventChannel<ThreadWillExit>>> = OnceLock::new();
    EXITS.get_or_init(EventChannel::new).clone()
}

/// Block until every thread exit queued so far has been posted on
/// [`thread_exits`]. Threads joined before this call are covered.
pub fn settle_thread_exits() {
    let (done_tx, done_rx) = mpsc::sync_channel(1);
    if reaper().send(ReaperMessage::Settle(done_tx)).is_ok() {
        let _ = done_rx.recv();
    }
}

/// Run loop for the primary thread.
pub struct MainQueue {
    thread: ThreadHandle,
    sender: Sender<Job>,
    receiver: Mutex<Receiver<Job>>,
}

impl MainQueue {
    /// Designate the calling thread as primary.
    pub fn for_current_thread() -> Arc<Self> {
        let (sender, receiver) = mpsc::channel();
        Arc::new(Self {
            thread: current(),
            sender,
            receiver: Mutex::new(receiver),
        })
    }

    pub fn thread(&self) -> ThreadHandle {
        self.thread
    }

    pub fn is_current(&self) -> bool {
        current() == self.thread
    }

    pub fn dispatch_async(&self, job: Job) {
        // The queue owns its receiver, so the send cannot fail while `self` lives.
        let _ = self.sender.send(job);
    }

    /// Block until the primary thread has run `job`.
    pub fn dispatch_sync(&self, job: Job) {
        if self.is_current() {
            job();
            return;
        }
        let (done_tx, done_rx) = mpsc::sync_channel::<()>(1);
        self.dispatch_async(Box::new(move || {
            job();
            let _ = done_tx.send(());
        }));
        if done_rx.recv().is_err() {
            warn!(primary = %self.thread, "primary job dropped before completion");
        }
    }

    fn next_job(&self, wait: Option<Duration>) -> Option<Job> {
        let receiver = self.receiver.lock();
        match wait {
            None => receiver.try_recv().ok(),
            Some(timeout) => match receiver.recv_timeout(timeout) {
                Ok(job) => Some(job),
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
            },
        }
    }

    /// Run every job queued so far. Call from the primary thread.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        while let Some(job) = self.next_job(None) {
            job();
            ran += 1;
        }
        ran
    }

    /// Pump the queue until `done` returns true or `timeout` elapses.
    /// Returns whether `done` was satisfied.
    pub fn run_until<F>(&self, timeout: Duration, mut done: F) -> bool
    where
        F: FnMut() -> bool,
    {
        let deadline = Instant::now() + timeout;
        loop {
            self.run_pending();
            if done() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let wait = (deadline - now).min(Duration::from_millis(10));
            if let Some(job) = self.next_job(Some(wait)) {
                job();
            }
        }
    }
}

/// [`ThreadHost`] over real OS threads, primary thread owned by a [`MainQueue`].
pub struct OsThreadHost {
    queue: Arc<MainQueue>,
}

impl OsThreadHost {
    pub fn new(queue: Arc<MainQueue>) -> Arc<Self> {
        Arc::new(Self { queue })
    }

    /// Make the calling thread primary and return the host with its queue.
    pub fn on_current_thread() -> (Arc<Self>, Arc<MainQueue>) {
        let queue = MainQueue::for_current_thread();
        (Self::new(queue.clone()), queue)
    }

    pub fn queue(&self) -> &Arc<MainQueue> {
        &self.queue
    }
}

impl ThreadHost for OsThreadHost {
    fn current(&self) -> ThreadHandle {
        current()
    }

    fn primary(&self) -> ThreadHandle {
        self.queue.thread()
    }

    fn local_storage(&self) -> Arc<ThreadStorage> {
        current_storage()
    }

    fn run_on_primary_sync(&self, job: Job) {
        self.queue.dispatch_sync(job);
    }

    fn run_on_primary_async(&self, job: Job) {
        self.queue.dispatch_async(job);
    }

    fn thread_exits(&self) -> Arc<EventChannel<ThreadWillExit>> {
        thread_exits()
    }

    fn settle_thread_exits(&self) {
        settle_thread_exits();
    }
}
