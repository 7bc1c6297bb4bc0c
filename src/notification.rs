//! In-process notification channels.
//!
//! An [`EventChannel`] delivers each posted event synchronously, on the posting
//! thread, to every live subscriber. Subscribing returns a [`Subscription`];
//! dropping it (or calling [`Subscription::cancel`]) removes the callback, so a
//! subscriber's lifetime is tied to whatever owns the handle.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

type Callback<E> = Arc<dyn Fn(&E) + Send + Sync>;

pub struct EventChannel<E> {
    next_id: AtomicU64,
    subscribers: RwLock<Vec<(u64, Callback<E>)>>,
}

impl<E: 'static> EventChannel<E> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next_id: AtomicU64::new(1),
            subscribers: RwLock::new(Vec::new()),
        })
    }

    /// Register a callback invoked for every event posted after this call.
    pub fn subscribe<F>(self: &Arc<Self>, callback: F) -> Subscription
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.write().push((id, Arc::new(callback)));

        let channel: Weak<Self> = Arc::downgrade(self);
        Subscription {
            cancel: Some(Box::new(move || {
                if let Some(channel) = channel.upgrade() {
                    channel.subscribers.write().retain(|(sub_id, _)| *sub_id != id);
                }
            })),
        }
    }

    /// Deliver `event` to all subscribers; returns how many were invoked.
    pub fn post(&self, event: &E) -> usize {
        // Snapshot first: callbacks may subscribe or cancel while running.
        let callbacks: Vec<Callback<E>> = self
            .subscribers
            .read()
            .iter()
            .map(|(_, callback)| callback.clone())
            .collect();
        for callback in &callbacks {
            callback(event);
        }
        callbacks.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

/// Handle for a live subscription; unsubscribes on drop.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn cancel(mut self) {
        self.cancel_inner();
    }

    fn cancel_inner(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel_inner();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}
