//! Evicts a thread's context when the thread exits.

use crate::notification::Subscription;
use crate::stack::registry::SlotRegistry;
use crate::thread::{ThreadHost, ThreadWillExit};
use std::sync::Arc;
use tracing::debug;

/// Subscribe `registry` to the host's thread-exit stream. Threads with no
/// slot for this stack are ignored.
pub(crate) fn track_thread_exits(host: &dyn ThreadHost, registry: Arc<SlotRegistry>) -> Subscription {
    host.thread_exits().subscribe(move |event: &ThreadWillExit| {
        if let Some(context) = registry.unregister(event.thread) {
            debug!(
                thread = %event.thread,
                context = %context.id(),
                slot = registry.key().as_u64(),
                "evicted context of exiting thread"
            );
        }
    })
}
