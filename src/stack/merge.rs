//! Save-merge pipeline: replays other contexts' commits into the primary
//! context, on the primary thread, in the order they were observed.

use crate::context::{Context, ContextId, SaveChannel, SaveNotification};
use crate::notification::Subscription;
use crate::store::CoordinatorId;
use crate::thread::ThreadHost;
use std::sync::Arc;
use tracing::trace;

/// Whether a save belongs in `primary`: not its own, and from its coordinator.
pub(crate) fn should_merge(
    notification: &SaveNotification,
    primary: ContextId,
    coordinator: CoordinatorId,
) -> bool {
    notification.context != primary && notification.coordinator == coordinator
}

pub(crate) fn observe_saves(
    channel: &Arc<SaveChannel>,
    primary: Context,
    host: Arc<dyn ThreadHost>,
) -> Subscription {
    let primary_id = primary.id();
    let coordinator = primary.coordinator().id();

    channel.subscribe(move |notification: &SaveNotification| {
        if !should_merge(notification, primary_id, coordinator) {
            return;
        }
        let target = primary.clone();
        let changes = notification.changes.clone();
        let source = notification.context;
        host.run_on_primary_async(Box::new(move || {
            target.merge_change_set(&changes);
            trace!(source = %source, primary = %target.id(), "merged into primary");
        }));
    })
}
