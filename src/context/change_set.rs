//! Change-sets and the commit notification that carries them.

use crate::context::ContextId;
use crate::notification::EventChannel;
use crate::store::{CoordinatorId, ObjectId, ObjectRecord};
use chrono::{DateTime, Utc};
use std::sync::{Arc, OnceLock};

/// Objects inserted, updated and deleted by one commit, as written.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeSet {
    pub inserted: Vec<ObjectRecord>,
    pub updated: Vec<ObjectRecord>,
    pub deleted: Vec<ObjectId>,
    pub committed_at: DateTime<Utc>,
}

impl ChangeSet {
    pub fn new(inserted: Vec<ObjectRecord>, updated: Vec<ObjectRecord>, deleted: Vec<ObjectId>) -> Self {
        Self {
            inserted,
            updated,
            deleted,
            committed_at: Utc::now(),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new(), Vec::new(), Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.inserted.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }

    pub fn len(&self) -> usize {
        self.inserted.len() + self.updated.len() + self.deleted.len()
    }
}

/// Posted after a context's commit is durable.
#[derive(Debug, Clone)]
pub struct SaveNotification {
    pub context: ContextId,
    pub coordinator: CoordinatorId,
    pub changes: Arc<ChangeSet>,
}

pub type SaveChannel = EventChannel<SaveNotification>;

/// Process-wide save channel, shared by every coordinator that does not
/// bring its own.
pub fn save_notifications() -> Arc<SaveChannel> {
    static SAVES: OnceLock<Arc<SaveChannel>> = OnceLock::new();
    SAVES.get_or_init(EventChannel::new).clone()
}
