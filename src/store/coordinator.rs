//! Store coordinator
//!
//! The single shared entry point to a store. Contexts bound to the same
//! coordinator see the same data; commits through it are serialized.

use crate::context::{
    save_notifications, ChangeSet, Context, ContextKind, MergePolicy, SaveChannel,
    SaveNotification,
};
use crate::error::StoreError;
use crate::store::{Model, ObjectId, ObjectRecord, PersistentStore, Properties, StoreType};
use crate::thread::ThreadHandle;
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CoordinatorId(u64);

impl CoordinatorId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        CoordinatorId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

/// Options applied when a store is opened.
#[derive(Clone)]
pub struct StoreOptions {
    /// Flush sled to disk as part of every commit.
    pub flush_on_commit: bool,
    /// Channel receiving a notification per successful commit.
    pub notifications: Arc<SaveChannel>,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            flush_on_commit: true,
            notifications: save_notifications(),
        }
    }
}

impl fmt::Debug for StoreOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreOptions")
            .field("flush_on_commit", &self.flush_on_commit)
            .field("subscribers", &self.notifications.subscriber_count())
            .finish()
    }
}

/// An update a context wants to commit: the values it last saw and its edits.
pub(crate) struct PendingUpdate {
    pub id: ObjectId,
    pub snapshot: Properties,
    pub changes: Properties,
}

#[derive(Default)]
pub(crate) struct CommitRequest {
    pub inserts: Vec<ObjectRecord>,
    pub updates: Vec<PendingUpdate>,
    pub deletes: Vec<ObjectId>,
}

impl CommitRequest {
    pub fn is_empty(&self) -> bool {
        self.inserts.is_empty() && self.updates.is_empty() && self.deletes.is_empty()
    }
}

struct CoordinatorInner {
    id: CoordinatorId,
    model: Arc<Model>,
    store: RwLock<Option<PersistentStore>>,
    options: StoreOptions,
    commit_lock: Mutex<()>,
}

#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<CoordinatorInner>,
}

impl Coordinator {
    /// Coordinator with no store attached yet.
    pub fn new(model: Arc<Model>, options: StoreOptions) -> Self {
        Self {
            inner: Arc::new(CoordinatorInner {
                id: CoordinatorId::next(),
                model,
                store: RwLock::new(None),
                options,
                commit_lock: Mutex::new(()),
            }),
        }
    }

    /// Attach the backing store. A coordinator holds one store at most.
    pub fn add_store(&self, path: Option<&Path>, store_type: StoreType) -> Result<(), StoreError> {
        let mut slot = self.inner.store.write();
        if slot.is_some() {
            return Err(StoreError::AlreadyAttached);
        }
        *slot = Some(PersistentStore::open(path, store_type, &self.inner.model)?);
        Ok(())
    }

    pub fn id(&self) -> CoordinatorId {
        self.inner.id
    }

    pub fn model(&self) -> &Arc<Model> {
        &self.inner.model
    }

    pub fn options(&self) -> &StoreOptions {
        &self.inner.options
    }

    pub fn has_store(&self) -> bool {
        self.inner.store.read().is_some()
    }

    pub fn store_location(&self) -> Option<PathBuf> {
        self.inner
            .store
            .read()
            .as_ref()
            .and_then(|store| store.location().map(Path::to_path_buf))
    }

    /// Create a context bound to this coordinator.
    pub fn new_context(&self, kind: ContextKind, owner: ThreadHandle, policy: MergePolicy) -> Context {
        Context::new(kind, self.clone(), owner, policy)
    }

    fn with_store<R>(
        &self,
        f: impl FnOnce(&PersistentStore) -> Result<R, StoreError>,
    ) -> Result<R, StoreError> {
        let guard = self.inner.store.read();
        let store = guard.as_ref().ok_or(StoreError::NoStore)?;
        f(store)
    }

    pub fn fetch(&self, entity: &str) -> Result<Vec<ObjectRecord>, StoreError> {
        self.with_store(|store| store.list(entity))
    }

    pub fn load(&self, id: ObjectId) -> Result<Option<ObjectRecord>, StoreError> {
        self.with_store(|store| store.get(id))
    }

    pub fn count(&self, entity: &str) -> Result<usize, StoreError> {
        self.with_store(|store| store.count(entity))
    }

    pub fn next_object_id(&self) -> Result<ObjectId, StoreError> {
        self.with_store(|store| store.next_id())
    }

    /// Write a context's pending changes atomically and describe the result.
    pub(crate) fn commit(
        &self,
        request: CommitRequest,
        policy: MergePolicy,
    ) -> Result<ChangeSet, StoreError> {
        let _serial = self.inner.commit_lock.lock();
        self.with_store(|store| {
            let mut updated = Vec::with_capacity(request.updates.len());
            for update in &request.updates {
                let current = store
                    .get(update.id)?
                    .ok_or(StoreError::ObjectNotFound(update.id))?;
                let properties =
                    policy.resolve_commit(&update.snapshot, &current.properties, &update.changes);
                updated.push(ObjectRecord {
                    id: update.id,
                    entity: current.entity,
                    properties,
                });
            }

            let mut writes = request.inserts.clone();
            writes.extend(updated.iter().cloned());
            store.apply(&writes, &request.deletes, self.inner.options.flush_on_commit)?;

            debug!(
                coordinator = self.inner.id.0,
                inserted = request.inserts.len(),
                updated = updated.len(),
                deleted = request.deletes.len(),
                "commit written"
            );
            Ok(ChangeSet::new(request.inserts, updated, request.deletes))
        })
    }

    pub(crate) fn post_save(&self, notification: &SaveNotification) -> usize {
        self.inner.options.notifications.post(notification)
    }
}

impl PartialEq for Coordinator {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Coordinator {}

impl fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Coordinator")
            .field("id", &self.inner.id)
            .field("store", &self.store_location())
            .finish()
    }
}

/// Build a coordinator for `model` and attach the store at `path`.
pub fn open_store(
    model: Arc<Model>,
    path: Option<&Path>,
    store_type: StoreType,
    options: StoreOptions,
) -> Result<Coordinator, StoreError> {
    let coordinator = Coordinator::new(model, options);
    coordinator.add_store(path, store_type)?;
    Ok(coordinator)
}
