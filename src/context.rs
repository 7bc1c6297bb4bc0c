//! Contexts: in-memory working state bound to a coordinator.
//!
//! A context registers the objects it has seen, keeps a snapshot of their last
//! known committed values, and layers its own pending edits on top. Other
//! contexts' commits only become visible through [`Context::merge_change_set`]
//! or by fetching objects the context has never registered.

pub mod change_set;
pub mod merge_policy;

pub use change_set::{save_notifications, ChangeSet, SaveChannel, SaveNotification};
pub use merge_policy::MergePolicy;

use crate::error::ContextError;
use crate::store::coordinator::{CommitRequest, PendingUpdate};
use crate::store::{Coordinator, ObjectId, ObjectRecord, Properties};
use crate::thread::ThreadHandle;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(u64);

impl ContextId {
    pub(crate) fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        ContextId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextKind {
    /// Lives on the primary thread; receives merges.
    Primary,
    /// Confined to one worker thread.
    Background,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ObjectState {
    Inserted,
    Persisted,
    Deleted,
}

struct ManagedObject {
    entity: String,
    committed: Properties,
    changes: Properties,
    state: ObjectState,
}

impl ManagedObject {
    fn from_record(record: ObjectRecord) -> Self {
        Self {
            entity: record.entity,
            committed: record.properties,
            changes: Properties::new(),
            state: ObjectState::Persisted,
        }
    }

    fn current(&self) -> Properties {
        let mut values = self.committed.clone();
        values.extend(self.changes.iter().map(|(k, v)| (k.clone(), v.clone())));
        values
    }

    fn to_record(&self, id: ObjectId) -> ObjectRecord {
        ObjectRecord {
            id,
            entity: self.entity.clone(),
            properties: self.current(),
        }
    }

    fn is_dirty(&self) -> bool {
        self.state != ObjectState::Persisted || !self.changes.is_empty()
    }
}

#[derive(Default)]
struct ContextState {
    objects: BTreeMap<ObjectId, ManagedObject>,
}

struct ContextInner {
    id: ContextId,
    kind: ContextKind,
    owner: ThreadHandle,
    coordinator: Coordinator,
    policy: MergePolicy,
    state: Mutex<ContextState>,
}

/// Shared handle to one context. Clones refer to the same context.
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

impl Context {
    pub(crate) fn new(
        kind: ContextKind,
        coordinator: Coordinator,
        owner: ThreadHandle,
        policy: MergePolicy,
    ) -> Self {
        let id = ContextId::next();
        trace!(context = %id, ?kind, %owner, "context created");
        Self {
            inner: Arc::new(ContextInner {
                id,
                kind,
                owner,
                coordinator,
                policy,
                state: Mutex::new(ContextState::default()),
            }),
        }
    }

    pub fn id(&self) -> ContextId {
        self.inner.id
    }

    pub fn kind(&self) -> ContextKind {
        self.inner.kind
    }

    pub fn is_primary(&self) -> bool {
        self.inner.kind == ContextKind::Primary
    }

    /// Thread this context is confined to.
    pub fn owner(&self) -> ThreadHandle {
        self.inner.owner
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.inner.coordinator
    }

    pub fn merge_policy(&self) -> MergePolicy {
        self.inner.policy
    }

    /// Insert a new object; it reaches the store on the next commit.
    pub fn insert(&self, entity: &str, properties: Properties) -> Result<ObjectId, ContextError> {
        self.inner.coordinator.model().check_properties(entity, &properties)?;
        let id = self.inner.coordinator.next_object_id()?;
        self.inner.state.lock().objects.insert(
            id,
            ManagedObject {
                entity: entity.to_string(),
                committed: Properties::new(),
                changes: properties,
                state: ObjectState::Inserted,
            },
        );
        Ok(id)
    }

    /// Register `id` from the store if this context has not seen it yet.
    fn ensure_registered(&self, state: &mut ContextState, id: ObjectId) -> Result<bool, ContextError> {
        if state.objects.contains_key(&id) {
            return Ok(true);
        }
        match self.inner.coordinator.load(id)? {
            Some(record) => {
                state.objects.insert(id, ManagedObject::from_record(record));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Current values of `id` as this context sees them.
    pub fn object(&self, id: ObjectId) -> Result<Option<ObjectRecord>, ContextError> {
        let mut state = self.inner.state.lock();
        if !self.ensure_registered(&mut state, id)? {
            return Ok(None);
        }
        Ok(state
            .objects
            .get(&id)
            .filter(|object| object.state != ObjectState::Deleted)
            .map(|object| object.to_record(id)))
    }

    pub fn set(&self, id: ObjectId, property: &str, value: Value) -> Result<(), ContextError> {
        let mut state = self.inner.state.lock();
        if !self.ensure_registered(&mut state, id)? {
            return Err(ContextError::ObjectNotFound(id));
        }
        let object = state
            .objects
            .get_mut(&id)
            .ok_or(ContextError::ObjectNotFound(id))?;
        if object.state == ObjectState::Deleted {
            return Err(ContextError::ObjectDeleted(id));
        }
        self.inner
            .coordinator
            .model()
            .check_value(&object.entity, property, &value)?;

        if object.state == ObjectState::Persisted && object.committed.get(property) == Some(&value) {
            object.changes.remove(property);
        } else {
            object.changes.insert(property.to_string(), value);
        }
        Ok(())
    }

    pub fn delete(&self, id: ObjectId) -> Result<(), ContextError> {
        let mut state = self.inner.state.lock();
        if !self.ensure_registered(&mut state, id)? {
            return Err(ContextError::ObjectNotFound(id));
        }
        let inserted = state
            .objects
            .get(&id)
            .map(|object| object.state == ObjectState::Inserted)
            .unwrap_or(false);
        if inserted {
            state.objects.remove(&id);
        } else if let Some(object) = state.objects.get_mut(&id) {
            object.state = ObjectState::Deleted;
        }
        Ok(())
    }

    /// All objects of `entity`: registers store objects this context has not
    /// seen. Already registered objects keep their in-context values.
    pub fn fetch(&self, entity: &str) -> Result<Vec<ObjectRecord>, ContextError> {
        self.inner.coordinator.model().check_entity(entity)?;
        let records = self.inner.coordinator.fetch(entity)?;
        let mut state = self.inner.state.lock();
        for record in records {
            state
                .objects
                .entry(record.id)
                .or_insert_with(|| ManagedObject::from_record(record));
        }
        Ok(Self::collect(&state, entity))
    }

    /// Objects of `entity` already registered here, without touching the store.
    pub fn registered_objects(&self, entity: &str) -> Vec<ObjectRecord> {
        Self::collect(&self.inner.state.lock(), entity)
    }

    pub fn registered_count(&self, entity: &str) -> usize {
        self.inner
            .state
            .lock()
            .objects
            .values()
            .filter(|object| object.entity == entity && object.state != ObjectState::Deleted)
            .count()
    }

    fn collect(state: &ContextState, entity: &str) -> Vec<ObjectRecord> {
        state
            .objects
            .iter()
            .filter(|(_, object)| object.entity == entity && object.state != ObjectState::Deleted)
            .map(|(id, object)| object.to_record(*id))
            .collect()
    }

    pub fn has_changes(&self) -> bool {
        self.inner.state.lock().objects.values().any(ManagedObject::is_dirty)
    }

    /// Discard every uncommitted edit, insert and delete.
    pub fn rollback(&self) {
        let mut state = self.inner.state.lock();
        state.objects.retain(|_, object| object.state != ObjectState::Inserted);
        for object in state.objects.values_mut() {
            object.changes.clear();
            object.state = ObjectState::Persisted;
        }
    }

    /// Write pending changes to the store, then announce them on the
    /// coordinator's save channel. Nothing is posted when there was nothing
    /// to write.
    pub fn commit(&self) -> Result<Arc<ChangeSet>, ContextError> {
        let changes = {
            let mut state = self.inner.state.lock();
            let mut request = CommitRequest::default();
            for (id, object) in &state.objects {
                match object.state {
                    ObjectState::Inserted => request.inserts.push(object.to_record(*id)),
                    ObjectState::Deleted => request.deletes.push(*id),
                    ObjectState::Persisted if !object.changes.is_empty() => {
                        request.updates.push(PendingUpdate {
                            id: *id,
                            snapshot: object.committed.clone(),
                            changes: object.changes.clone(),
                        })
                    }
                    ObjectState::Persisted => {}
                }
            }
            if request.is_empty() {
                return Ok(Arc::new(ChangeSet::empty()));
            }

            let changes = self.inner.coordinator.commit(request, self.inner.policy)?;
            for record in changes.inserted.iter().chain(&changes.updated) {
                if let Some(object) = state.objects.get_mut(&record.id) {
                    object.committed = record.properties.clone();
                    object.changes.clear();
                    object.state = ObjectState::Persisted;
                }
            }
            for id in &changes.deleted {
                state.objects.remove(id);
            }
            Arc::new(changes)
        };

        let delivered = self.inner.coordinator.post_save(&SaveNotification {
            context: self.inner.id,
            coordinator: self.inner.coordinator.id(),
            changes: changes.clone(),
        });
        debug!(
            context = %self.inner.id,
            objects = changes.len(),
            delivered,
            "context committed"
        );
        Ok(changes)
    }

    /// Fold another context's committed changes into this one. Pending local
    /// edits are reconciled through this context's merge policy.
    pub fn merge_change_set(&self, changes: &ChangeSet) {
        let policy = self.inner.policy;
        let mut state = self.inner.state.lock();

        for record in &changes.inserted {
            match state.objects.get_mut(&record.id) {
                Some(object) => refresh(policy, object, record),
                None => {
                    state
                        .objects
                        .insert(record.id, ManagedObject::from_record(record.clone()));
                }
            }
        }
        for record in &changes.updated {
            // Unregistered objects are read fresh on their next fetch.
            if let Some(object) = state.objects.get_mut(&record.id) {
                refresh(policy, object, record);
            }
        }
        for id in &changes.deleted {
            state.objects.remove(id);
        }
        trace!(context = %self.inner.id, objects = changes.len(), "change-set merged");
    }
}

fn refresh(policy: MergePolicy, object: &mut ManagedObject, record: &ObjectRecord) {
    let ManagedObject {
        committed, changes, ..
    } = object;
    policy.resolve_merge(committed, changes, &record.properties);
    *committed = record.properties.clone();
    changes.retain(|property, value| committed.get(property) != Some(&*value));
}

impl PartialEq for Context {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Context {}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.kind)
            .field("owner", &self.inner.owner)
            .finish()
    }
}
