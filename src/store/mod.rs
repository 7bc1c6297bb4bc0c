//! Storage collaborator
//!
//! The model, the sled-backed persistent store, and the coordinator that every
//! context of a stack is bound to.

pub mod coordinator;
pub mod model;
pub mod persistence;

pub use coordinator::{open_store, Coordinator, CoordinatorId, StoreOptions};
pub use model::{Model, PropertyType};
pub use persistence::{erase_store, PersistentStore, StoreType};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Property name to value.
pub type Properties = BTreeMap<String, Value>;

/// Permanent identity of a stored object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId(u64);

impl ObjectId {
    pub const fn from_raw(raw: u64) -> Self {
        ObjectId(raw)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }

    pub(crate) fn to_key(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One object as stored (or as seen by a context).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectRecord {
    pub id: ObjectId,
    pub entity: String,
    pub properties: Properties,
}

impl ObjectRecord {
    pub fn get(&self, property: &str) -> Option<&Value> {
        self.properties.get(property)
    }
}
