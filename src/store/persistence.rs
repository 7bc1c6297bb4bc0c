//! Persistence layer: sled-backed object store

use crate::error::StoreError;
use crate::store::{Model, ObjectId, ObjectRecord};
use serde::{Deserialize, Serialize};
use sled::{Db, Tree};
use std::path::{Path, PathBuf};
use tracing::debug;

const TREE_OBJECTS: &str = "objects";
const TREE_METADATA: &str = "metadata";
const METADATA_KEY: &[u8] = b"store";
const FORMAT_VERSION: u32 = 1;

/// Backing format of a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreType {
    /// Durable on-disk sled database.
    #[default]
    Sled,
    /// Temporary sled database, discarded when the store is dropped.
    InMemory,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoreMetadata {
    format_version: u32,
    model_fingerprint: String,
}

/// Sled-based object store
pub struct PersistentStore {
    db: Db,
    objects: Tree,
    location: Option<PathBuf>,
    store_type: StoreType,
}

impl PersistentStore {
    /// Open (or create) a store and check it was written for `model`.
    pub fn open(path: Option<&Path>, store_type: StoreType, model: &Model) -> Result<Self, StoreError> {
        let db = match store_type {
            StoreType::Sled => {
                let path = path.ok_or_else(|| StoreError::Open {
                    path: PathBuf::new(),
                    reason: "a durable store needs a path".to_string(),
                })?;
                sled::Config::new()
                    .path(path)
                    .open()
                    .map_err(|e| StoreError::Open {
                        path: path.to_path_buf(),
                        reason: e.to_string(),
                    })?
            }
            StoreType::InMemory => sled::Config::new()
                .temporary(true)
                .open()
                .map_err(|e| StoreError::Open {
                    path: PathBuf::new(),
                    reason: e.to_string(),
                })?,
        };

        let location = match store_type {
            StoreType::Sled => path.map(Path::to_path_buf),
            StoreType::InMemory => None,
        };
        let open_err = |e: sled::Error| StoreError::Open {
            path: location.clone().unwrap_or_default(),
            reason: e.to_string(),
        };
        let objects = db.open_tree(TREE_OBJECTS).map_err(open_err)?;
        let metadata = db.open_tree(TREE_METADATA).map_err(open_err)?;

        let expected = model.fingerprint();
        match metadata.get(METADATA_KEY).map_err(open_err)? {
            Some(raw) => {
                let stored: StoreMetadata = bincode::deserialize(&raw)
                    .map_err(|e| StoreError::Data(format!("Unreadable store metadata: {}", e)))?;
                if stored.format_version != FORMAT_VERSION {
                    return Err(StoreError::Data(format!(
                        "Unsupported store format version {}",
                        stored.format_version
                    )));
                }
                if stored.model_fingerprint != expected {
                    return Err(StoreError::IncompatibleModel {
                        expected,
                        found: stored.model_fingerprint,
                    });
                }
            }
            None => {
                let fresh = StoreMetadata {
                    format_version: FORMAT_VERSION,
                    model_fingerprint: expected,
                };
                let raw = bincode::serialize(&fresh)
                    .map_err(|e| StoreError::Data(format!("Failed to encode store metadata: {}", e)))?;
                metadata.insert(METADATA_KEY, raw).map_err(open_err)?;
                metadata.flush().map_err(open_err)?;
            }
        }

        debug!(location = ?location, ?store_type, "store opened");
        Ok(Self {
            db,
            objects,
            location,
            store_type,
        })
    }

    pub fn location(&self) -> Option<&Path> {
        self.location.as_deref()
    }

    pub fn store_type(&self) -> StoreType {
        self.store_type
    }

    /// Allocate a fresh, never reused object id.
    pub fn next_id(&self) -> Result<ObjectId, StoreError> {
        let raw = self.db.generate_id().map_err(to_store_io)?;
        // Zero is left unused so ids read as 1-based.
        Ok(ObjectId::from_raw(raw + 1))
    }

    pub fn get(&self, id: ObjectId) -> Result<Option<ObjectRecord>, StoreError> {
        match self.objects.get(id.to_key()).map_err(to_store_io)? {
            Some(raw) => Ok(Some(decode(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn list(&self, entity: &str) -> Result<Vec<ObjectRecord>, StoreError> {
        let mut records = Vec::new();
        for item in self.objects.iter() {
            let (_, raw) = item.map_err(to_store_io)?;
            let record = decode(&raw)?;
            if record.entity == entity {
                records.push(record);
            }
        }
        Ok(records)
    }

    pub fn count(&self, entity: &str) -> Result<usize, StoreError> {
        Ok(self.list(entity)?.len())
    }

    /// Write `records` and remove `deleted` in one atomic batch.
    pub fn apply(
        &self,
        records: &[ObjectRecord],
        deleted: &[ObjectId],
        flush: bool,
    ) -> Result<(), StoreError> {
        let mut batch = sled::Batch::default();
        for record in records {
            let value = serde_json::to_vec(record)
                .map_err(|e| StoreError::Data(format!("Failed to encode object {}: {}", record.id, e)))?;
            batch.insert(record.id.to_key().to_vec(), value);
        }
        for id in deleted {
            batch.remove(id.to_key().to_vec());
        }
        self.objects.apply_batch(batch).map_err(to_store_io)?;
        if flush {
            self.flush()?;
        }
        Ok(())
    }

    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush().map_err(to_store_io)?;
        Ok(())
    }
}

fn decode(raw: &[u8]) -> Result<ObjectRecord, StoreError> {
    serde_json::from_slice(raw).map_err(|e| StoreError::Data(format!("Failed to decode object: {}", e)))
}

fn to_store_io(err: sled::Error) -> StoreError {
    StoreError::IoError(std::io::Error::new(std::io::ErrorKind::Other, err.to_string()))
}

/// Delete whatever lives at `path`, file or directory. A missing path is fine.
pub fn erase_store(path: &Path) -> Result<(), StoreError> {
    let result = if path.is_dir() {
        std::fs::remove_dir_all(path)
    } else if path.exists() {
        std::fs::remove_file(path)
    } else {
        return Ok(());
    };
    result.map_err(|source| StoreError::Erase {
        path: path.to_path_buf(),
        source,
    })
}
