//! Property-level conflict rules.
//!
//! A conflict is a property a context edited locally whose stored (or incoming)
//! value has moved since the context last saw it.

use crate::store::Properties;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergePolicy {
    /// The context's own edits win over store and incoming values.
    #[default]
    LocalTrumpsStore,
    /// Store and incoming values win; conflicting local edits are dropped.
    StoreTrumpsLocal,
}

impl MergePolicy {
    /// Values to write when committing `changes` over the store's `current`
    /// record, given the `snapshot` the edits were made against.
    pub fn resolve_commit(
        self,
        snapshot: &Properties,
        current: &Properties,
        changes: &Properties,
    ) -> Properties {
        let mut resolved = current.clone();
        for (property, value) in changes {
            let conflicting = current.get(property) != snapshot.get(property);
            if self == MergePolicy::LocalTrumpsStore || !conflicting {
                resolved.insert(property.clone(), value.clone());
            }
        }
        resolved
    }

    /// Reconcile pending `changes` with an `incoming` record that replaces
    /// `snapshot`.
    pub fn resolve_merge(self, snapshot: &Properties, changes: &mut Properties, incoming: &Properties) {
        if self == MergePolicy::StoreTrumpsLocal {
            changes.retain(|property, _| incoming.get(property) == snapshot.get(property));
        }
    }
}
