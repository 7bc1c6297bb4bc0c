//! Shared test utilities for integration tests
//!
//! Model files, isolated store options, and property builders so each test
//! gets its own temp directory and save channel.

use ctxstack::notification::EventChannel;
use ctxstack::store::{open_store, Coordinator, Model, Properties, StoreOptions, StoreType};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const NOTE_MODEL: &str = r#"
[entities.Note]
title = "string"
body = "string"
rank = "integer"
"#;

pub const TASK_MODEL: &str = r#"
[entities.Task]
summary = "string"
done = "boolean"
"#;

/// Write `source` as `model.toml` under `dir`.
pub fn write_model(dir: &Path, source: &str) -> PathBuf {
    let path = dir.join("model.toml");
    std::fs::write(&path, source).unwrap();
    path
}

pub fn note_model() -> Arc<Model> {
    Arc::new(Model::from_toml_str(NOTE_MODEL).unwrap())
}

/// Store options with a private save channel and no per-commit flush.
pub fn isolated_options() -> StoreOptions {
    StoreOptions {
        flush_on_commit: false,
        notifications: EventChannel::new(),
    }
}

pub fn in_memory_coordinator() -> Coordinator {
    open_store(note_model(), None, StoreType::InMemory, isolated_options()).unwrap()
}

pub fn props(pairs: &[(&str, Value)]) -> Properties {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

pub fn note(title: &str, rank: i64) -> Properties {
    props(&[("title", json!(title)), ("rank", json!(rank))])
}
