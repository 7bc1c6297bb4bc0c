//! Configuration files driving the CLI run context end to end.

use crate::integration::test_utils::{write_model, NOTE_MODEL};
use ctxstack::cli::{Commands, RunContext};
use ctxstack::config::ConfigLoader;
use ctxstack::StoreType;
use tempfile::TempDir;

fn write_config(dir: &TempDir, body: &str) -> std::path::PathBuf {
    let path = dir.path().join("ctxstack.toml");
    std::fs::write(&path, body).unwrap();
    path
}

#[test]
fn config_paths_resolve_next_to_the_file() {
    let dir = TempDir::new().unwrap();
    write_model(dir.path(), NOTE_MODEL);
    let path = write_config(&dir, "model_path = \"model.toml\"\nstore_path = \"data\"\n");

    let config = ConfigLoader::load_from_file(&path).unwrap();
    assert_eq!(config.model_path, dir.path().join("model.toml"));
    assert_eq!(config.store_path, Some(dir.path().join("data")));
    assert_eq!(config.store_type, StoreType::Sled);
}

#[test]
fn sled_store_without_path_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "store_type = \"sled\"\n");
    assert!(ConfigLoader::load_from_file(&path).is_err());
}

// Only test in this binary that installs the main stack.
#[test]
fn demo_then_inspect() {
    let dir = TempDir::new().unwrap();
    write_model(dir.path(), NOTE_MODEL);
    let path = write_config(
        &dir,
        "model_path = \"model.toml\"\nstore_path = \"data\"\n",
    );
    let run = RunContext::new(Some(path)).unwrap();

    let report = run
        .execute(&Commands::Demo {
            workers: 3,
            records: 4,
            entity: "Note".to_string(),
            field: "title".to_string(),
        })
        .unwrap();
    assert!(report.contains("Objects in store"));
    assert!(ctxstack::main_stack().is_none());

    let listing = run
        .execute(&Commands::Inspect {
            entity: "Note".to_string(),
            format: "json".to_string(),
        })
        .unwrap();
    let records: Vec<serde_json::Value> = serde_json::from_str(&listing).unwrap();
    assert_eq!(records.len(), 12);
    assert!(records
        .iter()
        .all(|r| r["properties"]["title"].as_str().unwrap().starts_with("worker-")));
}

#[test]
fn inspect_rejects_unknown_entity() {
    let dir = TempDir::new().unwrap();
    write_model(dir.path(), NOTE_MODEL);
    let path = write_config(&dir, "model_path = \"model.toml\"\nstore_type = \"in_memory\"\n");
    let run = RunContext::new(Some(path)).unwrap();

    let result = run.execute(&Commands::Inspect {
        entity: "Ghost".to_string(),
        format: "text".to_string(),
    });
    assert!(matches!(result, Err(ctxstack::StackError::Model(_))));
}
