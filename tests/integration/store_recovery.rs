//! Opening a stack over a store that cannot be opened as-is.

use crate::integration::test_utils::{isolated_options, note, write_model, NOTE_MODEL, TASK_MODEL};
use ctxstack::{SimulatedThreads, Stack, StackError, StackOptions, StoreError};
use tempfile::TempDir;

#[test]
fn corrupted_store_is_erased_and_recreated() {
    let dir = TempDir::new().unwrap();
    let model_path = write_model(dir.path(), NOTE_MODEL);
    let store_path = dir.path().join("store");
    std::fs::write(&store_path, b"this is not a database").unwrap();

    let options = StackOptions::new(&model_path, &store_path)
        .erase_on_open_failure(true)
        .store_options(isolated_options());
    let stack = Stack::try_open(options, SimulatedThreads::new()).unwrap();

    assert!(store_path.is_dir());
    assert_eq!(stack.coordinator().count("Note").unwrap(), 0);

    let primary = stack.primary_context();
    primary.insert("Note", note("fresh", 1)).unwrap();
    primary.commit().unwrap();
    assert_eq!(stack.coordinator().count("Note").unwrap(), 1);
}

#[test]
fn corrupted_store_without_erase_fails() {
    let dir = TempDir::new().unwrap();
    let model_path = write_model(dir.path(), NOTE_MODEL);
    let store_path = dir.path().join("store");
    std::fs::write(&store_path, b"this is not a database").unwrap();

    let options = StackOptions::new(&model_path, &store_path).store_options(isolated_options());
    let result = Stack::try_open(options, SimulatedThreads::new());

    assert!(matches!(result, Err(StackError::StoreOpen(StoreError::Open { .. }))));
    // Left untouched.
    assert!(store_path.is_file());
}

#[test]
fn store_for_another_model_is_replaced_when_allowed() {
    let dir = TempDir::new().unwrap();
    let store_path = dir.path().join("store");

    let task_dir = dir.path().join("tasks");
    std::fs::create_dir_all(&task_dir).unwrap();
    let task_model = write_model(&task_dir, TASK_MODEL);
    {
        let options = StackOptions::new(&task_model, &store_path).store_options(isolated_options());
        Stack::try_open(options, SimulatedThreads::new()).unwrap();
    }

    let note_model = write_model(dir.path(), NOTE_MODEL);
    let strict = StackOptions::new(&note_model, &store_path).store_options(isolated_options());
    assert!(matches!(
        Stack::try_open(strict, SimulatedThreads::new()),
        Err(StackError::StoreOpen(StoreError::IncompatibleModel { .. }))
    ));

    let lenient = StackOptions::new(&note_model, &store_path)
        .erase_on_open_failure(true)
        .store_options(isolated_options());
    let stack = Stack::try_open(lenient, SimulatedThreads::new()).unwrap();
    assert_eq!(stack.coordinator().count("Note").unwrap(), 0);
}

#[test]
fn missing_model_is_not_recovered() {
    let dir = TempDir::new().unwrap();
    let options = StackOptions::new(dir.path().join("absent.toml"), dir.path().join("store"))
        .erase_on_open_failure(true)
        .store_options(isolated_options());

    assert!(matches!(
        Stack::try_open(options, SimulatedThreads::new()),
        Err(StackError::Model(_))
    ));
    assert!(!dir.path().join("store").exists());
}

#[test]
fn in_memory_stack_needs_no_path() {
    let dir = TempDir::new().unwrap();
    let model_path = write_model(dir.path(), NOTE_MODEL);
    let options = StackOptions::in_memory(&model_path).store_options(isolated_options());
    let stack = Stack::try_open(options, SimulatedThreads::new()).unwrap();
    assert!(stack.coordinator().store_location().is_none());
}
