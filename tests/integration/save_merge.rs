//! Save-merge pipeline scenarios on simulated threads.

use crate::integration::test_utils::{
    in_memory_coordinator, isolated_options, note, note_model, write_model, NOTE_MODEL,
};
use ctxstack::store::{open_store, StoreOptions};
use ctxstack::{
    ContextKind, MergePolicy, SimulatedThreads, Stack, StackOptions, StoreType, ThreadHandle,
    ThreadHost,
};
use serde_json::json;
use tempfile::TempDir;

#[test]
fn preseeded_store_gains_one_merged_object() {
    let dir = TempDir::new().unwrap();
    let model_path = write_model(dir.path(), NOTE_MODEL);
    let store_path = dir.path().join("store");

    {
        let durable = StoreOptions {
            flush_on_commit: true,
            ..isolated_options()
        };
        let seed = open_store(note_model(), Some(&store_path), StoreType::Sled, durable).unwrap();
        let context = seed.new_context(
            ContextKind::Background,
            ThreadHandle::from_raw(1000),
            MergePolicy::default(),
        );
        for rank in 0..3 {
            context.insert("Note", note(&format!("seed-{}", rank), rank)).unwrap();
        }
        context.commit().unwrap();
    }

    let threads = SimulatedThreads::new();
    let options = StackOptions::new(&model_path, &store_path).store_options(isolated_options());
    let stack = Stack::try_open(options, threads.clone()).unwrap();
    assert_eq!(stack.primary_context().fetch("Note").unwrap().len(), 3);

    let worker = threads.spawn();
    let id = threads.enter(worker, || {
        let context = stack.context_for_current_thread();
        let id = context.insert("Note", note("from-worker", 7)).unwrap();
        context.commit().unwrap();
        id
    });

    assert_eq!(threads.drain_primary(), 1);
    let primary = stack.primary_context();
    assert_eq!(primary.registered_count("Note"), 4);
    let merged = primary.object(id).unwrap().unwrap();
    assert_eq!(merged.get("title"), Some(&json!("from-worker")));
    assert_eq!(merged.get("rank"), Some(&json!(7)));
    assert_eq!(stack.coordinator().count("Note").unwrap(), 4);
}

#[test]
fn primary_commits_are_not_merged_back() {
    let threads = SimulatedThreads::new();
    let stack = Stack::new(in_memory_coordinator(), threads.clone()).unwrap();

    let primary = stack.context_for_current_thread();
    primary.insert("Note", note("local", 1)).unwrap();
    primary.commit().unwrap();

    assert_eq!(threads.pending_primary_jobs(), 0);
    assert_eq!(primary.registered_count("Note"), 1);
}

#[test]
fn background_commits_merge_in_arrival_order() {
    let threads = SimulatedThreads::new();
    let stack = Stack::new(in_memory_coordinator(), threads.clone()).unwrap();
    let primary = stack.primary_context();

    let id = primary.insert("Note", note("original", 0)).unwrap();
    primary.commit().unwrap();

    let first = threads.spawn();
    let second = threads.spawn();
    // Both workers load the object before either commits.
    let a = threads.enter(first, || stack.context_for_current_thread());
    let b = threads.enter(second, || stack.context_for_current_thread());
    threads.enter(first, || a.object(id).unwrap());
    threads.enter(second, || b.object(id).unwrap());

    threads.enter(first, || {
        a.set(id, "title", json!("one")).unwrap();
        a.commit().unwrap();
    });
    threads.enter(second, || {
        b.set(id, "title", json!("two")).unwrap();
        b.commit().unwrap();
    });

    assert_eq!(threads.pending_primary_jobs(), 2);
    assert_eq!(threads.drain_primary(), 2);

    let merged = primary.object(id).unwrap().unwrap();
    assert_eq!(merged.get("title"), Some(&json!("two")));
    let stored = stack.coordinator().load(id).unwrap().unwrap();
    assert_eq!(stored.get("title"), Some(&json!("two")));
}

#[test]
fn unsaved_primary_edits_survive_a_merge() {
    let threads = SimulatedThreads::new();
    let stack = Stack::new(in_memory_coordinator(), threads.clone()).unwrap();
    let primary = stack.primary_context();

    let id = primary.insert("Note", note("original", 0)).unwrap();
    primary.commit().unwrap();
    primary.set(id, "title", json!("typing")).unwrap();

    let worker = threads.spawn();
    threads.enter(worker, || {
        let context = stack.context_for_current_thread();
        context.set(id, "rank", json!(5)).unwrap();
        context.commit().unwrap();
    });
    threads.drain_primary();

    let seen = primary.object(id).unwrap().unwrap();
    assert_eq!(seen.get("title"), Some(&json!("typing")));
    assert_eq!(seen.get("rank"), Some(&json!(5)));
    assert!(primary.has_changes());
}

#[test]
fn saves_from_another_coordinator_are_ignored() {
    let threads = SimulatedThreads::new();
    let shared = isolated_options();
    let ours = open_store(note_model(), None, StoreType::InMemory, shared.clone()).unwrap();
    let theirs = open_store(note_model(), None, StoreType::InMemory, shared).unwrap();
    let stack = Stack::new(ours, threads.clone()).unwrap();

    let foreign = theirs.new_context(
        ContextKind::Background,
        ThreadHandle::from_raw(500),
        MergePolicy::default(),
    );
    foreign.insert("Note", note("elsewhere", 1)).unwrap();
    foreign.commit().unwrap();

    assert_eq!(threads.pending_primary_jobs(), 0);
    assert_eq!(stack.primary_context().registered_count("Note"), 0);
}

#[test]
fn thread_exit_evicts_its_context() {
    let threads = SimulatedThreads::new();
    let stack = Stack::new(in_memory_coordinator(), threads.clone()).unwrap();

    let worker = threads.spawn();
    let before = threads.enter(worker, || stack.context_for_current_thread());
    assert!(stack.registered_threads().contains(&worker));

    threads.terminate(worker);
    assert!(stack.registered_threads().is_empty());

    let replacement = threads.spawn();
    let after = threads.enter(replacement, || stack.context_for_current_thread());
    assert_ne!(before, after);
    assert_eq!(threads.current(), threads.primary());
}
