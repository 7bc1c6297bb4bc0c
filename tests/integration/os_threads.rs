//! Stack behavior on real OS threads driven through a MainQueue.

use crate::integration::test_utils::{in_memory_coordinator, note};
use ctxstack::{ContextKind, OsThreadHost, Stack};
use serde_json::json;
use std::collections::HashSet;
use std::sync::{Arc, Barrier};
use std::time::Duration;

#[test]
fn each_thread_gets_its_own_stable_context() {
    let (host, queue) = OsThreadHost::on_current_thread();
    let stack = Arc::new(Stack::new(in_memory_coordinator(), host).unwrap());
    let primary = stack.primary_context().id();

    let workers: Vec<_> = (0..4)
        .map(|_| {
            let stack = stack.clone();
            std::thread::spawn(move || {
                let first = stack.context_for_current_thread();
                let second = stack.context_for_current_thread();
                assert_eq!(first, second);
                assert_eq!(first.kind(), ContextKind::Background);
                first.id()
            })
        })
        .collect();

    let ids: Vec<_> = workers.into_iter().map(|w| w.join().unwrap()).collect();
    let distinct: HashSet<_> = ids.iter().copied().collect();
    assert_eq!(distinct.len(), 4);
    assert!(!distinct.contains(&primary));

    // Exited threads are evicted.
    stack.settle_thread_exits();
    assert!(stack.registered_threads().is_empty());
    assert_eq!(queue.run_pending(), 0);
}

#[test]
fn primary_thread_sees_primary_context() {
    let (host, _queue) = OsThreadHost::on_current_thread();
    let stack = Stack::new(in_memory_coordinator(), host).unwrap();
    let context = stack.context_for_current_thread();
    assert_eq!(&context, stack.primary_context());
    assert!(context.is_primary());
}

#[test]
fn worker_commits_merge_in_order_on_primary() {
    let (host, queue) = OsThreadHost::on_current_thread();
    let stack = Arc::new(Stack::new(in_memory_coordinator(), host).unwrap());

    let worker = {
        let stack = stack.clone();
        std::thread::spawn(move || {
            let context = stack.context_for_current_thread();
            let id = context.insert("Note", note("draft", 1)).unwrap();
            context.commit().unwrap();
            context.set(id, "title", json!("final")).unwrap();
            context.commit().unwrap();
            id
        })
    };
    let id = worker.join().unwrap();

    // Nothing merges until the primary thread pumps its queue.
    assert!(stack.primary_context().registered_objects("Note").is_empty());
    assert_eq!(queue.run_pending(), 2);

    let merged = stack.primary_context().registered_objects("Note");
    assert_eq!(merged.len(), 1);
    assert_eq!(merged[0].id, id);
    assert_eq!(merged[0].get("title"), Some(&json!("final")));
}

#[test]
fn construction_off_primary_waits_for_the_pump() {
    let (host, queue) = OsThreadHost::on_current_thread();
    let coordinator = in_memory_coordinator();

    let builder = {
        let host = host.clone();
        std::thread::spawn(move || Stack::new(coordinator, host))
    };

    assert!(queue.run_until(Duration::from_secs(5), || builder.is_finished()));
    let stack = builder.join().unwrap().unwrap();
    assert_eq!(stack.primary_context().owner(), queue.thread());
}

#[test]
fn concurrent_worker_commits_all_reach_primary() {
    const WORKERS: usize = 4;
    const RECORDS: usize = 5;

    let (host, queue) = OsThreadHost::on_current_thread();
    let stack = Arc::new(Stack::new(in_memory_coordinator(), host).unwrap());
    let primary = stack.primary_context();
    primary.insert("Note", note("already-here", 0)).unwrap();
    primary.commit().unwrap();
    let before = primary.registered_count("Note");

    let start = Arc::new(Barrier::new(WORKERS));
    let workers: Vec<_> = (0..WORKERS)
        .map(|worker| {
            let stack = stack.clone();
            let start = start.clone();
            std::thread::spawn(move || {
                let context = stack.context_for_current_thread();
                start.wait();
                for n in 0..RECORDS {
                    context
                        .insert("Note", note(&format!("w{}-{}", worker, n), n as i64))
                        .unwrap();
                    context.commit().unwrap();
                }
            })
        })
        .collect();

    assert!(queue.run_until(Duration::from_secs(10), || workers
        .iter()
        .all(|w| w.is_finished())));
    for worker in workers {
        worker.join().unwrap();
    }
    queue.run_pending();

    assert_eq!(primary.registered_count("Note"), before + WORKERS * RECORDS);
    let titles: HashSet<String> = primary
        .registered_objects("Note")
        .iter()
        .filter_map(|record| record.get("title").and_then(|v| v.as_str()).map(String::from))
        .collect();
    for worker in 0..WORKERS {
        for n in 0..RECORDS {
            assert!(titles.contains(&format!("w{}-{}", worker, n)));
        }
    }
    assert_eq!(
        stack.coordinator().count("Note").unwrap(),
        before + WORKERS * RECORDS
    );
}
