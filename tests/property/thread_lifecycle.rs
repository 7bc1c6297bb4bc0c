//! Random spawn/lookup/commit/exit sequences against a simple model of which
//! threads should hold a context.

use ctxstack::notification::EventChannel;
use ctxstack::store::{open_store, Model, StoreOptions, StoreType};
use ctxstack::{ContextId, SimulatedThreads, Stack, ThreadHandle};
use proptest::prelude::*;
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

#[derive(Debug, Clone)]
enum Op {
    Spawn,
    Lookup(usize),
    Commit(usize),
    Exit(usize),
    Drain,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        1 => Just(Op::Spawn),
        3 => any::<usize>().prop_map(Op::Lookup),
        2 => any::<usize>().prop_map(Op::Commit),
        1 => any::<usize>().prop_map(Op::Exit),
        1 => Just(Op::Drain),
    ]
}

fn stack(threads: &Arc<SimulatedThreads>) -> Stack {
    let model = Model::from_toml_str("[entities.Note]\ntitle = \"string\"\n").unwrap();
    let coordinator = open_store(
        Arc::new(model),
        None,
        StoreType::InMemory,
        StoreOptions {
            flush_on_commit: false,
            notifications: EventChannel::new(),
        },
    )
    .unwrap();
    Stack::new(coordinator, threads.clone()).unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Registered threads are exactly the live threads that asked for a
    /// context; each keeps one context for its lifetime; every background
    /// insert reaches the primary context once merges drain.
    #[test]
    fn registry_tracks_live_threads(ops in proptest::collection::vec(op(), 1..60)) {
        let threads = SimulatedThreads::new();
        let stack = stack(&threads);

        let mut live: Vec<ThreadHandle> = Vec::new();
        let mut holding: BTreeMap<ThreadHandle, ContextId> = BTreeMap::new();
        let mut committed = 0usize;

        for op in ops {
            match op {
                Op::Spawn => live.push(threads.spawn()),
                Op::Lookup(i) if !live.is_empty() => {
                    let thread = live[i % live.len()];
                    let id = threads.enter(thread, || stack.context_for_current_thread().id());
                    let known = *holding.entry(thread).or_insert(id);
                    prop_assert_eq!(known, id);
                }
                Op::Commit(i) if !live.is_empty() => {
                    let thread = live[i % live.len()];
                    let id = threads.enter(thread, || {
                        let context = stack.context_for_current_thread();
                        context
                            .insert("Note", [("title".to_string(), json!("x"))].into_iter().collect())
                            .unwrap();
                        context.commit().unwrap();
                        context.id()
                    });
                    holding.entry(thread).or_insert(id);
                    committed += 1;
                }
                Op::Exit(i) if !live.is_empty() => {
                    let thread = live.remove(i % live.len());
                    threads.terminate(thread);
                    holding.remove(&thread);
                }
                Op::Drain => {
                    threads.drain_primary();
                }
                _ => {}
            }

            let expected: BTreeSet<ThreadHandle> = holding.keys().copied().collect();
            prop_assert_eq!(stack.registered_threads(), expected);
        }

        threads.drain_primary();
        prop_assert_eq!(stack.primary_context().registered_count("Note"), committed);
        prop_assert_eq!(stack.coordinator().count("Note").unwrap(), committed);
    }
}
