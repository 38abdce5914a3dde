//! Property-based checks of graph invariants on random DAGs.

use proptest::prelude::*;
use rustc_hash::FxHashSet;

use super::{node, requests};
use crate::{Pid, ResourceGraph};

/// Edges `(from, to)` with `from < to`, so every graph is acyclic.
fn dag_strategy() -> impl Strategy<Value = (usize, Vec<(usize, usize)>)> {
    (2usize..12).prop_flat_map(|n| {
        let edges = prop::collection::vec((0..n, 0..n), 0..n * 2)
            .prop_map(|pairs| {
                pairs
                    .into_iter()
                    .filter(|(a, b)| a < b)
                    .collect::<Vec<_>>()
            });
        (Just(n), edges)
    })
}

fn build(n: usize, edges: &[(usize, usize)]) -> (ResourceGraph, Vec<Pid>) {
    let graph = ResourceGraph::new();
    let pids: Vec<Pid> = (0..n).map(|i| node(&graph, &format!("./m{i}.js"))).collect();
    graph.set_entry(pids[0]);
    for (i, from) in pids.iter().enumerate() {
        let names: Vec<String> = edges
            .iter()
            .filter(|(a, _)| *a == i)
            .map(|(_, b)| format!("./m{b}"))
            .collect();
        let targets: Vec<(&str, Pid, bool)> = edges
            .iter()
            .filter(|(a, _)| *a == i)
            .zip(&names)
            .map(|((_, b), name)| (name.as_str(), pids[*b], false))
            .collect();
        requests(&graph, *from, &targets);
    }
    (graph, pids)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn dependencies_and_dependents_mirror((n, edges) in dag_strategy()) {
        let (graph, pids) = build(n, &edges);
        for pid in &pids {
            let Some(resource) = graph.get(*pid) else { continue };
            for dep in &resource.dependencies {
                prop_assert!(graph.get(*dep).unwrap().dependents.contains(pid));
            }
            for parent in &resource.dependents {
                prop_assert!(graph.get(*parent).unwrap().dependencies.contains(pid));
            }
        }
    }

    #[test]
    fn deep_set_is_unique_and_excludes_root((n, edges) in dag_strategy()) {
        let (graph, pids) = build(n, &edges);
        let deep = graph.deep_dependency_set(pids[0], |_, _| true, true).unwrap();
        let unique: FxHashSet<_> = deep.iter().collect();
        prop_assert_eq!(unique.len(), deep.len());
        prop_assert!(!deep.contains(&pids[0]));
    }

    #[test]
    fn reindex_is_deterministic((n, edges) in dag_strategy()) {
        let (first, pids) = build(n, &edges);
        let (second, _) = build(n, &edges);
        first.reindex(pids[0]);
        second.reindex(pids[0]);
        for pid in &pids {
            prop_assert_eq!(
                first.get(*pid).map(|r| r.index),
                second.get(*pid).map(|r| r.index)
            );
        }
    }
}
