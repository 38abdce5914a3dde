//! Edge maintenance, traversal and invalidation on hand-built graphs.

use std::path::Path;

use super::{node, requests};
use crate::{
    Context, Error, Request, RequestTarget, Resource, ResourceGraph, ResourceIndex, ResourceKind,
};

#[test]
fn edges_are_symmetric() {
    let graph = ResourceGraph::new();
    let entry = node(&graph, "./index.js");
    let a = node(&graph, "./a.js");
    graph.set_entry(entry);
    requests(&graph, entry, &[("./a", a, false)]);

    let a_node = graph.get(a).unwrap();
    assert!(a_node.dependents.contains(&entry));
    assert!(graph.get(entry).unwrap().dependencies.contains(&a));
}

#[test]
fn vanished_request_evicts_orphans_recursively() {
    let graph = ResourceGraph::new();
    let entry = node(&graph, "./index.js");
    let a = node(&graph, "./a.js");
    let b = node(&graph, "./b.js");
    graph.set_entry(entry);
    requests(&graph, entry, &[("./a", a, false)]);
    requests(&graph, a, &[("./b", b, false)]);

    let removed = requests(&graph, entry, &[]);
    let removed: Vec<_> = removed.iter().map(|r| r.pid).collect();
    assert_eq!(removed, vec![a, b]);
    assert!(graph.contains(entry));
    assert_eq!(graph.len(), 1);
}

#[test]
fn shared_dependency_survives_one_parent() {
    let graph = ResourceGraph::new();
    let entry = node(&graph, "./index.js");
    let a = node(&graph, "./a.js");
    let b = node(&graph, "./b.js");
    let shared = node(&graph, "./shared.js");
    graph.set_entry(entry);
    requests(&graph, entry, &[("./a", a, false), ("./b", b, false)]);
    requests(&graph, a, &[("./shared", shared, false)]);
    requests(&graph, b, &[("./shared", shared, false)]);

    requests(&graph, entry, &[("./b", b, false)]);
    assert!(!graph.contains(a));
    assert!(graph.contains(shared));
    assert_eq!(graph.get(shared).unwrap().dependents.len(), 1);
}

#[test]
fn entry_is_never_an_orphan() {
    let graph = ResourceGraph::new();
    let entry = node(&graph, "./index.js");
    let a = node(&graph, "./a.js");
    graph.set_entry(entry);
    requests(&graph, entry, &[("./a", a, false)]);
    requests(&graph, a, &[("./index", entry, false)]);

    let removed = requests(&graph, a, &[]);
    assert!(removed.is_empty());
    assert!(graph.contains(entry));
}

#[test]
fn cycles_terminate_and_garbage_is_collected() {
    let graph = ResourceGraph::new();
    let entry = node(&graph, "./index.js");
    let a = node(&graph, "./a.js");
    let b = node(&graph, "./b.js");
    graph.set_entry(entry);
    requests(&graph, entry, &[("./a", a, false)]);
    requests(&graph, a, &[("./b", b, false)]);
    requests(&graph, b, &[("./a", a, false)]);

    let deep = graph.deep_dependency_set(entry, |_, _| true, true).unwrap();
    assert_eq!(deep.len(), 2);

    // a is still held by b, so dropping the entry edge leaves a cycle behind.
    requests(&graph, entry, &[]);
    assert!(graph.contains(a));
    let collected = graph.collect_garbage(entry);
    assert_eq!(collected.len(), 2);
    assert_eq!(graph.len(), 1);
}

#[test]
fn mark_dirty_reaches_every_dependent() {
    let graph = ResourceGraph::new();
    let entry = node(&graph, "./index.js");
    let a = node(&graph, "./a.js");
    let b = node(&graph, "./b.js");
    let unrelated = node(&graph, "./c.js");
    graph.set_entry(entry);
    requests(&graph, entry, &[("./a", a, false), ("./c", unrelated, false)]);
    requests(&graph, a, &[("./b", b, false)]);
    graph.update(b, |r| r.source_checksum = Some("abc".into())).unwrap();

    let marked = graph.mark_dirty(b);
    assert_eq!(marked, vec![b, a, entry]);
    let b_node = graph.get(b).unwrap();
    assert!(b_node.dirty && !b_node.loaded);
    assert!(b_node.source_checksum.is_none());
    assert!(!graph.get(unrelated).unwrap().dirty);
}

#[test]
fn deep_set_moves_revisited_nodes_to_the_end() {
    let graph = ResourceGraph::new();
    let entry = node(&graph, "./index.js");
    let a = node(&graph, "./a.js");
    let b = node(&graph, "./b.js");
    requests(&graph, entry, &[("./b", b, false), ("./a", a, false)]);
    requests(&graph, a, &[("./b", b, false)]);

    let deep = graph.deep_dependency_set(entry, |_, _| true, true).unwrap();
    assert_eq!(deep, vec![a, b]);
}

#[test]
fn deep_set_filters_and_checks_loaded() {
    let graph = ResourceGraph::new();
    let entry = node(&graph, "./index.js");
    let sync = node(&graph, "./sync.js");
    let lazy = node(&graph, "./lazy.js");
    requests(&graph, entry, &[("./sync", sync, false), ("./lazy", lazy, true)]);

    let deep = graph
        .deep_dependency_set(entry, |edge, _| !edge.is_async, true)
        .unwrap();
    assert_eq!(deep, vec![sync]);

    graph.update(lazy, |r| r.loaded = false).unwrap();
    let err = graph
        .deep_dependency_set(entry, |_, _| true, true)
        .unwrap_err();
    assert!(matches!(err, Error::NotLoaded(id) if id == "./lazy.js"));
    assert!(graph.deep_dependency_set(entry, |_, _| true, false).is_ok());
}

#[test]
fn reindex_follows_request_order() {
    let graph = ResourceGraph::new();
    let entry = node(&graph, "./index.js");
    let a = node(&graph, "./a.js");
    let b = node(&graph, "./b.js");
    let c = node(&graph, "./c.js");
    requests(&graph, entry, &[("./a", a, false), ("./b", b, false)]);
    requests(&graph, a, &[("./c", c, false), ("./b", b, false)]);
    graph.reindex(entry);

    let index = |pid| graph.get(pid).unwrap().index.unwrap();
    assert_eq!(index(entry), ResourceIndex::from(vec![0]));
    assert_eq!(index(a), ResourceIndex::from(vec![0, 0]));
    assert_eq!(index(c), ResourceIndex::from(vec![0, 0, 0]));
    assert_eq!(index(b), ResourceIndex::from(vec![0, 0, 1]));
}

#[test]
fn request_map_by_kind() {
    let graph = ResourceGraph::new();
    let entry = node(&graph, "./index.js");
    let a = node(&graph, "./a.js");

    let mut external = Resource::from_context(&Context::new(&Request::new("fs"), Path::new("/project")));
    external.kind = ResourceKind::External;
    let external_pid = external.pid;
    graph.insert_resource(external);
    let null = Resource::from_context(&Context::new(&Request::new("./gone"), Path::new("/project")));
    let null_pid = null.pid;
    graph.insert_resource(null);

    requests(
        &graph,
        entry,
        &[("./a", a, false), ("fs", external_pid, false), ("./gone", null_pid, false)],
    );
    let map = graph.request_map(entry).unwrap();
    assert_eq!(map["./a"], RequestTarget::Pid(a));
    assert_eq!(map["fs"], RequestTarget::External("fs".to_string()));
    assert_eq!(map["./gone"], RequestTarget::Null);
}

#[test]
fn export_starts_at_entry_in_index_order() {
    let graph = ResourceGraph::new();
    let entry = node(&graph, "./index.js");
    let a = node(&graph, "./a.js");
    let b = node(&graph, "./b.js");
    requests(&graph, entry, &[("./b", b, false), ("./a", a, false)]);
    graph.reindex(entry);

    let records = graph.export(entry).unwrap();
    let order: Vec<_> = records.iter().map(|r| r.pid).collect();
    assert_eq!(order, vec![entry, b, a]);
    assert_eq!(records[0].requests[0].value, "./b");
}

#[test]
fn origins_cover_reachable_files() {
    let graph = ResourceGraph::new();
    let entry = node(&graph, "./index.js");
    let a = node(&graph, "./a.js");
    node(&graph, "./stray.js");
    requests(&graph, entry, &[("./a", a, false)]);

    let origins = graph.origins(entry);
    assert_eq!(
        origins,
        vec![
            Path::new("/project/a.js").to_path_buf(),
            Path::new("/project/index.js").to_path_buf(),
        ]
    );
    assert_eq!(graph.find_by_origin(Path::new("/project/a.js")), vec![a]);
}

#[test]
fn dependency_of_is_transitive() {
    let graph = ResourceGraph::new();
    let entry = node(&graph, "./index.js");
    let a = node(&graph, "./a.js");
    let b = node(&graph, "./b.js");
    requests(&graph, entry, &[("./a", a, false)]);
    requests(&graph, a, &[("./b", b, false)]);

    assert!(graph.dependency_of(b, entry));
    assert!(!graph.dependency_of(entry, b));
}

#[test]
fn unresolved_skips_middleware_nulls() {
    let graph = ResourceGraph::new();
    let entry = node(&graph, "./index.js");

    let mut missing = Context::new(&Request::new("./missing"), Path::new("/project"));
    missing.error = Some("cannot resolve './missing'".to_string());
    let missing = Resource::from_context(&missing);
    let missing_pid = missing.pid;
    graph.insert_resource(missing);
    let nulled = Resource::from_context(&Context::new(&Request::new("./nulled"), Path::new("/project")));
    let nulled_pid = nulled.pid;
    graph.insert_resource(nulled);

    requests(
        &graph,
        entry,
        &[("./missing", missing_pid, false), ("./nulled", nulled_pid, false)],
    );
    assert_eq!(graph.unresolved(), vec![(missing_pid, vec![entry])]);
}
