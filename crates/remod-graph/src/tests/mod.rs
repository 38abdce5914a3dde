mod graph_tests;
mod property_tests;

use std::path::Path;

use indexmap::IndexMap;

use crate::{Context, Pid, Request, RequestEdge, Resource, ResourceGraph, ResourceKind};

/// Insert a loaded Normal resource named `module_id`.
pub(crate) fn node(graph: &ResourceGraph, module_id: &str) -> Pid {
    let ctx = Context::new(&Request::new(module_id), Path::new("/project"));
    let mut resource = Resource::from_context(&ctx);
    resource.kind = ResourceKind::Normal;
    resource.origin = format!("/project/{}", module_id.trim_start_matches("./"));
    resource.dirty = false;
    resource.loaded = true;
    let pid = resource.pid;
    graph.insert_resource(resource);
    pid
}

/// Replace the requests of `from` with `(value, pid, async)` triples.
pub(crate) fn requests(graph: &ResourceGraph, from: Pid, edges: &[(&str, Pid, bool)]) -> Vec<Resource> {
    let map: IndexMap<String, RequestEdge> = edges
        .iter()
        .map(|(value, pid, is_async)| {
            (
                value.to_string(),
                RequestEdge {
                    pid: *pid,
                    is_async: *is_async,
                },
            )
        })
        .collect();
    graph.update_requests(from, map).expect("targets exist")
}
