//! Turns requests into graph resources and restores graphs from snapshots.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexMap;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::context::ContextFactory;
use crate::error::Result;
use crate::graph::{ResourceGraph, ResourceRecord};
use crate::ids::Pid;
use crate::request::Request;
use crate::resource::{RequestEdge, ResourceKind};

/// Outcome of [`ResourceFactory::hydrate`].
#[derive(Debug, Clone, Default)]
pub struct Hydration {
    pub restored: usize,
    /// Resources whose recorded requests no longer resolve the same way.
    pub stale: Vec<Pid>,
}

#[derive(Debug, Clone)]
pub struct ResourceFactory {
    contexts: Arc<ContextFactory>,
    graph: ResourceGraph,
}

impl ResourceFactory {
    pub fn new(contexts: ContextFactory) -> Self {
        Self {
            contexts: Arc::new(contexts),
            graph: ResourceGraph::new(),
        }
    }

    pub fn contexts(&self) -> &ContextFactory {
        &self.contexts
    }

    pub fn graph(&self) -> &ResourceGraph {
        &self.graph
    }

    pub fn root_dir(&self) -> &Path {
        self.contexts.root_dir()
    }

    /// Fetch-or-create the resource `request` names, as seen from `parent`
    /// (or from the root when there is none).
    pub async fn resource(&self, request: &Request, parent: Option<Pid>) -> Result<Pid> {
        let base_dir = self.base_dir_of(parent);
        let ctx = self.contexts.context(request, &base_dir).await?;
        self.graph.insert(&ctx)
    }

    pub async fn entry(&self, request: &Request) -> Result<Pid> {
        let pid = self.resource(request, None).await?;
        self.graph.set_entry(pid);
        Ok(pid)
    }

    fn base_dir_of(&self, parent: Option<Pid>) -> PathBuf {
        parent
            .and_then(|pid| {
                self.graph
                    .with(pid, |r| r.base_dir().map(Path::to_path_buf))
                    .flatten()
            })
            .unwrap_or_else(|| self.root_dir().to_path_buf())
    }

    /// Restore a graph from snapshot records.
    ///
    /// Every recorded request is resolved again. A resource whose request
    /// now lands elsewhere, or on a Null where it used to find something, is
    /// marked dirty (with its dependents) rather than dropped. Indices are
    /// discarded when the snapshot was taken for a different entry.
    pub async fn hydrate(&self, entry: &Request, records: Vec<ResourceRecord>) -> Result<Hydration> {
        let entry_pid = self.entry(entry).await?;
        let keep_index = records.first().is_some_and(|r| r.pid == entry_pid);
        if !records.is_empty() && !keep_index {
            tracing::debug!("snapshot entry differs, discarding indices");
        }

        let recorded_kinds: FxHashMap<Pid, ResourceKind> =
            records.iter().map(|r| (r.pid, r.kind)).collect();
        let mut hydration = Hydration::default();
        let mut restored = FxHashSet::default();

        for record in &records {
            let fresh_kind = self.graph.with(record.pid, |r| r.kind);
            if fresh_kind.is_some_and(|kind| kind != record.kind) {
                continue;
            }
            self.graph
                .insert_resource(record.clone().into_resource(keep_index));
            restored.insert(record.pid);
        }
        hydration.restored = restored.len();

        for record in records
            .iter()
            .filter(|r| r.kind == ResourceKind::Normal && restored.contains(&r.pid))
        {
            let base_dir = Path::new(&record.origin)
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| self.root_dir().to_path_buf());
            let mut requests = IndexMap::new();
            let mut stale = false;

            for recorded in &record.requests {
                let request = Request::parse(&recorded.value).with_async(recorded.is_async);
                let ctx = match self.contexts.context(&request, &base_dir).await {
                    Ok(ctx) => ctx,
                    Err(e) => {
                        tracing::debug!(request = %recorded.value, error = %e, "recorded request no longer resolves");
                        stale = true;
                        continue;
                    }
                };
                let pid = self.graph.insert(&ctx)?;
                let was_null = recorded_kinds.get(&recorded.pid) == Some(&ResourceKind::Null);
                if pid != recorded.pid || (ctx.kind() == ResourceKind::Null && !was_null) {
                    stale = true;
                }
                requests.insert(
                    recorded.value.clone(),
                    RequestEdge {
                        pid,
                        is_async: recorded.is_async,
                    },
                );
            }

            self.graph.update_requests(record.pid, requests)?;
            if stale {
                hydration.stale.push(record.pid);
            }
        }

        for pid in &hydration.stale {
            self.graph.mark_dirty(*pid);
        }
        Ok(hydration)
    }

    /// Forget every context and resource.
    pub fn reset(&self) {
        self.contexts.clear();
        self.graph.clear();
    }
}
