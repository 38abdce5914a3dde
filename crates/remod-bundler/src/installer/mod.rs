//! One build pass over a scope.
//!
//! ```text
//! install(force)
//!   ├─ force: forget everything, remove the output directory
//!   ├─ first pass: hydrate from the snapshot
//!   ├─ traverse from the entry (pristine resources only recurse)
//!   ├─ collect garbage, reindex, pack and write assets
//!   ├─ Write and Complete hooks for processed resources
//!   ├─ manifests for processed resources and their dependents
//!   └─ save the snapshot
//! ```
//!
//! Passes on one installer are serialized; a second `install` waits for the
//! first to finish.

mod emit;
mod traverse;

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use remod_config::ScopeConfig;
use remod_graph::{
    ContextFactory, Pid, Request, Resolver, Resource, ResourceFactory, ResourceGraph, ResourceKind,
    Runtime,
};
use rustc_hash::FxHashSet;
use tokio::sync::Mutex;

use crate::bundle::{self, Asset, Bundles};
use crate::cache::Snapshot;
use crate::options::ScopeOptions;
use crate::pipeline::{Phase, Stage};
use crate::watcher::{ChangeKind, FileEvent};
use crate::{Error, Result};

use traverse::Traversal;

/// Decides whether a resource is processed. Returning `false` marks it
/// loaded as-is.
pub type Interceptor = Arc<dyn Fn(&Resource) -> bool + Send + Sync>;

#[derive(Clone, Default)]
pub struct InstallOptions {
    /// Discard every cache and the output directory first.
    pub force: bool,
    pub interceptor: Option<Interceptor>,
}

impl InstallOptions {
    pub fn force() -> Self {
        Self {
            force: true,
            interceptor: None,
        }
    }

    pub fn with_interceptor(mut self, f: impl Fn(&Resource) -> bool + Send + Sync + 'static) -> Self {
        self.interceptor = Some(Arc::new(f));
        self
    }
}

impl fmt::Debug for InstallOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstallOptions")
            .field("force", &self.force)
            .field("interceptor", &self.interceptor.is_some())
            .finish()
    }
}

/// What a pass did.
#[derive(Debug, Clone)]
pub struct InstallReport {
    pub entry: Pid,
    /// Resources reached from the entry.
    pub visited: usize,
    /// Resources run through a pipeline, sorted.
    pub processed: Vec<Pid>,
    /// Every asset of the scope.
    pub assets: Vec<Asset>,
    /// Ids of the assets written by this pass.
    pub written: Vec<String>,
    /// Ids of superseded assets whose files were removed.
    pub removed: Vec<String>,
    pub manifests: Vec<PathBuf>,
    /// Whether the pass started from cached state.
    pub warm: bool,
    pub duration: Duration,
}

#[derive(Debug, Default)]
struct InstallState {
    hydrated: bool,
    /// Asset id to members, as of the last pass.
    assets: BTreeMap<String, Vec<Pid>>,
}

struct InstallerInner {
    options: ScopeOptions,
    runtime: Arc<dyn Runtime>,
    factory: ResourceFactory,
    bundles: Bundles,
    state: Mutex<InstallState>,
}

/// Builds one scope. Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct Installer {
    inner: Arc<InstallerInner>,
}

impl Installer {
    pub fn new(options: ScopeOptions, runtime: Arc<dyn Runtime>) -> Self {
        let resolver = Resolver::new(options.resolve.clone(), Arc::clone(&runtime));
        let contexts =
            ContextFactory::new(resolver, options.middleware.clone()).with_strict(options.strict);
        let bundles = Bundles::new(options.min_size, options.max_size);
        Self {
            inner: Arc::new(InstallerInner {
                factory: ResourceFactory::new(contexts),
                options,
                runtime,
                bundles,
                state: Mutex::new(InstallState::default()),
            }),
        }
    }

    pub fn from_config(config: &ScopeConfig, base: &Path, runtime: Arc<dyn Runtime>) -> Result<Self> {
        Ok(Self::new(ScopeOptions::from_config(config, base)?, runtime))
    }

    pub fn options(&self) -> &ScopeOptions {
        &self.inner.options
    }

    pub fn graph(&self) -> &ResourceGraph {
        self.inner.factory.graph()
    }

    pub fn factory(&self) -> &ResourceFactory {
        &self.inner.factory
    }

    pub fn runtime(&self) -> &Arc<dyn Runtime> {
        &self.inner.runtime
    }

    /// Files the last pass depended on.
    pub fn origins(&self) -> Vec<PathBuf> {
        match self.graph().entry() {
            Some(entry) => self.graph().origins(entry),
            None => Vec::new(),
        }
    }

    /// Run a build pass.
    pub async fn install(&self, options: InstallOptions) -> Result<InstallReport> {
        let mut state = self.inner.state.lock().await;
        self.install_locked(&mut state, options).await
    }

    /// Apply file events to the graph, then run a pass.
    pub async fn rebuild(&self, events: &[FileEvent]) -> Result<InstallReport> {
        let mut state = self.inner.state.lock().await;
        self.invalidate(events);
        self.install_locked(&mut state, InstallOptions::default()).await
    }

    fn invalidate(&self, events: &[FileEvent]) {
        let graph = self.graph();
        let contexts = self.inner.factory.contexts();
        let mut marked = Vec::new();

        for event in events {
            let path = event.path.as_path();
            let gone = event.kind == ChangeKind::Removed
                || (event.kind == ChangeKind::Modified && !self.inner.runtime.exists(path));
            match event.kind {
                ChangeKind::Created => {
                    let dropped = contexts
                        .uncache(|ctx| ctx.kind() == ResourceKind::Null && ctx.error.is_some());
                    tracing::debug!(path = %path.display(), contexts = dropped, "file created");
                    for (_, dependents) in graph.unresolved() {
                        for dependent in dependents {
                            marked.extend(graph.mark_dirty(dependent));
                        }
                    }
                    // Editors that save by replacing the file report a creation.
                    for pid in graph.find_by_origin(path) {
                        marked.extend(graph.mark_dirty(pid));
                    }
                }
                _ if gone => {
                    contexts.uncache(|ctx| ctx.file() == Some(path));
                    for pid in graph.find_by_origin(path) {
                        marked.extend(graph.mark_dirty(pid));
                    }
                }
                _ => {
                    for pid in graph.find_by_origin(path) {
                        marked.extend(graph.mark_dirty(pid));
                    }
                }
            }
        }

        let dirs: FxHashSet<PathBuf> = marked
            .iter()
            .filter_map(|pid| graph.with(*pid, |r| r.base_dir().map(Path::to_path_buf)).flatten())
            .collect();
        if !dirs.is_empty() {
            contexts.uncache(|ctx| dirs.contains(&ctx.base_dir));
        }
        tracing::debug!(marked = marked.len(), "invalidated resources");
    }

    async fn install_locked(
        &self,
        state: &mut InstallState,
        options: InstallOptions,
    ) -> Result<InstallReport> {
        let started = Instant::now();
        let inner = &self.inner;
        let entry_request = Request::parse(&inner.options.entry);

        if options.force {
            inner.factory.reset();
            inner.bundles.clear();
            state.assets.clear();
            state.hydrated = true;
            let output_dir = &inner.options.output_dir;
            if inner.runtime.exists(output_dir) {
                inner.runtime.remove_dir_all(output_dir).await?;
            }
        } else if !state.hydrated {
            state.hydrated = true;
            self.hydrate(state, &entry_request).await?;
        }

        let warm = !self.graph().is_empty();
        self.run(state, &entry_request, options, started, warm)
            .await
            .map_err(|err| match err {
                Error::Pipeline { .. } | Error::Warm(_) => err,
                err if warm => Error::Warm(Box::new(err)),
                err => err,
            })
    }

    async fn hydrate(&self, state: &mut InstallState, entry: &Request) -> Result<()> {
        let inner = &self.inner;
        let Some(snapshot) = Snapshot::load(inner.runtime.as_ref(), &inner.options.output_dir).await?
        else {
            return Ok(());
        };
        if !snapshot.matches(&inner.options.fingerprint) {
            tracing::debug!("settings changed since the snapshot, starting cold");
            return Ok(());
        }

        let hydration = inner.factory.hydrate(entry, snapshot.cache).await?;
        state.assets = snapshot.members;
        tracing::debug!(
            restored = hydration.restored,
            stale = hydration.stale.len(),
            "hydrated graph from snapshot"
        );
        Ok(())
    }

    async fn run(
        &self,
        state: &mut InstallState,
        entry_request: &Request,
        options: InstallOptions,
        started: Instant,
        warm: bool,
    ) -> Result<InstallReport> {
        let inner = &self.inner;
        let graph = self.graph();
        let entry = inner.factory.entry(entry_request).await?;

        let traversal = Traversal::new(inner, options.interceptor.clone());
        traversal.visit(entry).await;
        let outcome = traversal.finish()?;

        let flushed = match self.flush(state, entry, &outcome.processed).await {
            Ok(flushed) => flushed,
            Err(err) => {
                traverse::requeue(graph, &outcome.processed);
                return Err(err);
            }
        };

        let report = InstallReport {
            entry,
            visited: outcome.visited,
            processed: outcome.processed,
            assets: flushed.assets,
            written: flushed.written,
            removed: flushed.removed,
            manifests: flushed.manifests,
            warm,
            duration: started.elapsed(),
        };
        tracing::info!(
            visited = report.visited,
            processed = report.processed.len(),
            written = report.written.len(),
            elapsed_ms = report.duration.as_millis() as u64,
            "install complete"
        );
        Ok(report)
    }

    /// Everything after the walk: garbage collection, assets, hooks,
    /// manifests and the snapshot.
    async fn flush(
        &self,
        state: &mut InstallState,
        entry: Pid,
        processed: &[Pid],
    ) -> Result<Flushed> {
        let inner = &self.inner;
        let graph = self.graph();
        let runtime = inner.runtime.as_ref();
        let output_dir = &inner.options.output_dir;

        for evicted in graph.collect_garbage(entry) {
            inner.bundles.remove(evicted.pid);
        }
        graph.reindex(entry);

        let changed: FxHashSet<Pid> = processed.iter().copied().collect();
        emit::hooks(inner, processed, Phase::Write, Stage::Pre).await?;
        let (assets, written) = inner
            .bundles
            .write(graph, runtime, output_dir, &state.assets, &changed)
            .await?;
        let removed = bundle::prune(runtime, output_dir, &state.assets, &assets).await?;
        emit::hooks(inner, processed, Phase::Write, Stage::Post).await?;
        emit::hooks(inner, processed, Phase::Complete, Stage::Pre).await?;
        emit::hooks(inner, processed, Phase::Complete, Stage::Post).await?;

        // Manifests name asset ids, so members that moved need new ones too.
        let mut seeds = processed.to_vec();
        seeds.extend(bundle::relocated(&state.assets, &assets));
        state.assets = assets
            .iter()
            .map(|asset| (asset.id.clone(), asset.members.clone()))
            .collect();
        let manifests = emit::manifests(inner, &seeds, &assets).await?;
        emit::snapshot(inner, entry, &state.assets).await?;

        Ok(Flushed {
            assets,
            written,
            removed,
            manifests,
        })
    }
}

struct Flushed {
    assets: Vec<Asset>,
    written: Vec<String>,
    removed: Vec<String>,
    manifests: Vec<PathBuf>,
}

impl fmt::Debug for Installer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Installer")
            .field("root_dir", &self.inner.options.root_dir)
            .field("entry", &self.inner.options.entry)
            .field("resources", &self.graph().len())
            .finish_non_exhaustive()
    }
}
