//! Concurrent depth-first walk of the graph.
//!
//! Each resource is loaded at most once per pass. Children are visited
//! concurrently and joined before their parent counts as loaded. A failure
//! stops only the failing resource; siblings carry on and the first failure
//! is reported once the walk is done.

use std::path::Path;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, join_all};
use indexmap::{IndexMap, IndexSet};
use parking_lot::Mutex;
use remod_graph::{Pid, Request, RequestEdge, Resource, ResourceGraph, ResourceKind};
use rustc_hash::FxHashSet;

use super::{InstallerInner, Interceptor};
use crate::bundle::bundle_id_of;
use crate::cache::{options_checksum, source_checksum};
use crate::pipeline::{
    Binding, HookContext, ModuleInfo, Phase, Pipeline, PipelineError, Stage, output_slug,
};
use crate::{Error, Result};

pub(super) struct Outcome {
    pub visited: usize,
    pub processed: Vec<Pid>,
}

pub(super) struct Traversal<'a> {
    inner: &'a InstallerInner,
    interceptor: Option<Interceptor>,
    visited: Mutex<FxHashSet<Pid>>,
    processed: Mutex<Vec<Pid>>,
    failure: Mutex<Option<Error>>,
}

impl<'a> Traversal<'a> {
    pub(super) fn new(inner: &'a InstallerInner, interceptor: Option<Interceptor>) -> Self {
        Self {
            inner,
            interceptor,
            visited: Mutex::new(FxHashSet::default()),
            processed: Mutex::new(Vec::new()),
            failure: Mutex::new(None),
        }
    }

    pub(super) fn visit<'s>(&'s self, pid: Pid) -> BoxFuture<'s, ()> {
        async move {
            let first = self.visited.lock().insert(pid);
            if !first {
                return;
            }
            if let Err(err) = self.load(pid).await {
                tracing::error!(%pid, error = %err, "failed to load resource");
                let mut failure = self.failure.lock();
                if failure.is_none() {
                    *failure = Some(err);
                }
            }
        }
        .boxed()
    }

    /// The walk's outcome, or its first failure.
    ///
    /// On failure nothing is flushed, so every resource processed during the
    /// walk goes back to dirty and the next pass writes its output and
    /// manifest.
    pub(super) fn finish(self) -> Result<Outcome> {
        let mut processed = self.processed.into_inner();
        if let Some(err) = self.failure.into_inner() {
            requeue(self.inner.factory.graph(), &processed);
            return Err(err);
        }
        processed.sort();
        Ok(Outcome {
            visited: self.visited.into_inner().len(),
            processed,
        })
    }

    async fn visit_all(&self, children: impl IntoIterator<Item = Pid>) {
        join_all(children.into_iter().map(|child| self.visit(child))).await;
    }

    async fn load(&self, pid: Pid) -> Result<()> {
        let inner = self.inner;
        let graph = inner.factory.graph();
        let Some(resource) = graph.get(pid) else {
            return Ok(());
        };

        match resource.kind {
            ResourceKind::Normal => {}
            ResourceKind::Null => {
                if let Some(error) = &resource.error {
                    tracing::warn!(module_id = %resource.module_id, %error, "unresolved request");
                }
                return Ok(());
            }
            ResourceKind::External => return Ok(()),
        }

        if let Some(interceptor) = &self.interceptor {
            if !interceptor(&resource) {
                tracing::debug!(module_id = %resource.module_id, "skipped by interceptor");
                inner.bundles.remove(pid);
                graph.update(pid, |r| r.loaded = true)?;
                return Ok(());
            }
        }

        let Some(path) = resource.path().map(Path::to_path_buf) else {
            return Ok(());
        };
        let pipeline = inner
            .options
            .pipelines
            .select(&path)
            .cloned()
            .ok_or_else(|| Error::InvalidConfig(format!("no pipeline accepts {}", path.display())))?;

        let meta = inner.runtime.metadata(&path).await?;
        let source = source_checksum(&meta);
        let options = options_checksum(&inner.options.fingerprint, pipeline.name());
        let pristine = !resource.dirty
            && resource.has_output()
            && resource.source_checksum.as_deref() == Some(source.as_str())
            && resource.options_checksum.as_deref() == Some(options.as_str());

        if pristine {
            tracing::trace!(module_id = %resource.module_id, "pristine");
            self.assign(&resource, pipeline.as_ref(), true)?;
            self.visit_all(resource.dependencies.iter().copied()).await;
            graph.update(pid, |r| r.loaded = true)?;
            return Ok(());
        }

        let children = self
            .process(&resource, &path, pipeline.as_ref(), source, options)
            .await?;
        self.processed.lock().push(pid);
        self.visit_all(children).await;
        graph.update(pid, |r| r.loaded = true)?;
        inner.bundles.settle(pid);
        Ok(())
    }

    /// Read, parse, resolve requests and generate. Returns the children to
    /// visit next.
    async fn process(
        &self,
        resource: &Resource,
        path: &Path,
        pipeline: &dyn Pipeline,
        source: String,
        options: String,
    ) -> Result<IndexSet<Pid>> {
        let inner = self.inner;
        let graph = inner.factory.graph();
        let pid = resource.pid;
        let slug = resource
            .slug
            .clone()
            .unwrap_or_else(|| resource.module_id.clone());
        let fail = |phase: Phase| {
            move |source: PipelineError| Error::Pipeline {
                pipeline: pipeline.name().to_string(),
                module_id: resource.module_id.clone(),
                phase,
                source,
            }
        };
        let mut hook = HookContext {
            pid,
            module_id: resource.module_id.clone(),
            slug: resource.slug.clone(),
            path: Some(path.to_path_buf()),
            pipeline: pipeline.name(),
            phase: Phase::Read,
            stage: Stage::Pre,
            size: None,
        };
        tracing::debug!(module_id = %resource.module_id, pipeline = pipeline.name(), "processing");

        self.hook(&mut hook, Phase::Read, Stage::Pre).await?;
        let bytes = inner.runtime.read_file(path).await?;
        self.hook(&mut hook, Phase::Read, Stage::Post).await?;

        self.hook(&mut hook, Phase::Parse, Stage::Pre).await?;
        let mut module = pipeline.parse(&bytes, &slug).map_err(fail(Phase::Parse))?;
        self.hook(&mut hook, Phase::Parse, Stage::Post).await?;

        self.hook(&mut hook, Phase::Requests, Stage::Pre).await?;
        let requests = module.requests();
        let targets = join_all(
            requests
                .iter()
                .map(|request| inner.factory.resource(request, Some(pid))),
        )
        .await;
        let mut edges = IndexMap::new();
        for (request, target) in requests.iter().zip(targets) {
            edges.insert(
                request.to_string(),
                RequestEdge {
                    pid: target?,
                    is_async: request.is_async(),
                },
            );
        }
        let children: IndexSet<Pid> = edges
            .values()
            .map(|edge| edge.pid)
            .filter(|child| *child != pid)
            .collect();
        let bindings: IndexMap<String, Binding> = edges
            .iter()
            .map(|(key, edge)| {
                let binding = graph.with(edge.pid, binding_of).unwrap_or(Binding::NotFound);
                let href = !edge.is_async && Request::parse(key).is_href();
                let binding = match binding {
                    Binding::Module { module_id, .. } if href => {
                        Binding::Url(inner.options.resource_url(&module_id))
                    }
                    Binding::External(id) if href => Binding::Url(id),
                    binding => binding,
                };
                (key.clone(), binding)
            })
            .collect();
        for evicted in graph.update_requests(pid, edges)? {
            tracing::debug!(module_id = %evicted.module_id, "dropped orphan");
            inner.bundles.remove(evicted.pid);
        }
        module.transform(&bindings).map_err(fail(Phase::Requests))?;
        self.hook(&mut hook, Phase::Requests, Stage::Post).await?;

        self.hook(&mut hook, Phase::Generate, Stage::Pre).await?;
        let info = ModuleInfo {
            pid,
            module_id: &resource.module_id,
            slug: &slug,
        };
        let mut output = module.generate(&info).map_err(fail(Phase::Generate))?;
        if inner.options.compress {
            output = module.compress(output);
        }
        hook.size = Some(output.len());
        self.hook(&mut hook, Phase::Generate, Stage::Post).await?;

        let output_slug = output_slug(&slug, pipeline.output_extension());
        let updated = graph.update(pid, |r| {
            r.output_type = Some(pipeline.output_type().to_string());
            r.output_slug = Some(output_slug);
            r.size = output.len();
            r.output = Some(Arc::from(output));
            r.source_checksum = Some(source);
            r.options_checksum = Some(options);
            r.dirty = false;
            r.clone()
        })?;
        self.assign(&updated, pipeline, false)?;
        Ok(children)
    }

    fn assign(&self, resource: &Resource, pipeline: &dyn Pipeline, loaded: bool) -> Result<()> {
        let inner = self.inner;
        let extension = pipeline.output_extension();
        let Some(bundle) = bundle_id_of(resource, &inner.options.unions, extension) else {
            return Ok(());
        };
        inner
            .bundles
            .assign(resource.pid, &bundle, extension.unwrap_or_default(), loaded);
        if resource.bundle.as_deref() != Some(bundle.as_str()) {
            inner
                .factory
                .graph()
                .update(resource.pid, |r| r.bundle = Some(bundle))?;
        }
        Ok(())
    }

    async fn hook(&self, ctx: &mut HookContext, phase: Phase, stage: Stage) -> Result<()> {
        let hooks = &self.inner.options.hooks;
        if !hooks.has(phase, stage) {
            return Ok(());
        }
        ctx.phase = phase;
        ctx.stage = stage;
        hooks.run(ctx).await.map_err(|source| Error::Pipeline {
            pipeline: ctx.pipeline.to_string(),
            module_id: ctx.module_id.clone(),
            phase,
            source,
        })
    }
}

/// Mark resources processed by a pass that did not finish as dirty again,
/// so the next pass writes their outputs and manifests.
pub(super) fn requeue(graph: &ResourceGraph, processed: &[Pid]) {
    for pid in processed {
        // A resource evicted mid-walk has nothing left to flush.
        let _ = graph.update(*pid, |r| r.dirty = true);
    }
    if !processed.is_empty() {
        tracing::debug!(unflushed = processed.len(), "pass failed, outputs kept dirty");
    }
}

fn binding_of(resource: &Resource) -> Binding {
    match resource.kind {
        ResourceKind::Normal => Binding::Module {
            pid: resource.pid,
            module_id: resource.module_id.clone(),
        },
        ResourceKind::External => Binding::External(resource.module_id.clone()),
        ResourceKind::Null if resource.error.is_some() => Binding::NotFound,
        ResourceKind::Null => Binding::Null,
    }
}
