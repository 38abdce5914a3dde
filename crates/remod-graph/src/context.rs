//! Resolution contexts and the memoizing context factory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;

use crate::error::{Error, Result};
use crate::ids::{Pid, module_id_of, package_id_of, slug_of};
use crate::middleware::ContextMiddleware;
use crate::request::{Request, RequestAttributes};
use crate::resolver::{Resolver, Target};
use crate::resource::ResourceKind;

/// Upper bound on middleware passes for a single request.
pub const MAX_MIDDLEWARE_ITERATIONS: usize = 1000;

/// Mutable resolution record for one request.
///
/// Middleware edits `request`, `external` and `force`; the factory re-runs
/// resolution whenever `request` changes, then seals the identity fields.
#[derive(Debug, Clone)]
pub struct Context {
    /// Request as written, before any rewrite.
    pub origin: String,
    /// Current request; `None` once a rule has nulled it.
    pub request: Option<String>,
    pub attributes: RequestAttributes,
    pub is_async: bool,
    pub base_dir: PathBuf,
    pub resolved: Option<Target>,
    /// Resolution failure message, kept for Null resources.
    pub error: Option<String>,
    pub external: bool,
    /// Module id override.
    pub force: Option<String>,

    pub module_id: String,
    pub slug: Option<String>,
    pub package_id: Option<String>,
    pub pid: Pid,

    resolved_for: Option<Option<String>>,
}

impl Context {
    pub fn new(request: &Request, base_dir: &Path) -> Self {
        Self {
            origin: request.value.clone(),
            request: Some(request.value.clone()),
            attributes: request.attributes.clone(),
            is_async: request.is_async(),
            base_dir: base_dir.to_path_buf(),
            resolved: None,
            error: None,
            external: false,
            force: None,
            module_id: request.value.clone(),
            slug: None,
            package_id: None,
            pid: Pid::of(&request.value),
            resolved_for: None,
        }
    }

    pub fn kind(&self) -> ResourceKind {
        match &self.resolved {
            _ if self.external => ResourceKind::External,
            Some(Target::Core(_) | Target::Url(_)) => ResourceKind::External,
            Some(Target::File(_)) => ResourceKind::Normal,
            None => ResourceKind::Null,
        }
    }

    /// Absolute source path for Normal contexts.
    pub fn file(&self) -> Option<&Path> {
        match self.kind() {
            ResourceKind::Normal => self.resolved.as_ref().and_then(Target::as_file),
            _ => None,
        }
    }

    fn needs_resolution(&self) -> bool {
        !self.external && self.resolved_for.as_ref() != Some(&self.request)
    }

    /// Derive `module_id`, `slug`, `package_id` and `pid` from the final state.
    fn seal(&mut self, root: &Path, module_dirs: &[String]) {
        self.slug = self.file().map(|path| slug_of(root, path));

        let derived = match (&self.slug, &self.resolved) {
            (Some(slug), _) => module_id_of(slug, module_dirs),
            (None, Some(Target::Core(name) | Target::Url(name))) => name.clone(),
            _ => self.request.clone().unwrap_or_else(|| self.origin.clone()),
        };
        self.module_id = self.force.clone().unwrap_or(derived);

        self.package_id = match (self.kind(), &self.resolved) {
            (ResourceKind::Null, _) => None,
            (_, Some(Target::Core(name))) => Some(name.clone()),
            _ => package_id_of(&self.module_id, module_dirs),
        };
        self.pid = Pid::of(&self.module_id);
    }
}

/// Builds and memoizes [`Context`]s for `(request, base_dir)` pairs.
#[derive(Debug)]
pub struct ContextFactory {
    resolver: Resolver,
    middleware: Vec<ContextMiddleware>,
    strict: bool,
    cache: DashMap<(String, PathBuf), Arc<Context>>,
}

impl ContextFactory {
    pub fn new(resolver: Resolver, middleware: Vec<ContextMiddleware>) -> Self {
        Self {
            resolver,
            middleware,
            strict: false,
            cache: DashMap::new(),
        }
    }

    /// Fail resolution outright instead of degrading to a Null context.
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    pub fn root_dir(&self) -> &Path {
        self.resolver.root_dir()
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// Resolve `request` from `base_dir`, applying middleware to a fixed point.
    pub async fn context(&self, request: &Request, base_dir: &Path) -> Result<Arc<Context>> {
        let key = (request.to_string(), base_dir.to_path_buf());
        if let Some(hit) = self.cache.get(&key) {
            return Ok(Arc::clone(hit.value()));
        }

        let mut ctx = Context::new(request, base_dir);
        let mut iterations = 0;
        loop {
            let mut mutated = false;
            for middleware in &self.middleware {
                mutated |= middleware.apply(&mut ctx);
            }
            if ctx.needs_resolution() {
                self.resolve_into(&mut ctx).await?;
            }
            if !mutated {
                break;
            }
            iterations += 1;
            if iterations >= MAX_MIDDLEWARE_ITERATIONS {
                return Err(Error::CycleLimit {
                    request: request.value.clone(),
                    iterations,
                });
            }
        }

        if ctx.external {
            ctx.error = None;
        }
        ctx.seal(self.root_dir(), &self.resolver.options().module_dirs);

        if ctx.error.is_some() {
            if self.strict {
                return Err(Error::Resolution {
                    request: request.value.clone(),
                    from: base_dir.to_path_buf(),
                });
            }
            tracing::debug!(request = %request, error = ?ctx.error, "unresolved request");
            return Ok(Arc::new(ctx));
        }

        let ctx = Arc::new(ctx);
        self.cache.insert(key, Arc::clone(&ctx));
        Ok(ctx)
    }

    async fn resolve_into(&self, ctx: &mut Context) -> Result<()> {
        ctx.resolved_for = Some(ctx.request.clone());
        ctx.resolved = None;
        ctx.error = None;
        let Some(request) = ctx.request.as_deref() else {
            return Ok(());
        };
        match self.resolver.resolve(request, &ctx.base_dir).await {
            Ok(target) => ctx.resolved = Some(target),
            Err(e @ Error::Resolution { .. }) => ctx.error = Some(e.to_string()),
            Err(e) => return Err(e),
        }
        Ok(())
    }

    /// Drop memoized contexts matching `predicate`. Returns how many were dropped.
    pub fn uncache(&self, predicate: impl Fn(&Context) -> bool) -> usize {
        let before = self.cache.len();
        self.cache.retain(|_, ctx| !predicate(ctx));
        before - self.cache.len()
    }

    pub fn clear(&self) {
        self.cache.clear();
    }

    pub fn cached(&self) -> usize {
        self.cache.len()
    }
}
