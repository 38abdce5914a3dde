//! Resolved settings for one build scope.

use std::path::{Path, PathBuf};
use std::time::Duration;

use remod_config::ScopeConfig;
use remod_graph::{ContextMiddleware, Matcher, ResolveOptions};
use serde_json::Value;

use crate::bundle::{DEFAULT_MAX_SIZE, DEFAULT_MIN_SIZE, UnionRule};
use crate::pipeline::{Hook, HookRegistry, Pipeline, PipelineSet};
use crate::{Error, Result};

/// Everything an [`Installer`](crate::Installer) needs to know about a scope.
#[derive(Debug, Clone)]
pub struct ScopeOptions {
    /// Canonical root; nothing outside it is ever resolved.
    pub root_dir: PathBuf,
    pub entry: String,
    /// Absolute output directory.
    pub output_dir: PathBuf,
    pub strict: bool,
    pub compress: bool,
    /// URL path resources are served under, always ending in `/`.
    pub public_path: String,
    pub resolve: ResolveOptions,
    pub middleware: Vec<ContextMiddleware>,
    pub unions: Vec<UnionRule>,
    pub min_size: u64,
    pub max_size: u64,
    /// Output-shaping settings, hashed into every options checksum.
    pub fingerprint: Value,
    /// Config file the scope came from. A change to it forces a full rebuild.
    pub config_path: Option<PathBuf>,
    pub debounce: Duration,
    pub pipelines: PipelineSet,
    pub hooks: HookRegistry,
}

impl ScopeOptions {
    /// Defaults for `entry` under `root_dir`.
    pub fn new(root_dir: impl Into<PathBuf>, entry: impl Into<String>) -> Self {
        let root_dir = root_dir.into();
        let entry = entry.into();
        let config = ScopeConfig::new(&root_dir, entry.clone());
        let resolve = ResolveOptions::new(&root_dir);
        let pipelines = PipelineSet::builtin(&resolve.extensions);
        Self {
            output_dir: root_dir.join(&config.output),
            root_dir,
            entry,
            strict: config.strict,
            compress: config.compress,
            public_path: public_path(&config.public_path),
            resolve,
            middleware: ContextMiddleware::defaults(),
            unions: Vec::new(),
            min_size: DEFAULT_MIN_SIZE,
            max_size: DEFAULT_MAX_SIZE,
            fingerprint: config.fingerprint(),
            config_path: None,
            debounce: Duration::from_millis(config.watch.debounce_ms),
            pipelines,
            hooks: HookRegistry::new(),
        }
    }

    /// Build from a loaded config. Relative roots are taken from the config
    /// file's directory, or from `base` for programmatic configs.
    pub fn from_config(config: &ScopeConfig, base: &Path) -> Result<Self> {
        config.validate()?;
        let root_dir = config.root_dir(base)?;

        let mut resolve = ResolveOptions::new(&root_dir)
            .with_extensions(config.resolve.extensions.clone())
            .with_main_fields(config.resolve.main_fields.clone())
            .with_module_dirs(config.resolve.module_dirs.clone());
        if let Some(core) = &config.core {
            resolve = resolve.with_core(core.iter().cloned());
        }

        let mut middleware = ContextMiddleware::defaults();
        for (from, to) in &config.alias {
            middleware.push(ContextMiddleware::Alias {
                matcher: matcher("alias", from)?,
                target: to.clone(),
            });
        }
        for pattern in &config.external {
            middleware.push(ContextMiddleware::External(matcher("external", pattern)?));
        }
        for pattern in &config.null {
            middleware.push(ContextMiddleware::Null(matcher("null", pattern)?));
        }

        let mut unions = Vec::new();
        for union in &config.unions {
            for pattern in &union.include {
                unions.push(UnionRule::new(matcher("unions", pattern)?, union.id.clone()));
            }
        }

        let pipelines = PipelineSet::builtin(&resolve.extensions);
        Ok(Self {
            output_dir: root_dir.join(&config.output),
            root_dir,
            entry: config.entry.clone(),
            strict: config.strict,
            compress: config.compress,
            public_path: public_path(&config.public_path),
            resolve,
            middleware,
            unions,
            min_size: config.bundle.min_size,
            max_size: config.bundle.max_size,
            fingerprint: config.fingerprint(),
            config_path: config.source.clone(),
            debounce: Duration::from_millis(config.watch.debounce_ms),
            pipelines,
            hooks: HookRegistry::new(),
        })
    }

    pub fn with_output_dir(mut self, output_dir: impl AsRef<Path>) -> Self {
        self.output_dir = self.root_dir.join(output_dir);
        self
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        set_fingerprint(&mut self.fingerprint, "strict", Value::Bool(strict));
        self
    }

    pub fn with_compress(mut self, compress: bool) -> Self {
        self.compress = compress;
        set_fingerprint(&mut self.fingerprint, "compress", Value::Bool(compress));
        self
    }

    pub fn with_public_path(mut self, path: &str) -> Self {
        self.public_path = public_path(path);
        set_fingerprint(&mut self.fingerprint, "public_path", Value::from(path));
        self
    }

    pub fn with_bundle_sizes(mut self, min_size: u64, max_size: u64) -> Self {
        self.min_size = min_size;
        self.max_size = max_size;
        self
    }

    pub fn with_union(mut self, rule: UnionRule) -> Self {
        self.unions.push(rule);
        self
    }

    pub fn with_middleware(mut self, middleware: ContextMiddleware) -> Self {
        self.middleware.push(middleware);
        self
    }

    /// Register a pipeline ahead of the built-in ones.
    pub fn with_pipeline(mut self, pipeline: impl Pipeline + 'static) -> Self {
        self.pipelines.prepend(pipeline);
        self
    }

    pub fn with_hook(mut self, hook: impl Hook + 'static) -> Self {
        self.hooks.add(hook);
        self
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    /// URL the runtime loader serves a local or package module from.
    ///
    /// Relative module ids are marked with a leading `:` so they cannot be
    /// mistaken for package names (`/_/:./src/logo.png`, `/_/lodash/map.js`).
    pub fn resource_url(&self, module_id: &str) -> String {
        let relative = matches!(module_id, "." | "..")
            || module_id.starts_with("./")
            || module_id.starts_with("../");
        let marker = if relative { ":" } else { "" };
        format!("{}_/{marker}{module_id}", self.public_path)
    }

    /// Whether `path` lies inside the output directory.
    pub fn is_output(&self, path: &Path) -> bool {
        path.starts_with(&self.output_dir)
    }
}

fn matcher(field: &str, pattern: &str) -> Result<Matcher> {
    Matcher::from_pattern(pattern)
        .map_err(|e| Error::InvalidConfig(format!("{field}: invalid pattern '{pattern}': {e}")))
}

fn public_path(path: &str) -> String {
    if path.ends_with('/') {
        path.to_string()
    } else {
        format!("{path}/")
    }
}

fn set_fingerprint(fingerprint: &mut Value, key: &str, value: Value) {
    if let Value::Object(map) = fingerprint {
        map.insert(key.to_string(), value);
    }
}
