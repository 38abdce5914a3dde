#![cfg_attr(docsrs, feature(doc_cfg))]

//! # remod-bundler
//!
//! Incremental build core on top of the `remod-graph` resource graph.
//!
//! An [`Installer`] walks the graph from a scope's entry, runs each changed
//! resource through its [`Pipeline`], packs the results into content-addressed
//! assets and writes a manifest per changed module. The graph is saved as a
//! snapshot so the next process only redoes what changed on disk; a
//! [`watcher`] subscription does the same within one process.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use remod_bundler::{InstallOptions, Installer, NativeRuntime, ScopeOptions};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let options = ScopeOptions::new("/project", "./src/index.js");
//! let installer = Installer::new(options, Arc::new(NativeRuntime));
//! let report = installer.install(InstallOptions::default()).await?;
//! println!("processed {} of {} modules", report.processed.len(), report.visited);
//! # Ok(()) }
//! ```
//!
//! ### Watching
//!
//! ```no_run
//! use std::sync::Arc;
//! use remod_bundler::{Installer, NativeRuntime, ScopeOptions, WatchEvent, watcher};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let installer = Installer::new(ScopeOptions::new("/project", "."), Arc::new(NativeRuntime));
//! let mut subscription = watcher::subscribe(installer)?;
//! while let Some(event) = subscription.next().await {
//!     if let WatchEvent::Failed(err) = event {
//!         eprintln!("{err}");
//!     }
//! }
//! # Ok(()) }
//! ```

pub use remod_graph::*;

pub mod bundle;
pub mod cache;
pub mod installer;
pub mod options;
pub mod pipeline;
pub mod watcher;

#[cfg(feature = "logging")]
#[cfg_attr(docsrs, doc(cfg(feature = "logging")))]
pub mod logging;

pub use bundle::{Asset, Bundles, UnionRule};
pub use cache::{CacheError, SNAPSHOT_FILE, Snapshot};
pub use installer::{InstallOptions, InstallReport, Installer, Interceptor};
pub use options::ScopeOptions;
pub use pipeline::{
    Binding, Hook, HookContext, HookRegistry, ParsedModule, Phase, Pipeline, PipelineError,
    PipelineSet, Stage,
};
pub use watcher::{ChangeKind, FileEvent, Subscription, WatchEvent};

/// Error types for remod-bundler operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Error from the resource graph (resolution, identity, snapshots).
    #[error(transparent)]
    Graph(#[from] remod_graph::Error),

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] remod_config::ConfigError),

    /// A pipeline or hook failed while processing a module.
    #[error("{pipeline} pipeline failed in {phase} for {module_id}: {source}")]
    Pipeline {
        pipeline: String,
        module_id: String,
        phase: Phase,
        #[source]
        source: PipelineError,
    },

    /// Packing was attempted while members were still loading.
    #[error("Cannot pack bundle '{bundle}': {pending} member(s) still loading")]
    Packing { bundle: String, pending: usize },

    /// Snapshot could not be read or written.
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// Filesystem error from the runtime.
    #[error(transparent)]
    Runtime(#[from] remod_graph::RuntimeError),

    /// The filesystem watcher could not be set up.
    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    /// Failure in a build that resumed from cached state.
    #[error("An error occurred while installing from cache: {0}")]
    Warm(Box<Error>),
}

/// Result type alias for remod-bundler operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// The underlying error of a warm-build failure.
    pub fn root(&self) -> &Error {
        match self {
            Error::Warm(inner) => inner.root(),
            other => other,
        }
    }
}

impl miette::Diagnostic for Error {
    fn code(&self) -> Option<Box<dyn std::fmt::Display + '_>> {
        let code = match self {
            Error::Graph(err) => match err {
                remod_graph::Error::Resolution { .. } => "RESOLUTION_FAILED",
                remod_graph::Error::CycleLimit { .. } => "CYCLE_LIMIT",
                remod_graph::Error::OutsideRoot { .. } => "OUTSIDE_ROOT",
                remod_graph::Error::Runtime(_) => "IO_ERROR",
                _ => "GRAPH_ERROR",
            },
            Error::InvalidConfig(_) | Error::Config(_) => "CONFIG_ERROR",
            Error::Pipeline { .. } => "PIPELINE_FAILED",
            Error::Packing { .. } => "PACKING_FAILED",
            Error::Cache(_) => "CACHE_ERROR",
            Error::Runtime(_) => "IO_ERROR",
            Error::Watch(_) => "WATCH_ERROR",
            Error::Warm(inner) => {
                let inner: &Error = inner;
                return inner.code();
            }
        };
        Some(Box::new(code))
    }

    fn severity(&self) -> Option<miette::Severity> {
        Some(miette::Severity::Error)
    }

    fn help(&self) -> Option<Box<dyn std::fmt::Display + '_>> {
        match self {
            Error::Graph(remod_graph::Error::Resolution { request, from }) => Some(Box::new(format!(
                "Could not resolve '{request}' from {}.\nCheck the path, or mark it external or null in the config.",
                from.display()
            ))),
            Error::Graph(remod_graph::Error::CycleLimit { request, .. }) => Some(Box::new(format!(
                "Middleware kept rewriting '{request}'. Look for alias rules that map onto each other."
            ))),
            Error::Graph(remod_graph::Error::OutsideRoot { root, .. }) => Some(Box::new(format!(
                "Modules must live under the scope root ({}).",
                root.display()
            ))),
            Error::InvalidConfig(msg) => Some(Box::new(format!(
                "Check your configuration file for syntax errors.\nError: {msg}"
            ))),
            Error::Packing { .. } => Some(Box::new(
                "A bundle was packed before its members finished loading.",
            )),
            Error::Warm(_) => Some(Box::new("Try re-running with force")),
            _ => None,
        }
    }
}
