//! # remod-graph
//!
//! Resolution and the resource graph for incremental module builds.
//!
//! ## Overview
//!
//! - **Resolution**: [`Resolver`] maps a request and a base directory to a
//!   file, core module or URL, never leaving the root directory.
//! - **Contexts**: [`ContextFactory`] runs [`ContextMiddleware`] over each
//!   request until nothing changes and memoizes the result.
//! - **Resources**: [`ResourceGraph`] holds one [`Resource`] per module id,
//!   with pid-keyed edges in both directions.
//! - **Manifests**: [`Manifest`] lists what a loader needs to run a module.
//!
//! ## Architecture
//!
//! ```text
//! Request ──► ContextFactory ──► Context ──► ResourceFactory ──► ResourceGraph
//!               │    ▲                                              │
//!               ▼    │ middleware                                   ▼
//!             Resolver (Runtime)                                 Manifest
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use remod_graph::{
//!     ContextFactory, ContextMiddleware, NativeRuntime, Request, ResolveOptions, Resolver,
//!     ResourceFactory,
//! };
//!
//! # async fn run() -> remod_graph::Result<()> {
//! let resolver = Resolver::new(ResolveOptions::new("/project"), Arc::new(NativeRuntime));
//! let factory = ResourceFactory::new(ContextFactory::new(resolver, ContextMiddleware::defaults()));
//! let entry = factory.entry(&Request::new("./src/index.js")).await?;
//! assert_eq!(factory.graph().entry(), Some(entry));
//! # Ok(())
//! # }
//! ```

pub mod context;
pub mod error;
pub mod factory;
pub mod graph;
pub mod ids;
pub mod index;
pub mod manifest;
pub mod middleware;
pub mod package_json;
pub mod request;
pub mod resolver;
pub mod resource;
pub mod runtime;

pub use context::{Context, ContextFactory, MAX_MIDDLEWARE_ITERATIONS};
pub use error::{Error, Result};
pub use factory::{Hydration, ResourceFactory};
pub use graph::{RequestRecord, ResourceGraph, ResourceRecord};
pub use ids::{Pid, is_absolute_url, module_id_of, package_id_of, package_root_of, slug_of};
pub use index::ResourceIndex;
pub use manifest::{Manifest, ManifestEntry, ManifestKey};
pub use middleware::{ContextMiddleware, Matcher};
pub use package_json::PackageJson;
pub use request::{Request, RequestAttributes};
pub use resolver::{NODE_BUILTINS, ResolveOptions, Resolver, Target};
pub use resource::{RequestEdge, RequestTarget, Resource, ResourceKind};
pub use runtime::{FileMetadata, NativeRuntime, Runtime, RuntimeError, RuntimeResult};

#[cfg(any(test, feature = "test-utils"))]
pub use runtime::test_utils;

#[cfg(test)]
mod tests;
