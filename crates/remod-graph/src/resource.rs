//! Graph nodes.

use std::path::Path;
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

use crate::context::Context;
use crate::ids::Pid;
use crate::index::ResourceIndex;

/// Terminal classification of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    /// A file processed by a pipeline.
    Normal,
    /// Nothing: an unresolved or nulled request.
    Null,
    /// Left to the runtime loader (core modules, URLs, explicit externals).
    External,
}

/// Outgoing request edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestEdge {
    pub pid: Pid,
    pub is_async: bool,
}

/// What a request turns into in generated output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestTarget {
    Pid(Pid),
    External(String),
    Null,
}

/// One module in the graph, keyed by its module id.
#[derive(Debug, Clone)]
pub struct Resource {
    pub kind: ResourceKind,
    pub pid: Pid,
    pub module_id: String,
    pub slug: Option<String>,
    /// Absolute source path for Normal resources, the request otherwise.
    pub origin: String,
    pub package_id: Option<String>,
    /// Resolution failure that produced a Null resource.
    pub error: Option<String>,

    pub output_type: Option<String>,
    pub output_slug: Option<String>,

    /// Raw request to target, in the order the source made them.
    pub requests: IndexMap<String, RequestEdge>,
    pub dependencies: IndexSet<Pid>,
    pub dependents: IndexSet<Pid>,

    pub index: Option<ResourceIndex>,
    pub source_checksum: Option<String>,
    pub options_checksum: Option<String>,
    pub dirty: bool,
    pub loaded: bool,
    pub size: usize,
    pub bundle: Option<String>,

    pub source: Option<Arc<str>>,
    pub output: Option<Arc<[u8]>>,
}

impl Resource {
    pub fn from_context(ctx: &Context) -> Self {
        let kind = ctx.kind();
        let origin = match ctx.file() {
            Some(path) => path.to_string_lossy().into_owned(),
            None => ctx.origin.clone(),
        };
        Self {
            kind,
            pid: ctx.pid,
            module_id: ctx.module_id.clone(),
            slug: ctx.slug.clone(),
            origin,
            package_id: ctx.package_id.clone(),
            error: ctx.error.clone(),
            output_type: None,
            output_slug: None,
            requests: IndexMap::new(),
            dependencies: IndexSet::new(),
            dependents: IndexSet::new(),
            index: None,
            source_checksum: None,
            options_checksum: None,
            dirty: kind == ResourceKind::Normal,
            loaded: kind != ResourceKind::Normal,
            size: 0,
            bundle: None,
            source: None,
            output: None,
        }
    }

    pub fn is_normal(&self) -> bool {
        self.kind == ResourceKind::Normal
    }

    pub fn is_null(&self) -> bool {
        self.kind == ResourceKind::Null
    }

    pub fn is_external(&self) -> bool {
        self.kind == ResourceKind::External
    }

    /// Source path of a Normal resource.
    pub fn path(&self) -> Option<&Path> {
        self.is_normal().then(|| Path::new(&self.origin))
    }

    /// Directory requests made by this resource are resolved from.
    pub fn base_dir(&self) -> Option<&Path> {
        self.path().and_then(Path::parent)
    }

    pub fn has_output(&self) -> bool {
        self.output.is_some()
    }

    /// No dependents and not the entry.
    pub fn is_orphan(&self, entry: Option<Pid>) -> bool {
        self.dependents.is_empty() && entry != Some(self.pid)
    }

    /// Forget everything a build produced, keeping identity and edges.
    pub fn invalidate(&mut self) {
        self.dirty = self.is_normal();
        self.loaded = !self.is_normal();
        self.source_checksum = None;
    }

    /// What a request naming this resource becomes in generated output.
    pub fn as_target(&self) -> RequestTarget {
        match self.kind {
            ResourceKind::Normal => RequestTarget::Pid(self.pid),
            ResourceKind::External => RequestTarget::External(self.module_id.clone()),
            ResourceKind::Null => RequestTarget::Null,
        }
    }
}
