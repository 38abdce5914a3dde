//! Per-file-type processing strategies.
//!
//! A [`Pipeline`] turns source bytes into a [`ParsedModule`], which reports
//! its requests, rewrites them once they are bound to graph targets, and
//! generates output. Pipelines are chosen by file extension in registration
//! order; the first that accepts a path wins.

mod css;
pub mod hooks;
mod json;
mod raw;
mod script;

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use indexmap::IndexMap;
use remod_graph::{Pid, Request};

pub use css::CssPipeline;
pub use hooks::{Hook, HookContext, HookRegistry, Phase, Stage};
pub use json::JsonPipeline;
pub use raw::RawPipeline;
pub use script::ScriptPipeline;

/// Failure reported by a pipeline.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("source is not valid UTF-8")]
    Encoding,

    #[error("{0}")]
    Invalid(String),
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

/// What a request is bound to once resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Binding {
    Module { pid: Pid, module_id: String },
    External(String),
    /// The URL the resource is served from, for `href` requests.
    Url(String),
    /// Deliberately nothing.
    Null,
    /// Failed to resolve.
    NotFound,
}

/// Identity of the module being generated.
#[derive(Debug, Clone, Copy)]
pub struct ModuleInfo<'a> {
    pub pid: Pid,
    pub module_id: &'a str,
    pub slug: &'a str,
}

pub trait Pipeline: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    /// Output type shared by modules that load together (`js`, `css`, `raw`).
    fn output_type(&self) -> &'static str;

    /// Extension of generated output. `None` keeps the source's own.
    fn output_extension(&self) -> Option<&'static str>;

    fn accepts(&self, path: &Path) -> bool;

    fn parse(&self, source: &[u8], slug: &str) -> PipelineResult<Box<dyn ParsedModule>>;
}

pub trait ParsedModule: Send {
    fn requests(&self) -> Vec<Request>;

    /// Rewrite requests to their bound targets.
    fn transform(&mut self, _bindings: &IndexMap<String, Binding>) -> PipelineResult<()> {
        Ok(())
    }

    fn generate(&self, module: &ModuleInfo<'_>) -> PipelineResult<Vec<u8>>;

    fn compress(&self, output: Vec<u8>) -> Vec<u8> {
        output
    }
}

/// Ordered pipeline registry.
#[derive(Debug, Clone)]
pub struct PipelineSet {
    pipelines: Vec<Arc<dyn Pipeline>>,
}

impl PipelineSet {
    pub fn empty() -> Self {
        Self {
            pipelines: Vec::new(),
        }
    }

    /// css, json, raw, then script as the catch-all.
    pub fn builtin(script_extensions: &[String]) -> Self {
        let mut set = Self::empty();
        set.push(CssPipeline);
        set.push(JsonPipeline);
        set.push(RawPipeline::new(script_extensions));
        set.push(ScriptPipeline);
        set
    }

    pub fn push(&mut self, pipeline: impl Pipeline + 'static) {
        self.pipelines.push(Arc::new(pipeline));
    }

    /// Register ahead of every existing pipeline.
    pub fn prepend(&mut self, pipeline: impl Pipeline + 'static) {
        self.pipelines.insert(0, Arc::new(pipeline));
    }

    pub fn select(&self, path: &Path) -> Option<&Arc<dyn Pipeline>> {
        self.pipelines.iter().find(|p| p.accepts(path))
    }

    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }
}

pub(crate) fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(ext.trim_start_matches('.')))
}

pub(crate) fn utf8(source: &[u8]) -> PipelineResult<&str> {
    std::str::from_utf8(source).map_err(|_| PipelineError::Encoding)
}

/// Output slug for a source slug: the pipeline extension is appended when
/// the source does not already carry it.
pub fn output_slug(slug: &str, extension: Option<&str>) -> String {
    match extension {
        Some(ext) if !slug.ends_with(ext) => format!("{slug}{ext}"),
        _ => slug.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builtin() -> PipelineSet {
        PipelineSet::builtin(
            &[".js", ".jsx", ".mjs", ".es", ".es6", ".json"]
                .map(String::from),
        )
    }

    #[test]
    fn selection_follows_registration_order() {
        let set = builtin();
        let name = |p: &str| set.select(Path::new(p)).map(|p| p.name());
        assert_eq!(name("a.css"), Some("css"));
        assert_eq!(name("data.json"), Some("json"));
        assert_eq!(name("logo.png"), Some("raw"));
        assert_eq!(name("index.js"), Some("script"));
        assert_eq!(name("Makefile"), Some("script"));
    }

    #[test]
    fn output_slug_appends_missing_extension() {
        assert_eq!(output_slug("src/a.js", Some(".js")), "src/a.js");
        assert_eq!(output_slug("data.json", Some(".js")), "data.json.js");
        assert_eq!(output_slug("logo.png", None), "logo.png");
    }
}
