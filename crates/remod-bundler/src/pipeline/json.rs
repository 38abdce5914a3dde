//! JSON modules, exported as a value.

use std::path::Path;

use remod_graph::Request;

use super::script::wrap;
use super::{ModuleInfo, ParsedModule, Pipeline, PipelineError, PipelineResult, has_extension, utf8};

#[derive(Debug, Default, Clone, Copy)]
pub struct JsonPipeline;

impl Pipeline for JsonPipeline {
    fn name(&self) -> &'static str {
        "json"
    }

    fn output_type(&self) -> &'static str {
        "js"
    }

    fn output_extension(&self) -> Option<&'static str> {
        Some(".js")
    }

    fn accepts(&self, path: &Path) -> bool {
        has_extension(path, "json")
    }

    fn parse(&self, source: &[u8], slug: &str) -> PipelineResult<Box<dyn ParsedModule>> {
        let text = utf8(source)?;
        let value: serde_json::Value = serde_json::from_str(text)
            .map_err(|e| PipelineError::Invalid(format!("{slug}: {e}")))?;
        Ok(Box::new(JsonModule { value }))
    }
}

struct JsonModule {
    value: serde_json::Value,
}

impl ParsedModule for JsonModule {
    fn requests(&self) -> Vec<Request> {
        Vec::new()
    }

    fn generate(&self, module: &ModuleInfo<'_>) -> PipelineResult<Vec<u8>> {
        let body = format!("module.exports = {};", self.value);
        Ok(wrap(module, &body).into_bytes())
    }
}
