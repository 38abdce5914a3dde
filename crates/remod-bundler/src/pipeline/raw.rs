//! Files passed through as-is: images, fonts and anything else the resolver
//! would not treat as a script.

use std::path::Path;

use remod_graph::Request;

use super::{ModuleInfo, ParsedModule, Pipeline, PipelineResult};

#[derive(Debug, Clone)]
pub struct RawPipeline {
    script_extensions: Vec<String>,
}

impl RawPipeline {
    pub fn new(script_extensions: &[String]) -> Self {
        Self {
            script_extensions: script_extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        }
    }
}

impl Pipeline for RawPipeline {
    fn name(&self) -> &'static str {
        "raw"
    }

    fn output_type(&self) -> &'static str {
        "raw"
    }

    fn output_extension(&self) -> Option<&'static str> {
        None
    }

    fn accepts(&self, path: &Path) -> bool {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) => !self
                .script_extensions
                .iter()
                .any(|s| s.eq_ignore_ascii_case(ext)),
            None => false,
        }
    }

    fn parse(&self, source: &[u8], _slug: &str) -> PipelineResult<Box<dyn ParsedModule>> {
        Ok(Box::new(RawModule {
            bytes: source.to_vec(),
        }))
    }
}

struct RawModule {
    bytes: Vec<u8>,
}

impl ParsedModule for RawModule {
    fn requests(&self) -> Vec<Request> {
        Vec::new()
    }

    fn generate(&self, _module: &ModuleInfo<'_>) -> PipelineResult<Vec<u8>> {
        Ok(self.bytes.clone())
    }
}
