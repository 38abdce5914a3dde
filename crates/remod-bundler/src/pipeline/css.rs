//! Stylesheets. `@import` rules become requests and are dropped from the
//! output, since the loader fetches imported sheets itself.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use remod_graph::Request;

use super::{ModuleInfo, ParsedModule, Pipeline, PipelineResult, has_extension, utf8};

static IMPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"@import\s+(?:url\(\s*)?['"]?(?P<request>[^'"\s)]+)['"]?\s*\)?[^;]*;\s*"#)
        .expect("import pattern is valid")
});

#[derive(Debug, Default, Clone, Copy)]
pub struct CssPipeline;

impl Pipeline for CssPipeline {
    fn name(&self) -> &'static str {
        "css"
    }

    fn output_type(&self) -> &'static str {
        "css"
    }

    fn output_extension(&self) -> Option<&'static str> {
        Some(".css")
    }

    fn accepts(&self, path: &Path) -> bool {
        has_extension(path, "css")
    }

    fn parse(&self, source: &[u8], _slug: &str) -> PipelineResult<Box<dyn ParsedModule>> {
        Ok(Box::new(CssModule {
            code: utf8(source)?.to_string(),
        }))
    }
}

struct CssModule {
    code: String,
}

impl ParsedModule for CssModule {
    fn requests(&self) -> Vec<Request> {
        let mut seen = Vec::<Request>::new();
        for caps in IMPORT.captures_iter(&self.code) {
            let request = Request::parse(&caps["request"]);
            if !seen.contains(&request) {
                seen.push(request);
            }
        }
        seen
    }

    fn generate(&self, _module: &ModuleInfo<'_>) -> PipelineResult<Vec<u8>> {
        Ok(IMPORT.replace_all(&self.code, "").into_owned().into_bytes())
    }

    fn compress(&self, output: Vec<u8>) -> Vec<u8> {
        match String::from_utf8(output) {
            Ok(text) => text
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .collect::<String>()
                .into_bytes(),
            Err(e) => e.into_bytes(),
        }
    }
}
