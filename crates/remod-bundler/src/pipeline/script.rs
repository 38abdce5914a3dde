//! Script modules.
//!
//! Requests are found lexically. `require()` and `import()` calls with a
//! literal argument are rewritten to the loader's calling convention; static
//! `import`/`export` statements are reported but left untouched.

use std::path::Path;
use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::{Captures, Regex};
use remod_graph::Request;

use super::{Binding, ModuleInfo, ParsedModule, Pipeline, PipelineResult, utf8};

static REQUESTS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?x)
          \bimport\s*\(\s*['"](?P<dynamic>[^'"\n]+)['"]\s*\)
        | \brequire\s*\(\s*['"](?P<require>[^'"\n]+)['"]\s*\)
        | \b(?:import|export)\s*(?:[\w*{}\s,$]+?\s*\bfrom\s*)?['"](?P<static>[^'"\n]+)['"]
        "#,
    )
    .expect("request pattern is valid")
});

static CALLS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?x)
          \bimport\s*\(\s*['"](?P<dynamic>[^'"\n]+)['"]\s*\)
        | \brequire\s*\(\s*['"](?P<require>[^'"\n]+)['"]\s*\)
        "#,
    )
    .expect("call pattern is valid")
});

#[derive(Debug, Default, Clone, Copy)]
pub struct ScriptPipeline;

impl Pipeline for ScriptPipeline {
    fn name(&self) -> &'static str {
        "script"
    }

    fn output_type(&self) -> &'static str {
        "js"
    }

    fn output_extension(&self) -> Option<&'static str> {
        Some(".js")
    }

    fn accepts(&self, _path: &Path) -> bool {
        true
    }

    fn parse(&self, source: &[u8], _slug: &str) -> PipelineResult<Box<dyn ParsedModule>> {
        let code = utf8(source)?.to_string();
        Ok(Box::new(ScriptModule { code }))
    }
}

struct ScriptModule {
    code: String,
}

impl ParsedModule for ScriptModule {
    fn requests(&self) -> Vec<Request> {
        extract(&self.code)
    }

    fn transform(&mut self, bindings: &IndexMap<String, Binding>) -> PipelineResult<()> {
        let rewritten = CALLS.replace_all(&self.code, |caps: &Captures<'_>| {
            let binding = |raw: &str| bindings.get(&request_key(raw));
            if let Some(raw) = caps.name("require") {
                match binding(raw.as_str()) {
                    Some(b) => require_call(raw.as_str(), b),
                    None => caps[0].to_string(),
                }
            } else if let Some(raw) = caps.name("dynamic") {
                match binding(raw.as_str()) {
                    Some(b) => import_call(raw.as_str(), b),
                    None => caps[0].to_string(),
                }
            } else {
                caps[0].to_string()
            }
        });
        self.code = rewritten.into_owned();
        Ok(())
    }

    fn generate(&self, module: &ModuleInfo<'_>) -> PipelineResult<Vec<u8>> {
        Ok(wrap(module, &self.code).into_bytes())
    }

    fn compress(&self, output: Vec<u8>) -> Vec<u8> {
        let text = match String::from_utf8(output) {
            Ok(text) => text,
            Err(e) => return e.into_bytes(),
        };
        text.lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
            .into_bytes()
    }
}

/// Requests in source order. A request made both ways counts as sync.
pub(crate) fn extract(code: &str) -> Vec<Request> {
    let mut found: IndexMap<&str, bool> = IndexMap::new();
    for caps in REQUESTS.captures_iter(code) {
        let (raw, is_async) = match (caps.name("dynamic"), caps.name("require"), caps.name("static")) {
            (Some(m), _, _) => (m.as_str(), true),
            (_, Some(m), _) => (m.as_str(), false),
            (_, _, Some(m)) => (m.as_str(), false),
            _ => continue,
        };
        found
            .entry(raw)
            .and_modify(|a| *a = *a && is_async)
            .or_insert(is_async);
    }
    found
        .into_iter()
        .map(|(raw, is_async)| {
            let request = Request::parse(raw);
            let is_async = is_async || request.is_async();
            request.with_async(is_async)
        })
        .collect()
}

/// Key a raw request string the way bindings are keyed.
pub(crate) fn request_key(raw: &str) -> String {
    Request::parse(raw).to_string()
}

fn quote(value: &str) -> String {
    serde_json::Value::from(value).to_string()
}

/// `raw` made safe to embed in a block comment.
fn comment(raw: &str) -> String {
    raw.replace("*/", "*\\/")
}

fn require_call(raw: &str, binding: &Binding) -> String {
    match binding {
        Binding::Module { pid, .. } => format!("$require(/* {} */ {pid})", comment(raw)),
        Binding::External(id) => format!("$require({})", quote(id)),
        Binding::Url(url) => quote(url),
        Binding::Null => format!("null /* {} */", comment(raw)),
        Binding::NotFound => format!("module._throwNotFound({})", quote(raw)),
    }
}

fn import_call(raw: &str, binding: &Binding) -> String {
    match binding {
        Binding::Module { module_id, .. } => format!("module.import({})", quote(module_id)),
        Binding::External(id) => format!("module.import({})", quote(id)),
        Binding::Url(url) => format!("Promise.resolve({})", quote(url)),
        Binding::Null => "Promise.resolve(null)".to_string(),
        Binding::NotFound => format!("module._throwNotFound({})", quote(raw)),
    }
}

/// Register `body` with the loader under the module's pid.
pub(crate) fn wrap(module: &ModuleInfo<'_>, body: &str) -> String {
    format!(
        "this[\"pid:{pid}\"] = function(exports, $require, module, __filename, __dirname) {{\n{body}\n}};",
        pid = module.pid
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use remod_graph::Pid;

    fn info(pid: Pid) -> ModuleInfo<'static> {
        ModuleInfo {
            pid,
            module_id: "./src/index.js",
            slug: "src/index.js",
        }
    }

    #[test]
    fn extracts_every_request_form_in_order() {
        let code = r#"
import React from "react";
import './polyfill';
import { a, b } from './ab.js';
export * from "./reexport";
const c = require('./c');
const lazy = import('./lazy');
"#;
        let values: Vec<_> = extract(code).into_iter().map(|r| (r.value, r.is_async)).collect();
        assert_eq!(
            values,
            vec![
                ("react".to_string(), false),
                ("./polyfill".to_string(), false),
                ("./ab.js".to_string(), false),
                ("./reexport".to_string(), false),
                ("./c".to_string(), false),
                ("./lazy".to_string(), true),
            ]
        );
    }

    #[test]
    fn sync_use_wins_over_async() {
        let requests = extract("import('./a'); require('./a');");
        assert_eq!(requests.len(), 1);
        assert!(!requests[0].is_async());
    }

    #[test]
    fn inline_async_attribute() {
        let requests = extract("require('./worker.js<async>');");
        assert_eq!(requests[0].value, "./worker.js");
        assert!(requests[0].is_async());
    }

    #[test]
    fn rewrites_calls_by_binding() {
        let pid = Pid::of("./src/a.js");
        let mut module = ScriptPipeline
            .parse(
                b"var a = require('./a');\nvar fs = require('fs');\nvar n = require('./gone');\nvar x = require('./x');\nimport('./a');",
                "src/index.js",
            )
            .unwrap();
        let mut bindings = IndexMap::new();
        bindings.insert(
            "./a".to_string(),
            Binding::Module {
                pid,
                module_id: "./src/a.js".to_string(),
            },
        );
        bindings.insert("fs".to_string(), Binding::External("fs".to_string()));
        bindings.insert("./gone".to_string(), Binding::NotFound);
        bindings.insert("./x".to_string(), Binding::Null);
        module.transform(&bindings).unwrap();

        let out = String::from_utf8(module.generate(&info(Pid::of("./src/index.js"))).unwrap()).unwrap();
        assert!(out.contains(&format!("$require(/* ./a */ {pid})")));
        assert!(out.contains(r#"$require("fs")"#));
        assert!(out.contains(r#"module._throwNotFound("./gone")"#));
        assert!(out.contains("null /* ./x */"));
        assert!(out.contains(r#"module.import("./src/a.js")"#));
    }

    #[test]
    fn href_requests_become_url_literals() {
        let mut module = ScriptPipeline
            .parse(b"var logo = require('./logo.png<static>');", "src/index.js")
            .unwrap();
        let mut bindings = IndexMap::new();
        bindings.insert("./logo.png<static>".to_string(), Binding::Url("/_/:./src/logo.png".to_string()));
        module.transform(&bindings).unwrap();

        let out = String::from_utf8(module.generate(&info(Pid::of("./src/index.js"))).unwrap()).unwrap();
        assert!(out.contains(r#"var logo = "/_/:./src/logo.png";"#));
        assert!(!out.contains("$require"));
    }

    #[test]
    fn request_text_cannot_close_the_comment() {
        let pid = Pid::of("./src/a*/b.js");
        let mut module = ScriptPipeline
            .parse(b"require('./a*/b');\nrequire('./x*/');", "src/index.js")
            .unwrap();
        let mut bindings = IndexMap::new();
        bindings.insert(
            "./a*/b".to_string(),
            Binding::Module {
                pid,
                module_id: "./src/a*/b.js".to_string(),
            },
        );
        bindings.insert("./x*/".to_string(), Binding::Null);
        module.transform(&bindings).unwrap();

        let out = String::from_utf8(module.generate(&info(Pid::of("./src/index.js"))).unwrap()).unwrap();
        assert!(out.contains(&format!(r"$require(/* ./a*\/b */ {pid})")));
        assert!(out.contains(r"null /* ./x*\/ */"));
        assert!(!out.contains("*/b"));
    }

    #[test]
    fn wrapper_registers_pid() {
        let pid = Pid::of("./src/index.js");
        let module = ScriptPipeline.parse(b"exports.a = 1;", "src/index.js").unwrap();
        let out = String::from_utf8(module.generate(&info(pid)).unwrap()).unwrap();
        assert!(out.starts_with(&format!("this[\"pid:{pid}\"] = function(exports, $require, module, __filename, __dirname) {{")));
        assert!(out.ends_with("};"));
    }

    #[test]
    fn compress_drops_indentation_and_blank_lines() {
        let module = ScriptPipeline.parse(b"", "a.js").unwrap();
        let out = module.compress(b"  a();\n\n    b();\n".to_vec());
        assert_eq!(out, b"a();\nb();");
    }

    #[test]
    fn rejects_invalid_utf8() {
        assert!(ScriptPipeline.parse(&[0xff, 0xfe], "a.js").is_err());
    }
}
