//! Structural module resolution bounded by a root directory.
//!
//! Resolution order for a request:
//!
//! 1. core (runtime-provided) modules short-circuit
//! 2. absolute URLs short-circuit
//! 3. path requests (`./`, `../`, `/`) try the file, its extensions, then
//!    the directory's `package.json` main fields and `index`
//! 4. bare requests repeat step 3 inside each package directory from the
//!    base directory up to the root
//!
//! No candidate outside the root is ever considered.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use path_clean::PathClean;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::ids::is_absolute_url;
use crate::package_json::PackageJson;
use crate::runtime::Runtime;

/// Node.js builtin modules, the default `core` list.
pub const NODE_BUILTINS: &[&str] = &[
    "assert", "async_hooks", "buffer", "child_process", "cluster", "console", "constants",
    "crypto", "dgram", "dns", "domain", "events", "fs", "http", "http2", "https", "inspector",
    "module", "net", "os", "path", "perf_hooks", "process", "punycode", "querystring",
    "readline", "repl", "stream", "string_decoder", "sys", "timers", "tls", "trace_events",
    "tty", "url", "util", "v8", "vm", "worker_threads", "zlib",
];

/// Settings the resolver works with.
#[derive(Debug, Clone)]
pub struct ResolveOptions {
    pub root_dir: PathBuf,
    pub core: FxHashSet<String>,
    pub extensions: Vec<String>,
    pub main_fields: Vec<String>,
    pub module_dirs: Vec<String>,
}

impl ResolveOptions {
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            core: NODE_BUILTINS.iter().map(|s| s.to_string()).collect(),
            extensions: [".js", ".jsx", ".mjs", ".es", ".es6", ".json"]
                .into_iter()
                .map(String::from)
                .collect(),
            main_fields: vec!["main".to_string()],
            module_dirs: vec!["node_modules".to_string()],
        }
    }

    pub fn with_core<I, S>(mut self, core: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.core = core.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_extensions(mut self, extensions: Vec<String>) -> Self {
        self.extensions = extensions;
        self
    }

    pub fn with_main_fields(mut self, main_fields: Vec<String>) -> Self {
        self.main_fields = main_fields;
        self
    }

    pub fn with_module_dirs(mut self, module_dirs: Vec<String>) -> Self {
        self.module_dirs = module_dirs;
        self
    }

    /// Core check, accepting the `node:` scheme.
    pub fn is_core(&self, request: &str) -> bool {
        let name = request.strip_prefix("node:").unwrap_or(request);
        self.core.contains(name)
    }
}

/// Outcome of a successful resolution.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum Target {
    File(PathBuf),
    Core(String),
    Url(String),
}

impl Target {
    pub fn as_file(&self) -> Option<&Path> {
        match self {
            Target::File(path) => Some(path),
            _ => None,
        }
    }
}

/// Resolver over a [`Runtime`].
#[derive(Debug, Clone)]
pub struct Resolver {
    options: Arc<ResolveOptions>,
    runtime: Arc<dyn Runtime>,
}

impl Resolver {
    pub fn new(options: ResolveOptions, runtime: Arc<dyn Runtime>) -> Self {
        Self {
            options: Arc::new(options),
            runtime,
        }
    }

    pub fn options(&self) -> &ResolveOptions {
        &self.options
    }

    pub fn runtime(&self) -> &Arc<dyn Runtime> {
        &self.runtime
    }

    pub fn root_dir(&self) -> &Path {
        &self.options.root_dir
    }

    /// Resolve `request` as seen from `base_dir`.
    pub async fn resolve(&self, request: &str, base_dir: &Path) -> Result<Target> {
        if self.options.is_core(request) {
            return Ok(Target::Core(request.to_string()));
        }
        if is_absolute_url(request) {
            return Ok(Target::Url(request.to_string()));
        }

        let root = self.root_dir();
        let path = strip_query(request);
        let base = if base_dir.is_absolute() {
            base_dir.to_path_buf()
        } else {
            root.join(base_dir)
        };

        if is_path_request(path) {
            let candidate = if path.starts_with('/') {
                PathBuf::from(path).clean()
            } else {
                base.join(path).clean()
            };
            if !candidate.starts_with(root) {
                return Err(Error::OutsideRoot {
                    request: request.to_string(),
                    path: candidate,
                    root: root.to_path_buf(),
                });
            }
            if let Some(found) = self.load(&candidate).await {
                return Ok(Target::File(found));
            }
        } else {
            for dir in self.lookup_dirs(&base) {
                for module_dir in &self.options.module_dirs {
                    let candidate = dir.join(module_dir).join(path).clean();
                    if let Some(found) = self.load(&candidate).await {
                        return Ok(Target::File(found));
                    }
                }
            }
        }

        Err(Error::Resolution {
            request: request.to_string(),
            from: base,
        })
    }

    /// `base` and each ancestor down to the root, nearest first.
    fn lookup_dirs(&self, base: &Path) -> Vec<PathBuf> {
        let root = self.root_dir();
        let dirs: Vec<PathBuf> = base
            .ancestors()
            .take_while(|dir| dir.starts_with(root))
            .map(Path::to_path_buf)
            .collect();
        if dirs.is_empty() {
            vec![root.to_path_buf()]
        } else {
            dirs
        }
    }

    async fn load(&self, candidate: &Path) -> Option<PathBuf> {
        if let Some(file) = self.load_as_file(candidate).await {
            return Some(file);
        }
        self.load_as_directory(candidate).await
    }

    async fn load_as_file(&self, path: &Path) -> Option<PathBuf> {
        if self.is_file(path).await {
            return Some(path.to_path_buf());
        }
        for ext in &self.options.extensions {
            let mut with_ext = OsString::from(path.as_os_str());
            with_ext.push(ext);
            let with_ext = PathBuf::from(with_ext);
            if self.is_file(&with_ext).await {
                return Some(with_ext);
            }
        }
        None
    }

    async fn load_as_directory(&self, dir: &Path) -> Option<PathBuf> {
        match PackageJson::load(self.runtime.as_ref(), dir).await {
            Ok(Some(pkg)) => {
                if let Some(main) = pkg.main(&self.options.main_fields) {
                    let main_path = dir.join(main).clean();
                    if let Some(found) = self.load_as_file(&main_path).await {
                        return Some(found);
                    }
                    if let Some(found) = self.load_as_file(&main_path.join("index")).await {
                        return Some(found);
                    }
                }
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(dir = %dir.display(), error = %e, "ignoring package.json"),
        }
        self.load_as_file(&dir.join("index")).await
    }

    /// Files outside the root never exist as far as resolution is concerned.
    async fn is_file(&self, path: &Path) -> bool {
        if !path.starts_with(self.root_dir()) {
            return false;
        }
        self.runtime
            .metadata(path)
            .await
            .map(|m| m.is_file)
            .unwrap_or(false)
    }
}

fn is_path_request(request: &str) -> bool {
    request == "."
        || request == ".."
        || request.starts_with("./")
        || request.starts_with("../")
        || request.starts_with('/')
}

fn strip_query(request: &str) -> &str {
    request
        .split_once(['?', '#'])
        .map_or(request, |(path, _)| path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::test_utils::{TestProject, TestRuntime};

    fn resolver(project: &TestProject) -> Resolver {
        Resolver::new(
            ResolveOptions::new(project.root()),
            Arc::new(TestRuntime::new()),
        )
    }

    #[tokio::test]
    async fn resolves_relative_by_trying_extensions() {
        let project = TestProject::new();
        let a = project.write("src/a.js", "");
        let target = resolver(&project)
            .resolve("./a", &project.path("src"))
            .await
            .unwrap();
        assert_eq!(target, Target::File(a));
    }

    #[tokio::test]
    async fn resolves_directory_index_and_main() {
        let project = TestProject::new();
        let index = project.write("src/lib/index.js", "");
        project.write("node_modules/pkg/package.json", r#"{ "main": "dist/main" }"#);
        let main = project.write("node_modules/pkg/dist/main.js", "");
        let r = resolver(&project);

        let target = r.resolve("./lib", &project.path("src")).await.unwrap();
        assert_eq!(target, Target::File(index));

        let target = r.resolve("pkg", &project.path("src/lib")).await.unwrap();
        assert_eq!(target, Target::File(main));
    }

    #[tokio::test]
    async fn nearest_package_directory_wins() {
        let project = TestProject::new();
        project.write("node_modules/dep/index.js", "");
        let nested = project.write("src/node_modules/dep/index.js", "");
        let target = resolver(&project)
            .resolve("dep", &project.path("src"))
            .await
            .unwrap();
        assert_eq!(target, Target::File(nested));
    }

    #[tokio::test]
    async fn core_and_urls_short_circuit() {
        let project = TestProject::new();
        let r = resolver(&project);
        assert_eq!(
            r.resolve("fs", project.root()).await.unwrap(),
            Target::Core("fs".to_string())
        );
        assert_eq!(
            r.resolve("node:path", project.root()).await.unwrap(),
            Target::Core("node:path".to_string())
        );
        assert!(matches!(
            r.resolve("https://x.test/a.js", project.root()).await.unwrap(),
            Target::Url(_)
        ));
    }

    #[tokio::test]
    async fn escaping_root_is_a_hard_failure() {
        let project = TestProject::new();
        let err = resolver(&project)
            .resolve("../../etc/passwd", &project.path("src"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::OutsideRoot { .. }));
    }

    #[tokio::test]
    async fn missing_module_is_resolution_error() {
        let project = TestProject::new();
        let err = resolver(&project)
            .resolve("./nope", project.root())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Resolution { .. }));
    }

    #[tokio::test]
    async fn query_string_is_ignored() {
        let project = TestProject::new();
        let a = project.write("a.css", "");
        let target = resolver(&project)
            .resolve("./a.css?inline", project.root())
            .await
            .unwrap();
        assert_eq!(target, Target::File(a));
    }
}
