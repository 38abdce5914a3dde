//! Shared fixtures for remod-bundler integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use remod_bundler::test_utils::{TestProject, TestRuntime};
use remod_bundler::{Installer, Pid, ScopeOptions};

pub const ENTRY: &str = "./src/index.js";

/// Options for a project rooted at `project` with the default entry.
pub fn options(project: &TestProject) -> ScopeOptions {
    ScopeOptions::new(project.root(), ENTRY)
}

pub fn installer(project: &TestProject) -> Installer {
    installer_with(options(project))
}

pub fn installer_with(options: ScopeOptions) -> Installer {
    Installer::new(options, Arc::new(TestRuntime::new()))
}

/// Pid of a local file, given its slug.
pub fn pid(slug: &str) -> Pid {
    Pid::of(&format!("./{slug}"))
}

/// Contents of an output file.
pub fn output(project: &TestProject, rel: &str) -> String {
    project.read(&format!(".remote/{rel}"))
}

pub fn output_exists(project: &TestProject, rel: &str) -> bool {
    project.path(&format!(".remote/{rel}")).exists()
}

/// A small app: the entry requires `a`, which requires `b`.
pub fn app() -> TestProject {
    let project = TestProject::new();
    project.write("src/index.js", "const a = require('./a');\nmodule.exports = a;\n");
    project.write("src/a.js", "const b = require('./b');\nmodule.exports = b + 1;\n");
    project.write("src/b.js", "module.exports = 1;\n");
    project
}
