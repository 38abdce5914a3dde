//! Test utilities shared by unit and integration tests.
//!
//! - [`TestRuntime`]: the native runtime with read/write counters
//! - [`TestProject`]: a temporary project directory with fixture helpers

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use super::{FileMetadata, NativeRuntime, Runtime, RuntimeResult};

/// Native filesystem access that counts reads and writes, so tests can
/// assert how much work a build actually did.
#[derive(Debug, Default)]
pub struct TestRuntime {
    inner: NativeRuntime,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl TestRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `read_file` calls so far.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Number of `write_file` calls so far.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn reset_counters(&self) {
        self.reads.store(0, Ordering::SeqCst);
        self.writes.store(0, Ordering::SeqCst);
    }
}

#[async_trait]
impl Runtime for TestRuntime {
    async fn read_file(&self, path: &Path) -> RuntimeResult<Vec<u8>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.read_file(path).await
    }

    async fn write_file(&self, path: &Path, content: &[u8]) -> RuntimeResult<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.write_file(path, content).await
    }

    async fn metadata(&self, path: &Path) -> RuntimeResult<FileMetadata> {
        self.inner.metadata(path).await
    }

    fn exists(&self, path: &Path) -> bool {
        self.inner.exists(path)
    }

    async fn create_dir(&self, path: &Path, recursive: bool) -> RuntimeResult<()> {
        self.inner.create_dir(path, recursive).await
    }

    async fn remove_file(&self, path: &Path) -> RuntimeResult<()> {
        self.inner.remove_file(path).await
    }

    async fn remove_dir_all(&self, path: &Path) -> RuntimeResult<()> {
        self.inner.remove_dir_all(path).await
    }
}

/// A throwaway project directory.
///
/// ```rust,ignore
/// let project = TestProject::new();
/// project.write("src/index.js", "require('./a');");
/// project.write("src/a.js", "module.exports = 1;");
/// ```
#[derive(Debug)]
pub struct TestProject {
    dir: tempfile::TempDir,
    root: PathBuf,
}

impl TestProject {
    #[allow(clippy::expect_used)]
    pub fn new() -> Self {
        let dir = tempfile::TempDir::new().expect("create temp dir");
        let root = dir.path().canonicalize().expect("canonicalize temp dir");
        Self { dir, root }
    }

    /// Canonical project root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.root.join(rel)
    }

    /// Write `contents` to `rel`, creating parent directories.
    #[allow(clippy::expect_used)]
    pub fn write(&self, rel: &str, contents: impl AsRef<[u8]>) -> PathBuf {
        let path = self.path(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create fixture dir");
        }
        std::fs::write(&path, contents).expect("write fixture");
        path
    }

    #[allow(clippy::expect_used)]
    pub fn remove(&self, rel: &str) -> PathBuf {
        let path = self.path(rel);
        std::fs::remove_file(&path).expect("remove fixture");
        path
    }

    #[allow(clippy::expect_used)]
    pub fn read(&self, rel: &str) -> String {
        std::fs::read_to_string(self.path(rel)).expect("read fixture")
    }

    /// The underlying temp dir, kept alive as long as the project.
    pub fn temp_dir(&self) -> &tempfile::TempDir {
        &self.dir
    }
}

impl Default for TestProject {
    fn default() -> Self {
        Self::new()
    }
}
