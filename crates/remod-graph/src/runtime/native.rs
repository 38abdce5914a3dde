//! Native Runtime Implementation
//!
//! Async wrappers around `std::fs`, run on tokio's blocking pool.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::task;

use super::{FileMetadata, Runtime, RuntimeError, RuntimeResult};

/// Native filesystem Runtime implementation using `std::fs`.
///
/// Standard library file operations block, so each call runs in
/// `tokio::task::spawn_blocking`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeRuntime;

impl NativeRuntime {
    pub fn new() -> Self {
        Self
    }
}

fn io_error(action: &str, path: &Path, e: std::io::Error) -> RuntimeError {
    if e.kind() == std::io::ErrorKind::NotFound {
        RuntimeError::FileNotFound(path.to_path_buf())
    } else {
        RuntimeError::Io(format!("Failed to {action} {}: {e}", path.display()))
    }
}

async fn blocking<T, F>(f: F) -> RuntimeResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> RuntimeResult<T> + Send + 'static,
{
    task::spawn_blocking(f)
        .await
        .map_err(|e| RuntimeError::Other(format!("Task join error: {e}")))?
}

#[cfg(unix)]
fn stat_extras(metadata: &std::fs::Metadata) -> (Option<i128>, Option<u64>) {
    use std::os::unix::fs::MetadataExt;
    let changed = i128::from(metadata.ctime()) * 1_000_000_000 + i128::from(metadata.ctime_nsec());
    (Some(changed), Some(metadata.ino()))
}

#[cfg(not(unix))]
fn stat_extras(_metadata: &std::fs::Metadata) -> (Option<i128>, Option<u64>) {
    (None, None)
}

#[async_trait]
impl Runtime for NativeRuntime {
    async fn read_file(&self, path: &Path) -> RuntimeResult<Vec<u8>> {
        let path = path.to_path_buf();
        blocking(move || std::fs::read(&path).map_err(|e| io_error("read", &path, e))).await
    }

    async fn write_file(&self, path: &Path, content: &[u8]) -> RuntimeResult<()> {
        let path = path.to_path_buf();
        let content = content.to_vec();
        blocking(move || {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| io_error("create", parent, e))?;
            }
            std::fs::write(&path, content).map_err(|e| io_error("write", &path, e))
        })
        .await
    }

    async fn metadata(&self, path: &Path) -> RuntimeResult<FileMetadata> {
        let path = path.to_path_buf();
        blocking(move || {
            let metadata = std::fs::metadata(&path).map_err(|e| io_error("stat", &path, e))?;
            let modified = metadata
                .modified()
                .ok()
                .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                .map(|d| d.as_nanos());
            let (changed, inode) = stat_extras(&metadata);

            Ok(FileMetadata {
                size: metadata.len(),
                is_dir: metadata.is_dir(),
                is_file: metadata.is_file(),
                modified,
                changed,
                inode,
            })
        })
        .await
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    async fn create_dir(&self, path: &Path, recursive: bool) -> RuntimeResult<()> {
        let path = path.to_path_buf();
        blocking(move || {
            let result = if recursive {
                std::fs::create_dir_all(&path)
            } else {
                std::fs::create_dir(&path)
            };
            result.map_err(|e| io_error("create", &path, e))
        })
        .await
    }

    async fn remove_file(&self, path: &Path) -> RuntimeResult<()> {
        let path = path.to_path_buf();
        blocking(move || std::fs::remove_file(&path).map_err(|e| io_error("remove", &path, e)))
            .await
    }

    async fn remove_dir_all(&self, path: &Path) -> RuntimeResult<()> {
        let path: PathBuf = path.to_path_buf();
        blocking(move || match std::fs::remove_dir_all(&path) {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            other => other.map_err(|e| io_error("remove", &path, e)),
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn write_creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let runtime = NativeRuntime::new();
        let path = dir.path().join("a/b/c.txt");

        runtime.write_file(&path, b"hello").await.unwrap();
        assert_eq!(runtime.read_file(&path).await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn missing_file_maps_to_not_found() {
        let dir = TempDir::new().unwrap();
        let runtime = NativeRuntime::new();
        let err = runtime
            .read_file(&dir.path().join("nope.js"))
            .await
            .unwrap_err();
        assert!(matches!(err, RuntimeError::FileNotFound(_)));
    }

    #[tokio::test]
    async fn metadata_reports_size_and_kind() {
        let dir = TempDir::new().unwrap();
        let runtime = NativeRuntime::new();
        let path = dir.path().join("x.js");
        std::fs::write(&path, "12345").unwrap();

        let meta = runtime.metadata(&path).await.unwrap();
        assert_eq!(meta.size, 5);
        assert!(meta.is_file);
        assert!(!meta.is_dir);
        assert!(meta.modified.is_some());
    }

    #[tokio::test]
    async fn remove_dir_all_tolerates_missing_directory() {
        let dir = TempDir::new().unwrap();
        NativeRuntime::new()
            .remove_dir_all(&dir.path().join("missing"))
            .await
            .unwrap();
    }
}
