//! Platform runtime abstraction.
//!
//! Everything the build core does to the filesystem goes through the
//! [`Runtime`] trait, so the graph and installer can be driven by the native
//! filesystem or by a test double.

pub mod native;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

use async_trait::async_trait;
use std::path::{Path, PathBuf};

pub use native::NativeRuntime;

/// Result type for runtime operations
pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Errors that can occur during runtime operations
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// File not found
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(String),

    /// Other runtime error
    #[error("Runtime error: {0}")]
    Other(String),
}

/// File metadata
///
/// `modified`, `changed` and `inode` feed the stat-based source checksum; a
/// platform that cannot report one leaves it `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetadata {
    /// File size in bytes
    pub size: u64,
    /// Whether this is a directory
    pub is_dir: bool,
    /// Whether this is a file
    pub is_file: bool,
    /// Last modified timestamp (nanoseconds since epoch)
    pub modified: Option<u128>,
    /// Last status change timestamp (nanoseconds since epoch)
    pub changed: Option<i128>,
    /// Inode number
    pub inode: Option<u64>,
}

/// Platform runtime trait
///
/// # Example
///
/// ```rust,ignore
/// use remod_graph::runtime::{Runtime, RuntimeResult};
///
/// let bytes = runtime.read_file(Path::new("src/index.js")).await?;
/// ```
#[async_trait]
pub trait Runtime: Send + Sync + std::fmt::Debug {
    /// Read a file from the filesystem
    async fn read_file(&self, path: &Path) -> RuntimeResult<Vec<u8>>;

    /// Write a file, creating missing parent directories
    async fn write_file(&self, path: &Path, content: &[u8]) -> RuntimeResult<()>;

    /// Get file metadata
    async fn metadata(&self, path: &Path) -> RuntimeResult<FileMetadata>;

    /// Check if a path exists
    fn exists(&self, path: &Path) -> bool;

    /// Create a directory
    async fn create_dir(&self, path: &Path, recursive: bool) -> RuntimeResult<()>;

    /// Remove a file
    async fn remove_file(&self, path: &Path) -> RuntimeResult<()>;

    /// Remove a directory and everything below it. Missing directories are not an error.
    async fn remove_dir_all(&self, path: &Path) -> RuntimeResult<()>;
}
