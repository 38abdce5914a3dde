//! Build cache: checksums deciding whether a resource can be reused, and the
//! snapshot that carries the graph from one process to the next.
//!
//! # Architecture
//!
//! - **Source checksum**: BLAKE3 over file metadata (mtime, ctime, size,
//!   inode). Cheaper than hashing contents and good enough to spot edits.
//! - **Options checksum**: BLAKE3 over the scope fingerprint, the pipeline
//!   name and the crate version.
//! - **Snapshot**: `<output>/.__resources__.json`, discarded on a version
//!   mismatch.

mod checksum;
mod snapshot;

pub use checksum::{options_checksum, source_checksum};
pub use snapshot::{SNAPSHOT_FILE, Snapshot};

/// Error types for cache operations.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Serialization error.
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// Deserialization error.
    #[error("deserialization error: {0}")]
    DeserializationError(String),

    /// Reading or writing the snapshot failed.
    #[error("snapshot io error: {0}")]
    Io(String),
}

impl From<remod_graph::RuntimeError> for CacheError {
    fn from(err: remod_graph::RuntimeError) -> Self {
        CacheError::Io(err.to_string())
    }
}

/// Result type for cache operations.
pub type CacheResult<T> = std::result::Result<T, CacheError>;
