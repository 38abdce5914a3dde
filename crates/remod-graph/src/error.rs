use std::path::PathBuf;

use crate::ids::Pid;
use crate::runtime::RuntimeError;

/// Error types for graph and resolution operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A request matched no file, package, core module or URL.
    #[error("Cannot find module '{request}' from '{}'", from.display())]
    Resolution { request: String, from: PathBuf },

    /// A request named a path outside of the scope's root directory.
    #[error("Request '{request}' resolves to '{}', outside of root '{}'", path.display(), root.display())]
    OutsideRoot {
        request: String,
        path: PathBuf,
        root: PathBuf,
    },

    /// Context middleware kept mutating a request.
    #[error("Exceeded max middleware iterations ({iterations}) resolving '{request}'")]
    CycleLimit { request: String, iterations: usize },

    /// A query required a resource that has not finished loading.
    #[error("Resource '{0}' is not loaded")]
    NotLoaded(String),

    #[error("Unknown resource pid {0}")]
    UnknownResource(Pid),

    /// Two distinct module ids hashed to the same pid.
    #[error("pid {pid} is shared by '{existing}' and '{incoming}'")]
    PidCollision {
        pid: Pid,
        existing: String,
        incoming: String,
    },

    #[error("Invalid package.json at {}: {reason}", path.display())]
    PackageJson { path: PathBuf, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

/// Result type alias for graph operations.
pub type Result<T> = std::result::Result<T, Error>;
