//! Unified error types for the hostroot workspace.
//!
//! Every fatal condition of the root switch maps to exactly one variant.
//! Non-fatal steps never construct these; they log and continue.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum HostrootError {
    /// Boot metadata (storage-driver file, `current` link) is missing or unusable.
    #[error("configuration error at {path}: {message}")]
    Configuration {
        /// File or link that could not be used.
        path: PathBuf,
        /// Description of the problem.
        message: String,
    },

    /// The layer store could not be opened with the requested driver.
    #[error("failed to open layer store at {root}: {message}")]
    StoreInit {
        /// Root of the layer store.
        root: PathBuf,
        /// Description of the incompatibility.
        message: String,
    },

    /// No read-write layer exists for the container.
    #[error("read-write layer not found for container {id}")]
    LayerNotFound {
        /// Container identifier that was looked up.
        id: String,
    },

    /// A mount-family syscall failed.
    #[error("{operation} failed on {target}: {message}")]
    Mount {
        /// Short name of the operation (`mount`, `remount`, `move`, ...).
        operation: &'static str,
        /// Mount point the operation was applied to.
        target: PathBuf,
        /// Underlying error description.
        message: String,
    },

    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// `pivot_root(2)` or the subsequent `chdir` failed.
    #[error("pivot into {new_root} failed: {message}")]
    Pivot {
        /// Root that was being pivoted into.
        new_root: PathBuf,
        /// Underlying error description.
        message: String,
    },

    /// The init program could not replace the running process.
    #[error("failed to execute {program}: {source}")]
    Exec {
        /// Program that was executed.
        program: PathBuf,
        /// Underlying I/O error returned by `execve`.
        source: std::io::Error,
    },

    /// The configuration file could not be parsed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, HostrootError>;
