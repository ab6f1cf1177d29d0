//! Error types for call post-processing

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for concluder operations
pub type ConcluderResult<T> = Result<T, ConcluderError>;

/// Errors that can occur while concluding a call
#[derive(Error, Debug)]
pub enum ConcluderError {
    /// An external command exited with a failure status
    #[error("external command failed with status {status}: {command}")]
    CommandFailed {
        /// The shell command line
        command: String,
        /// Exit status, -1 when terminated by a signal
        status: i32,
    },

    /// The metadata sidecar could not be written
    #[error("unable to create metadata file {path}")]
    SidecarWrite {
        /// Sidecar path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
