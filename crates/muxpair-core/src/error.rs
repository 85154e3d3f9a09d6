//! Unified error type for muxpair.
//!
//! Only [`Error::DirectoryUnreadable`] is fatal to a run. Every other variant
//! is captured per item into the [`crate::RunReport`] by the run coordinator.

use std::path::PathBuf;

/// Unified error type covering all failure modes in muxpair.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An input directory could not be listed.
    #[error("Directory unreadable: {}: {source}", path.display())]
    DirectoryUnreadable {
        /// The directory that failed to list.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The probe tool failed or produced output we could not parse.
    #[error("Probe failed [{}]: {message}", path.display())]
    ProbeFailed {
        /// The file being probed.
        path: PathBuf,
        /// Tool diagnostic or parse error.
        message: String,
    },

    /// The mux tool failed to produce a usable output file.
    #[error("Merge failed: {0}")]
    MergeFailed(String),

    /// No free output name could be found for a pair.
    #[error("Output path collision: {} ({attempts} alternatives taken)", path.display())]
    OutputPathCollision {
        /// The first candidate path that was rendered.
        path: PathBuf,
        /// How many suffixed alternatives were tried.
        attempts: u32,
    },

    /// An external tool (ffmpeg, ffprobe) could not be run.
    #[error("Tool error [{tool}]: {message}")]
    Tool {
        /// Name of the tool that failed.
        tool: String,
        /// Human-readable error description.
        message: String,
    },

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Configuration failed validation.
    #[error("Config error: {0}")]
    Config(String),

    /// The run was cancelled before the operation finished.
    #[error("Cancelled")]
    Cancelled,

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Convenience constructor for [`Error::ProbeFailed`].
    pub fn probe_failed(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Error::ProbeFailed {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::Tool`].
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::DirectoryUnreadable`].
    pub fn directory_unreadable(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::DirectoryUnreadable {
            path: path.into(),
            source,
        }
    }

    /// Whether this error aborts the whole run rather than a single item.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::DirectoryUnreadable { .. })
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
