//! Error types for the launch pipeline.
//!
//! Every phase of a launch reports through [`LaunchError`] so callers can tell a
//! configuration problem from a failed download, a trust refusal or an abort.

use std::fmt;
use std::path::PathBuf;

/// Errors that can occur while resolving, fetching, verifying or running a launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchError {
    /// The launch cannot start: no resources, no entry point, or a re-entrant `run`.
    Configuration(String),

    /// The descriptor could not be loaded or understood.
    Descriptor(String),

    /// A resource could not be downloaded (HTTP status, network or stream failure).
    Download {
        /// Declared name of the resource
        resource: String,
        /// What went wrong
        reason: String,
    },

    /// The verification mechanism itself could not run.
    VerificationUnavailable {
        artifact: PathBuf,
        reason: String,
    },

    /// The artifact was checked and is not trusted, and no trust override was given.
    Trust { artifact: PathBuf },

    /// The child process failed to start.
    ProcessSpawn { program: String, reason: String },

    /// The operation was cancelled by an external stop request.
    Aborted,

    /// Internal error occurred.
    Internal(String),
}

impl fmt::Display for LaunchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration(msg) => write!(f, "Invalid launch configuration: {}", msg),
            Self::Descriptor(msg) => write!(f, "Invalid descriptor: {}", msg),
            Self::Download { resource, reason } => {
                write!(f, "Download of `{}` failed: {}", resource, reason)
            }
            Self::VerificationUnavailable { artifact, reason } => write!(
                f,
                "Unable to verify {}: {}",
                artifact.display(),
                reason
            ),
            Self::Trust { artifact } => write!(
                f,
                "{} is not trusted. Override using --trust",
                artifact.display()
            ),
            Self::ProcessSpawn { program, reason } => {
                write!(f, "Failed to start `{}`: {}", program, reason)
            }
            Self::Aborted => write!(f, "Launch aborted"),
            Self::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for LaunchError {}

/// Result type for launch operations.
pub type LaunchResult<T> = Result<T, LaunchError>;

impl From<anyhow::Error> for LaunchError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl LaunchError {
    /// Create a download error for the named resource.
    pub fn download(resource: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::Download {
            resource: resource.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether this error is the result of an external stop request.
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted)
    }
}
