//! Common error types for the classifier pipeline

use std::path::PathBuf;
use thiserror::Error;

/// Common result type for pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy shared by the resolver, the stages and the service
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration source missing, unparseable, empty or incomplete
    #[error("Configuration error in {path}: {reason}")]
    ConfigLoad { path: PathBuf, reason: String },

    /// A stage's required upstream artifact is absent
    #[error("Artifact not found at {path}: {reason}")]
    ArtifactNotFound { path: PathBuf, reason: String },

    /// Artifact discovery found more than one candidate
    #[error("Ambiguous artifact under {path}: {} candidates ({})", candidates.len(), join_paths(candidates))]
    AmbiguousArtifact {
        path: PathBuf,
        candidates: Vec<PathBuf>,
    },

    /// Failure surfaced from a collaborator (download, extraction, model, tracking)
    #[error("Backend error: {0}")]
    Backend(String),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Value unusable by the operation (bad request, zero batch size, ...)
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    pub fn config_load(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Error::ConfigLoad {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn artifact_not_found(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Error::ArtifactNotFound {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn backend(reason: impl ToString) -> Self {
        Error::Backend(reason.to_string())
    }
}

fn join_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Backend(format!("JSON serialization failed: {}", err))
    }
}
