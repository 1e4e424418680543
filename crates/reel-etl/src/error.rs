//! Stage error types.

use std::path::PathBuf;

use reel_store::StoreError;

/// Failures raised by pipeline stages.
///
/// Every variant fails the task attempt and is subject to its retry budget.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    /// An input file is missing, unreadable, lacks a declared column, or holds
    /// a value that cannot be coerced.
    #[error("source data error in {dataset}: {reason}")]
    SourceData { dataset: String, reason: String },

    /// The store refused a connection or transaction, or a relation is missing.
    #[error("store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),

    /// A relation or query produced zero rows where at least one is required.
    #[error("{relation} is empty")]
    EmptyResult { relation: String },

    /// An artifact could not be persisted.
    #[error("failed to write artifact {}: {reason}", .path.display())]
    ArtifactWrite { path: PathBuf, reason: String },

    /// A cleanup step could not remove or recreate a path.
    #[error("cleanup failed at {}: {source}", .path.display())]
    Cleanup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StageError {
    pub(crate) fn source_data(dataset: &str, reason: impl Into<String>) -> Self {
        Self::SourceData {
            dataset: dataset.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn artifact(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::ArtifactWrite {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}
