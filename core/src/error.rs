use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, RecommendError>;

/// Failures surfaced by the recommendation pipeline.
///
/// `DataLoad` and `ModelLoad` are startup failures; `Encoding` is a per-query
/// failure that callers report without tearing down the process.
#[derive(Debug, thiserror::Error)]
pub enum RecommendError {
    #[error("failed to load catalog from {path}: {reason}")]
    DataLoad { path: PathBuf, reason: String },

    #[error("failed to load vector model from {path}: {reason}")]
    ModelLoad { path: PathBuf, reason: String },

    #[error("failed to write vector model to {path}: {reason}")]
    ModelSave { path: PathBuf, reason: String },

    #[error("failed to encode query: {0}")]
    Encoding(String),

    #[error("training failed: {0}")]
    Training(String),

    #[error("experiment log {path}: {source}")]
    ExperimentLog {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl RecommendError {
    pub(crate) fn data_load(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::DataLoad { path: path.into(), reason: reason.to_string() }
    }

    pub(crate) fn model_load(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::ModelLoad { path: path.into(), reason: reason.to_string() }
    }

    pub(crate) fn model_save(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::ModelSave { path: path.into(), reason: reason.to_string() }
    }

    /// True for failures that should stop the process before it serves queries.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::DataLoad { .. } | Self::ModelLoad { .. })
    }
}
