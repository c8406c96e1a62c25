use thiserror::Error;

#[derive(Debug, Error)]
pub enum SuggestError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("project '{0}' not found")]
    ProjectNotFound(String),
    #[error("vocabulary '{0}' not found")]
    VocabularyNotFound(String),
    #[error("backend '{backend}' does not support {operation}")]
    UnsupportedOperation {
        backend: String,
        operation: &'static str,
    },
    #[error("training project '{project_id}' failed: {reason}")]
    TrainingFailed { project_id: String, reason: String },
    #[error("suggestion failed: {0}")]
    SuggestionFailed(String),
    #[error("batch of {size} documents exceeds the limit of {max}")]
    BatchTooLarge { size: usize, max: usize },
    #[error("service unavailable: {0}")]
    Unavailable(String),
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("storage error: {0}")]
    Storage(String),
}

impl SuggestError {
    pub fn unsupported(backend: impl Into<String>, operation: &'static str) -> Self {
        Self::UnsupportedOperation {
            backend: backend.into(),
            operation,
        }
    }

    pub fn training(project_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::TrainingFailed {
            project_id: project_id.into(),
            reason: reason.into(),
        }
    }

    /// Transient conditions a caller may retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::SuggestionFailed(_) | Self::Unavailable(_))
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::UnsupportedOperation { .. })
    }
}

impl From<anyhow::Error> for SuggestError {
    fn from(err: anyhow::Error) -> Self {
        Self::Storage(format!("{err:#}"))
    }
}

pub type Result<T> = std::result::Result<T, SuggestError>;
