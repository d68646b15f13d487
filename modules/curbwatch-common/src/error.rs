use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum CurbwatchError {
    #[error("Validation error on '{field}': {message}")]
    Validation { field: String, message: String },

    #[error("report not found for task id '{0}'")]
    ReportNotFound(String),

    #[error("report {0} not in pending status")]
    ReportNotPending(Uuid),

    #[error("issue {0} not found")]
    IssueNotFound(Uuid),

    #[error("invalid issue transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("write conflict, retry the operation: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl CurbwatchError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Domain errors are expected business outcomes; everything else is
    /// infrastructure and crosses the boundary as a generic failure.
    pub fn is_domain(&self) -> bool {
        !matches!(
            self,
            CurbwatchError::Database(_) | CurbwatchError::Config(_) | CurbwatchError::Anyhow(_)
        )
    }
}
