use crate::domain::planner::PlanError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
    #[error("Credential error: {0}")]
    Credential(String),
    #[error("{0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("Authentication expired. Please reconnect to Google Calendar. ({0})")]
    Authentication(String),
    #[error("{message} (http {status})")]
    Http { status: u16, message: String },
    #[error("network error: {0}")]
    Network(String),
}

impl From<PlanError> for InfraError {
    fn from(error: PlanError) -> Self {
        match error {
            PlanError::NotFound { .. } => Self::NotFound(error.to_string()),
            PlanError::Validation(message) => Self::Validation(message),
            PlanError::ReadOnly(_) | PlanError::NoPendingChange => Self::Validation(error.to_string()),
        }
    }
}

impl InfraError {
    pub fn is_authentication(&self) -> bool {
        matches!(self, Self::Authentication(_))
    }
}
