use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlannerError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Tier limit exceeded: {0}")]
    TierLimit(String),

    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for PlannerError {
    fn from(err: std::io::Error) -> Self {
        PlannerError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for PlannerError {
    fn from(err: serde_json::Error) -> Self {
        PlannerError::Storage(err.to_string())
    }
}

impl From<uuid::Error> for PlannerError {
    fn from(err: uuid::Error) -> Self {
        PlannerError::Validation(err.to_string())
    }
}
