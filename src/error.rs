use thiserror::Error;

#[derive(Debug, Error)]
pub enum GripError {
    /// Operation not allowed in the current run state
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Missing or malformed configuration value
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl GripError {
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        GripError::InvalidState(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        GripError::Configuration(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, GripError>;
