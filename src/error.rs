use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Unknown identifier: {0}")]
    Identifier(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PipelineError {
    /// True when the store rejected a write because a unique or primary key already exists
    pub fn is_duplicate_key(&self) -> bool {
        match self {
            PipelineError::Database(err) => crate::store::is_unique_violation(err),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
