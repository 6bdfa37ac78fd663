use thiserror::Error;

pub type AdServeResult<T> = Result<T, AdServeError>;

/// Error taxonomy for the decision engine. Callers distinguish business
/// outcomes (plain results, never errors) from infrastructure failures by
/// variant, not by string matching.
#[derive(Error, Debug)]
pub enum AdServeError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Frequency cap exceeded: {0}")]
    CapExceeded(String),

    #[error("Upstream unavailable: {0}")]
    Unavailable(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AdServeError {
    /// True for failures worth retrying against the same request id.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AdServeError::Unavailable(_) | AdServeError::Io(_))
    }
}
