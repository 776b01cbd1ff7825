//! Error types for Courier operations

/// Result type for Courier operations
pub type Result<T> = std::result::Result<T, CourierError>;

/// Error types for the relay engine
#[derive(Debug, thiserror::Error)]
pub enum CourierError {
    /// The completion provider returned a structured error payload
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// The completion provider answered with an unexpected shape
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Network failure, timeout, or non-2xx status without a usable body
    #[error("Transport error: {0}")]
    Transport(String),

    /// A turn could not be constructed (e.g. empty content)
    #[error("Invalid turn: {0}")]
    InvalidTurn(String),

    /// A completion request was rejected before being sent
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl CourierError {
    /// Short machine-readable label, used as a structured log field
    pub fn kind(&self) -> &'static str {
        match self {
            CourierError::Upstream(_) => "upstream",
            CourierError::MalformedResponse(_) => "malformed_response",
            CourierError::Transport(_) => "transport",
            CourierError::InvalidTurn(_) => "invalid_turn",
            CourierError::InvalidRequest(_) => "invalid_request",
            CourierError::Configuration(_) => "configuration",
            CourierError::Serialization(_) => "serialization",
            CourierError::Io(_) => "io",
            CourierError::Other(_) => "other",
        }
    }
}

impl From<String> for CourierError {
    fn from(s: String) -> Self {
        CourierError::Other(s)
    }
}

impl From<&str> for CourierError {
    fn from(s: &str) -> Self {
        CourierError::Other(s.to_string())
    }
}

impl From<anyhow::Error> for CourierError {
    fn from(err: anyhow::Error) -> Self {
        CourierError::Other(err.to_string())
    }
}
