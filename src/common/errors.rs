//! Error types for the engine

use thiserror::Error;

/// Result type alias using our EngineError
pub type Result<T> = std::result::Result<T, EngineError>;

/// Main error type for engine operations
#[derive(Error, Debug)]
pub enum EngineError {
    /// Malformed inputs (bad step schedule, out-of-range bps, zero max results...)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Supply lies beyond the final step of the curve
    #[error("Supply {supply} exceeds curve range (max {max_supply})")]
    RangeExceeded { supply: u64, max_supply: u64 },

    /// Trade amount exceeds what the curve can issue or redeem
    #[error("Requested {requested} tickets but only {available} available")]
    CapacityExceeded { requested: u64, available: u64 },

    /// A remote source could not be reached or has no data yet
    #[error("Source unavailable: {0}")]
    Unavailable(String),

    /// Data exists but is older than the freshness horizon
    #[error("Stale data: {0}")]
    Stale(String),

    /// One item in a batch failed
    #[error("Partial failure: {failed} of {total} items failed")]
    PartialFailure { failed: usize, total: usize },

    /// HTTP request errors
    #[error("HTTP request error: {0}")]
    HttpRequest(#[from] reqwest::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON parsing error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// WebSocket connection or communication errors
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// Authentication errors
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Invalid API response
    #[error("Invalid API response: {0}")]
    InvalidResponse(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Timeout errors
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Channel send errors
    #[error("Channel send error: {0}")]
    ChannelSend(String),

    /// Flow state could not be stored or loaded
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Whether the error may be absorbed at per-item granularity.
    ///
    /// Validation and curve-bound errors are caller bugs and always propagate.
    pub fn is_recoverable(&self) -> bool {
        match self {
            EngineError::Validation(_)
            | EngineError::RangeExceeded { .. }
            | EngineError::CapacityExceeded { .. }
            | EngineError::Configuration(_)
            | EngineError::Authentication(_) => false,
            EngineError::Unavailable(_)
            | EngineError::Stale(_)
            | EngineError::PartialFailure { .. }
            | EngineError::HttpRequest(_)
            | EngineError::JsonParse(_)
            | EngineError::WebSocket(_)
            | EngineError::InvalidResponse(_)
            | EngineError::Timeout(_)
            | EngineError::ChannelSend(_)
            | EngineError::Persistence(_)
            | EngineError::Internal(_) => true,
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for EngineError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        EngineError::WebSocket(err.to_string())
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::Persistence(err.to_string())
    }
}
