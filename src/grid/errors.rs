//! Grid-specific error types

use thiserror::Error;

/// Errors that can occur while planning, placing or cancelling a grid
#[derive(Error, Debug, Clone)]
pub enum GridError {
    #[error("Invalid grid request: {0}")]
    InvalidRequest(String),

    #[error("No grid level lies within the tradeable price range")]
    NoViableOrders,

    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The exchange refused the order because reduce-only is not applicable right now
    #[error("Invalid order ({code}): {message}")]
    InvalidOrder { code: i64, message: String },

    #[error("Exchange rejected request ({code}): {message}")]
    Exchange { code: i64, message: String },

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Operation not supported by exchange: {0}")]
    Unsupported(String),

    #[error("Asset not found: {0}")]
    AssetNotFound(String),

    #[error("A grid is already tracked for {0}; cancel it first")]
    GridAlreadyTracked(String),

    #[error("State persistence error: {0}")]
    StatePersistence(String),

    #[error("JSON parse error: {0}")]
    JsonParse(String),
}

impl GridError {
    /// Whether this is the reduce-only rejection that allows a plain retry
    pub fn is_invalid_order(&self) -> bool {
        matches!(self, GridError::InvalidOrder { .. })
    }
}

impl From<serde_json::Error> for GridError {
    fn from(err: serde_json::Error) -> Self {
        GridError::JsonParse(err.to_string())
    }
}

impl From<std::io::Error> for GridError {
    fn from(err: std::io::Error) -> Self {
        GridError::StatePersistence(err.to_string())
    }
}

impl From<reqwest::Error> for GridError {
    fn from(err: reqwest::Error) -> Self {
        GridError::Http(err.to_string())
    }
}

/// Result type for grid operations
pub type GridResult<T> = std::result::Result<T, GridError>;
