//! Error types for perpgate-core.

use thiserror::Error;

/// Core error types.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid decimal field {field}: {value:?}")]
    InvalidDecimal { field: &'static str, value: String },

    #[error("Invalid kline row: {0}")]
    InvalidKline(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
