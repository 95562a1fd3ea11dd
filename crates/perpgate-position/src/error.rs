//! Position error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PositionError {
    #[error("Poller must be started from within a Tokio runtime: {0}")]
    NoRuntime(String),
}

pub type PositionResult<T> = Result<T, PositionError>;
