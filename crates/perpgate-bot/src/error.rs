//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Client configuration error: {0}")]
    Client(#[from] perpgate_gateway::ConfigError),

    #[error("Position error: {0}")]
    Position(#[from] perpgate_position::PositionError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] perpgate_telemetry::TelemetryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;
