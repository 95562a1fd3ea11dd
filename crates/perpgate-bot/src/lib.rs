//! perpgate market data and position monitoring process.
//!
//! Composes the gateway, feed and position crates:
//! - Trade refresher keeping the rolling trade cache warm
//! - Scheduled market snapshots gated by trading hours
//! - Position poller that disarms the system once flat

pub mod app;
pub mod arm;
pub mod config;
pub mod error;

pub use app::Application;
pub use arm::ArmSwitch;
pub use config::AppConfig;
pub use error::{AppError, AppResult};
