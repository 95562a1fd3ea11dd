//! Position monitoring for perpgate.
//!
//! [`PositionPoller`] polls open positions on a fixed interval while a trade
//! is live, keeps a bounded [`PositionHistory`], and disarms the system
//! through a [`DisarmHandler`] once the position is flat.

pub mod error;
pub mod history;
pub mod poller;

pub use error::{PositionError, PositionResult};
pub use history::{HistoryRecord, PositionHistory, DEFAULT_HISTORY_CAPACITY};
pub use poller::{DisarmHandler, PollerConfig, PollerState, PositionPoller, PositionSource};
