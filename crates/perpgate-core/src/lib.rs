//! Core domain types for the perpgate exchange gateway.
//!
//! This crate provides the types shared by every other crate:
//! - `Symbol`, `KlineInterval`, `DepthLimit`: request vocabulary
//! - Read models decoded from exchange REST responses (ticker, klines, depth, ...)
//! - Order enums and `ClientOrderId` for idempotent order placement
//! - `PositionSnapshot` / `PositionInfo`: position state derived from `positionRisk`

pub mod account;
pub mod decimal;
pub mod error;
pub mod market;
pub mod order;
pub mod position;
pub mod types;

pub use account::{AccountInfo, AssetBalance};
pub use decimal::{parse_decimal, parse_decimal_or_zero};
pub use error::{CoreError, Result};
pub use market::{DepthLimit, KlineInterval, RatioPeriod, Symbol};
pub use order::{
    ClientOrderId, MarginType, NewOrder, Order, OrderSide, OrderStatus, OrderType, PositionSide,
    TimeInForce, UserTrade, WorkingType,
};
pub use position::{Position, PositionEntry, PositionInfo, PositionSnapshot};
pub use types::{
    BookTicker, Depth, DepthLevel, FundingRate, Income, Kline, LongShortRatio, MarkPrice,
    OpenInterest, RecentTrade, ServerTime, SymbolInfo, Ticker24h,
};
