//! Market data aggregation for perpgate.
//!
//! - [`MarketDataAggregator`]: concurrent, partial-failure tolerant snapshot
//!   of twelve REST sources plus a trade refresh
//! - [`RollingTradeCache`]: bounded trade tape queried by time window
//! - [`TradeRefresher`]: throttled fetch into the cache and its periodic loop

pub mod aggregator;
pub mod error;
pub mod trade_cache;
pub mod trade_refresh;

pub use aggregator::{
    AggregatorConfig, DataSource, MarketDataAggregator, MarketSnapshot, SourceFailure,
};
pub use error::{FeedError, FeedResult};
pub use trade_cache::{
    CachedTrade, RollingTradeCache, DEFAULT_TRADE_CAPACITY, WINDOW_10M, WINDOW_20M, WINDOW_5M,
};
pub use trade_refresh::{TradeRefreshConfig, TradeRefresher};
