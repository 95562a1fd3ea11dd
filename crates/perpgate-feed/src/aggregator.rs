//! Concurrent market snapshot aggregation.
//!
//! `MarketDataAggregator::snapshot` fetches every source concurrently and
//! waits for all of them. A failing source never blocks or cancels the
//! others; its error is stored in place of its value.
//!
//! Sources are fetched independently, so fields of one snapshot are not
//! mutually consistent in time (ticker price and depth may be from slightly
//! different moments). Consumers deriving cross-source metrics must allow
//! for that.

use crate::trade_refresh::TradeRefresher;
use chrono::{DateTime, Utc};
use perpgate_core::{
    AccountInfo, BookTicker, Depth, DepthLimit, FundingRate, Kline, KlineInterval, MarkPrice,
    OpenInterest, Order, Position, PositionInfo, PositionSnapshot, Symbol, Ticker24h,
};
use perpgate_gateway::{FuturesClient, GatewayError, GatewayResult};
use perpgate_telemetry::Metrics;
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

// ============================================================================
// Sources
// ============================================================================

/// One independently fetched input of a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataSource {
    Ticker,
    Klines,
    Depth,
    Positions,
    Account,
    MarkPrice,
    FundingRate,
    FundingHistory,
    OpenInterest,
    OrderHistory,
    OpenOrders,
    BookTicker,
    RecentTrades,
}

impl DataSource {
    pub const ALL: [DataSource; 13] = [
        Self::Ticker,
        Self::Klines,
        Self::Depth,
        Self::Positions,
        Self::Account,
        Self::MarkPrice,
        Self::FundingRate,
        Self::FundingHistory,
        Self::OpenInterest,
        Self::OrderHistory,
        Self::OpenOrders,
        Self::BookTicker,
        Self::RecentTrades,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ticker => "ticker",
            Self::Klines => "klines",
            Self::Depth => "depth",
            Self::Positions => "positions",
            Self::Account => "account",
            Self::MarkPrice => "mark_price",
            Self::FundingRate => "funding_rate",
            Self::FundingHistory => "funding_history",
            Self::OpenInterest => "open_interest",
            Self::OrderHistory => "order_history",
            Self::OpenOrders => "open_orders",
            Self::BookTicker => "book_ticker",
            Self::RecentTrades => "recent_trades",
        }
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A source that failed during one snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFailure {
    pub source: DataSource,
    pub error: GatewayError,
}

impl fmt::Display for SourceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.source, self.error)
    }
}

// ============================================================================
// Snapshot
// ============================================================================

/// Best-effort view of market and account state.
///
/// Every field is an independent result; use the accessors, which return
/// `None` for a failed source.
#[derive(Debug, Clone)]
pub struct MarketSnapshot {
    pub taken_at: DateTime<Utc>,
    pub ticker: GatewayResult<Ticker24h>,
    pub klines: GatewayResult<Vec<Kline>>,
    pub depth: GatewayResult<Depth>,
    pub positions: GatewayResult<Vec<Position>>,
    pub account: GatewayResult<AccountInfo>,
    pub mark_price: GatewayResult<MarkPrice>,
    pub funding_rate: GatewayResult<FundingRate>,
    pub funding_history: GatewayResult<Vec<FundingRate>>,
    pub open_interest: GatewayResult<OpenInterest>,
    pub order_history: GatewayResult<Vec<Order>>,
    pub open_orders: GatewayResult<Vec<Order>>,
    pub book_ticker: GatewayResult<BookTicker>,
}

impl MarketSnapshot {
    pub fn ticker(&self) -> Option<&Ticker24h> {
        self.ticker.as_ref().ok()
    }

    pub fn klines(&self) -> Option<&[Kline]> {
        self.klines.as_deref().ok()
    }

    pub fn depth(&self) -> Option<&Depth> {
        self.depth.as_ref().ok()
    }

    pub fn positions(&self) -> Option<&[Position]> {
        self.positions.as_deref().ok()
    }

    pub fn account(&self) -> Option<&AccountInfo> {
        self.account.as_ref().ok()
    }

    pub fn mark_price(&self) -> Option<&MarkPrice> {
        self.mark_price.as_ref().ok()
    }

    pub fn funding_rate(&self) -> Option<&FundingRate> {
        self.funding_rate.as_ref().ok()
    }

    pub fn funding_history(&self) -> Option<&[FundingRate]> {
        self.funding_history.as_deref().ok()
    }

    pub fn open_interest(&self) -> Option<&OpenInterest> {
        self.open_interest.as_ref().ok()
    }

    pub fn order_history(&self) -> Option<&[Order]> {
        self.order_history.as_deref().ok()
    }

    pub fn open_orders(&self) -> Option<&[Order]> {
        self.open_orders.as_deref().ok()
    }

    pub fn book_ticker(&self) -> Option<&BookTicker> {
        self.book_ticker.as_ref().ok()
    }

    /// Failures among the twelve fetched sources.
    pub fn errors(&self) -> Vec<SourceFailure> {
        let results: [(DataSource, Option<&GatewayError>); 12] = [
            (DataSource::Ticker, self.ticker.as_ref().err()),
            (DataSource::Klines, self.klines.as_ref().err()),
            (DataSource::Depth, self.depth.as_ref().err()),
            (DataSource::Positions, self.positions.as_ref().err()),
            (DataSource::Account, self.account.as_ref().err()),
            (DataSource::MarkPrice, self.mark_price.as_ref().err()),
            (DataSource::FundingRate, self.funding_rate.as_ref().err()),
            (DataSource::FundingHistory, self.funding_history.as_ref().err()),
            (DataSource::OpenInterest, self.open_interest.as_ref().err()),
            (DataSource::OrderHistory, self.order_history.as_ref().err()),
            (DataSource::OpenOrders, self.open_orders.as_ref().err()),
            (DataSource::BookTicker, self.book_ticker.as_ref().err()),
        ];
        results
            .into_iter()
            .filter_map(|(source, err)| {
                err.map(|error| SourceFailure {
                    source,
                    error: error.clone(),
                })
            })
            .collect()
    }

    /// Whether every source succeeded.
    pub fn is_complete(&self) -> bool {
        self.errors().is_empty()
    }

    pub fn position_snapshot(&self) -> Option<PositionSnapshot> {
        self.positions().map(PositionSnapshot::from_positions)
    }

    /// Derived position state at `now_ms`; `None` if positions failed.
    pub fn position_info(&self, now_ms: i64) -> Option<PositionInfo> {
        self.position_snapshot().map(|s| s.info(now_ms))
    }
}

// ============================================================================
// Aggregator
// ============================================================================

/// Snapshot request parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct AggregatorConfig {
    #[serde(default)]
    pub symbol: Symbol,
    #[serde(default)]
    pub kline_interval: KlineInterval,
    /// Default: 71 (70 closed candles after the forming one is dropped).
    #[serde(default = "default_kline_limit")]
    pub kline_limit: u16,
    #[serde(default)]
    pub depth_limit: DepthLimit,
    #[serde(default = "default_funding_history_limit")]
    pub funding_history_limit: u16,
    #[serde(default = "default_order_history_limit")]
    pub order_history_limit: u16,
}

fn default_kline_limit() -> u16 {
    71
}

fn default_funding_history_limit() -> u16 {
    6
}

fn default_order_history_limit() -> u16 {
    15
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            symbol: Symbol::default(),
            kline_interval: KlineInterval::default(),
            kline_limit: default_kline_limit(),
            depth_limit: DepthLimit::default(),
            funding_history_limit: default_funding_history_limit(),
            order_history_limit: default_order_history_limit(),
        }
    }
}

/// Fans out one snapshot's worth of requests.
pub struct MarketDataAggregator {
    client: FuturesClient,
    trades: Arc<TradeRefresher>,
    config: AggregatorConfig,
}

impl MarketDataAggregator {
    pub fn new(client: FuturesClient, trades: Arc<TradeRefresher>, config: AggregatorConfig) -> Self {
        Self {
            client,
            trades,
            config,
        }
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    /// Fetch all sources concurrently and trigger a trade refresh.
    ///
    /// Always returns a snapshot. The failure list covers every failed
    /// source, including the trade refresh.
    pub async fn snapshot(&self) -> (MarketSnapshot, Vec<SourceFailure>) {
        let started = Instant::now();
        let cfg = &self.config;
        let symbol = &cfg.symbol;
        let client = &self.client;

        let (
            ticker,
            klines,
            depth,
            positions,
            account,
            mark_price,
            funding_rate,
            funding_history,
            open_interest,
            order_history,
            open_orders,
            book_ticker,
            trades,
        ) = tokio::join!(
            client.ticker_24h(symbol),
            client.klines(symbol, cfg.kline_interval, cfg.kline_limit),
            client.depth(symbol, cfg.depth_limit),
            client.positions(symbol),
            client.account_info(),
            client.mark_price(symbol),
            client.latest_funding_rate(symbol),
            client.funding_rate_history(symbol, cfg.funding_history_limit, None, None),
            client.open_interest(symbol),
            client.order_history(symbol, cfg.order_history_limit),
            client.open_orders(Some(symbol)),
            client.book_ticker(symbol),
            self.trades.refresh(),
        );

        let snapshot = MarketSnapshot {
            taken_at: Utc::now(),
            ticker,
            klines,
            depth,
            positions,
            account,
            mark_price,
            funding_rate,
            funding_history,
            open_interest,
            order_history,
            open_orders,
            book_ticker,
        };

        let mut failures = snapshot.errors();
        if let Err(error) = trades {
            failures.push(SourceFailure {
                source: DataSource::RecentTrades,
                error,
            });
        }

        for failure in &failures {
            Metrics::source_failed(failure.source.as_str());
            warn!(
                source = %failure.source,
                kind = %failure.error.kind,
                error = %failure.error,
                "Snapshot source failed"
            );
        }

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        Metrics::snapshot_latency(elapsed_ms);
        debug!(
            symbol = %symbol,
            failures = failures.len(),
            elapsed_ms = elapsed_ms as u64,
            "Snapshot taken"
        );

        (snapshot, failures)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trade_cache::RollingTradeCache;
    use crate::trade_refresh::TradeRefreshConfig;
    use perpgate_gateway::{ClientConfig, Credentials, ErrorKind, MockTransport};

    fn aggregator(mock: &Arc<MockTransport>) -> MarketDataAggregator {
        let config = ClientConfig {
            base_url: "https://fapi.test".into(),
            max_retries: 0,
            ..ClientConfig::default()
        };
        let client =
            FuturesClient::with_transport(Credentials::new("key", "secret"), config, mock.clone())
                .unwrap();
        let refresher = Arc::new(TradeRefresher::new(
            client.clone(),
            Arc::new(RollingTradeCache::default()),
            TradeRefreshConfig::default(),
        ));
        MarketDataAggregator::new(client, refresher, AggregatorConfig::default())
    }

    #[tokio::test]
    async fn test_partial_failure_keeps_other_sources() {
        let mock = Arc::new(MockTransport::new());
        mock.ok(
            "/fapi/v1/ticker/24hr",
            r#"{"symbol":"ETHUSDT","lastPrice":"3000.5"}"#,
        );
        mock.ok(
            "/fapi/v1/ticker/bookTicker",
            r#"{"symbol":"ETHUSDT","bidPrice":"3000","askPrice":"3001"}"#,
        );
        mock.api_error("/fapi/v2/account", 401, -2015, "Invalid API-key");
        mock.ok("/fapi/v1/trades", "[]");

        let (snapshot, failures) = aggregator(&mock).snapshot().await;

        assert_eq!(snapshot.ticker().unwrap().last_price, "3000.5");
        assert!(snapshot.book_ticker().is_some());
        assert!(snapshot.account().is_none());
        assert_eq!(
            snapshot.account.as_ref().unwrap_err().kind,
            ErrorKind::InvalidRequest
        );
        // Ticker, book ticker and the trade refresh succeeded.
        assert_eq!(failures.len(), 10);
        assert!(!failures.iter().any(|f| f.source == DataSource::Ticker));
        assert!(!failures.iter().any(|f| f.source == DataSource::RecentTrades));
        assert!(!snapshot.is_complete());
    }

    #[tokio::test]
    async fn test_every_source_requested_once() {
        let mock = Arc::new(MockTransport::new());
        aggregator(&mock).snapshot().await;

        let paths: Vec<String> = mock.requests().iter().map(|r| r.path()).collect();
        for path in [
            "/fapi/v1/ticker/24hr",
            "/fapi/v1/klines",
            "/fapi/v1/depth",
            "/fapi/v2/positionRisk",
            "/fapi/v2/account",
            "/fapi/v1/premiumIndex",
            "/fapi/v1/openInterest",
            "/fapi/v1/allOrders",
            "/fapi/v1/openOrders",
            "/fapi/v1/ticker/bookTicker",
            "/fapi/v1/trades",
        ] {
            assert_eq!(paths.iter().filter(|p| *p == path).count(), 1, "{path}");
        }
        // Latest rate and history share the endpoint.
        assert_eq!(paths.iter().filter(|p| *p == "/fapi/v1/fundingRate").count(), 2);
    }

    #[tokio::test]
    async fn test_trade_refresh_failure_reported() {
        let mock = Arc::new(MockTransport::new());
        mock.disconnect("/fapi/v1/trades");

        let (_, failures) = aggregator(&mock).snapshot().await;
        let trade_failure = failures
            .iter()
            .find(|f| f.source == DataSource::RecentTrades)
            .unwrap();
        assert_eq!(trade_failure.error.kind, ErrorKind::Disconnected);
        assert_eq!(failures.len(), DataSource::ALL.len());
    }

    #[tokio::test]
    async fn test_position_info_from_snapshot() {
        let mock = Arc::new(MockTransport::new());
        mock.ok(
            "/fapi/v2/positionRisk",
            r#"[
                {"symbol":"ETHUSDT","positionAmt":"0.5","positionSide":"LONG","unRealizedProfit":"12.5","updateTime":1000},
                {"symbol":"ETHUSDT","positionAmt":"0","positionSide":"SHORT","updateTime":0}
            ]"#,
        );

        let (snapshot, _) = aggregator(&mock).snapshot().await;
        let info = snapshot.position_info(61_000).unwrap();
        assert!(info.has_long);
        assert!(!info.has_short);
        assert_eq!(info.duration, std::time::Duration::from_secs(60));
    }
}
