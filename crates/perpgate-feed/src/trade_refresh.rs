//! Periodic trade-tape refresh into the rolling cache.

use crate::trade_cache::{CachedTrade, RollingTradeCache};
use parking_lot::Mutex;
use perpgate_core::Symbol;
use perpgate_gateway::{FuturesClient, GatewayResult};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Trade refresh settings.
#[derive(Debug, Clone, Deserialize)]
pub struct TradeRefreshConfig {
    #[serde(default)]
    pub symbol: Symbol,
    /// Trades requested per fetch. Default: 1000 (exchange maximum).
    #[serde(default = "default_fetch_limit")]
    pub fetch_limit: u16,
    /// Minimum spacing between successful fetches (seconds). Default: 10.
    #[serde(default = "default_throttle_secs")]
    pub throttle_secs: u64,
    /// Loop period (seconds). Default: 150.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

fn default_fetch_limit() -> u16 {
    1_000
}

fn default_throttle_secs() -> u64 {
    10
}

fn default_interval_secs() -> u64 {
    150
}

impl Default for TradeRefreshConfig {
    fn default() -> Self {
        Self {
            symbol: Symbol::default(),
            fetch_limit: default_fetch_limit(),
            throttle_secs: default_throttle_secs(),
            interval_secs: default_interval_secs(),
        }
    }
}

impl TradeRefreshConfig {
    pub fn throttle(&self) -> Duration {
        Duration::from_secs(self.throttle_secs)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// Fetches recent trades and merges them into a `RollingTradeCache`.
pub struct TradeRefresher {
    client: FuturesClient,
    cache: Arc<RollingTradeCache>,
    config: TradeRefreshConfig,
    /// Time of the last successful fetch.
    last_success: Mutex<Option<Instant>>,
}

impl TradeRefresher {
    pub fn new(client: FuturesClient, cache: Arc<RollingTradeCache>, config: TradeRefreshConfig) -> Self {
        Self {
            client,
            cache,
            config,
            last_success: Mutex::new(None),
        }
    }

    pub fn cache(&self) -> &Arc<RollingTradeCache> {
        &self.cache
    }

    pub fn config(&self) -> &TradeRefreshConfig {
        &self.config
    }

    /// Fetch and merge recent trades.
    ///
    /// Returns `Ok(None)` without fetching when the last successful fetch is
    /// within the throttle window, otherwise the number of trades merged.
    /// Trades that fail to parse are skipped.
    pub async fn refresh(&self) -> GatewayResult<Option<usize>> {
        if self.is_throttled(Instant::now()) {
            debug!("Trade refresh throttled");
            return Ok(None);
        }

        let raw = self
            .client
            .recent_trades(&self.config.symbol, self.config.fetch_limit)
            .await?;

        let fetched = raw.len();
        let trades: Vec<CachedTrade> = raw
            .iter()
            .filter_map(|t| match CachedTrade::try_from(t) {
                Ok(trade) => Some(trade),
                Err(e) => {
                    warn!(error = %e, "Skipping malformed trade");
                    None
                }
            })
            .collect();
        let merged = trades.len();
        let size = self.cache.insert(trades);

        *self.last_success.lock() = Some(Instant::now());
        debug!(
            symbol = %self.config.symbol,
            fetched,
            merged,
            cache_size = size,
            "Trades refreshed"
        );
        Ok(Some(merged))
    }

    fn is_throttled(&self, now: Instant) -> bool {
        match *self.last_success.lock() {
            Some(last) => now.saturating_duration_since(last) <= self.config.throttle(),
            None => false,
        }
    }

    /// Refresh every interval until `shutdown` fires.
    ///
    /// While `is_active()` is false the cache is cleared instead of refreshed.
    pub async fn run<F>(&self, is_active: F, shutdown: CancellationToken)
    where
        F: Fn() -> bool + Send + Sync,
    {
        info!(
            symbol = %self.config.symbol,
            interval_secs = self.config.interval_secs,
            throttle_secs = self.config.throttle_secs,
            "Trade refresher started"
        );

        let mut ticker = tokio::time::interval(self.config.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = shutdown.cancelled() => {
                    info!("Trade refresher stopped");
                    return;
                }
                _ = ticker.tick() => {}
            }

            if !is_active() {
                if !self.cache.is_empty() {
                    debug!("Inactive, clearing trade cache");
                }
                self.cache.clear();
                continue;
            }

            if let Err(e) = self.refresh().await {
                warn!(error = %e, "Trade refresh failed");
            }
        }
    }
}
