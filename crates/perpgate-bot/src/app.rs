//! Main application orchestration.
//!
//! Owns one client and wires it into:
//! - the trade refresher loop (keeps the rolling trade cache warm)
//! - the snapshot schedule (market data aggregation)
//! - the position poller (disarms the system once flat)

use crate::arm::ArmSwitch;
use crate::config::AppConfig;
use crate::error::AppResult;
use chrono::{DateTime, Utc};
use perpgate_core::PositionSnapshot;
use perpgate_feed::{
    MarketDataAggregator, MarketSnapshot, RollingTradeCache, SourceFailure, TradeRefresher,
};
use perpgate_gateway::{FuturesClient, HttpTransport};
use perpgate_position::PositionPoller;
use std::sync::Arc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Main application.
pub struct Application {
    config: AppConfig,
    client: FuturesClient,
    refresher: Arc<TradeRefresher>,
    aggregator: MarketDataAggregator,
    poller: PositionPoller,
    arm: Arc<ArmSwitch>,
}

impl Application {
    /// Create an application talking to the configured exchange.
    pub fn new(config: AppConfig) -> AppResult<Self> {
        let client = FuturesClient::new(config.credentials(), config.client_config())?;
        Ok(Self::with_client(config, client))
    }

    /// Create an application over a caller-supplied transport.
    pub fn with_transport(config: AppConfig, transport: Arc<dyn HttpTransport>) -> AppResult<Self> {
        let client =
            FuturesClient::with_transport(config.credentials(), config.client_config(), transport)?;
        Ok(Self::with_client(config, client))
    }

    fn with_client(config: AppConfig, client: FuturesClient) -> Self {
        let cache = Arc::new(RollingTradeCache::new(config.trade_cache.capacity));
        let refresher = Arc::new(TradeRefresher::new(
            client.clone(),
            cache,
            config.trade_refresh_config(),
        ));
        let aggregator = MarketDataAggregator::new(
            client.clone(),
            Arc::clone(&refresher),
            config.aggregator_config(),
        );
        let arm = Arc::new(ArmSwitch::default());
        let poller = PositionPoller::new(
            Arc::new(client.clone()),
            arm.clone(),
            config.poller_config(),
        );

        Self {
            config,
            client,
            refresher,
            aggregator,
            poller,
            arm,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn client(&self) -> &FuturesClient {
        &self.client
    }

    pub fn trade_cache(&self) -> &Arc<RollingTradeCache> {
        self.refresher.cache()
    }

    pub fn poller(&self) -> &PositionPoller {
        &self.poller
    }

    pub fn arm_switch(&self) -> &Arc<ArmSwitch> {
        &self.arm
    }

    /// Inside trading hours, or holding a position.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.config.trading_hours.is_trading_time(now) || self.arm.is_armed()
    }

    /// Set the arm switch from one positions fetch. A failed fetch leaves
    /// the system disarmed.
    pub async fn init_arm_state(&self) {
        match self.client.positions(&self.config.symbol).await {
            Ok(positions) => {
                let info = PositionSnapshot::from_positions(&positions)
                    .info(Utc::now().timestamp_millis());
                self.arm.update(&info);
                info!(
                    armed = self.arm.is_armed(),
                    has_long = info.has_long,
                    has_short = info.has_short,
                    "Initial arm state"
                );
            }
            Err(e) => {
                warn!(error = %e, "Initial position fetch failed, starting disarmed");
            }
        }
    }

    /// One scheduled step: take a snapshot if active and start the poller
    /// when it shows an open position.
    ///
    /// Returns `None` when skipped.
    pub async fn tick(&self, now: DateTime<Utc>) -> Option<(MarketSnapshot, Vec<SourceFailure>)> {
        if !self.is_active(now) {
            debug!("Outside trading hours with no position, skipping snapshot");
            return None;
        }

        let (snapshot, failures) = self.aggregator.snapshot().await;
        info!(
            symbol = %self.config.symbol,
            mark_price = snapshot.mark_price().map_or("-", |m| m.mark_price.as_str()),
            last_price = snapshot.ticker().map_or("-", |t| t.last_price.as_str()),
            klines = snapshot.klines().map_or(0, <[_]>::len),
            open_orders = snapshot.open_orders().map_or(0, <[_]>::len),
            trades_cached = self.trade_cache().len(),
            failed_sources = failures.len(),
            "Snapshot taken"
        );

        if let Some(info) = snapshot.position_info(now.timestamp_millis()) {
            if !info.is_flat() {
                match self.poller.start() {
                    Ok(true) => info!("Position open, poller started"),
                    Ok(false) => {}
                    Err(e) => error!(error = %e, "Failed to start position poller"),
                }
            }
            // After start: a run finishing flat disarms under the poller lock.
            self.arm.update(&info);
        }

        Some((snapshot, failures))
    }

    /// Run until `shutdown` is cancelled.
    pub async fn run_until(&self, shutdown: CancellationToken) -> AppResult<()> {
        info!(
            symbol = %self.config.symbol,
            environment = ?self.config.exchange.environment,
            snapshot_interval_mins = self.config.schedule.snapshot_interval_mins,
            "Starting application"
        );

        self.init_arm_state().await;

        let refresher_handle = {
            let refresher = Arc::clone(&self.refresher);
            let arm = Arc::clone(&self.arm);
            let hours = self.config.trading_hours.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                refresher
                    .run(
                        move || hours.is_trading_time(Utc::now()) || arm.is_armed(),
                        shutdown,
                    )
                    .await;
            })
        };

        let mut ticker = tokio::time::interval(self.config.schedule.snapshot_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    self.tick(Utc::now()).await;
                }
            }
        }

        info!("Shutting down");
        self.poller.stop();
        if let Err(e) = refresher_handle.await {
            warn!(error = %e, "Trade refresher task ended abnormally");
        }
        info!("Application stopped");
        Ok(())
    }

    /// Run until Ctrl-C.
    pub async fn run(&self) -> AppResult<()> {
        let shutdown = CancellationToken::new();
        let signal_task = {
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => {
                        info!("Shutdown signal received");
                        shutdown.cancel();
                    }
                    Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
                }
            })
        };

        let result = self.run_until(shutdown).await;
        signal_task.abort();
        result
    }
}
