//! Position poller state machine.
//!
//! `Idle -> Running -> Stopped`. While running, a background task fetches
//! positions every interval and records them. The run ends when a fetch shows
//! no open long or short (the poller disarms the system exactly once) or when
//! `stop()` cancels it (no disarm).
//!
//! Fetch errors are logged and skipped; they never disarm.

use crate::error::{PositionError, PositionResult};
use crate::history::{HistoryRecord, PositionHistory, DEFAULT_HISTORY_CAPACITY};
use chrono::Utc;
use parking_lot::Mutex;
use perpgate_core::{Position, PositionEntry, PositionInfo, PositionSide, PositionSnapshot, Symbol};
use perpgate_gateway::{BoxFuture, FuturesClient, GatewayResult};
use perpgate_telemetry::Metrics;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

// ============================================================================
// Seams
// ============================================================================

/// Where positions come from.
pub trait PositionSource: Send + Sync {
    fn fetch_positions<'a>(&'a self, symbol: &'a Symbol) -> BoxFuture<'a, GatewayResult<Vec<Position>>>;
}

impl PositionSource for FuturesClient {
    fn fetch_positions<'a>(&'a self, symbol: &'a Symbol) -> BoxFuture<'a, GatewayResult<Vec<Position>>> {
        Box::pin(self.positions(symbol))
    }
}

/// Puts the trading system into its non-trading state.
pub trait DisarmHandler: Send + Sync {
    fn disarm(&self, info: &PositionInfo);
}

impl<F> DisarmHandler for F
where
    F: Fn(&PositionInfo) + Send + Sync,
{
    fn disarm(&self, info: &PositionInfo) {
        self(info)
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Poller settings.
#[derive(Debug, Clone, Deserialize)]
pub struct PollerConfig {
    #[serde(default)]
    pub symbol: Symbol,
    /// Time between polls (seconds). Default: 180.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Snapshots retained. Default: 15.
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
}

fn default_interval_secs() -> u64 {
    180
}

fn default_history_capacity() -> usize {
    DEFAULT_HISTORY_CAPACITY
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            symbol: Symbol::default(),
            interval_secs: default_interval_secs(),
            history_capacity: default_history_capacity(),
        }
    }
}

impl PollerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

// ============================================================================
// Poller
// ============================================================================

/// Lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    /// Never started.
    Idle,
    Running,
    /// Stopped by `stop()` or by a flat position.
    Stopped,
}

struct PollerInner {
    state: PollerState,
    /// Cancellation for the current run; `Some` exactly while running.
    run_token: Option<CancellationToken>,
    history: PositionHistory,
}

/// Single-instance position poller.
pub struct PositionPoller {
    source: Arc<dyn PositionSource>,
    disarm: Arc<dyn DisarmHandler>,
    config: PollerConfig,
    inner: Arc<Mutex<PollerInner>>,
}

impl PositionPoller {
    pub fn new(
        source: Arc<dyn PositionSource>,
        disarm: Arc<dyn DisarmHandler>,
        config: PollerConfig,
    ) -> Self {
        let history = PositionHistory::new(config.history_capacity);
        Self {
            source,
            disarm,
            config,
            inner: Arc::new(Mutex::new(PollerInner {
                state: PollerState::Idle,
                run_token: None,
                history,
            })),
        }
    }

    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    /// Start polling.
    ///
    /// Returns `Ok(false)` if already running. Otherwise clears history,
    /// spawns the loop and returns `Ok(true)`.
    pub fn start(&self) -> PositionResult<bool> {
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|e| PositionError::NoRuntime(e.to_string()))?;

        let token = {
            let mut inner = self.inner.lock();
            if inner.state == PollerState::Running {
                debug!("Position poller already running");
                return Ok(false);
            }
            let token = CancellationToken::new();
            inner.state = PollerState::Running;
            inner.run_token = Some(token.clone());
            inner.history.clear();
            token
        };

        Metrics::poller_running(true);
        info!(
            symbol = %self.config.symbol,
            interval_secs = self.config.interval_secs,
            "Position poller started"
        );

        let run = PollRun {
            source: Arc::clone(&self.source),
            disarm: Arc::clone(&self.disarm),
            inner: Arc::clone(&self.inner),
            symbol: self.config.symbol.clone(),
            interval: self.config.interval(),
            token,
        };
        runtime.spawn(run.run());
        Ok(true)
    }

    /// Cancel the current run and clear history. No-op when not running,
    /// apart from clearing history.
    pub fn stop(&self) {
        let mut inner = self.inner.lock();
        if let Some(token) = inner.run_token.take() {
            token.cancel();
            inner.state = PollerState::Stopped;
            Metrics::poller_running(false);
            info!("Position poller stopped");
        }
        inner.history.clear();
    }

    pub fn state(&self) -> PollerState {
        self.inner.lock().state
    }

    pub fn is_running(&self) -> bool {
        self.state() == PollerState::Running
    }

    /// Recorded snapshots, oldest first.
    pub fn history(&self) -> Vec<HistoryRecord> {
        self.inner.lock().history.records()
    }

    /// History of one position, oldest first.
    pub fn history_for(&self, symbol: &str, side: PositionSide) -> Vec<(chrono::DateTime<Utc>, PositionEntry)> {
        self.inner.lock().history.entries_for(symbol, side)
    }
}

/// One run of the polling loop.
struct PollRun {
    source: Arc<dyn PositionSource>,
    disarm: Arc<dyn DisarmHandler>,
    inner: Arc<Mutex<PollerInner>>,
    symbol: Symbol,
    interval: Duration,
    token: CancellationToken,
}

impl PollRun {
    async fn run(self) {
        loop {
            if self.token.is_cancelled() {
                return;
            }

            // Runs to completion; cancellation is checked once it returns.
            let result = self.source.fetch_positions(&self.symbol).await;

            match result {
                Err(e) => {
                    if self.token.is_cancelled() {
                        return;
                    }
                    Metrics::position_poll("error");
                    warn!(error = %e, kind = %e.kind, "Position fetch failed");
                }
                Ok(positions) => {
                    let snapshot = PositionSnapshot::from_positions(&positions);
                    let now = Utc::now();
                    let info = snapshot.info(now.timestamp_millis());

                    if info.is_flat() {
                        self.finish_flat(&info);
                        return;
                    }
                    if !self.record(snapshot, now) {
                        return;
                    }

                    Metrics::position_poll("open");
                    info!(
                        has_long = info.has_long,
                        has_short = info.has_short,
                        long_amt = %info.long_amt,
                        short_amt = %info.short_amt,
                        unrealized_pnl = %info.unrealized_pnl,
                        held_secs = info.duration.as_secs(),
                        "Position polled"
                    );
                }
            }

            tokio::select! {
                () = self.token.cancelled() => {
                    debug!("Position poll loop cancelled");
                    return;
                }
                () = tokio::time::sleep(self.interval) => {}
            }
        }
    }

    /// Append to history unless this run was cancelled meanwhile.
    fn record(&self, snapshot: PositionSnapshot, now: chrono::DateTime<Utc>) -> bool {
        let mut inner = self.inner.lock();
        if self.token.is_cancelled() {
            return false;
        }
        inner.history.push(HistoryRecord {
            snapshot,
            recorded_at: now,
        });
        true
    }

    /// Transition to `Stopped` and disarm, unless this run was cancelled
    /// while the fetch was in flight.
    ///
    /// The handler runs under the poller lock so no `start()` can land
    /// between the transition and the disarm. It must not call back into
    /// the poller.
    fn finish_flat(&self, info: &PositionInfo) {
        let mut inner = self.inner.lock();
        if self.token.is_cancelled() {
            return;
        }
        self.token.cancel();
        inner.run_token = None;
        inner.state = PollerState::Stopped;

        Metrics::position_poll("flat");
        Metrics::poller_running(false);
        info!(symbol = %self.symbol, "No open position, stopping poller and disarming");
        self.disarm.disarm(info);
    }
}
