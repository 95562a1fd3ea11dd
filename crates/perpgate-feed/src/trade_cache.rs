//! Rolling trade-tape cache.
//!
//! Trades are keyed by exchange trade id, so overlapping fetches merge
//! idempotently. Size is bounded at insertion time: once an insert brings
//! the store to capacity, only the newest `capacity` trades are kept.

use crate::error::{FeedError, FeedResult};
use parking_lot::Mutex;
use perpgate_core::{parse_decimal, RecentTrade};
use perpgate_telemetry::Metrics;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

/// Reference capacity.
pub const DEFAULT_TRADE_CAPACITY: usize = 10_000;

/// Reference window granularities.
pub const WINDOW_5M: Duration = Duration::from_secs(5 * 60);
pub const WINDOW_10M: Duration = Duration::from_secs(10 * 60);
pub const WINDOW_20M: Duration = Duration::from_secs(20 * 60);

/// Trade-tape entry with parsed numerics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedTrade {
    pub id: i64,
    pub price: Decimal,
    pub quantity: Decimal,
    pub timestamp_ms: i64,
    /// Buyer was the maker, i.e. the aggressor sold.
    pub is_buyer_maker: bool,
}

impl CachedTrade {
    /// Aggressor bought.
    pub fn is_taker_buy(&self) -> bool {
        !self.is_buyer_maker
    }

    pub fn notional(&self) -> Decimal {
        self.price * self.quantity
    }
}

impl TryFrom<&RecentTrade> for CachedTrade {
    type Error = FeedError;

    fn try_from(trade: &RecentTrade) -> FeedResult<Self> {
        let invalid = |source| FeedError::InvalidTrade {
            id: trade.id,
            source,
        };
        Ok(Self {
            id: trade.id,
            price: parse_decimal("price", &trade.price).map_err(invalid)?,
            quantity: parse_decimal("qty", &trade.qty).map_err(invalid)?,
            timestamp_ms: trade.time,
            is_buyer_maker: trade.is_buyer_maker,
        })
    }
}

/// Bounded, time-queryable trade store.
///
/// All operations serialize on one mutex, so concurrent producers and
/// window readers see a linearized history.
pub struct RollingTradeCache {
    capacity: usize,
    trades: Mutex<HashMap<i64, CachedTrade>>,
}

impl RollingTradeCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            trades: Mutex::new(HashMap::with_capacity(capacity)),
        }
    }

    /// Merge `trades` by id, then compact to the newest `capacity` entries
    /// if the store reached capacity. Returns the resulting size.
    pub fn insert<I>(&self, trades: I) -> usize
    where
        I: IntoIterator<Item = CachedTrade>,
    {
        let mut store = self.trades.lock();
        for trade in trades {
            store.insert(trade.id, trade);
        }

        if store.len() >= self.capacity {
            let mut all: Vec<CachedTrade> = store.drain().map(|(_, t)| t).collect();
            // Newest first; id breaks timestamp ties.
            all.sort_unstable_by(|a, b| {
                b.timestamp_ms
                    .cmp(&a.timestamp_ms)
                    .then_with(|| b.id.cmp(&a.id))
            });
            all.truncate(self.capacity);
            store.extend(all.into_iter().map(|t| (t.id, t)));
        }

        let size = store.len();
        drop(store);

        Metrics::trade_cache_size(size);
        debug!(size, capacity = self.capacity, "Trade cache updated");
        size
    }

    /// Trades from the last `duration`, oldest first.
    pub fn window(&self, duration: Duration) -> Vec<CachedTrade> {
        self.window_at(duration, chrono::Utc::now().timestamp_millis())
    }

    /// `window` relative to an explicit `now_ms`.
    pub fn window_at(&self, duration: Duration, now_ms: i64) -> Vec<CachedTrade> {
        let span = i64::try_from(duration.as_millis()).unwrap_or(i64::MAX);
        let cutoff = now_ms.saturating_sub(span);

        let mut trades: Vec<CachedTrade> = self
            .trades
            .lock()
            .values()
            .filter(|t| t.timestamp_ms >= cutoff)
            .cloned()
            .collect();
        trades.sort_unstable_by(|a, b| {
            a.timestamp_ms
                .cmp(&b.timestamp_ms)
                .then_with(|| a.id.cmp(&b.id))
        });
        trades
    }

    pub fn get(&self, id: i64) -> Option<CachedTrade> {
        self.trades.lock().get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.trades.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.trades.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&self) {
        self.trades.lock().clear();
        Metrics::trade_cache_size(0);
    }
}

impl Default for RollingTradeCache {
    fn default() -> Self {
        Self::new(DEFAULT_TRADE_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    const NOW: i64 = 1_700_000_000_000;
    const MINUTE: i64 = 60_000;

    fn trade(id: i64, timestamp_ms: i64) -> CachedTrade {
        CachedTrade {
            id,
            price: dec!(3000),
            quantity: dec!(0.1),
            timestamp_ms,
            is_buyer_maker: false,
        }
    }

    #[test]
    fn test_capacity_keeps_newest() {
        let cache = RollingTradeCache::new(10_000);
        let size = cache.insert((0..10_001).map(|i| trade(i, NOW + i)));

        assert_eq!(size, 10_000);
        assert_eq!(cache.len(), 10_000);
        assert!(cache.get(0).is_none());
        assert!(cache.get(1).is_some());
        assert!(cache.get(10_000).is_some());
    }

    #[test]
    fn test_reinsert_updates_in_place() {
        let cache = RollingTradeCache::new(100);
        cache.insert([trade(1, NOW), trade(2, NOW)]);

        let mut updated = trade(1, NOW);
        updated.price = dec!(3100);
        assert_eq!(cache.insert([updated]), 2);
        assert_eq!(cache.get(1).unwrap().price, dec!(3100));
    }

    #[test]
    fn test_below_capacity_no_eviction() {
        let cache = RollingTradeCache::new(5);
        assert_eq!(cache.insert((0..4).map(|i| trade(i, NOW - i))), 4);
        assert!(cache.get(3).is_some());
    }

    #[test]
    fn test_window_filters_and_orders_ascending() {
        let cache = RollingTradeCache::new(100);
        cache.insert([
            trade(3, NOW - MINUTE),
            trade(1, NOW - 6 * MINUTE),
            trade(2, NOW - 4 * MINUTE),
        ]);

        let window = cache.window_at(WINDOW_5M, NOW);
        let ids: Vec<i64> = window.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![2, 3]);

        assert_eq!(cache.window_at(WINDOW_10M, NOW).len(), 3);
        assert!(cache.window_at(Duration::from_secs(30), NOW).is_empty());
    }

    #[test]
    fn test_window_includes_cutoff_boundary() {
        let cache = RollingTradeCache::new(100);
        cache.insert([trade(1, NOW - 5 * MINUTE)]);
        assert_eq!(cache.window_at(WINDOW_5M, NOW).len(), 1);
    }

    #[test]
    fn test_clear() {
        let cache = RollingTradeCache::default();
        cache.insert([trade(1, NOW)]);
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.capacity(), DEFAULT_TRADE_CAPACITY);
    }

    #[test]
    fn test_from_recent_trade() {
        let raw = RecentTrade {
            id: 7,
            price: "3000.5".into(),
            qty: "0.25".into(),
            quote_qty: "750.125".into(),
            time: NOW,
            is_buyer_maker: true,
        };
        let cached = CachedTrade::try_from(&raw).unwrap();
        assert_eq!(cached.price, dec!(3000.5));
        assert_eq!(cached.notional(), dec!(750.125));
        assert!(!cached.is_taker_buy());

        let bad = RecentTrade {
            price: "n/a".into(),
            ..raw
        };
        assert!(matches!(
            CachedTrade::try_from(&bad),
            Err(FeedError::InvalidTrade { id: 7, .. })
        ));
    }

    #[test]
    fn test_concurrent_writers_and_readers() {
        let cache = Arc::new(RollingTradeCache::new(1_000));
        let handles: Vec<_> = (0..4)
            .map(|w| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    for i in 0..500 {
                        cache.insert([trade(w * 500 + i, NOW + i)]);
                        let _ = cache.window_at(WINDOW_5M, NOW + i);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert!(cache.len() <= 1_000);
    }
}
