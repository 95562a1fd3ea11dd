//! Bounded position history.

use chrono::{DateTime, Utc};
use perpgate_core::{PositionEntry, PositionSide, PositionSnapshot};
use std::collections::VecDeque;

/// Reference capacity.
pub const DEFAULT_HISTORY_CAPACITY: usize = 15;

/// One recorded poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRecord {
    pub snapshot: PositionSnapshot,
    pub recorded_at: DateTime<Utc>,
}

/// FIFO of recent snapshots; the oldest record is dropped once full.
#[derive(Debug, Clone)]
pub struct PositionHistory {
    capacity: usize,
    records: VecDeque<HistoryRecord>,
}

impl PositionHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            records: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, record: HistoryRecord) {
        self.records.push_back(record);
        while self.records.len() > self.capacity {
            self.records.pop_front();
        }
    }

    /// Records, oldest first.
    pub fn records(&self) -> Vec<HistoryRecord> {
        self.records.iter().cloned().collect()
    }

    pub fn latest(&self) -> Option<&HistoryRecord> {
        self.records.back()
    }

    /// Entries for one symbol and side across all records, oldest first,
    /// each paired with the time its record was taken.
    pub fn entries_for(&self, symbol: &str, side: PositionSide) -> Vec<(DateTime<Utc>, PositionEntry)> {
        self.records
            .iter()
            .flat_map(|record| {
                record
                    .snapshot
                    .matching(symbol, side)
                    .map(move |entry| (record.recorded_at, entry.clone()))
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}

impl Default for PositionHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn record(n: i64) -> HistoryRecord {
        HistoryRecord {
            snapshot: PositionSnapshot {
                entries: vec![
                    PositionEntry {
                        symbol: "ETHUSDT".into(),
                        side: PositionSide::Long,
                        amount: dec!(0.5),
                        unrealized_pnl: rust_decimal::Decimal::from(n),
                        update_time_ms: n,
                    },
                    PositionEntry {
                        symbol: "ETHUSDT".into(),
                        side: PositionSide::Short,
                        amount: dec!(0),
                        unrealized_pnl: dec!(0),
                        update_time_ms: 0,
                    },
                ],
            },
            recorded_at: DateTime::from_timestamp_millis(n).unwrap(),
        }
    }

    #[test]
    fn test_fifo_eviction() {
        let mut history = PositionHistory::default();
        for n in 0..20 {
            history.push(record(n));
        }
        assert_eq!(history.len(), 15);
        assert_eq!(history.records()[0], record(5));
        assert_eq!(history.latest(), Some(&record(19)));
    }

    #[test]
    fn test_entries_for_filters_symbol_and_side() {
        let mut history = PositionHistory::new(3);
        history.push(record(1));
        history.push(record(2));

        let longs = history.entries_for("ETHUSDT", PositionSide::Long);
        assert_eq!(longs.len(), 2);
        assert_eq!(longs[0].1.update_time_ms, 1);
        assert_eq!(longs[1].0, DateTime::from_timestamp_millis(2).unwrap());

        assert_eq!(history.entries_for("ETHUSDT", PositionSide::Short).len(), 2);
        assert!(history.entries_for("BTCUSDT", PositionSide::Long).is_empty());
    }

    #[test]
    fn test_clear() {
        let mut history = PositionHistory::new(2);
        history.push(record(1));
        history.clear();
        assert!(history.is_empty());
        assert_eq!(history.capacity(), 2);
    }
}
