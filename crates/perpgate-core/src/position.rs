//! Position read model and derived position state.
//!
//! `Position` mirrors one row of `GET /fapi/v2/positionRisk`. The poller and
//! the aggregator reduce those rows into a `PositionSnapshot` and then into a
//! `PositionInfo`, which answers the only question the trading loop asks:
//! is anything still open, on which side, and for how long.

use crate::decimal::{parse_decimal, parse_decimal_or_zero};
use crate::error::Result;
use crate::order::PositionSide;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One position row as returned by the exchange.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Position {
    pub symbol: String,
    pub position_amt: String,
    pub entry_price: String,
    pub mark_price: String,
    #[serde(rename = "unRealizedProfit", alias = "unrealizedProfit")]
    pub unrealized_profit: String,
    pub liquidation_price: String,
    pub leverage: String,
    /// Lowercase on this endpoint (`cross` / `isolated`).
    pub margin_type: String,
    pub isolated_margin: String,
    pub position_side: PositionSide,
    pub notional: String,
    pub update_time: i64,
}

impl Position {
    pub fn position_amt(&self) -> Result<Decimal> {
        parse_decimal("positionAmt", &self.position_amt)
    }

    pub fn entry_price(&self) -> Result<Decimal> {
        parse_decimal("entryPrice", &self.entry_price)
    }
}

// ============================================================================
// Snapshot
// ============================================================================

/// Normalized position entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionEntry {
    pub symbol: String,
    pub side: PositionSide,
    /// Signed amount (negative for one-way shorts).
    pub amount: Decimal,
    pub unrealized_pnl: Decimal,
    pub update_time_ms: i64,
}

impl From<&Position> for PositionEntry {
    fn from(p: &Position) -> Self {
        Self {
            symbol: p.symbol.clone(),
            side: p.position_side,
            amount: parse_decimal_or_zero(&p.position_amt),
            unrealized_pnl: parse_decimal_or_zero(&p.unrealized_profit),
            update_time_ms: p.update_time,
        }
    }
}

/// All position entries for the traded symbol at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionSnapshot {
    pub entries: Vec<PositionEntry>,
}

impl PositionSnapshot {
    pub fn from_positions(positions: &[Position]) -> Self {
        Self {
            entries: positions.iter().map(PositionEntry::from).collect(),
        }
    }

    /// Entries matching `symbol` and `side`.
    pub fn matching<'a>(
        &'a self,
        symbol: &'a str,
        side: PositionSide,
    ) -> impl Iterator<Item = &'a PositionEntry> + 'a {
        self.entries
            .iter()
            .filter(move |e| e.symbol == symbol && e.side == side)
    }

    /// Derive open/closed state at `now_ms`.
    pub fn info(&self, now_ms: i64) -> PositionInfo {
        let mut info = PositionInfo::default();

        for entry in &self.entries {
            let amt = entry.amount.abs();
            if amt.is_zero() {
                continue;
            }

            let is_long = match entry.side {
                PositionSide::Long => true,
                PositionSide::Short => false,
                PositionSide::Both => entry.amount.is_sign_positive(),
            };
            if is_long {
                info.has_long = true;
                info.long_amt = amt;
            } else {
                info.has_short = true;
                info.short_amt = amt;
            }

            let held_ms = now_ms.saturating_sub(entry.update_time_ms).max(0);
            info.duration = Duration::from_millis(held_ms as u64);
            info.unrealized_pnl = entry.unrealized_pnl;
        }

        info
    }
}

/// Derived position state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionInfo {
    pub has_long: bool,
    pub has_short: bool,
    pub long_amt: Decimal,
    pub short_amt: Decimal,
    /// Time since the open position was last updated.
    pub duration: Duration,
    pub unrealized_pnl: Decimal,
}

impl PositionInfo {
    /// No long and no short position open.
    #[must_use]
    pub fn is_flat(&self) -> bool {
        !self.has_long && !self.has_short
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn position(side: PositionSide, amt: &str, pnl: &str, update_time: i64) -> Position {
        Position {
            symbol: "ETHUSDT".into(),
            position_amt: amt.into(),
            unrealized_profit: pnl.into(),
            position_side: side,
            update_time,
            ..Default::default()
        }
    }

    #[test]
    fn test_decode_position_risk_row() {
        let body = r#"[{
            "symbol": "ETHUSDT",
            "positionAmt": "0.050",
            "entryPrice": "2301.2",
            "markPrice": "2310.0",
            "unRealizedProfit": "0.44",
            "liquidationPrice": "0",
            "leverage": "10",
            "marginType": "cross",
            "isolatedMargin": "0.00000000",
            "isAutoAddMargin": "false",
            "positionSide": "LONG",
            "notional": "115.5",
            "updateTime": 1700000000000
        }]"#;
        let rows: Vec<Position> = serde_json::from_str(body).unwrap();
        assert_eq!(rows[0].position_side, PositionSide::Long);
        assert_eq!(rows[0].position_amt().unwrap(), dec!(0.050));
        assert_eq!(rows[0].unrealized_profit, "0.44");
    }

    #[test]
    fn test_hedge_mode_long_open() {
        let rows = vec![
            position(PositionSide::Long, "0.050", "1.25", 1_000),
            position(PositionSide::Short, "0.000", "0", 0),
        ];
        let info = PositionSnapshot::from_positions(&rows).info(61_000);
        assert!(info.has_long);
        assert!(!info.has_short);
        assert_eq!(info.long_amt, dec!(0.05));
        assert_eq!(info.duration, Duration::from_secs(60));
        assert_eq!(info.unrealized_pnl, dec!(1.25));
        assert!(!info.is_flat());
    }

    #[test]
    fn test_short_amount_is_absolute() {
        let rows = vec![position(PositionSide::Short, "-0.200", "-3.1", 0)];
        let info = PositionSnapshot::from_positions(&rows).info(0);
        assert!(info.has_short);
        assert_eq!(info.short_amt, dec!(0.2));
    }

    #[test]
    fn test_one_way_mode_uses_sign() {
        let long = PositionSnapshot::from_positions(&[position(PositionSide::Both, "1", "0", 0)]);
        assert!(long.info(0).has_long);

        let short = PositionSnapshot::from_positions(&[position(PositionSide::Both, "-1", "0", 0)]);
        let info = short.info(0);
        assert!(info.has_short);
        assert!(!info.has_long);
    }

    #[test]
    fn test_flat_and_unparsable_rows() {
        let rows = vec![
            position(PositionSide::Long, "0", "0", 0),
            position(PositionSide::Short, "", "", 0),
        ];
        let info = PositionSnapshot::from_positions(&rows).info(10);
        assert!(info.is_flat());
        assert_eq!(info.duration, Duration::ZERO);

        assert!(PositionSnapshot::default().info(0).is_flat());
    }

    #[test]
    fn test_future_update_time_clamps_duration() {
        let rows = vec![position(PositionSide::Long, "1", "0", 5_000)];
        let info = PositionSnapshot::from_positions(&rows).info(1_000);
        assert_eq!(info.duration, Duration::ZERO);
    }

    #[test]
    fn test_matching_filters_symbol_and_side() {
        let snapshot = PositionSnapshot::from_positions(&[
            position(PositionSide::Long, "1", "0", 0),
            position(PositionSide::Short, "-1", "0", 0),
        ]);
        assert_eq!(snapshot.matching("ETHUSDT", PositionSide::Long).count(), 1);
        assert_eq!(snapshot.matching("BTCUSDT", PositionSide::Long).count(), 0);
    }
}
