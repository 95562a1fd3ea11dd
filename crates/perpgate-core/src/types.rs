//! Market data read models decoded from the futures REST API.
//!
//! Numeric fields stay string-encoded exactly as the exchange sends them;
//! typed accessors parse on demand.

use crate::decimal::parse_decimal;
use crate::error::{CoreError, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Ticker
// ============================================================================

/// 24h rolling price statistics (`GET /fapi/v1/ticker/24hr`).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Ticker24h {
    pub symbol: String,
    pub price_change: String,
    pub price_change_percent: String,
    pub weighted_avg_price: String,
    pub last_price: String,
    pub last_qty: String,
    pub open_price: String,
    pub high_price: String,
    pub low_price: String,
    pub volume: String,
    pub quote_volume: String,
    pub open_time: i64,
    pub close_time: i64,
    pub first_id: i64,
    pub last_id: i64,
    pub count: i64,
}

impl Ticker24h {
    pub fn last_price(&self) -> Result<Decimal> {
        parse_decimal("lastPrice", &self.last_price)
    }

    pub fn price_change_percent(&self) -> Result<Decimal> {
        parse_decimal("priceChangePercent", &self.price_change_percent)
    }
}

/// Best bid/ask on the book (`GET /fapi/v1/ticker/bookTicker`).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BookTicker {
    pub symbol: String,
    pub bid_price: String,
    pub bid_qty: String,
    pub ask_price: String,
    pub ask_qty: String,
    pub time: i64,
}

impl BookTicker {
    /// Mid price, `None` if either side fails to parse.
    pub fn mid(&self) -> Option<Decimal> {
        let bid = parse_decimal("bidPrice", &self.bid_price).ok()?;
        let ask = parse_decimal("askPrice", &self.ask_price).ok()?;
        Some((bid + ask) / Decimal::TWO)
    }
}

// ============================================================================
// Klines
// ============================================================================

/// Minimum number of positional fields in a kline row.
const KLINE_ROW_LEN: usize = 12;

/// One candlestick.
///
/// The exchange encodes klines as heterogeneous arrays:
/// `[openTime, open, high, low, close, volume, closeTime, quoteVolume,
///   trades, takerBuyBase, takerBuyQuote, ignore]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Kline {
    pub open_time: i64,
    pub open: String,
    pub high: String,
    pub low: String,
    pub close: String,
    pub volume: String,
    pub close_time: i64,
    pub quote_volume: String,
    pub trade_count: i64,
    pub taker_buy_base_volume: String,
    pub taker_buy_quote_volume: String,
}

impl Kline {
    /// Decode one positional kline row.
    pub fn from_row(row: &[Value]) -> Result<Self> {
        if row.len() < KLINE_ROW_LEN {
            return Err(CoreError::InvalidKline(format!(
                "expected {KLINE_ROW_LEN} fields, got {}",
                row.len()
            )));
        }

        let int = |idx: usize| {
            row[idx]
                .as_i64()
                .ok_or_else(|| CoreError::InvalidKline(format!("field {idx} is not an integer")))
        };
        let text = |idx: usize| {
            row[idx]
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| CoreError::InvalidKline(format!("field {idx} is not a string")))
        };

        Ok(Self {
            open_time: int(0)?,
            open: text(1)?,
            high: text(2)?,
            low: text(3)?,
            close: text(4)?,
            volume: text(5)?,
            close_time: int(6)?,
            quote_volume: text(7)?,
            trade_count: int(8)?,
            taker_buy_base_volume: text(9)?,
            taker_buy_quote_volume: text(10)?,
        })
    }

    /// Decode a kline response, skipping malformed rows.
    ///
    /// The final row is the still-forming candle; it is dropped whenever more
    /// than one candle remains.
    #[must_use]
    pub fn decode_rows(rows: &[Vec<Value>]) -> Vec<Self> {
        let mut klines: Vec<Self> = rows
            .iter()
            .filter_map(|row| Self::from_row(row).ok())
            .collect();
        if klines.len() > 1 {
            klines.pop();
        }
        klines
    }

    pub fn close(&self) -> Result<Decimal> {
        parse_decimal("close", &self.close)
    }
}

// ============================================================================
// Depth
// ============================================================================

/// One price level of the order book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DepthLevel {
    pub price: String,
    pub quantity: String,
}

impl DepthLevel {
    pub fn price(&self) -> Result<Decimal> {
        parse_decimal("price", &self.price)
    }

    pub fn quantity(&self) -> Result<Decimal> {
        parse_decimal("quantity", &self.quantity)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDepth {
    #[serde(default)]
    last_update_id: i64,
    #[serde(default)]
    bids: Vec<Vec<String>>,
    #[serde(default)]
    asks: Vec<Vec<String>>,
}

/// Order book snapshot (`GET /fapi/v1/depth`).
///
/// Levels arrive as `[price, qty]` arrays; rows shorter than two entries are skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(from = "RawDepth")]
pub struct Depth {
    pub last_update_id: i64,
    pub bids: Vec<DepthLevel>,
    pub asks: Vec<DepthLevel>,
}

fn decode_levels(rows: Vec<Vec<String>>) -> Vec<DepthLevel> {
    rows.into_iter()
        .filter(|row| row.len() >= 2)
        .map(|mut row| {
            let quantity = row.swap_remove(1);
            let price = row.swap_remove(0);
            DepthLevel { price, quantity }
        })
        .collect()
}

impl From<RawDepth> for Depth {
    fn from(raw: RawDepth) -> Self {
        Self {
            last_update_id: raw.last_update_id,
            bids: decode_levels(raw.bids),
            asks: decode_levels(raw.asks),
        }
    }
}

impl Depth {
    pub fn best_bid(&self) -> Option<&DepthLevel> {
        self.bids.first()
    }

    pub fn best_ask(&self) -> Option<&DepthLevel> {
        self.asks.first()
    }
}

// ============================================================================
// Trades
// ============================================================================

/// Public trade-tape entry (`GET /fapi/v1/trades`).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecentTrade {
    pub id: i64,
    pub price: String,
    pub qty: String,
    pub quote_qty: String,
    pub time: i64,
    pub is_buyer_maker: bool,
}

// ============================================================================
// Mark price / funding / open interest
// ============================================================================

/// Mark and index price (`GET /fapi/v1/premiumIndex`).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MarkPrice {
    pub symbol: String,
    pub mark_price: String,
    pub index_price: String,
    pub est_settle_price: String,
    pub last_funding_rate: String,
    pub next_funding_time: i64,
    pub interest_rate: String,
    pub time: i64,
}

impl MarkPrice {
    pub fn mark_price(&self) -> Result<Decimal> {
        parse_decimal("markPrice", &self.mark_price)
    }

    pub fn last_funding_rate(&self) -> Result<Decimal> {
        parse_decimal("lastFundingRate", &self.last_funding_rate)
    }
}

/// Funding rate settlement record (`GET /fapi/v1/fundingRate`).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FundingRate {
    pub symbol: String,
    pub funding_rate: String,
    pub funding_time: i64,
    pub mark_price: String,
}

impl FundingRate {
    pub fn funding_rate(&self) -> Result<Decimal> {
        parse_decimal("fundingRate", &self.funding_rate)
    }
}

/// Open interest (`GET /fapi/v1/openInterest`).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OpenInterest {
    pub symbol: String,
    pub open_interest: String,
    pub time: i64,
}

/// Top-trader long/short ratio sample
/// (`GET /futures/data/topLongShortPositionRatio` and `.../topLongShortAccountRatio`).
///
/// For the position endpoint `long_account`/`short_account` are shares of
/// position size; for the account endpoint they are shares of accounts.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LongShortRatio {
    pub symbol: String,
    pub long_short_ratio: String,
    pub long_account: String,
    pub short_account: String,
    pub timestamp: i64,
}

impl LongShortRatio {
    pub fn ratio(&self) -> Result<Decimal> {
        parse_decimal("longShortRatio", &self.long_short_ratio)
    }
}

/// Account income record (`GET /fapi/v1/income`).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Income {
    pub symbol: String,
    /// `REALIZED_PNL`, `FUNDING_FEE`, `COMMISSION`, ...
    pub income_type: String,
    pub income: String,
    pub asset: String,
    pub info: String,
    pub time: i64,
    pub tran_id: i64,
    pub trade_id: String,
}

impl Income {
    pub fn amount(&self) -> Result<Decimal> {
        parse_decimal("income", &self.income)
    }
}

/// Contract metadata from `GET /fapi/v1/exchangeInfo`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SymbolInfo {
    pub symbol: String,
    pub status: String,
    pub contract_type: String,
    pub base_asset: String,
    pub quote_asset: String,
    pub margin_asset: String,
    pub price_precision: u32,
    pub quantity_precision: u32,
    pub order_types: Vec<String>,
}

impl SymbolInfo {
    pub fn is_trading(&self) -> bool {
        self.status == "TRADING"
    }
}

/// Exchange clock (`GET /fapi/v1/time`).
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerTime {
    pub server_time: i64,
}
