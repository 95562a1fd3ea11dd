//! Request vocabulary: symbols, kline intervals and depth limits.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Futures contract symbol (e.g. `ETHUSDT`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String")]
pub struct Symbol(String);

impl Symbol {
    /// The ETH/USDT perpetual, the default trading pair.
    pub const ETHUSDT: &'static str = "ETHUSDT";

    pub fn new(symbol: impl Into<String>) -> Self {
        Self(symbol.into().to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Symbol {
    fn default() -> Self {
        Self::new(Self::ETHUSDT)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Symbol {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl AsRef<str> for Symbol {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Kline (candlestick) interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum KlineInterval {
    #[serde(rename = "1m")]
    OneMinute,
    #[default]
    #[serde(rename = "3m")]
    ThreeMinutes,
    #[serde(rename = "5m")]
    FiveMinutes,
    #[serde(rename = "15m")]
    FifteenMinutes,
    #[serde(rename = "30m")]
    ThirtyMinutes,
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "4h")]
    FourHours,
    #[serde(rename = "1d")]
    OneDay,
}

impl KlineInterval {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OneMinute => "1m",
            Self::ThreeMinutes => "3m",
            Self::FiveMinutes => "5m",
            Self::FifteenMinutes => "15m",
            Self::ThirtyMinutes => "30m",
            Self::OneHour => "1h",
            Self::FourHours => "4h",
            Self::OneDay => "1d",
        }
    }
}

impl fmt::Display for KlineInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregation period of the long/short ratio endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RatioPeriod {
    #[serde(rename = "5m")]
    FiveMinutes,
    #[serde(rename = "15m")]
    FifteenMinutes,
    #[serde(rename = "30m")]
    ThirtyMinutes,
    #[default]
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "2h")]
    TwoHours,
    #[serde(rename = "4h")]
    FourHours,
    #[serde(rename = "6h")]
    SixHours,
    #[serde(rename = "12h")]
    TwelveHours,
    #[serde(rename = "1d")]
    OneDay,
}

impl RatioPeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FiveMinutes => "5m",
            Self::FifteenMinutes => "15m",
            Self::ThirtyMinutes => "30m",
            Self::OneHour => "1h",
            Self::TwoHours => "2h",
            Self::FourHours => "4h",
            Self::SixHours => "6h",
            Self::TwelveHours => "12h",
            Self::OneDay => "1d",
        }
    }
}

impl fmt::Display for RatioPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Order book depth levels accepted by the depth endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
pub enum DepthLimit {
    Five,
    Ten,
    #[default]
    Twenty,
    Fifty,
    Hundred,
    FiveHundred,
    Thousand,
}

impl DepthLimit {
    pub fn levels(&self) -> u16 {
        match self {
            Self::Five => 5,
            Self::Ten => 10,
            Self::Twenty => 20,
            Self::Fifty => 50,
            Self::Hundred => 100,
            Self::FiveHundred => 500,
            Self::Thousand => 1000,
        }
    }
}

impl From<DepthLimit> for u16 {
    fn from(limit: DepthLimit) -> Self {
        limit.levels()
    }
}

impl TryFrom<u16> for DepthLimit {
    type Error = String;

    fn try_from(levels: u16) -> Result<Self, Self::Error> {
        match levels {
            5 => Ok(Self::Five),
            10 => Ok(Self::Ten),
            20 => Ok(Self::Twenty),
            50 => Ok(Self::Fifty),
            100 => Ok(Self::Hundred),
            500 => Ok(Self::FiveHundred),
            1000 => Ok(Self::Thousand),
            other => Err(format!("unsupported depth limit {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_uppercases() {
        let symbol = Symbol::new("ethusdt");
        assert_eq!(symbol.as_str(), "ETHUSDT");
        assert_eq!(Symbol::default(), symbol);

        let parsed: Symbol = serde_json::from_str("\"btcusdt\"").unwrap();
        assert_eq!(parsed.as_str(), "BTCUSDT");
        assert_eq!(serde_json::to_string(&parsed).unwrap(), "\"BTCUSDT\"");
    }

    #[test]
    fn test_kline_interval_wire_names() {
        assert_eq!(KlineInterval::ThreeMinutes.as_str(), "3m");
        let parsed: KlineInterval = serde_json::from_str("\"4h\"").unwrap();
        assert_eq!(parsed, KlineInterval::FourHours);
    }

    #[test]
    fn test_ratio_period_wire_names() {
        assert_eq!(RatioPeriod::default().as_str(), "1h");
        let parsed: RatioPeriod = serde_json::from_str("\"12h\"").unwrap();
        assert_eq!(parsed, RatioPeriod::TwelveHours);
        assert!(serde_json::from_str::<RatioPeriod>("\"3m\"").is_err());
    }

    #[test]
    fn test_depth_limit_from_config_value() {
        let limit: DepthLimit = serde_json::from_str("20").unwrap();
        assert_eq!(limit, DepthLimit::Twenty);
        assert!(serde_json::from_str::<DepthLimit>("7").is_err());
    }
}
