//! Helpers for the string-encoded decimals the exchange returns.
//!
//! Prices, quantities and rates arrive as JSON strings ("2345.67") so the
//! wire types keep them as `String` and convert on access.

use crate::error::{CoreError, Result};
use rust_decimal::Decimal;
use std::str::FromStr;

/// Parse a string-encoded decimal, naming the field in the error.
pub fn parse_decimal(field: &'static str, value: &str) -> Result<Decimal> {
    Decimal::from_str(value.trim()).map_err(|_| CoreError::InvalidDecimal {
        field,
        value: value.to_string(),
    })
}

/// Parse a string-encoded decimal, treating empty or malformed input as zero.
#[must_use]
pub fn parse_decimal_or_zero(value: &str) -> Decimal {
    Decimal::from_str(value.trim()).unwrap_or(Decimal::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_decimal() {
        assert_eq!(parse_decimal("price", "2345.67").unwrap(), dec!(2345.67));
        assert_eq!(parse_decimal("qty", " -0.010 ").unwrap(), dec!(-0.010));
    }

    #[test]
    fn test_parse_decimal_names_field() {
        let err = parse_decimal("markPrice", "").unwrap_err();
        assert!(err.to_string().contains("markPrice"));
    }

    #[test]
    fn test_parse_decimal_or_zero() {
        assert_eq!(parse_decimal_or_zero("1.5"), dec!(1.5));
        assert_eq!(parse_decimal_or_zero(""), Decimal::ZERO);
        assert_eq!(parse_decimal_or_zero("abc"), Decimal::ZERO);
    }
}
