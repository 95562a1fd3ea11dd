//! Futures account read model (`GET /fapi/v2/account`).

use crate::decimal::parse_decimal;
use crate::error::Result;
use crate::position::Position;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Per-asset margin balances.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AssetBalance {
    pub asset: String,
    pub wallet_balance: String,
    pub unrealized_profit: String,
    pub margin_balance: String,
    pub maint_margin: String,
    pub initial_margin: String,
    pub available_balance: String,
    pub max_withdraw_amount: String,
    pub margin_available: bool,
    pub update_time: i64,
}

/// Account-level balances and margin totals.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AccountInfo {
    pub fee_tier: i64,
    pub can_trade: bool,
    pub can_deposit: bool,
    pub can_withdraw: bool,
    pub update_time: i64,
    pub total_initial_margin: String,
    pub total_maint_margin: String,
    pub total_wallet_balance: String,
    pub total_unrealized_profit: String,
    pub total_margin_balance: String,
    pub total_cross_wallet_balance: String,
    pub available_balance: String,
    pub max_withdraw_amount: String,
    pub assets: Vec<AssetBalance>,
    pub positions: Vec<Position>,
}

impl AccountInfo {
    pub fn available_balance(&self) -> Result<Decimal> {
        parse_decimal("availableBalance", &self.available_balance)
    }

    pub fn total_wallet_balance(&self) -> Result<Decimal> {
        parse_decimal("totalWalletBalance", &self.total_wallet_balance)
    }

    /// Balance entry for one margin asset (e.g. `USDT`).
    pub fn asset(&self, name: &str) -> Option<&AssetBalance> {
        self.assets.iter().find(|a| a.asset == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_account_decode_tolerates_missing_fields() {
        let body = r#"{
            "feeTier": 0,
            "canTrade": true,
            "totalWalletBalance": "1250.50",
            "availableBalance": "980.25",
            "assets": [{"asset": "USDT", "walletBalance": "1250.50", "marginAvailable": true}]
        }"#;
        let account: AccountInfo = serde_json::from_str(body).unwrap();
        assert!(account.can_trade);
        assert_eq!(account.available_balance().unwrap(), dec!(980.25));
        assert_eq!(account.total_wallet_balance().unwrap(), dec!(1250.50));
        assert!(account.asset("USDT").unwrap().margin_available);
        assert!(account.asset("BNB").is_none());
        assert!(account.positions.is_empty());
    }
}
