//! Binance wire types
//!
//! Numeric fields arrive as strings and are converted with
//! `parse_decimal` when mapped into domain types.

use serde::{Deserialize, Serialize};

use crate::common::decimal::parse_decimal;
use crate::common::errors::{OpsError, Result};
use crate::common::types::{AccountType, BalanceEntry, LoanPosition, TradingRule};

/// Error body returned on non-2xx responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: i64,
    pub msg: String,
}

/// Entry of `getUserAsset` and `get-funding-asset`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetBalance {
    pub asset: String,
    pub free: String,
    #[serde(default)]
    pub locked: Option<String>,
    #[serde(default)]
    pub freeze: Option<String>,
}

impl AssetBalance {
    pub fn into_entry(self) -> Result<BalanceEntry> {
        let mut entry = BalanceEntry::new(self.asset, parse_decimal(&self.free)?);
        if let Some(locked) = self.locked.or(self.freeze) {
            entry.locked = parse_decimal(&locked)?;
        }
        Ok(entry)
    }
}

/// Cross-margin account snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarginAccountResponse {
    pub user_assets: Vec<MarginAsset>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarginAsset {
    pub asset: String,
    pub free: String,
    #[serde(default)]
    pub locked: Option<String>,
    pub borrowed: String,
}

impl MarginAsset {
    pub fn into_entry(self) -> Result<BalanceEntry> {
        let mut entry = BalanceEntry::new(self.asset, parse_decimal(&self.free)?)
            .with_borrowed(parse_decimal(&self.borrowed)?);
        if let Some(locked) = self.locked {
            entry.locked = parse_decimal(&locked)?;
        }
        Ok(entry)
    }
}

/// `exchangeInfo` response, narrowed to symbol filters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeInfoResponse {
    pub symbols: Vec<SymbolInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolInfo {
    pub symbol: String,
    pub filters: Vec<serde_json::Value>,
}

impl ExchangeInfoResponse {
    /// Extract the LOT_SIZE filter of `symbol`
    pub fn lot_size(&self, symbol: &str) -> Result<TradingRule> {
        let info = self
            .symbols
            .iter()
            .find(|s| s.symbol == symbol)
            .ok_or_else(|| OpsError::InvalidResponse(format!("symbol {} not in exchangeInfo", symbol)))?;

        let filter = info
            .filters
            .iter()
            .find(|f| f.get("filterType").and_then(|t| t.as_str()) == Some("LOT_SIZE"))
            .ok_or_else(|| OpsError::InvalidResponse(format!("symbol {} has no LOT_SIZE filter", symbol)))?;

        let field = |name: &str| -> Result<String> {
            filter
                .get(name)
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .ok_or_else(|| OpsError::InvalidResponse(format!("LOT_SIZE filter missing {}", name)))
        };

        Ok(TradingRule::new(
            parse_decimal(&field("minQty")?)?,
            parse_decimal(&field("stepSize")?)?,
        ))
    }
}

/// Ongoing flexible loan orders
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoanOrdersResponse {
    #[serde(default)]
    pub rows: Vec<LoanOrderRow>,
    #[serde(default)]
    pub total: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoanOrderRow {
    pub loan_coin: String,
    pub total_debt: String,
    #[serde(default)]
    pub collateral_coin: Option<String>,
    #[serde(default)]
    pub collateral_amount: Option<String>,
}

impl LoanOrderRow {
    pub fn into_position(self) -> Result<LoanPosition> {
        Ok(LoanPosition {
            loan_coin: self.loan_coin,
            total_debt: parse_decimal(&self.total_debt)?,
            collateral_coin: self.collateral_coin,
            collateral_amount: self
                .collateral_amount
                .as_deref()
                .map(parse_decimal)
                .transpose()?,
        })
    }
}

/// Flexible loan borrow response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BorrowResponse {
    pub loan_coin: String,
    #[serde(default)]
    pub loan_amount: Option<String>,
    #[serde(default)]
    pub collateral_coin: Option<String>,
    #[serde(default)]
    pub collateral_amount: Option<String>,
    pub status: String,
}

/// Response of transfer and margin borrow endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranIdResponse {
    pub tran_id: u64,
}

/// Response of the withdraw apply endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawResponse {
    pub id: String,
}

/// New order acknowledgement
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOrderResponse {
    pub symbol: String,
    pub order_id: u64,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub executed_qty: Option<String>,
}

/// Universal transfer type for a wallet pair
pub fn transfer_type(from: AccountType, to: AccountType) -> Option<&'static str> {
    match (from, to) {
        (AccountType::Spot, AccountType::Margin) => Some("MAIN_MARGIN"),
        (AccountType::Margin, AccountType::Spot) => Some("MARGIN_MAIN"),
        (AccountType::Spot, AccountType::Funding) => Some("MAIN_FUNDING"),
        (AccountType::Funding, AccountType::Spot) => Some("FUNDING_MAIN"),
        (AccountType::Margin, AccountType::Funding) => Some("MARGIN_FUNDING"),
        (AccountType::Funding, AccountType::Margin) => Some("FUNDING_MARGIN"),
        _ => None,
    }
}
