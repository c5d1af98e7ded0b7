//! Domain types shared by the gateway, the engine and the CLI

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::errors::OpsError;

/// Wallet inside one exchange account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AccountType {
    Spot,
    Margin,
    Funding,
}

impl AccountType {
    pub const ALL: [AccountType; 3] = [AccountType::Spot, AccountType::Margin, AccountType::Funding];
}

impl std::fmt::Display for AccountType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccountType::Spot => write!(f, "SPOT"),
            AccountType::Margin => write!(f, "MARGIN"),
            AccountType::Funding => write!(f, "FUNDING"),
        }
    }
}

impl FromStr for AccountType {
    type Err = OpsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "SPOT" => Ok(AccountType::Spot),
            "MARGIN" => Ok(AccountType::Margin),
            "FUNDING" => Ok(AccountType::Funding),
            other => Err(OpsError::Validation(format!(
                "invalid account type: {}, supported: SPOT, MARGIN, FUNDING",
                other
            ))),
        }
    }
}

/// Order side (buy or sell)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

impl FromStr for Side {
    type Err = OpsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "BUY" => Ok(Side::Buy),
            "SELL" => Ok(Side::Sell),
            other => Err(OpsError::Validation(format!(
                "order side must be BUY or SELL, got {}",
                other
            ))),
        }
    }
}

/// Order type accepted by the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderType {
    Market,
    Limit,
}

impl std::fmt::Display for OrderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderType::Market => write!(f, "MARKET"),
            OrderType::Limit => write!(f, "LIMIT"),
        }
    }
}

/// One asset line of a balance query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceEntry {
    pub asset: String,
    /// Freely usable amount
    pub free: Decimal,
    /// Amount held by open orders or other locks
    #[serde(default)]
    pub locked: Decimal,
    /// Borrowed amount (margin account only, zero elsewhere)
    #[serde(default)]
    pub borrowed: Decimal,
}

impl BalanceEntry {
    pub fn new(asset: impl Into<String>, free: Decimal) -> Self {
        Self {
            asset: asset.into(),
            free,
            locked: Decimal::ZERO,
            borrowed: Decimal::ZERO,
        }
    }

    pub fn with_borrowed(mut self, borrowed: Decimal) -> Self {
        self.borrowed = borrowed;
        self
    }
}

/// Find the entry for `asset` in a balance listing
pub fn find_balance<'a>(entries: &'a [BalanceEntry], asset: &str) -> Option<&'a BalanceEntry> {
    entries.iter().find(|entry| entry.asset == asset)
}

/// Free balance of `asset`, zero when the listing has no entry for it
pub fn free_balance(entries: &[BalanceEntry], asset: &str) -> Decimal {
    find_balance(entries, asset)
        .map(|entry| entry.free)
        .unwrap_or(Decimal::ZERO)
}

/// Lot-size rule of a symbol: valid quantities are multiples of
/// `step_size` no smaller than `min_quantity`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradingRule {
    pub min_quantity: Decimal,
    pub step_size: Decimal,
}

impl TradingRule {
    pub fn new(min_quantity: Decimal, step_size: Decimal) -> Self {
        Self {
            min_quantity,
            step_size,
        }
    }
}

/// Open crypto-loan position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanPosition {
    pub loan_coin: String,
    pub total_debt: Decimal,
    #[serde(default)]
    pub collateral_coin: Option<String>,
    #[serde(default)]
    pub collateral_amount: Option<Decimal>,
}

/// Parameters of one collateralized borrow
#[derive(Debug, Clone, PartialEq)]
pub struct BorrowRequest {
    pub loan_coin: String,
    pub loan_amount: Option<Decimal>,
    pub collateral_coin: String,
    pub collateral_amount: Option<Decimal>,
}

/// Result of a borrow the exchange processed
#[derive(Debug, Clone, PartialEq)]
pub struct BorrowReceipt {
    pub loan_coin: String,
    pub loan_amount: Decimal,
    /// Exchange-side status string, e.g. "Succeeds", "Failed", "Processing"
    pub status: String,
}

impl BorrowReceipt {
    pub fn succeeded(&self) -> bool {
        self.status.eq_ignore_ascii_case("succeeds")
    }
}

/// Immutable order description handed to the gateway
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub quantity: Decimal,
    /// Limit price, required for limit orders (good till cancelled)
    pub price: Option<Decimal>,
}

impl OrderRequest {
    pub fn market(symbol: impl Into<String>, side: Side, quantity: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            order_type: OrderType::Market,
            quantity,
            price: None,
        }
    }

    pub fn limit(symbol: impl Into<String>, side: Side, quantity: Decimal, price: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            order_type: OrderType::Limit,
            quantity,
            price: Some(price),
        }
    }
}

/// Acknowledgement of a placed order
#[derive(Debug, Clone, PartialEq)]
pub struct OrderAck {
    pub order_id: u64,
    pub status: String,
    pub executed_quantity: Decimal,
}

/// Acknowledgement of a wallet-to-wallet transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferReceipt {
    pub tran_id: u64,
}

/// Acknowledgement of a cross-margin borrow
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarginBorrowReceipt {
    pub asset: String,
    pub amount: Decimal,
    /// Exchange transaction id of the borrow
    pub tran_id: u64,
}

/// Wallet a withdrawal is paid from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalletType {
    Spot,
    Funding,
}

impl WalletType {
    /// Numeric `walletType` the exchange expects
    pub fn code(&self) -> u8 {
        match self {
            WalletType::Spot => 0,
            WalletType::Funding => 1,
        }
    }

    pub fn account(&self) -> AccountType {
        match self {
            WalletType::Spot => AccountType::Spot,
            WalletType::Funding => AccountType::Funding,
        }
    }
}

impl TryFrom<AccountType> for WalletType {
    type Error = OpsError;

    fn try_from(account: AccountType) -> Result<Self, Self::Error> {
        match account {
            AccountType::Spot => Ok(WalletType::Spot),
            AccountType::Funding => Ok(WalletType::Funding),
            AccountType::Margin => Err(OpsError::Validation(
                "withdrawals are paid from the SPOT or FUNDING wallet, not MARGIN".into(),
            )),
        }
    }
}

/// On-chain withdrawal to an external address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawRequest {
    pub coin: String,
    /// Chain to send on; the coin's default network when absent
    pub network: Option<String>,
    pub address: String,
    pub amount: Decimal,
    pub wallet: WalletType,
}

/// Withdrawal the exchange accepted for processing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawReceipt {
    pub id: String,
    pub coin: String,
    pub amount: Decimal,
}
