//! Trait definitions for exchange account access

use async_trait::async_trait;
use rust_decimal::Decimal;

use super::errors::Result;
use super::types::{
    AccountType, BalanceEntry, BorrowReceipt, BorrowRequest, LoanPosition, MarginBorrowReceipt,
    OrderAck, OrderRequest, TradingRule, TransferReceipt, WithdrawReceipt, WithdrawRequest,
};

/// Credential-bound handle to one exchange account
///
/// Query operations are idempotent. Mutating operations (borrow, transfer,
/// withdrawal, order placement) are not: a duplicate call performs the action twice, so
/// callers decide whether a failed call may be retried.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AccountGateway: Send + Sync {
    /// Balances of one wallet, optionally narrowed to a single asset
    async fn query_balance(
        &self,
        account: AccountType,
        asset: Option<String>,
    ) -> Result<Vec<BalanceEntry>>;

    /// Lot-size rule of a symbol pair such as "BTCUSDT"
    async fn query_trading_rule(&self, symbol: &str) -> Result<TradingRule>;

    /// Open flexible crypto-loan positions
    async fn query_loan_status(&self) -> Result<Vec<LoanPosition>>;

    /// Borrow against collateral
    async fn borrow(&self, request: &BorrowRequest) -> Result<BorrowReceipt>;

    /// Borrow inside the cross-margin account
    async fn margin_borrow(&self, asset: &str, amount: Decimal) -> Result<MarginBorrowReceipt>;

    /// Move funds between wallets of the same account
    async fn transfer(
        &self,
        asset: &str,
        amount: Decimal,
        from: AccountType,
        to: AccountType,
    ) -> Result<TransferReceipt>;

    /// Send funds on-chain to an external address
    async fn withdraw(&self, request: &WithdrawRequest) -> Result<WithdrawReceipt>;

    /// Submit an order
    async fn place_order(&self, request: &OrderRequest) -> Result<OrderAck>;

    /// Cancel every open order of a symbol
    ///
    /// An exchange "no open orders" answer surfaces as an `Exchange` error
    /// carrying `NO_OPEN_ORDERS_CODE`; callers decide how to treat it.
    async fn cancel_all_orders(&self, symbol: &str) -> Result<()>;
}
