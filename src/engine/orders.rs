//! Order lifecycle coordinator
//!
//! ```text
//! PREPARING ──► SIZED ──► SUBMITTED ──► CONFIRMED
//!                                   └─► REJECTED
//! ```
//!
//! Submissions are never retried here: the gateway does not deduplicate
//! orders, so a rejection is a terminal outcome handed back to the caller.

use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use super::sizing::{compute_trade_quantity, validate_quantity};
use crate::common::errors::{OpsError, Result};
use crate::common::traits::AccountGateway;
use crate::common::types::{
    free_balance, AccountType, OrderRequest, Side, TradingRule, TransferReceipt, WalletType,
    WithdrawReceipt, WithdrawRequest,
};
use crate::config::types::OrderConfig;

/// Lifecycle states traced for every order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderState {
    Preparing,
    Sized,
    Submitted,
    Confirmed,
    Rejected,
}

/// Terminal outcome of a submission
#[derive(Debug, Clone, PartialEq)]
pub enum OrderOutcome {
    Confirmed {
        order_id: u64,
        status: String,
        executed_quantity: Decimal,
    },
    Rejected {
        reason: String,
    },
}

impl OrderOutcome {
    pub fn state(&self) -> OrderState {
        match self {
            OrderOutcome::Confirmed { .. } => OrderState::Confirmed,
            OrderOutcome::Rejected { .. } => OrderState::Rejected,
        }
    }

    pub fn is_confirmed(&self) -> bool {
        matches!(self, OrderOutcome::Confirmed { .. })
    }
}

/// Result of a submission: the request that was sent and how it ended
#[derive(Debug, Clone, PartialEq)]
pub struct OrderReport {
    pub request: OrderRequest,
    pub outcome: OrderOutcome,
}

/// Result of `cancel_all`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    Cancelled,
    NothingToCancel,
}

/// Tradable quantity derived by `prepare`
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedTrade {
    pub coin: String,
    pub symbol: String,
    pub rule: TradingRule,
    pub spot_balance: Decimal,
    pub quantity: Decimal,
    /// Amount moved from funding to spot before sizing
    pub moved_from_funding: Decimal,
}

/// Free balance of one asset across the three wallets
///
/// `None` marks a wallet whose query failed.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetOverview {
    pub account: String,
    pub asset: String,
    pub spot: Option<Decimal>,
    pub funding: Option<Decimal>,
    pub margin: Option<Decimal>,
}

impl std::fmt::Display for AssetOverview {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let show = |v: Option<Decimal>| match v {
            Some(d) => d.normalize().to_string(),
            None => "query failed".to_string(),
        };
        let titles = ["SPOT", "FUNDING", "MARGIN"];
        let values = [show(self.spot), show(self.funding), show(self.margin)];
        let widths: Vec<usize> = titles
            .iter()
            .zip(values.iter())
            .map(|(t, v)| t.chars().count().max(v.chars().count()) + 4)
            .collect();

        let line = |left: char, mid: char, right: char| -> String {
            let segments: Vec<String> = widths.iter().map(|w| "─".repeat(*w)).collect();
            format!("{}{}{}", left, segments.join(mid.to_string().as_str()), right)
        };
        let row = |cells: &[String]| -> String {
            let padded: Vec<String> = cells
                .iter()
                .zip(widths.iter())
                .map(|(c, w)| format!("{:^width$}", c, width = *w))
                .collect();
            format!("│{}│", padded.join("│"))
        };
        let title_cells: Vec<String> = titles.iter().map(|t| t.to_string()).collect();

        writeln!(f, "Account {} | {} balances:", self.account, self.asset)?;
        writeln!(f, "{}", line('┌', '┬', '┐'))?;
        writeln!(f, "{}", row(&title_cells))?;
        writeln!(f, "{}", line('├', '┼', '┤'))?;
        writeln!(f, "{}", row(&values))?;
        write!(f, "{}", line('└', '┴', '┘'))
    }
}

/// Sizes, submits and cancels orders for one account
pub struct OrderCoordinator {
    account: String,
    gateway: Arc<dyn AccountGateway>,
    config: OrderConfig,
}

impl OrderCoordinator {
    pub fn new(account: impl Into<String>, gateway: Arc<dyn AccountGateway>, config: OrderConfig) -> Self {
        Self {
            account: account.into(),
            gateway,
            config,
        }
    }

    /// Move any funding balance of `coin` to spot, then derive the largest
    /// lot-size aligned quantity the spot balance allows
    #[instrument(skip(self), fields(account = %self.account))]
    pub async fn prepare(&self, coin: &str) -> Result<PreparedTrade> {
        if coin.trim().is_empty() {
            return Err(OpsError::Validation("coin must not be empty".into()));
        }
        debug!(state = ?OrderState::Preparing, coin, "Preparing trade");

        let funding = self
            .gateway
            .query_balance(AccountType::Funding, Some(coin.to_string()))
            .await?;
        let funding_free = free_balance(&funding, coin);

        let spot_balance = if funding_free > Decimal::ZERO {
            self.move_funding_to_spot(coin, funding_free).await?
        } else {
            debug!(coin, "No funding balance to move");
            let spot = self
                .gateway
                .query_balance(AccountType::Spot, Some(coin.to_string()))
                .await?;
            free_balance(&spot, coin)
        };

        let symbol = self.config.symbol_for(coin);
        let rule = self.gateway.query_trading_rule(&symbol).await?;
        let quantity = compute_trade_quantity(spot_balance, rule.step_size)?;
        if quantity < rule.min_quantity || quantity.is_zero() {
            return Err(OpsError::InsufficientBalance {
                asset: coin.to_string(),
                account: AccountType::Spot,
                available: quantity,
                required: rule.min_quantity,
            });
        }

        debug!(state = ?OrderState::Sized, %symbol, %quantity, "Trade sized");
        Ok(PreparedTrade {
            coin: coin.to_string(),
            symbol,
            rule,
            spot_balance,
            quantity,
            moved_from_funding: funding_free,
        })
    }

    /// Two-phase funding -> spot move: transfer, then read spot until the
    /// moved amount is visible. Returns the confirmed spot balance.
    async fn move_funding_to_spot(&self, coin: &str, amount: Decimal) -> Result<Decimal> {
        let before = self
            .gateway
            .query_balance(AccountType::Spot, Some(coin.to_string()))
            .await?;
        let expected = free_balance(&before, coin) + amount;

        self.gateway
            .transfer(coin, amount, AccountType::Funding, AccountType::Spot)
            .await?;
        info!(account = %self.account, %amount, coin, "Moved funding balance to spot");

        let attempts = self.config.transfer_confirm_attempts.max(1);
        let delay = Duration::from_millis(self.config.transfer_confirm_delay_ms);
        for attempt in 1..=attempts {
            let spot = self
                .gateway
                .query_balance(AccountType::Spot, Some(coin.to_string()))
                .await?;
            let observed = free_balance(&spot, coin);
            if observed >= expected {
                return Ok(observed);
            }
            debug!(attempt, %observed, %expected, "Transfer not yet visible in spot balance");
            if attempt < attempts && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }

        Err(OpsError::InvalidResponse(format!(
            "transfer of {} {} to spot not visible after {} reads",
            amount, coin, attempts
        )))
    }

    /// Resolve the quantity for a submission: explicit quantities are checked
    /// against the lot-size rule, SELL without quantity sells the whole spot balance
    async fn resolve_quantity(&self, coin: &str, side: Side, quantity: Option<Decimal>) -> Result<(String, Decimal)> {
        match (side, quantity) {
            (_, Some(quantity)) => {
                let symbol = self.config.symbol_for(coin);
                let rule = self.gateway.query_trading_rule(&symbol).await?;
                validate_quantity(quantity, &rule)?;
                Ok((symbol, quantity))
            }
            (Side::Sell, None) => {
                let prepared = self.prepare(coin).await?;
                Ok((prepared.symbol, prepared.quantity))
            }
            (Side::Buy, None) => Err(OpsError::Validation(
                "a BUY order needs an explicit quantity".into(),
            )),
        }
    }

    /// Submit a market order for `coin` against the quote asset
    #[instrument(skip(self), fields(account = %self.account))]
    pub async fn submit_market(&self, coin: &str, side: Side, quantity: Option<Decimal>) -> Result<OrderReport> {
        let (symbol, quantity) = self.resolve_quantity(coin, side, quantity).await?;
        self.submit(OrderRequest::market(symbol, side, quantity)).await
    }

    /// Submit a good-till-cancelled limit order
    #[instrument(skip(self), fields(account = %self.account))]
    pub async fn submit_limit(
        &self,
        coin: &str,
        side: Side,
        price: Decimal,
        quantity: Option<Decimal>,
    ) -> Result<OrderReport> {
        if price <= Decimal::ZERO {
            return Err(OpsError::Validation(format!("limit price must be positive, got {}", price)));
        }
        let (symbol, quantity) = self.resolve_quantity(coin, side, quantity).await?;
        self.submit(OrderRequest::limit(symbol, side, quantity, price)).await
    }

    async fn submit(&self, request: OrderRequest) -> Result<OrderReport> {
        debug!(state = ?OrderState::Submitted, symbol = %request.symbol, side = %request.side, quantity = %request.quantity, "Submitting order");

        let outcome = match self.gateway.place_order(&request).await {
            Ok(ack) => {
                info!(
                    account = %self.account,
                    symbol = %request.symbol,
                    side = %request.side,
                    order_type = %request.order_type,
                    quantity = %request.quantity,
                    order_id = ack.order_id,
                    "Order confirmed"
                );
                OrderOutcome::Confirmed {
                    order_id: ack.order_id,
                    status: ack.status,
                    executed_quantity: ack.executed_quantity,
                }
            }
            Err(e) => {
                warn!(account = %self.account, symbol = %request.symbol, error = %e, "Order rejected");
                OrderOutcome::Rejected { reason: e.to_string() }
            }
        };
        debug!(state = ?outcome.state(), "Order finished");
        Ok(OrderReport { request, outcome })
    }

    /// Cancel all open orders of `coin`; having none open counts as success
    #[instrument(skip(self), fields(account = %self.account))]
    pub async fn cancel_all(&self, coin: &str) -> Result<CancelOutcome> {
        if coin.trim().is_empty() {
            return Err(OpsError::Validation("coin must not be empty".into()));
        }
        let symbol = self.config.symbol_for(coin);
        match self.gateway.cancel_all_orders(&symbol).await {
            Ok(()) => {
                info!(account = %self.account, %symbol, "Cancelled open orders");
                Ok(CancelOutcome::Cancelled)
            }
            Err(e) if e.is_no_open_orders() => {
                info!(account = %self.account, %symbol, "No open orders to cancel");
                Ok(CancelOutcome::NothingToCancel)
            }
            Err(e) => Err(e),
        }
    }

    /// Move `amount` of `asset` between wallets after checking the source
    /// holds enough; an insufficient source fails without calling transfer
    #[instrument(skip(self), fields(account = %self.account))]
    pub async fn transfer_funds(
        &self,
        asset: &str,
        amount: Decimal,
        from: AccountType,
        to: AccountType,
    ) -> Result<TransferReceipt> {
        if asset.trim().is_empty() {
            return Err(OpsError::Validation("transfer asset must not be empty".into()));
        }
        if amount <= Decimal::ZERO {
            return Err(OpsError::Validation(format!("transfer amount must be positive, got {}", amount)));
        }
        if from == to {
            return Err(OpsError::Validation(format!(
                "source and destination account must differ, both are {}",
                from
            )));
        }

        let entries = self.gateway.query_balance(from, Some(asset.to_string())).await?;
        let available = free_balance(&entries, asset);
        if available < amount {
            return Err(OpsError::InsufficientBalance {
                asset: asset.to_string(),
                account: from,
                available,
                required: amount,
            });
        }

        let receipt = self.gateway.transfer(asset, amount, from, to).await?;
        info!(account = %self.account, %amount, asset, %from, %to, tran_id = receipt.tran_id, "Transfer completed");
        Ok(receipt)
    }

    /// Send `coin` on-chain to `address` from the spot or funding wallet
    ///
    /// Without an explicit amount the wallet's whole free balance is sent.
    /// Like orders, a withdrawal is submitted once and never retried.
    #[instrument(skip(self, address), fields(account = %self.account))]
    pub async fn withdraw(
        &self,
        coin: &str,
        network: Option<&str>,
        amount: Option<Decimal>,
        address: Option<&str>,
        wallet: AccountType,
    ) -> Result<WithdrawReceipt> {
        if coin.trim().is_empty() {
            return Err(OpsError::Validation("withdraw coin must not be empty".into()));
        }
        let wallet = WalletType::try_from(wallet)?;
        let address = match address.map(str::trim) {
            Some(address) if !address.is_empty() => address.to_string(),
            _ => {
                return Err(OpsError::Configuration(format!(
                    "account {} has no withdraw address",
                    self.account
                )))
            }
        };
        if let Some(amount) = amount {
            if amount <= Decimal::ZERO {
                return Err(OpsError::Validation(format!("withdraw amount must be positive, got {}", amount)));
            }
        }

        let source = wallet.account();
        let entries = self.gateway.query_balance(source, Some(coin.to_string())).await?;
        let available = free_balance(&entries, coin);
        let amount = amount.unwrap_or(available);
        if amount.is_zero() || available < amount {
            return Err(OpsError::InsufficientBalance {
                asset: coin.to_string(),
                account: source,
                available,
                required: amount,
            });
        }

        let request = WithdrawRequest {
            coin: coin.to_string(),
            network: network.map(str::to_string),
            address,
            amount,
            wallet,
        };
        let receipt = self.gateway.withdraw(&request).await?;
        info!(account = %self.account, %amount, coin, wallet = %source, id = %receipt.id, "Withdrawal submitted");
        Ok(receipt)
    }

    /// Free balance of `asset` in every wallet; a failed wallet query is
    /// reported in the overview instead of failing the whole call
    #[instrument(skip(self), fields(account = %self.account))]
    pub async fn query_asset(&self, asset: &str) -> Result<AssetOverview> {
        if asset.trim().is_empty() {
            return Err(OpsError::Validation("asset must not be empty".into()));
        }

        let mut overview = AssetOverview {
            account: self.account.clone(),
            asset: asset.to_string(),
            spot: None,
            funding: None,
            margin: None,
        };
        for account in AccountType::ALL {
            let value = match self.gateway.query_balance(account, Some(asset.to_string())).await {
                Ok(entries) => Some(free_balance(&entries, asset)),
                Err(e) => {
                    warn!(account = %self.account, wallet = %account, error = %e, "Balance query failed");
                    None
                }
            };
            match account {
                AccountType::Spot => overview.spot = value,
                AccountType::Funding => overview.funding = value,
                AccountType::Margin => overview.margin = value,
            }
        }
        Ok(overview)
    }
}
