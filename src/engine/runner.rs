//! Per-account action runner
//!
//! Every account runs in its own tokio task. Tasks share nothing but the
//! cancellation token, so one account's failure never touches another's.

use futures_util::future::join_all;
use rust_decimal::Decimal;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, Instrument};

use super::convergence::{ConvergenceEngine, ConvergenceReport};
use super::orders::{AssetOverview, CancelOutcome, OrderCoordinator, OrderOutcome, OrderReport};
use super::targets::{FlexibleLoanTarget, MarginLoanTarget, TransferTarget};
use crate::common::errors::{OpsError, Result};
use crate::common::traits::AccountGateway;
use crate::common::types::{AccountType, Side, TransferReceipt, WithdrawReceipt};
use crate::config::types::{ConvergenceConfig, OrderConfig};

/// One account and the gateway bound to its credentials
#[derive(Clone)]
pub struct AccountContext {
    pub id: String,
    pub gateway: Arc<dyn AccountGateway>,
    /// External address withdrawals of this account are sent to
    pub withdraw_address: Option<String>,
}

impl AccountContext {
    pub fn new(id: impl Into<String>, gateway: Arc<dyn AccountGateway>) -> Self {
        Self {
            id: id.into(),
            gateway,
            withdraw_address: None,
        }
    }

    pub fn with_withdraw_address(mut self, address: Option<String>) -> Self {
        self.withdraw_address = address;
        self
    }
}

/// Operation applied to every selected account
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    QueryAsset {
        asset: String,
    },
    FlexibleLoan {
        loan_coin: String,
        collateral_coin: String,
        amount: Decimal,
    },
    MarginLoan {
        asset: String,
        amount: Decimal,
    },
    ConvergeTransfer {
        asset: String,
        from: AccountType,
        to: AccountType,
        amount: Decimal,
    },
    MarketOrder {
        coin: String,
        side: Side,
        quantity: Option<Decimal>,
    },
    LimitOrder {
        coin: String,
        side: Side,
        price: Decimal,
        quantity: Option<Decimal>,
    },
    CancelOrders {
        coin: String,
    },
    Transfer {
        asset: String,
        amount: Decimal,
        from: AccountType,
        to: AccountType,
    },
    /// On-chain withdrawal to the account's configured address
    Withdraw {
        coin: String,
        network: Option<String>,
        /// Whole free balance of `wallet` when absent
        amount: Option<Decimal>,
        wallet: AccountType,
    },
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::QueryAsset { .. } => "query_asset",
            Action::FlexibleLoan { .. } => "flexible_loan",
            Action::MarginLoan { .. } => "margin_loan",
            Action::ConvergeTransfer { .. } => "converge_transfer",
            Action::MarketOrder { .. } => "market_order",
            Action::LimitOrder { .. } => "limit_order",
            Action::CancelOrders { .. } => "cancel_orders",
            Action::Transfer { .. } => "transfer",
            Action::Withdraw { .. } => "withdraw",
        }
    }
}

/// Tunables shared by all account tasks
#[derive(Debug, Clone, Default)]
pub struct ActionSettings {
    pub convergence: ConvergenceConfig,
    pub orders: OrderConfig,
}

/// What a successful action produced
#[derive(Debug, Clone)]
pub enum ActionOutcome {
    Asset(AssetOverview),
    Convergence(ConvergenceReport),
    Order(OrderReport),
    Cancel(CancelOutcome),
    Transfer(TransferReceipt),
    Withdraw(WithdrawReceipt),
}

impl fmt::Display for ActionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionOutcome::Asset(overview) => write!(f, "{}", overview),
            ActionOutcome::Convergence(report) => write!(
                f,
                "{:?} after {} iterations ({} ok, {} failed), applied {} of {}, remaining {}",
                report.status,
                report.iterations,
                report.successes,
                report.failures,
                report.applied_total,
                report.target,
                report.remaining
            ),
            ActionOutcome::Order(report) => match &report.outcome {
                OrderOutcome::Confirmed {
                    order_id,
                    status,
                    executed_quantity,
                } => write!(
                    f,
                    "{} {} {} {}: order {} {} (executed {})",
                    report.request.order_type,
                    report.request.side,
                    report.request.quantity,
                    report.request.symbol,
                    order_id,
                    status,
                    executed_quantity
                ),
                OrderOutcome::Rejected { reason } => write!(
                    f,
                    "{} {} {} {} rejected: {}",
                    report.request.order_type,
                    report.request.side,
                    report.request.quantity,
                    report.request.symbol,
                    reason
                ),
            },
            ActionOutcome::Cancel(CancelOutcome::Cancelled) => write!(f, "open orders cancelled"),
            ActionOutcome::Cancel(CancelOutcome::NothingToCancel) => write!(f, "no open orders"),
            ActionOutcome::Transfer(receipt) => write!(f, "transfer id {}", receipt.tran_id),
            ActionOutcome::Withdraw(receipt) => write!(
                f,
                "withdrawal {} of {} {} submitted",
                receipt.id, receipt.amount, receipt.coin
            ),
        }
    }
}

/// Result of one account's task
#[derive(Debug)]
pub struct AccountReport {
    pub account: String,
    pub result: Result<ActionOutcome>,
}

/// Run one action against one account
pub async fn execute_action(
    ctx: &AccountContext,
    action: &Action,
    settings: &ActionSettings,
    cancel: &CancellationToken,
) -> Result<ActionOutcome> {
    let coordinator = || OrderCoordinator::new(ctx.id.clone(), ctx.gateway.clone(), settings.orders.clone());
    let engine = || ConvergenceEngine::new(ctx.id.clone(), settings.convergence.clone());

    match action {
        Action::QueryAsset { asset } => coordinator().query_asset(asset).await.map(ActionOutcome::Asset),
        Action::FlexibleLoan {
            loan_coin,
            collateral_coin,
            amount,
        } => {
            let target = FlexibleLoanTarget::new(ctx.gateway.clone(), loan_coin.as_str(), collateral_coin.as_str(), *amount)?;
            engine()?.run(&target, cancel).await.map(ActionOutcome::Convergence)
        }
        Action::MarginLoan { asset, amount } => {
            let target = MarginLoanTarget::new(ctx.gateway.clone(), asset.as_str(), *amount)?;
            engine()?.run(&target, cancel).await.map(ActionOutcome::Convergence)
        }
        Action::ConvergeTransfer { asset, from, to, amount } => {
            let target = TransferTarget::new(ctx.gateway.clone(), asset.as_str(), *from, *to, *amount)?;
            engine()?.run(&target, cancel).await.map(ActionOutcome::Convergence)
        }
        Action::MarketOrder { coin, side, quantity } => coordinator()
            .submit_market(coin, *side, *quantity)
            .await
            .map(ActionOutcome::Order),
        Action::LimitOrder {
            coin,
            side,
            price,
            quantity,
        } => coordinator()
            .submit_limit(coin, *side, *price, *quantity)
            .await
            .map(ActionOutcome::Order),
        Action::CancelOrders { coin } => coordinator().cancel_all(coin).await.map(ActionOutcome::Cancel),
        Action::Transfer { asset, amount, from, to } => coordinator()
            .transfer_funds(asset, *amount, *from, *to)
            .await
            .map(ActionOutcome::Transfer),
        Action::Withdraw {
            coin,
            network,
            amount,
            wallet,
        } => coordinator()
            .withdraw(coin, network.as_deref(), *amount, ctx.withdraw_address.as_deref(), *wallet)
            .await
            .map(ActionOutcome::Withdraw),
    }
}

/// Run `action` on every account concurrently and wait for all of them
///
/// Account failures are logged and kept in the per-account report. A
/// panicked task is a structural error and is returned once every other
/// task has finished.
pub async fn run_accounts(
    contexts: Vec<AccountContext>,
    action: Action,
    settings: ActionSettings,
    cancel: CancellationToken,
) -> Result<Vec<AccountReport>> {
    if cancel.is_cancelled() {
        return Err(OpsError::Cancelled);
    }

    let action = Arc::new(action);
    let settings = Arc::new(settings);
    let ids: Vec<String> = contexts.iter().map(|c| c.id.clone()).collect();

    info!(accounts = contexts.len(), action = action.name(), "Dispatching action");

    let handles = contexts.into_iter().map(|ctx| {
        let action = action.clone();
        let settings = settings.clone();
        let cancel = cancel.clone();
        let span = info_span!("account", account = %ctx.id, action = action.name());
        tokio::spawn(
            async move {
                let result = execute_action(&ctx, &action, &settings, &cancel).await;
                match &result {
                    Ok(outcome) => info!(account = %ctx.id, "Action finished: {}", outcome),
                    Err(e) => error!(account = %ctx.id, error = %e, "Action failed"),
                }
                AccountReport {
                    account: ctx.id,
                    result,
                }
            }
            .instrument(span),
        )
    });

    let joined = join_all(handles).await;

    let mut reports = Vec::with_capacity(joined.len());
    let mut structural = None;
    for (id, joined) in ids.into_iter().zip(joined) {
        match joined {
            Ok(report) => reports.push(report),
            Err(e) => {
                error!(account = %id, error = %e, "Account task aborted");
                if structural.is_none() {
                    structural = Some(OpsError::Internal(format!("task for account {} aborted: {}", id, e)));
                }
            }
        }
    }

    match structural {
        Some(e) => Err(e),
        None => Ok(reports),
    }
}
