//! Common test utilities and fixtures
#![allow(dead_code)]

use async_trait::async_trait;
use binance_account_ops::common::errors::{OpsError, Result, NO_OPEN_ORDERS_CODE};
use binance_account_ops::common::traits::AccountGateway;
use binance_account_ops::common::types::{
    AccountType, BalanceEntry, BorrowReceipt, BorrowRequest, LoanPosition, MarginBorrowReceipt,
    OrderAck, OrderRequest, TradingRule, TransferReceipt, WithdrawReceipt, WithdrawRequest,
};
use binance_account_ops::config::types::{ConvergenceConfig, OrderConfig};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// Convergence settings with every delay set to zero
pub fn fast_convergence() -> ConvergenceConfig {
    ConvergenceConfig {
        initial_step: dec!(100),
        base_backoff_ms: 0,
        max_backoff_ms: 0,
        jitter_min_ms: 0,
        jitter_max_ms: 0,
        max_iterations: Some(500),
        ..ConvergenceConfig::default()
    }
}

pub fn fast_orders() -> OrderConfig {
    OrderConfig {
        transfer_confirm_delay_ms: 0,
        ..OrderConfig::default()
    }
}

/// Error the fake returns when a step exceeds its per-request cap
pub fn over_limit() -> OpsError {
    OpsError::Exchange {
        code: -3045,
        message: "The system does not have enough asset now.".into(),
    }
}

#[derive(Default)]
struct FakeState {
    balances: HashMap<(AccountType, String), Decimal>,
    margin_borrowed: HashMap<String, Decimal>,
    loan_debt: HashMap<String, Decimal>,
    rules: HashMap<String, TradingRule>,
    open_orders: HashMap<String, usize>,
    placed: Vec<OrderRequest>,
    withdrawals: Vec<WithdrawRequest>,
    /// Largest amount a single mutating call accepts
    step_cap: Option<Decimal>,
    /// Errors returned by the next mutating calls, in order
    scripted_failures: VecDeque<OpsError>,
    /// Errors returned by the next ground-truth queries, in order
    query_failures: VecDeque<OpsError>,
    order_error: Option<(i64, String)>,
    calls: HashMap<&'static str, usize>,
    next_id: u64,
}

/// In-memory account with exchange-like bookkeeping
#[derive(Default)]
pub struct FakeGateway {
    state: Mutex<FakeState>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_balance(self, account: AccountType, asset: &str, amount: Decimal) -> Self {
        self.state
            .lock()
            .unwrap()
            .balances
            .insert((account, asset.to_string()), amount);
        self
    }

    pub fn with_loan_debt(self, coin: &str, amount: Decimal) -> Self {
        self.state.lock().unwrap().loan_debt.insert(coin.to_string(), amount);
        self
    }

    pub fn with_rule(self, symbol: &str, min_quantity: Decimal, step_size: Decimal) -> Self {
        self.state
            .lock()
            .unwrap()
            .rules
            .insert(symbol.to_string(), TradingRule::new(min_quantity, step_size));
        self
    }

    pub fn with_open_orders(self, symbol: &str, count: usize) -> Self {
        self.state.lock().unwrap().open_orders.insert(symbol.to_string(), count);
        self
    }

    pub fn with_step_cap(self, cap: Decimal) -> Self {
        self.state.lock().unwrap().step_cap = Some(cap);
        self
    }

    pub fn with_failures(self, failures: Vec<OpsError>) -> Self {
        self.state.lock().unwrap().scripted_failures.extend(failures);
        self
    }

    pub fn with_query_failures(self, failures: Vec<OpsError>) -> Self {
        self.state.lock().unwrap().query_failures.extend(failures);
        self
    }

    pub fn rejecting_orders(self, code: i64, message: &str) -> Self {
        self.state.lock().unwrap().order_error = Some((code, message.to_string()));
        self
    }

    pub fn balance(&self, account: AccountType, asset: &str) -> Decimal {
        self.state
            .lock()
            .unwrap()
            .balances
            .get(&(account, asset.to_string()))
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    pub fn loan_debt(&self, coin: &str) -> Decimal {
        self.state.lock().unwrap().loan_debt.get(coin).copied().unwrap_or(Decimal::ZERO)
    }

    pub fn margin_borrowed(&self, asset: &str) -> Decimal {
        self.state
            .lock()
            .unwrap()
            .margin_borrowed
            .get(asset)
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    pub fn placed_orders(&self) -> Vec<OrderRequest> {
        self.state.lock().unwrap().placed.clone()
    }

    pub fn withdrawals(&self) -> Vec<WithdrawRequest> {
        self.state.lock().unwrap().withdrawals.clone()
    }

    pub fn calls(&self, method: &str) -> usize {
        self.state.lock().unwrap().calls.get(method).copied().unwrap_or(0)
    }
}

impl FakeState {
    fn record(&mut self, method: &'static str) {
        *self.calls.entry(method).or_insert(0) += 1;
    }

    /// Shared gate for mutating calls: scripted failures first, then the cap
    fn admit(&mut self, amount: Decimal) -> Result<()> {
        if let Some(err) = self.scripted_failures.pop_front() {
            return Err(err);
        }
        if let Some(cap) = self.step_cap {
            if amount > cap {
                return Err(over_limit());
            }
        }
        Ok(())
    }

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn balance_mut(&mut self, account: AccountType, asset: &str) -> &mut Decimal {
        self.balances.entry((account, asset.to_string())).or_insert(Decimal::ZERO)
    }
}

#[async_trait]
impl AccountGateway for FakeGateway {
    async fn query_balance(&self, account: AccountType, asset: Option<String>) -> Result<Vec<BalanceEntry>> {
        let mut state = self.state.lock().unwrap();
        state.record("query_balance");
        if let Some(err) = state.query_failures.pop_front() {
            return Err(err);
        }
        let mut entries: Vec<BalanceEntry> = state
            .balances
            .iter()
            .filter(|((acc, name), _)| *acc == account && asset.as_deref().map_or(true, |a| a == name))
            .map(|((_, name), free)| {
                let borrowed = if account == AccountType::Margin {
                    state.margin_borrowed.get(name).copied().unwrap_or(Decimal::ZERO)
                } else {
                    Decimal::ZERO
                };
                BalanceEntry::new(name.clone(), *free).with_borrowed(borrowed)
            })
            .collect();
        entries.sort_by(|a, b| a.asset.cmp(&b.asset));
        Ok(entries)
    }

    async fn query_trading_rule(&self, symbol: &str) -> Result<TradingRule> {
        let mut state = self.state.lock().unwrap();
        state.record("query_trading_rule");
        state.rules.get(symbol).copied().ok_or_else(|| OpsError::Exchange {
            code: -1121,
            message: "Invalid symbol.".into(),
        })
    }

    async fn query_loan_status(&self) -> Result<Vec<LoanPosition>> {
        let mut state = self.state.lock().unwrap();
        state.record("query_loan_status");
        if let Some(err) = state.query_failures.pop_front() {
            return Err(err);
        }
        Ok(state
            .loan_debt
            .iter()
            .map(|(coin, debt)| LoanPosition {
                loan_coin: coin.clone(),
                total_debt: *debt,
                collateral_coin: None,
                collateral_amount: None,
            })
            .collect())
    }

    async fn borrow(&self, request: &BorrowRequest) -> Result<BorrowReceipt> {
        let mut state = self.state.lock().unwrap();
        state.record("borrow");
        let amount = request
            .loan_amount
            .ok_or_else(|| OpsError::Validation("loan amount required".into()))?;
        state.admit(amount)?;
        *state.loan_debt.entry(request.loan_coin.clone()).or_insert(Decimal::ZERO) += amount;
        Ok(BorrowReceipt {
            loan_coin: request.loan_coin.clone(),
            loan_amount: amount,
            status: "Succeeds".into(),
        })
    }

    async fn margin_borrow(&self, asset: &str, amount: Decimal) -> Result<MarginBorrowReceipt> {
        let mut state = self.state.lock().unwrap();
        state.record("margin_borrow");
        state.admit(amount)?;
        *state.margin_borrowed.entry(asset.to_string()).or_insert(Decimal::ZERO) += amount;
        *state.balance_mut(AccountType::Margin, asset) += amount;
        let tran_id = state.next_id();
        Ok(MarginBorrowReceipt {
            asset: asset.to_string(),
            amount,
            tran_id,
        })
    }

    async fn transfer(&self, asset: &str, amount: Decimal, from: AccountType, to: AccountType) -> Result<TransferReceipt> {
        let mut state = self.state.lock().unwrap();
        state.record("transfer");
        state.admit(amount)?;
        let source = state.balance_mut(from, asset);
        if *source < amount {
            return Err(OpsError::Exchange {
                code: -5002,
                message: "You have insufficient balance.".into(),
            });
        }
        *source -= amount;
        *state.balance_mut(to, asset) += amount;
        let tran_id = state.next_id();
        Ok(TransferReceipt { tran_id })
    }

    async fn withdraw(&self, request: &WithdrawRequest) -> Result<WithdrawReceipt> {
        let mut state = self.state.lock().unwrap();
        state.record("withdraw");
        state.admit(request.amount)?;
        let source = state.balance_mut(request.wallet.account(), &request.coin);
        if *source < request.amount {
            return Err(OpsError::Exchange {
                code: -4026,
                message: "User has insufficient balance".into(),
            });
        }
        *source -= request.amount;
        state.withdrawals.push(request.clone());
        let id = state.next_id();
        Ok(WithdrawReceipt {
            id: format!("wd-{}", id),
            coin: request.coin.clone(),
            amount: request.amount,
        })
    }

    async fn place_order(&self, request: &OrderRequest) -> Result<OrderAck> {
        let mut state = self.state.lock().unwrap();
        state.record("place_order");
        if let Some((code, message)) = state.order_error.clone() {
            return Err(OpsError::Exchange { code, message });
        }
        state.placed.push(request.clone());
        *state.open_orders.entry(request.symbol.clone()).or_insert(0) += 1;
        let order_id = state.next_id();
        Ok(OrderAck {
            order_id,
            status: "NEW".into(),
            executed_quantity: Decimal::ZERO,
        })
    }

    async fn cancel_all_orders(&self, symbol: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.record("cancel_all_orders");
        match state.open_orders.remove(symbol) {
            Some(count) if count > 0 => Ok(()),
            _ => Err(OpsError::Exchange {
                code: NO_OPEN_ORDERS_CODE,
                message: "Unknown order sent.".into(),
            }),
        }
    }
}
