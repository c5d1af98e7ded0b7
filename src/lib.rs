//! Binance Account Ops Library
//!
//! Multi-account Binance operations: adaptive convergence of loan and
//! balance targets, lot-size aware order sizing and an order lifecycle
//! coordinator, all behind a mockable account gateway.

pub mod binance;
pub mod common;
pub mod config;
pub mod engine;

// Re-export commonly used types
pub use binance::BinanceRestClient;
pub use common::errors::{OpsError, Result};
pub use common::traits::AccountGateway;
pub use common::types::{AccountType, BalanceEntry, OrderRequest, OrderType, Side, TradingRule};
pub use config::types::AppConfig;

pub use engine::{
    run_accounts, AccountContext, AccountReport, Action, ActionOutcome, ActionSettings, ConvergenceEngine,
    ConvergenceReport, ConvergenceStatus, OrderCoordinator, OrderOutcome,
};
