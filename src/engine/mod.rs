//! Engine module - account operations built on the gateway abstraction
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  run_accounts (one tokio task per account)                  │
//! ├─────────────────────────────────────────────────────────────┤
//! │  execute_action                                             │
//! │       │                                                     │
//! │       ├──► ConvergenceEngine ──► FlexibleLoanTarget         │
//! │       │                     ├──► MarginLoanTarget           │
//! │       │                     └──► TransferTarget             │
//! │       │                                                     │
//! │       └──► OrderCoordinator                                 │
//! │              prepare → sizing → submit → confirm/reject     │
//! └─────────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼
//!                  AccountGateway (REST or fake)
//! ```
//!
//! # Components
//!
//! - [`ConvergenceEngine`]: adaptive step loop toward a target amount
//! - [`ConvergenceTarget`]: what the engine observes and pushes
//! - [`OrderCoordinator`]: sizing, submission, cancellation, transfers and withdrawals
//! - [`compute_trade_quantity`]: lot-size aligned quantity from a balance
//! - [`run_accounts`]: concurrent fan-out over accounts

pub mod convergence;
pub mod orders;
pub mod runner;
pub mod sizing;
pub mod targets;

pub use convergence::{
    ConvergenceEngine, ConvergenceReport, ConvergenceStatus, ConvergenceTarget, RetryState, StepPolicy,
};
pub use orders::{
    AssetOverview, CancelOutcome, OrderCoordinator, OrderOutcome, OrderReport, OrderState, PreparedTrade,
};
pub use runner::{
    execute_action, run_accounts, AccountContext, AccountReport, Action, ActionOutcome, ActionSettings,
};
pub use sizing::{compute_trade_quantity, compute_trade_quantity_raw, validate_quantity};
pub use targets::{FlexibleLoanTarget, MarginLoanTarget, TransferTarget};
