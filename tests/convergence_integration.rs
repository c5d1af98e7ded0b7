//! End-to-end convergence runs against the in-memory gateway

mod common;

use binance_account_ops::common::errors::OpsError;
use binance_account_ops::common::traits::AccountGateway;
use binance_account_ops::common::types::AccountType;
use binance_account_ops::engine::{
    run_accounts, AccountContext, Action, ActionOutcome, ActionSettings, ConvergenceEngine,
    ConvergenceStatus, FlexibleLoanTarget, MarginLoanTarget, TransferTarget,
};
use common::{fast_convergence, fast_orders, FakeGateway};
use pretty_assertions::assert_eq;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn engine() -> ConvergenceEngine {
    ConvergenceEngine::new("test", fast_convergence()).unwrap()
}

// ============================================================================
// Flexible loan
// ============================================================================

#[test_log::test(tokio::test)]
async fn test_flexible_loan_reaches_target_under_step_cap() {
    let fake = Arc::new(FakeGateway::new().with_step_cap(dec!(150)));
    let gateway: Arc<dyn AccountGateway> = fake.clone();
    let target = FlexibleLoanTarget::new(gateway, "FDUSD", "USDT", dec!(1000)).unwrap();

    let report = engine().run(&target, &CancellationToken::new()).await.unwrap();

    assert_eq!(report.status, ConvergenceStatus::Converged);
    assert_eq!(fake.loan_debt("FDUSD"), dec!(1000));
    assert_eq!(report.applied_total, dec!(1000));
    assert_eq!(report.remaining, Decimal::ZERO);
    assert!(report.failures > 0, "the cap should have rejected some steps");
}

#[tokio::test]
async fn test_flexible_loan_tops_up_existing_debt() {
    let fake = Arc::new(FakeGateway::new().with_loan_debt("FDUSD", dec!(400)));
    let gateway: Arc<dyn AccountGateway> = fake.clone();
    let target = FlexibleLoanTarget::new(gateway, "FDUSD", "USDT", dec!(1000)).unwrap();

    let report = engine().run(&target, &CancellationToken::new()).await.unwrap();

    assert_eq!(report.applied_total, dec!(600));
    assert_eq!(fake.loan_debt("FDUSD"), dec!(1000));
}

#[tokio::test]
async fn test_flexible_loan_already_at_target_borrows_nothing() {
    let fake = Arc::new(FakeGateway::new().with_loan_debt("FDUSD", dec!(1200)));
    let gateway: Arc<dyn AccountGateway> = fake.clone();
    let target = FlexibleLoanTarget::new(gateway, "FDUSD", "USDT", dec!(1000)).unwrap();

    let report = engine().run(&target, &CancellationToken::new()).await.unwrap();

    assert_eq!(report.status, ConvergenceStatus::AlreadyConverged);
    assert_eq!(fake.calls("borrow"), 0);
}

#[tokio::test]
async fn test_initial_sync_failure_is_retried() {
    let fake = Arc::new(
        FakeGateway::new().with_query_failures(vec![OpsError::Timeout("loan status".into())]),
    );
    let gateway: Arc<dyn AccountGateway> = fake.clone();
    let target = FlexibleLoanTarget::new(gateway, "FDUSD", "USDT", dec!(50)).unwrap();

    let report = engine().run(&target, &CancellationToken::new()).await.unwrap();

    assert_eq!(report.status, ConvergenceStatus::Converged);
    assert_eq!(report.failures, 1);
    assert_eq!(fake.loan_debt("FDUSD"), dec!(50));
}

#[tokio::test]
async fn test_credential_error_ends_run() {
    let fake = Arc::new(FakeGateway::new().with_failures(vec![OpsError::Exchange {
        code: -2015,
        message: "Invalid API-key, IP, or permissions for action.".into(),
    }]));
    let gateway: Arc<dyn AccountGateway> = fake.clone();
    let target = FlexibleLoanTarget::new(gateway, "FDUSD", "USDT", dec!(1000)).unwrap();

    let err = engine().run(&target, &CancellationToken::new()).await.unwrap_err();

    assert_eq!(err.exchange_code(), Some(-2015));
    assert_eq!(fake.loan_debt("FDUSD"), Decimal::ZERO);
}

#[tokio::test]
async fn test_invalid_symbol_ends_run_on_first_step() {
    let fake = Arc::new(FakeGateway::new().with_failures(vec![OpsError::Exchange {
        code: -1121,
        message: "Invalid symbol.".into(),
    }]));
    let gateway: Arc<dyn AccountGateway> = fake.clone();
    let target = MarginLoanTarget::new(gateway, "BTC", dec!(0.5)).unwrap();
    let config = binance_account_ops::config::types::ConvergenceConfig {
        max_iterations: None,
        ..fast_convergence()
    };

    let err = ConvergenceEngine::new("test", config)
        .unwrap()
        .run(&target, &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.exchange_code(), Some(-1121));
    assert_eq!(fake.calls("margin_borrow"), 1);
    assert_eq!(fake.margin_borrowed("BTC"), Decimal::ZERO);
}

#[tokio::test]
async fn test_cancelled_run_makes_no_step() {
    let fake = Arc::new(FakeGateway::new());
    let gateway: Arc<dyn AccountGateway> = fake.clone();
    let target = FlexibleLoanTarget::new(gateway, "FDUSD", "USDT", dec!(1000)).unwrap();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let report = engine().run(&target, &cancel).await.unwrap();

    assert_eq!(report.status, ConvergenceStatus::Cancelled);
    assert_eq!(fake.calls("borrow"), 0);
}

// ============================================================================
// Margin loan
// ============================================================================

#[tokio::test]
async fn test_margin_loan_absorbs_transient_failures() {
    let fake = Arc::new(FakeGateway::new().with_failures(vec![
        OpsError::Timeout("borrow-repay".into()),
        OpsError::RateLimit {
            message: "Too many requests".into(),
            retry_after_seconds: Some(1),
        },
    ]));
    let gateway: Arc<dyn AccountGateway> = fake.clone();
    let target = MarginLoanTarget::new(gateway, "BTC", dec!(0.5)).unwrap();

    let config = fast_convergence();
    let config = binance_account_ops::config::types::ConvergenceConfig {
        initial_step: dec!(0.1),
        min_step: dec!(0.001),
        ..config
    };
    let report = ConvergenceEngine::new("test", config)
        .unwrap()
        .run(&target, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.status, ConvergenceStatus::Converged);
    assert_eq!(report.failures, 2);
    assert_eq!(fake.margin_borrowed("BTC"), dec!(0.5));
}

// ============================================================================
// Transfer
// ============================================================================

#[tokio::test]
async fn test_transfer_fills_destination_to_target() {
    let fake = Arc::new(
        FakeGateway::new()
            .with_balance(AccountType::Funding, "USDT", dec!(500))
            .with_balance(AccountType::Spot, "USDT", dec!(20)),
    );
    let gateway: Arc<dyn AccountGateway> = fake.clone();
    let target = TransferTarget::new(gateway, "USDT", AccountType::Funding, AccountType::Spot, dec!(200)).unwrap();

    let report = engine().run(&target, &CancellationToken::new()).await.unwrap();

    assert!(report.status.is_converged());
    assert_eq!(fake.balance(AccountType::Spot, "USDT"), dec!(200));
    assert_eq!(fake.balance(AccountType::Funding, "USDT"), dec!(320));
}

// ============================================================================
// Multi-account
// ============================================================================

#[test_log::test(tokio::test)]
async fn test_one_failing_account_does_not_stop_the_others() {
    let healthy_a = Arc::new(FakeGateway::new());
    let healthy_b = Arc::new(FakeGateway::new().with_loan_debt("FDUSD", dec!(250)));
    let broken = Arc::new(FakeGateway::new().with_failures(vec![OpsError::Authentication(
        "signature rejected".into(),
    )]));

    let contexts = vec![
        AccountContext::new("1", healthy_a.clone()),
        AccountContext::new("2", broken.clone()),
        AccountContext::new("3", healthy_b.clone()),
    ];
    let settings = ActionSettings {
        convergence: fast_convergence(),
        orders: fast_orders(),
    };
    let action = Action::FlexibleLoan {
        loan_coin: "FDUSD".into(),
        collateral_coin: "USDT".into(),
        amount: dec!(300),
    };

    let reports = run_accounts(contexts, action, settings, CancellationToken::new())
        .await
        .unwrap();

    let accounts: Vec<&str> = reports.iter().map(|r| r.account.as_str()).collect();
    assert_eq!(accounts, vec!["1", "2", "3"]);
    assert!(matches!(
        &reports[0].result,
        Ok(ActionOutcome::Convergence(r)) if r.status == ConvergenceStatus::Converged
    ));
    assert!(matches!(reports[1].result, Err(OpsError::Authentication(_))));
    assert!(matches!(
        &reports[2].result,
        Ok(ActionOutcome::Convergence(r)) if r.applied_total == dec!(50)
    ));
    assert_eq!(healthy_a.loan_debt("FDUSD"), dec!(300));
    assert_eq!(healthy_b.loan_debt("FDUSD"), dec!(300));
    assert_eq!(broken.loan_debt("FDUSD"), Decimal::ZERO);
}
