//! Convergence targets backed by an account gateway

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::debug;

use super::convergence::ConvergenceTarget;
use crate::common::errors::{OpsError, Result};
use crate::common::traits::AccountGateway;
use crate::common::types::{find_balance, free_balance, AccountType, BorrowRequest};

fn require_positive(amount: Decimal, what: &str) -> Result<()> {
    if amount <= Decimal::ZERO {
        return Err(OpsError::Validation(format!("{} must be positive, got {}", what, amount)));
    }
    Ok(())
}

fn require_asset(asset: &str, what: &str) -> Result<()> {
    if asset.trim().is_empty() {
        return Err(OpsError::Validation(format!("{} must not be empty", what)));
    }
    Ok(())
}

/// Flexible crypto-loan debt of `loan_coin`, borrowed against `collateral_coin`
pub struct FlexibleLoanTarget {
    gateway: Arc<dyn AccountGateway>,
    loan_coin: String,
    collateral_coin: String,
    target: Decimal,
}

impl FlexibleLoanTarget {
    pub fn new(
        gateway: Arc<dyn AccountGateway>,
        loan_coin: impl Into<String>,
        collateral_coin: impl Into<String>,
        target: Decimal,
    ) -> Result<Self> {
        let loan_coin = loan_coin.into();
        let collateral_coin = collateral_coin.into();
        require_asset(&loan_coin, "loan coin")?;
        require_asset(&collateral_coin, "collateral coin")?;
        require_positive(target, "target loan amount")?;
        Ok(Self {
            gateway,
            loan_coin,
            collateral_coin,
            target,
        })
    }
}

#[async_trait]
impl ConvergenceTarget for FlexibleLoanTarget {
    fn describe(&self) -> String {
        format!("flexible loan {} against {}", self.loan_coin, self.collateral_coin)
    }

    fn target_amount(&self) -> Decimal {
        self.target
    }

    async fn query_current(&self) -> Result<Decimal> {
        let positions = self.gateway.query_loan_status().await?;
        Ok(positions
            .iter()
            .find(|p| p.loan_coin == self.loan_coin)
            .map(|p| p.total_debt)
            .unwrap_or(Decimal::ZERO))
    }

    async fn apply_step(&self, amount: Decimal) -> Result<Decimal> {
        let request = BorrowRequest {
            loan_coin: self.loan_coin.clone(),
            loan_amount: Some(amount),
            collateral_coin: self.collateral_coin.clone(),
            collateral_amount: None,
        };
        let receipt = self.gateway.borrow(&request).await?;
        if !receipt.succeeded() {
            return Err(OpsError::Rejected(format!(
                "borrow of {} {} returned status {}",
                amount, self.loan_coin, receipt.status
            )));
        }
        Ok(amount)
    }
}

/// Cross-margin borrowed amount of `asset`
pub struct MarginLoanTarget {
    gateway: Arc<dyn AccountGateway>,
    asset: String,
    target: Decimal,
}

impl MarginLoanTarget {
    pub fn new(gateway: Arc<dyn AccountGateway>, asset: impl Into<String>, target: Decimal) -> Result<Self> {
        let asset = asset.into();
        require_asset(&asset, "margin asset")?;
        require_positive(target, "target borrow amount")?;
        Ok(Self { gateway, asset, target })
    }
}

#[async_trait]
impl ConvergenceTarget for MarginLoanTarget {
    fn describe(&self) -> String {
        format!("margin loan {}", self.asset)
    }

    fn target_amount(&self) -> Decimal {
        self.target
    }

    async fn query_current(&self) -> Result<Decimal> {
        let entries = self
            .gateway
            .query_balance(AccountType::Margin, Some(self.asset.clone()))
            .await?;
        Ok(find_balance(&entries, &self.asset)
            .map(|e| e.borrowed)
            .unwrap_or(Decimal::ZERO))
    }

    async fn apply_step(&self, amount: Decimal) -> Result<Decimal> {
        let receipt = self.gateway.margin_borrow(&self.asset, amount).await?;
        debug!(asset = %receipt.asset, amount = %receipt.amount, tran_id = receipt.tran_id, "Margin borrow accepted");
        Ok(receipt.amount)
    }
}

/// Free balance of `asset` in the destination wallet, filled from `from`
pub struct TransferTarget {
    gateway: Arc<dyn AccountGateway>,
    asset: String,
    from: AccountType,
    to: AccountType,
    target: Decimal,
}

impl TransferTarget {
    pub fn new(
        gateway: Arc<dyn AccountGateway>,
        asset: impl Into<String>,
        from: AccountType,
        to: AccountType,
        target: Decimal,
    ) -> Result<Self> {
        let asset = asset.into();
        require_asset(&asset, "transfer asset")?;
        require_positive(target, "target balance")?;
        if from == to {
            return Err(OpsError::Validation(format!(
                "source and destination account must differ, both are {}",
                from
            )));
        }
        Ok(Self {
            gateway,
            asset,
            from,
            to,
            target,
        })
    }
}

#[async_trait]
impl ConvergenceTarget for TransferTarget {
    fn describe(&self) -> String {
        format!("{} balance via {} -> {}", self.asset, self.from, self.to)
    }

    fn target_amount(&self) -> Decimal {
        self.target
    }

    async fn query_current(&self) -> Result<Decimal> {
        let entries = self
            .gateway
            .query_balance(self.to, Some(self.asset.clone()))
            .await?;
        Ok(free_balance(&entries, &self.asset))
    }

    async fn apply_step(&self, amount: Decimal) -> Result<Decimal> {
        self.gateway
            .transfer(&self.asset, amount, self.from, self.to)
            .await?;
        Ok(amount)
    }
}
