//! Lot-size aware trade sizing
//!
//! Turns a free balance and a symbol's LOT_SIZE rule into a submittable
//! quantity, or explains why there is none.

use rust_decimal::Decimal;

use crate::common::decimal::{floor_to_step, is_step_aligned, parse_decimal};
use crate::common::errors::{OpsError, Result};
use crate::common::types::TradingRule;

/// Largest `step_size`-aligned quantity not exceeding `balance`
///
/// A zero balance yields zero. A negative balance or a non-positive step is
/// a `Calculation` error; callers treat it as a configuration problem and
/// do not retry.
pub fn compute_trade_quantity(balance: Decimal, step_size: Decimal) -> Result<Decimal> {
    if balance < Decimal::ZERO {
        return Err(OpsError::Calculation(format!(
            "balance must not be negative, got {}",
            balance
        )));
    }
    if balance.is_zero() {
        return Ok(Decimal::ZERO);
    }
    floor_to_step(balance, step_size)
}

/// `compute_trade_quantity` over raw exchange strings
pub fn compute_trade_quantity_raw(balance: &str, step_size: &str) -> Result<Decimal> {
    compute_trade_quantity(parse_decimal(balance)?, parse_decimal(step_size)?)
}

/// Check an explicit quantity against a symbol's lot-size rule
pub fn validate_quantity(quantity: Decimal, rule: &TradingRule) -> Result<()> {
    if quantity <= Decimal::ZERO {
        return Err(OpsError::Validation(format!(
            "order quantity must be positive, got {}",
            quantity
        )));
    }
    if !is_step_aligned(quantity, rule.step_size) {
        return Err(OpsError::Validation(format!(
            "quantity {} is not a multiple of step size {}",
            quantity, rule.step_size
        )));
    }
    if quantity < rule.min_quantity {
        return Err(OpsError::Validation(format!(
            "quantity {} is below minimum order quantity {}",
            quantity, rule.min_quantity
        )));
    }
    Ok(())
}
