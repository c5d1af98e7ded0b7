//! Exact base-10 helpers for money-like quantities
//!
//! Every quantity comparison and increment in the engine goes through
//! `rust_decimal::Decimal`. Nothing here touches floating point.

use rand::Rng;
use rust_decimal::{Decimal, RoundingStrategy};
use std::str::FromStr;
use std::time::Duration;

use super::errors::{OpsError, Result};

/// Parse an exchange-formatted number ("12.34000000")
pub fn parse_decimal(raw: &str) -> Result<Decimal> {
    let trimmed = raw.trim();
    Decimal::from_str(trimmed)
        .or_else(|_| Decimal::from_scientific(trimmed))
        .map_err(|e| OpsError::Calculation(format!("'{}' is not a decimal number: {}", raw, e)))
}

/// Largest multiple of `step` that does not exceed `value`
///
/// Works on the integer mantissas at a common scale, so the result is an
/// exact multiple of `step` even when the two scales are far apart. When the
/// exact floor needs more than 28 significant digits, the result is the
/// largest multiple of `step` representable with fewer decimal places.
pub fn floor_to_step(value: Decimal, step: Decimal) -> Result<Decimal> {
    if step <= Decimal::ZERO {
        return Err(OpsError::Calculation(format!(
            "step size must be positive, got {}",
            step
        )));
    }
    let overflow = || OpsError::Calculation(format!("cannot floor {} to step {}", value, step));

    let scale = value.scale().max(step.scale());
    let units = |d: Decimal| {
        10i128
            .checked_pow(scale - d.scale())
            .and_then(|factor| d.mantissa().checked_mul(factor))
    };
    let value_units = units(value).ok_or_else(overflow)?;
    let step_units = units(step).ok_or_else(overflow)?;
    let steps = value_units.div_euclid(step_units);

    for dropped in 0..=scale {
        let divisor = 10i128.checked_pow(dropped).ok_or_else(overflow)?;
        // multiples of `step` that survive dividing by `divisor` exactly
        let stride = divisor / gcd(step_units, divisor);
        let floored = steps
            .div_euclid(stride)
            .checked_mul(stride)
            .and_then(|k| k.checked_mul(step_units))
            .ok_or_else(overflow)?
            / divisor;
        if let Ok(quantity) = Decimal::try_from_i128_with_scale(floored, scale - dropped) {
            return Ok(quantity.normalize());
        }
    }
    Err(overflow())
}

fn gcd(mut a: i128, mut b: i128) -> i128 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a.abs()
}

/// Whether `value` is an integer multiple of `step`
pub fn is_step_aligned(value: Decimal, step: Decimal) -> bool {
    step > Decimal::ZERO && (value % step).is_zero()
}

/// Cut `value` to `dp` decimal places, rounding toward zero
pub fn truncate_dp(value: Decimal, dp: u32) -> Decimal {
    value
        .round_dp_with_strategy(dp, RoundingStrategy::ToZero)
        .normalize()
}

/// Multiply a duration by a non-negative integer factor, saturating at `cap`
pub fn scale_duration(base: Duration, factor: u32, cap: Duration) -> Duration {
    base.checked_mul(factor).unwrap_or(cap).min(cap)
}

/// Uniformly random delay in `[min, max]`
pub fn jittered_delay(min: Duration, max: Duration) -> Duration {
    if max <= min {
        return min;
    }
    let lo = min.as_millis() as u64;
    let hi = max.as_millis() as u64;
    Duration::from_millis(rand::thread_rng().gen_range(lo..=hi))
}
