//! Target convergence engine
//!
//! Drives an account-side quantity (borrowed amount, wallet balance) toward a
//! target through repeated bounded steps. Step size adapts to outcomes: it
//! grows after a success and decays after a failure, while failures back off
//! linearly up to a cap. Ground truth is re-queried every `resync_interval`
//! iterations; in between the engine trusts its own bookkeeping.
//!
//! ```text
//!            ┌──────────── cancelled / iteration cap ───────────┐
//!            │                                                  ▼
//!  sync? ──► remaining ≤ 0 ──► Converged                     report
//!            │ remaining < floor ──► DustRemainder
//!            ▼
//!      attempt = clamp(step) ──► apply_step
//!            ├─ Ok  → remaining -= applied, step = min(step·g, remaining), jitter
//!            └─ Err → backoff(n·base ≤ max), step = max(step·d, min_step)
//! ```

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::common::decimal::{jittered_delay, scale_duration, truncate_dp};
use crate::common::errors::{OpsError, Result};
use crate::config::types::ConvergenceConfig;

/// A quantity the engine can observe and push toward a target
#[async_trait]
pub trait ConvergenceTarget: Send + Sync {
    /// Human-readable description for logs, e.g. "flexible loan FDUSD"
    fn describe(&self) -> String;

    /// Amount the accumulated quantity should reach
    fn target_amount(&self) -> Decimal;

    /// Ground-truth accumulated amount
    async fn query_current(&self) -> Result<Decimal>;

    /// Perform one bounded suboperation of `amount`, returning what was applied
    async fn apply_step(&self, amount: Decimal) -> Result<Decimal>;
}

/// Step-size adjustment rules
#[derive(Debug, Clone, PartialEq)]
pub struct StepPolicy {
    pub growth_factor: Decimal,
    pub decay_factor: Decimal,
    pub min_step: Decimal,
    pub near_threshold_ratio: Decimal,
    pub precision: u32,
}

impl StepPolicy {
    pub fn from_config(config: &ConvergenceConfig) -> Self {
        Self {
            growth_factor: config.growth_factor,
            decay_factor: config.decay_factor,
            min_step: config.min_step,
            near_threshold_ratio: config.near_threshold_ratio,
            precision: config.step_precision,
        }
    }

    /// Quantity to submit next
    ///
    /// Never more than `remaining`; the whole remainder once it is within the
    /// near threshold of the target.
    pub fn next_attempt(&self, step: Decimal, remaining: Decimal, target: Decimal) -> Decimal {
        let near_threshold = target * self.near_threshold_ratio;
        let attempt = if remaining <= near_threshold {
            remaining
        } else {
            step.min(remaining)
        };
        truncate_dp(attempt, self.precision)
    }

    /// Step after a success, given the remainder left after applying it
    pub fn after_success(&self, previous: Decimal, remaining: Decimal) -> Decimal {
        (previous * self.growth_factor).min(remaining)
    }

    /// Step after a failure
    pub fn after_failure(&self, previous: Decimal) -> Decimal {
        (previous * self.decay_factor).max(self.min_step)
    }
}

/// Consecutive-failure bookkeeping and the backoff derived from it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryState {
    consecutive_failures: u32,
    current_backoff: Duration,
    base_delay: Duration,
    max_delay: Duration,
}

impl RetryState {
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            consecutive_failures: 0,
            current_backoff: Duration::ZERO,
            base_delay,
            max_delay,
        }
    }

    /// Count a failure and return the delay to wait: `min(n * base, max)`
    pub fn record_failure(&mut self) -> Duration {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.current_backoff = scale_duration(self.base_delay, self.consecutive_failures, self.max_delay);
        self.current_backoff
    }

    pub fn reset(&mut self) {
        self.consecutive_failures = 0;
        self.current_backoff = Duration::ZERO;
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn current_backoff(&self) -> Duration {
        self.current_backoff
    }
}

/// How a convergence run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvergenceStatus {
    /// Target reached through applied steps
    Converged,
    /// Nothing to do: the first sync already showed the target reached
    AlreadyConverged,
    /// Remainder below the convergence floor, treated as reached
    DustRemainder,
    /// Stopped through the cancellation token
    Cancelled,
    /// Stopped by the configured iteration cap
    IterationLimit,
}

impl ConvergenceStatus {
    pub fn is_converged(&self) -> bool {
        matches!(
            self,
            ConvergenceStatus::Converged
                | ConvergenceStatus::AlreadyConverged
                | ConvergenceStatus::DustRemainder
        )
    }
}

/// Summary of one convergence run
#[derive(Debug, Clone, PartialEq)]
pub struct ConvergenceReport {
    pub status: ConvergenceStatus,
    pub target: Decimal,
    pub iterations: u64,
    pub successes: u64,
    pub failures: u64,
    /// Sum of all applied steps
    pub applied_total: Decimal,
    /// Remainder according to the engine's bookkeeping at exit
    pub remaining: Decimal,
}

/// Adaptive control loop bound to one account
pub struct ConvergenceEngine {
    account: String,
    config: ConvergenceConfig,
    policy: StepPolicy,
}

impl ConvergenceEngine {
    pub fn new(account: impl Into<String>, config: ConvergenceConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            account: account.into(),
            policy: StepPolicy::from_config(&config),
            config,
        })
    }

    pub fn config(&self) -> &ConvergenceConfig {
        &self.config
    }

    /// Run until the target is reached, the token is cancelled or the
    /// iteration cap is hit
    ///
    /// Retryable failures are absorbed with backoff. Non-retryable errors end
    /// the run with `Err`.
    pub async fn run<T>(&self, target: &T, cancel: &CancellationToken) -> Result<ConvergenceReport>
    where
        T: ConvergenceTarget + ?Sized,
    {
        let target_amount = target.target_amount();
        if target_amount <= Decimal::ZERO {
            return Err(OpsError::Validation(format!(
                "target amount must be positive, got {}",
                target_amount
            )));
        }

        let description = target.describe();
        let floor = self.config.convergence_floor;
        let resync_interval = u64::from(self.config.resync_interval);
        let (jitter_min, jitter_max) = self.config.jitter_bounds();

        let mut retry = RetryState::new(self.config.base_backoff(), self.config.max_backoff());
        let mut step = self.config.initial_step;
        let mut remaining = Decimal::ZERO;
        let mut synced = false;
        let mut report = ConvergenceReport {
            status: ConvergenceStatus::Converged,
            target: target_amount,
            iterations: 0,
            successes: 0,
            failures: 0,
            applied_total: Decimal::ZERO,
            remaining: Decimal::ZERO,
        };

        info!(account = %self.account, target = %description, amount = %target_amount, "Starting convergence");

        let status = loop {
            if cancel.is_cancelled() {
                break ConvergenceStatus::Cancelled;
            }
            if let Some(max) = self.config.max_iterations {
                if report.iterations >= max {
                    break ConvergenceStatus::IterationLimit;
                }
            }

            if !synced || report.iterations % resync_interval == 0 {
                match target.query_current().await {
                    Ok(current) => {
                        remaining = target_amount - current;
                        synced = true;
                        debug!(account = %self.account, %current, %remaining, "Synchronized with ground truth");
                    }
                    Err(e) if !e.is_retryable() => return Err(e),
                    Err(e) if synced => {
                        warn!(account = %self.account, error = %e, "Re-sync failed, keeping local bookkeeping");
                    }
                    Err(e) => {
                        report.iterations += 1;
                        report.failures += 1;
                        let delay = retry.record_failure();
                        warn!(
                            account = %self.account,
                            error = %e,
                            failures = retry.consecutive_failures(),
                            backoff_ms = delay.as_millis() as u64,
                            "Initial sync failed, retrying"
                        );
                        if !pause(delay, cancel).await {
                            break ConvergenceStatus::Cancelled;
                        }
                        continue;
                    }
                }
            }

            if remaining <= Decimal::ZERO {
                break if report.successes == 0 {
                    ConvergenceStatus::AlreadyConverged
                } else {
                    ConvergenceStatus::Converged
                };
            }
            if remaining < floor {
                warn!(account = %self.account, %remaining, "Remainder below convergence floor, treating as converged");
                break ConvergenceStatus::DustRemainder;
            }

            let attempt = self.policy.next_attempt(step, remaining, target_amount);
            if attempt < floor {
                warn!(account = %self.account, %attempt, "Step below convergence floor, treating as converged");
                break ConvergenceStatus::DustRemainder;
            }

            report.iterations += 1;
            match target.apply_step(attempt).await {
                Ok(applied) => {
                    let applied = applied.min(attempt);
                    report.successes += 1;
                    report.applied_total += applied;
                    remaining -= applied;
                    retry.reset();
                    step = self.policy.after_success(attempt, remaining);
                    info!(account = %self.account, target = %description, %applied, %remaining, "Step applied");

                    if remaining > Decimal::ZERO
                        && !pause(jittered_delay(jitter_min, jitter_max), cancel).await
                    {
                        break ConvergenceStatus::Cancelled;
                    }
                }
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => {
                    report.failures += 1;
                    let delay = retry.record_failure();
                    step = self.policy.after_failure(attempt);
                    warn!(
                        account = %self.account,
                        target = %description,
                        %attempt,
                        error = %e,
                        failures = retry.consecutive_failures(),
                        backoff_ms = delay.as_millis() as u64,
                        next_step = %step,
                        "Step failed, backing off"
                    );
                    if !pause(delay, cancel).await {
                        break ConvergenceStatus::Cancelled;
                    }
                }
            }
        };

        report.status = status;
        report.remaining = remaining.max(Decimal::ZERO);
        info!(
            account = %self.account,
            target = %description,
            status = ?report.status,
            applied = %report.applied_total,
            iterations = report.iterations,
            "Convergence finished"
        );
        Ok(report)
    }
}

/// Sleep unless cancelled first; false when the token fired
async fn pause(delay: Duration, cancel: &CancellationToken) -> bool {
    if delay.is_zero() {
        return !cancel.is_cancelled();
    }
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}
