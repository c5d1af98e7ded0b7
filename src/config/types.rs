//! Configuration types

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::common::errors::{OpsError, Result};

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Binance REST endpoint configuration
    #[serde(default)]
    pub binance: BinanceConfig,
    /// Accounts to operate on
    #[serde(default)]
    pub accounts: Vec<AccountConfig>,
    /// Convergence loop tuning
    #[serde(default)]
    pub convergence: ConvergenceConfig,
    /// Order lifecycle settings
    #[serde(default)]
    pub orders: OrderConfig,
    /// General application settings
    #[serde(default)]
    pub settings: AppSettings,
}

/// Binance platform configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinanceConfig {
    /// Base URL for the REST API
    #[serde(default = "default_binance_rest_url")]
    pub rest_url: String,
    /// Signed request validity window in milliseconds
    #[serde(default = "default_recv_window")]
    pub recv_window_ms: u64,
    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

impl Default for BinanceConfig {
    fn default() -> Self {
        Self {
            rest_url: default_binance_rest_url(),
            recv_window_ms: default_recv_window(),
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

fn default_binance_rest_url() -> String {
    "https://api.binance.com".to_string()
}

fn default_recv_window() -> u64 {
    5000
}

fn default_request_timeout() -> u64 {
    30
}

/// One credentialed exchange account
#[derive(Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    /// Account identifier used in logs
    pub id: String,
    pub api_key: String,
    pub api_secret: String,
    /// External address withdrawals are sent to
    #[serde(default)]
    pub withdraw_address: Option<String>,
}

impl AccountConfig {
    pub fn credentials(&self) -> ApiCredentials {
        ApiCredentials::new(self.api_key.clone(), self.api_secret.clone())
    }
}

impl std::fmt::Debug for AccountConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountConfig")
            .field("id", &self.id)
            .field("api_key", &"<redacted>")
            .field("api_secret", &"<redacted>")
            .field("withdraw_address", &self.withdraw_address)
            .finish()
    }
}

/// Tuning of the target convergence loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceConfig {
    /// Size of the first attempted step
    #[serde(default = "default_initial_step")]
    pub initial_step: Decimal,
    /// Step multiplier after a success (> 1)
    #[serde(default = "default_growth_factor")]
    pub growth_factor: Decimal,
    /// Step multiplier after a failure (between 0 and 1)
    #[serde(default = "default_decay_factor")]
    pub decay_factor: Decimal,
    /// Smallest step the decay may shrink to
    #[serde(default = "default_min_step")]
    pub min_step: Decimal,
    /// Remainders below this are treated as converged
    #[serde(default = "default_convergence_floor")]
    pub convergence_floor: Decimal,
    /// Fraction of the target under which the whole remainder is attempted at once
    #[serde(default = "default_near_threshold_ratio")]
    pub near_threshold_ratio: Decimal,
    #[serde(default = "default_base_backoff")]
    pub base_backoff_ms: u64,
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
    /// Random pause after each success, lower bound
    #[serde(default = "default_jitter_min")]
    pub jitter_min_ms: u64,
    /// Random pause after each success, upper bound
    #[serde(default = "default_jitter_max")]
    pub jitter_max_ms: u64,
    /// Iterations between ground-truth re-queries
    #[serde(default = "default_resync_interval")]
    pub resync_interval: u32,
    /// Decimal places kept on each submitted step
    #[serde(default = "default_step_precision")]
    pub step_precision: u32,
    /// Iteration cap; `None` keeps trying until converged or cancelled
    #[serde(default)]
    pub max_iterations: Option<u64>,
}

impl Default for ConvergenceConfig {
    fn default() -> Self {
        Self {
            initial_step: default_initial_step(),
            growth_factor: default_growth_factor(),
            decay_factor: default_decay_factor(),
            min_step: default_min_step(),
            convergence_floor: default_convergence_floor(),
            near_threshold_ratio: default_near_threshold_ratio(),
            base_backoff_ms: default_base_backoff(),
            max_backoff_ms: default_max_backoff(),
            jitter_min_ms: default_jitter_min(),
            jitter_max_ms: default_jitter_max(),
            resync_interval: default_resync_interval(),
            step_precision: default_step_precision(),
            max_iterations: None,
        }
    }
}

impl ConvergenceConfig {
    /// Reject combinations the loop cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.initial_step <= Decimal::ZERO {
            return Err(OpsError::Validation("initial_step must be positive".into()));
        }
        if self.growth_factor <= Decimal::ONE {
            return Err(OpsError::Validation("growth_factor must be greater than 1".into()));
        }
        if self.decay_factor <= Decimal::ZERO || self.decay_factor >= Decimal::ONE {
            return Err(OpsError::Validation("decay_factor must be between 0 and 1".into()));
        }
        if self.convergence_floor <= Decimal::ZERO {
            return Err(OpsError::Validation("convergence_floor must be positive".into()));
        }
        if self.min_step < self.convergence_floor {
            return Err(OpsError::Validation(
                "min_step must not be smaller than convergence_floor".into(),
            ));
        }
        if self.near_threshold_ratio < Decimal::ZERO || self.near_threshold_ratio > Decimal::ONE {
            return Err(OpsError::Validation("near_threshold_ratio must be within [0, 1]".into()));
        }
        if self.base_backoff_ms > self.max_backoff_ms {
            return Err(OpsError::Validation("base_backoff_ms exceeds max_backoff_ms".into()));
        }
        if self.jitter_min_ms > self.jitter_max_ms {
            return Err(OpsError::Validation("jitter_min_ms exceeds jitter_max_ms".into()));
        }
        if self.resync_interval == 0 {
            return Err(OpsError::Validation("resync_interval must be at least 1".into()));
        }
        if self.step_precision > 28 {
            return Err(OpsError::Validation("step_precision must be at most 28".into()));
        }
        Ok(())
    }

    pub fn base_backoff(&self) -> Duration {
        Duration::from_millis(self.base_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    pub fn jitter_bounds(&self) -> (Duration, Duration) {
        (
            Duration::from_millis(self.jitter_min_ms),
            Duration::from_millis(self.jitter_max_ms),
        )
    }
}

fn default_initial_step() -> Decimal {
    dec!(100)
}

fn default_growth_factor() -> Decimal {
    dec!(1.2)
}

fn default_decay_factor() -> Decimal {
    dec!(0.8)
}

fn default_min_step() -> Decimal {
    dec!(1)
}

fn default_convergence_floor() -> Decimal {
    dec!(0.00001)
}

fn default_near_threshold_ratio() -> Decimal {
    dec!(0.1)
}

fn default_base_backoff() -> u64 {
    1000
}

fn default_max_backoff() -> u64 {
    30_000
}

fn default_jitter_min() -> u64 {
    500
}

fn default_jitter_max() -> u64 {
    1500
}

fn default_resync_interval() -> u32 {
    5
}

fn default_step_precision() -> u32 {
    8
}

/// Order lifecycle settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderConfig {
    /// Quote asset appended to a coin to form the symbol pair
    #[serde(default = "default_quote_asset")]
    pub quote_asset: String,
    /// Spot balance reads after a funding-to-spot move before giving up
    #[serde(default = "default_confirm_attempts")]
    pub transfer_confirm_attempts: u32,
    #[serde(default = "default_confirm_delay")]
    pub transfer_confirm_delay_ms: u64,
}

impl Default for OrderConfig {
    fn default() -> Self {
        Self {
            quote_asset: default_quote_asset(),
            transfer_confirm_attempts: default_confirm_attempts(),
            transfer_confirm_delay_ms: default_confirm_delay(),
        }
    }
}

impl OrderConfig {
    /// Symbol pair for a coin, e.g. "BTC" -> "BTCUSDT"
    pub fn symbol_for(&self, coin: &str) -> String {
        format!("{}{}", coin.to_uppercase(), self.quote_asset.to_uppercase())
    }
}

fn default_quote_asset() -> String {
    "USDT".to_string()
}

fn default_confirm_attempts() -> u32 {
    5
}

fn default_confirm_delay() -> u64 {
    500
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSettings {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// API credentials for signed requests
#[derive(Clone)]
pub struct ApiCredentials {
    pub api_key: String,
    pub api_secret: String,
}

impl ApiCredentials {
    pub fn new(api_key: String, api_secret: String) -> Self {
        Self {
            api_key,
            api_secret,
        }
    }
}

impl std::fmt::Debug for ApiCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiCredentials")
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_convergence_config_is_valid() {
        assert!(ConvergenceConfig::default().validate().is_ok());
    }

    #[test]
    fn test_convergence_config_rejects_bad_factors() {
        let config = ConvergenceConfig {
            growth_factor: dec!(1),
            ..ConvergenceConfig::default()
        };
        assert!(matches!(config.validate(), Err(OpsError::Validation(_))));

        let config = ConvergenceConfig {
            decay_factor: dec!(1.5),
            ..ConvergenceConfig::default()
        };
        assert!(config.validate().is_err());

        let config = ConvergenceConfig {
            resync_interval: 0,
            ..ConvergenceConfig::default()
        };
        assert!(config.validate().is_err());

        let config = ConvergenceConfig {
            min_step: dec!(0.000001),
            ..ConvergenceConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_symbol_for() {
        let orders = OrderConfig::default();
        assert_eq!(orders.symbol_for("btc"), "BTCUSDT");
    }

    #[test]
    fn test_account_debug_redacts_secrets() {
        let account = AccountConfig {
            id: "1".into(),
            api_key: "key".into(),
            api_secret: "very-secret".into(),
            withdraw_address: None,
        };
        let rendered = format!("{:?}", account);
        assert!(!rendered.contains("very-secret"));
        assert!(rendered.contains("\"1\""));
    }
}
