//! Configuration loader

use config::{Config, Environment, File};
use std::path::Path;
use tracing::debug;

use super::types::{AccountConfig, AppConfig};
use crate::common::errors::{OpsError, Result};

/// Load configuration from file and environment variables
///
/// Priority (highest to lowest):
/// 1. Environment variables (prefixed with APP__)
/// 2. Configuration file (TOML format)
/// 3. Default values
///
/// When no account is configured, accounts are enumerated from
/// `ACCOUNT{n}_NUM` / `ACCOUNT{n}_API_KEY` / `ACCOUNT{n}_API_SECRET`
/// (plus an optional `ACCOUNT{n}_WITHDRAW_ADDRESS`).
///
/// A missing file is skipped silently; callers report it through
/// [`missing_config_file`] once logging is up.
pub fn load_config(config_path: Option<&str>) -> Result<AppConfig> {
    dotenvy::dotenv().ok();

    let mut builder = Config::builder();

    if let Some(path) = config_path {
        if missing_config_file(Some(path)).is_none() {
            builder = builder.add_source(File::with_name(path).required(false));
        }
    }

    builder = builder.add_source(
        Environment::with_prefix("APP")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    );

    let mut app_config: AppConfig = builder
        .build()
        .map_err(|e| OpsError::Configuration(e.to_string()))?
        .try_deserialize()
        .map_err(|e| OpsError::Configuration(e.to_string()))?;

    if app_config.accounts.is_empty() {
        app_config.accounts = load_accounts_from_env();
    }

    app_config.convergence.validate()?;
    debug!(accounts = app_config.accounts.len(), "Configuration loaded");
    Ok(app_config)
}

/// The requested config path, if it names a file that does not exist
pub fn missing_config_file(config_path: Option<&str>) -> Option<&str> {
    config_path.filter(|path| !Path::new(path).exists())
}

/// Enumerate accounts from the process environment
pub fn load_accounts_from_env() -> Vec<AccountConfig> {
    accounts_from_lookup(|key| std::env::var(key).ok())
}

/// Enumerate numbered accounts through `lookup`, stopping at the first
/// index without both key and secret
pub fn accounts_from_lookup<F>(lookup: F) -> Vec<AccountConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let mut accounts = Vec::new();
    for index in 1.. {
        let api_key = lookup(&format!("ACCOUNT{}_API_KEY", index));
        let api_secret = lookup(&format!("ACCOUNT{}_API_SECRET", index));
        let (api_key, api_secret) = match (api_key, api_secret) {
            (Some(key), Some(secret)) if !key.is_empty() && !secret.is_empty() => (key, secret),
            _ => break,
        };
        let id = lookup(&format!("ACCOUNT{}_NUM", index)).unwrap_or_else(|| index.to_string());
        let withdraw_address = lookup(&format!("ACCOUNT{}_WITHDRAW_ADDRESS", index)).filter(|a| !a.is_empty());
        accounts.push(AccountConfig {
            id,
            api_key,
            api_secret,
            withdraw_address,
        });
    }
    accounts
}
