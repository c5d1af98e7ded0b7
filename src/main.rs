//! Binance Account Ops - Main Entry Point
//!
//! Runs one account operation concurrently across every configured
//! Binance account.

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use binance_account_ops::config::{load_config, missing_config_file};
use binance_account_ops::{
    run_accounts, AccountContext, AccountType, Action, ActionSettings, BinanceRestClient, Side,
};

/// CLI arguments for the application
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Log level (trace, debug, info, warn, error); overrides settings.log_level
    #[arg(long)]
    log_level: Option<String>,

    /// Comma-separated account ids to run on (default: all)
    #[arg(long, value_delimiter = ',')]
    accounts: Vec<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show spot, funding and margin balance of an asset
    QueryAsset { asset: String },

    /// Borrow a flexible loan up to the target amount
    FlexibleLoan {
        #[arg(long)]
        loan_coin: String,
        #[arg(long)]
        collateral_coin: String,
        #[arg(long)]
        amount: Decimal,
    },

    /// Borrow on cross margin up to the target amount
    MarginLoan {
        #[arg(long)]
        asset: String,
        #[arg(long)]
        amount: Decimal,
    },

    /// Fill the destination wallet up to the target balance
    ConvergeTransfer {
        #[arg(long)]
        asset: String,
        #[arg(long)]
        from: AccountType,
        #[arg(long)]
        to: AccountType,
        #[arg(long)]
        amount: Decimal,
    },

    /// Submit a market order against the quote asset
    MarketOrder {
        #[arg(long)]
        coin: String,
        #[arg(long)]
        side: Side,
        /// Defaults to the whole spot balance for SELL
        #[arg(long)]
        quantity: Option<Decimal>,
    },

    /// Submit a GTC limit order against the quote asset
    LimitOrder {
        #[arg(long)]
        coin: String,
        #[arg(long)]
        side: Side,
        #[arg(long)]
        price: Decimal,
        #[arg(long)]
        quantity: Option<Decimal>,
    },

    /// Cancel all open orders of a coin
    CancelOrders {
        #[arg(long)]
        coin: String,
    },

    /// Move funds between wallets of the same account
    Transfer {
        #[arg(long)]
        asset: String,
        #[arg(long)]
        amount: Decimal,
        #[arg(long)]
        from: AccountType,
        #[arg(long)]
        to: AccountType,
    },

    /// Withdraw on-chain to each account's configured withdraw address
    Withdraw {
        #[arg(long)]
        coin: String,
        /// Chain to send on, e.g. BSC; the coin's default network when omitted
        #[arg(long)]
        network: Option<String>,
        /// Defaults to the whole free balance of the source wallet
        #[arg(long)]
        amount: Option<Decimal>,
        /// SPOT or FUNDING
        #[arg(long, default_value = "FUNDING")]
        wallet: AccountType,
    },
}

impl From<Command> for Action {
    fn from(command: Command) -> Self {
        match command {
            Command::QueryAsset { asset } => Action::QueryAsset { asset },
            Command::FlexibleLoan {
                loan_coin,
                collateral_coin,
                amount,
            } => Action::FlexibleLoan {
                loan_coin,
                collateral_coin,
                amount,
            },
            Command::MarginLoan { asset, amount } => Action::MarginLoan { asset, amount },
            Command::ConvergeTransfer { asset, from, to, amount } => {
                Action::ConvergeTransfer { asset, from, to, amount }
            }
            Command::MarketOrder { coin, side, quantity } => Action::MarketOrder { coin, side, quantity },
            Command::LimitOrder {
                coin,
                side,
                price,
                quantity,
            } => Action::LimitOrder {
                coin,
                side,
                price,
                quantity,
            },
            Command::CancelOrders { coin } => Action::CancelOrders { coin },
            Command::Transfer { asset, amount, from, to } => Action::Transfer { asset, amount, from, to },
            Command::Withdraw {
                coin,
                network,
                amount,
                wallet,
            } => Action::Withdraw {
                coin,
                network,
                amount,
                wallet,
            },
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    let config = load_config(Some(&args.config))?;

    // Initialize logging; RUST_LOG wins over flags and settings
    let level = args
        .log_level
        .clone()
        .unwrap_or_else(|| config.settings.log_level.clone());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting Binance account ops");
    info!("Configuration file: {}", args.config);
    if let Some(path) = missing_config_file(Some(args.config.as_str())) {
        warn!("Config file {} not found, using defaults and environment", path);
    }
    info!(accounts = config.accounts.len(), "Configuration loaded");

    let mut contexts = Vec::new();
    for account in &config.accounts {
        if !args.accounts.is_empty() && !args.accounts.contains(&account.id) {
            continue;
        }
        let client = BinanceRestClient::from_config(&config.binance, account.credentials())?;
        contexts.push(
            AccountContext::new(account.id.clone(), Arc::new(client))
                .with_withdraw_address(account.withdraw_address.clone()),
        );
    }
    if contexts.is_empty() {
        bail!("no accounts configured or selected");
    }

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Received shutdown signal, cancelling running operations...");
            shutdown.cancel();
        }
    });

    let settings = ActionSettings {
        convergence: config.convergence.clone(),
        orders: config.orders.clone(),
    };
    let reports = run_accounts(contexts, args.command.into(), settings, cancel).await?;

    let failed = reports.iter().filter(|r| r.result.is_err()).count();
    for report in &reports {
        match &report.result {
            Ok(outcome) => info!(account = %report.account, "{}", outcome),
            Err(e) => error!(account = %report.account, error = %e, "Account failed"),
        }
    }
    info!(total = reports.len(), failed, "All accounts finished");

    Ok(())
}
