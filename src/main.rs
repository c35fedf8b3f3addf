use alloy::primitives::{Address, U256};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use evm_tx_runner::account::{gas_gate_from_config, Account};
use evm_tx_runner::chains::ChainRegistry;
use evm_tx_runner::config::EngineConfig;
use evm_tx_runner::jobs::PercentageRange;
use evm_tx_runner::retry::random_between;
use evm_tx_runner::TransactionOutcome;
use rand::seq::SliceRandom;
use std::str::FromStr;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const PRIVATE_KEYS_ENV_VAR: &str = "PRIVATE_KEYS";

#[derive(Parser)]
#[command(name = "evm-tx-runner", about = "Submit and confirm transactions for many accounts")]
struct Cli {
    /// TOML config file, merged over configs/common.toml
    #[arg(long, global = true)]
    config: Option<String>,

    /// Chain name from the registry
    #[arg(long, global = true, default_value = "base")]
    chain: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the address of every configured key
    Address,
    /// Print native or token balance of every account
    Balance {
        #[arg(long)]
        token: Option<String>,
    },
    /// Approve a spender for a token from every account
    Approve {
        #[arg(long)]
        token: String,
        #[arg(long)]
        spender: String,
        /// Raw token units
        #[arg(long)]
        amount: String,
    },
    /// Send a random share of the native balance to a throwaway address
    SendRandom {
        #[arg(long)]
        min: Option<u8>,
        #[arg(long)]
        max: Option<u8>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = EngineConfig::load_or_default(cli.config.as_deref())?;
    let registry = ChainRegistry::from_config(&config);
    let profile = registry.get(&cli.chain)?;

    let mut keys = load_keys()?;
    if config.run.shuffle_wallets {
        keys.shuffle(&mut rand::thread_rng());
    }

    if let Command::Address = cli.command {
        for (index, key) in keys.iter().enumerate() {
            let wallet = evm_tx_runner::Wallet::from_private_key(key, profile.clone(), "")?;
            println!("{} {}", index + 1, wallet.address());
        }
        return Ok(());
    }

    let gas_gate = gas_gate_from_config(&config, &registry).await?;
    let wallet_delay = (
        Duration::from_secs(config.run.wallet_delay_min_seconds),
        Duration::from_secs(config.run.wallet_delay_max_seconds),
    );

    info!(chain = %profile.name, accounts = keys.len(), "🚀 Starting run");

    let total = keys.len();
    for (index, key) in keys.iter().enumerate() {
        let label = format!("[{}/{}]", index + 1, total);

        let account =
            match Account::connect(key, &label, profile.clone(), &config, gas_gate.clone()).await {
                Ok(account) => account,
                Err(e) => {
                    error!(label = %label, error = %e, "Error processing wallet");
                    continue;
                }
            };

        let submitted = match run_command(&cli.command, &account, &config).await {
            Ok(submitted) => submitted,
            Err(e) => {
                error!(label = %account.wallet().label(), error = %e, "Error processing wallet");
                false
            }
        };

        if submitted && index + 1 < total {
            let delay = random_between(wallet_delay.0, wallet_delay.1);
            info!("💤 Sleeping {:?} before next wallet", delay);
            tokio::time::sleep(delay).await;
        }
    }

    Ok(())
}

fn load_keys() -> Result<Vec<String>> {
    let raw = std::env::var(PRIVATE_KEYS_ENV_VAR)
        .with_context(|| format!("Environment variable {} not set", PRIVATE_KEYS_ENV_VAR))?;

    let keys: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .map(str::to_string)
        .collect();

    if keys.is_empty() {
        anyhow::bail!("{} contains no keys", PRIVATE_KEYS_ENV_VAR);
    }
    Ok(keys)
}

/// Run one command for one account; returns whether anything was submitted.
async fn run_command(command: &Command, account: &Account, config: &EngineConfig) -> Result<bool> {
    let label = account.wallet().label().to_string();

    let outcome = match command {
        Command::Address => return Ok(false),
        Command::Balance { token } => {
            let token = token.as_deref().map(Address::from_str).transpose()?;
            let balance = account.get_balance(token).await?;
            println!("{} {}", label, balance);
            return Ok(false);
        }
        Command::Approve {
            token,
            spender,
            amount,
        } => {
            account
                .approve(
                    Address::from_str(token)?,
                    Address::from_str(spender)?,
                    U256::from_str(amount)?,
                )
                .await?
        }
        Command::SendRandom { min, max } => {
            let range = PercentageRange::new(
                min.unwrap_or(config.transfer.min_percentage),
                max.unwrap_or(config.transfer.max_percentage),
            )?;
            account.send_random_transfer(range).await?
        }
    };

    match &outcome {
        TransactionOutcome::Confirmed { link, .. } => info!(label = %label, %link, "✅ Done"),
        TransactionOutcome::Abandoned { error, attempts } => {
            warn!(label = %label, attempts = attempts.len(), error = %error, "Transaction abandoned")
        }
        TransactionOutcome::Skipped(reason) => info!(label = %label, ?reason, "Skipped"),
    }

    Ok(outcome.was_submitted())
}
