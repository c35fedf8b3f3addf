use crate::chains::ChainProfile;
use anyhow::Result;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::time::Duration;
use toml::{Table, Value};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Additions to, or overrides of, the built-in chain registry.
    #[serde(default)]
    pub chains: BTreeMap<String, ChainProfile>,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default)]
    pub monitoring: MonitoringSettings,
    #[serde(default)]
    pub transfer: TransferSettings,
    #[serde(default)]
    pub approve: ApproveSettings,
    pub gas_gate: Option<GasGateSettings>,
    #[serde(default)]
    pub run: RunSettings,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_retries: u32,
    pub gas_increment: f64,
    pub transfer_gas_increment: f64,
    pub jitter_min_seconds: u64,
    pub jitter_max_seconds: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            gas_increment: 1.1,
            transfer_gas_increment: 2.0,
            jitter_min_seconds: 15,
            jitter_max_seconds: 20,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MonitoringSettings {
    pub transaction_timeout_seconds: u64,
    pub poll_interval_seconds: u64,
    pub rpc_timeout_seconds: u64,
    /// Transport retries of a single RPC call on rate limits and 5xx replies.
    pub rpc_max_retries: u32,
    pub rpc_initial_backoff_ms: u64,
    /// Throughput budget alloy's backoff assumes for the provider.
    pub rpc_compute_units_per_second: u64,
}

impl Default for MonitoringSettings {
    fn default() -> Self {
        Self {
            transaction_timeout_seconds: 180,
            poll_interval_seconds: 20,
            rpc_timeout_seconds: 180,
            rpc_max_retries: 5,
            rpc_initial_backoff_ms: 1000,
            rpc_compute_units_per_second: 330,
        }
    }
}

impl MonitoringSettings {
    pub fn transaction_timeout(&self) -> Duration {
        Duration::from_secs(self.transaction_timeout_seconds)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_seconds)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TransferSettings {
    pub min_percentage: u8,
    pub max_percentage: u8,
    pub gas_limit: u64,
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            min_percentage: 1,
            max_percentage: 5,
            gas_limit: 21_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ApproveSettings {
    pub cooldown_min_seconds: u64,
    pub cooldown_max_seconds: u64,
}

impl Default for ApproveSettings {
    fn default() -> Self {
        Self {
            cooldown_min_seconds: 7,
            cooldown_max_seconds: 20,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GasGateSettings {
    /// Chain whose gas price is watched, usually `ethereum`.
    pub chain: String,
    pub max_gwei: f64,
    #[serde(default = "default_gate_interval")]
    pub check_interval_seconds: u64,
}

fn default_gate_interval() -> u64 {
    60
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct RunSettings {
    pub shuffle_wallets: bool,
    pub wallet_delay_min_seconds: u64,
    pub wallet_delay_max_seconds: u64,
}

impl EngineConfig {
    /// Load `path` layered over `configs/common.toml`, with `${VAR}` placeholders
    /// resolved from the environment (and `.env`).
    pub fn load(path: &str) -> Result<Self> {
        dotenv::dotenv().ok();

        let mut table = read_common_table()?;
        let specific = fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read config {}: {}", path, e))?;
        overlay(&mut table, specific.parse::<Table>()?);

        Self::from_table(table)
    }

    /// Load `path` when given, otherwise fall back to defaults plus `configs/common.toml`.
    pub fn load_or_default(path: Option<&str>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }

        dotenv::dotenv().ok();
        Self::from_table(read_common_table()?)
    }

    fn from_table(mut table: Table) -> Result<Self> {
        resolve_env_placeholders(&mut table)?;
        let config: EngineConfig = Value::Table(table).try_into()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.retry.gas_increment < 1.0 || self.retry.transfer_gas_increment < 1.0 {
            anyhow::bail!(
                "Gas increments must be >= 1.0 (got {} and {})",
                self.retry.gas_increment,
                self.retry.transfer_gas_increment
            );
        }
        if self.retry.jitter_min_seconds > self.retry.jitter_max_seconds {
            anyhow::bail!("retry.jitter_min_seconds must not exceed retry.jitter_max_seconds");
        }
        if self.transfer.min_percentage > self.transfer.max_percentage
            || self.transfer.max_percentage > 100
        {
            anyhow::bail!(
                "Invalid transfer percentage range {}..={}",
                self.transfer.min_percentage,
                self.transfer.max_percentage
            );
        }
        if self.approve.cooldown_min_seconds > self.approve.cooldown_max_seconds {
            anyhow::bail!("approve.cooldown_min_seconds must not exceed approve.cooldown_max_seconds");
        }
        if self.run.wallet_delay_min_seconds > self.run.wallet_delay_max_seconds {
            anyhow::bail!("run.wallet_delay_min_seconds must not exceed run.wallet_delay_max_seconds");
        }
        if self.monitoring.poll_interval_seconds == 0 {
            anyhow::bail!("monitoring.poll_interval_seconds must be positive");
        }
        if let Some(gate) = &self.gas_gate {
            if gate.max_gwei <= 0.0 || gate.check_interval_seconds == 0 {
                anyhow::bail!("gas_gate needs a positive max_gwei and check_interval_seconds");
            }
        }
        for (name, profile) in &self.chains {
            if profile.gas_price_multiplier < 1.0 {
                anyhow::bail!("chains.{}.gas_price_multiplier must be >= 1.0", name);
            }
        }
        Ok(())
    }
}

const COMMON_CONFIG_PATH: &str = "configs/common.toml";

/// Shared settings, or an empty table when the file is absent.
fn read_common_table() -> Result<Table> {
    match fs::read_to_string(COMMON_CONFIG_PATH) {
        Ok(content) => content
            .parse::<Table>()
            .map_err(|e| anyhow::anyhow!("Invalid {}: {}", COMMON_CONFIG_PATH, e)),
        Err(_) => Ok(Table::new()),
    }
}

/// Deep-merge `top` into `base`: nested tables merge key by key, anything
/// else in `top` replaces what `base` had.
fn overlay(base: &mut Table, top: Table) {
    for (key, value) in top {
        match (base.get_mut(&key), value) {
            (Some(Value::Table(below)), Value::Table(above)) => overlay(below, above),
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

/// Replace `${VAR}` inside every string value. Any variable that is not set
/// fails the load, naming all of them.
fn resolve_env_placeholders(table: &mut Table) -> Result<()> {
    let pattern = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}")?;
    let mut unset = Vec::new();
    for (_, value) in table.iter_mut() {
        resolve_value(value, &pattern, &mut unset);
    }

    if !unset.is_empty() {
        unset.sort();
        unset.dedup();
        anyhow::bail!("Unset environment variables in config: {}", unset.join(", "));
    }
    Ok(())
}

fn resolve_value(value: &mut Value, pattern: &Regex, unset: &mut Vec<String>) {
    match value {
        Value::String(text) if text.contains("${") => {
            let resolved = pattern
                .replace_all(text, |caps: &regex::Captures| {
                    env::var(&caps[1]).unwrap_or_else(|_| {
                        unset.push(caps[1].to_string());
                        caps[0].to_string()
                    })
                })
                .into_owned();
            *text = resolved;
        }
        Value::Array(items) => {
            for item in items {
                resolve_value(item, pattern, unset);
            }
        }
        Value::Table(inner) => {
            for (_, item) in inner.iter_mut() {
                resolve_value(item, pattern, unset);
            }
        }
        _ => {}
    }
}
