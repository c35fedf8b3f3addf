//! Static chain profiles.
//!
//! The registry is built once at startup from the built-in table plus any
//! `[chains.<name>]` entries in the configuration, then shared read-only.

use crate::config::EngineConfig;
use crate::errors::{EngineError, EngineResult};
use crate::gas::PricingMode;
use alloy::primitives::B256;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ChainProfile {
    /// Registry key, filled in by [`ChainRegistry`].
    #[serde(skip)]
    pub name: String,
    pub rpc_url: String,
    pub explorer_url: String,
    pub native_symbol: String,
    pub chain_id: u64,
    /// Fee-market (EIP-1559) pricing instead of a single gas price.
    #[serde(default)]
    pub eip1559: bool,
    /// Applied to the node's gas price before any escalation.
    #[serde(default = "default_multiplier")]
    pub gas_price_multiplier: f64,
}

fn default_multiplier() -> f64 {
    1.0
}

impl ChainProfile {
    pub fn pricing_mode(&self) -> PricingMode {
        if self.eip1559 {
            PricingMode::FeeMarket
        } else {
            PricingMode::Legacy
        }
    }

    pub fn tx_link(&self, hash: B256) -> String {
        format!("{}/tx/{}", self.explorer_url.trim_end_matches('/'), hash)
    }
}

fn builtin(
    name: &str,
    rpc_url: &str,
    explorer_url: &str,
    native_symbol: &str,
    chain_id: u64,
    gas_price_multiplier: f64,
) -> ChainProfile {
    ChainProfile {
        name: name.to_string(),
        rpc_url: rpc_url.to_string(),
        explorer_url: explorer_url.to_string(),
        native_symbol: native_symbol.to_string(),
        chain_id,
        eip1559: false,
        gas_price_multiplier,
    }
}

pub fn builtin_profiles() -> Vec<ChainProfile> {
    vec![
        builtin("ethereum", "https://rpc.ankr.com/eth", "https://etherscan.io", "ETH", 1, 1.0),
        builtin(
            "linea",
            "https://rpc.linea.build",
            "https://lineascan.build",
            "ETH",
            59144,
            1.0,
        ),
        builtin("base", "https://mainnet.base.org", "https://basescan.org", "ETH", 8453, 1.0),
        // The node's suggested price is too low to get included
        builtin(
            "0g",
            "https://evmrpc-testnet.0g.ai",
            "https://chainscan-newton.0g.ai",
            "A0GI",
            16600,
            2.0,
        ),
    ]
}

#[derive(Debug, Clone)]
pub struct ChainRegistry {
    profiles: BTreeMap<String, Arc<ChainProfile>>,
}

impl ChainRegistry {
    pub fn from_config(config: &EngineConfig) -> Self {
        let mut profiles: BTreeMap<String, Arc<ChainProfile>> = builtin_profiles()
            .into_iter()
            .map(|profile| (profile.name.clone(), Arc::new(profile)))
            .collect();

        for (name, profile) in &config.chains {
            let mut profile = profile.clone();
            profile.name = name.clone();
            profiles.insert(name.clone(), Arc::new(profile));
        }

        Self { profiles }
    }

    pub fn get(&self, name: &str) -> EngineResult<Arc<ChainProfile>> {
        self.profiles.get(name).cloned().ok_or_else(|| {
            EngineError::Config(format!(
                "Unknown chain '{}' (known: {})",
                name,
                self.names().join(", ")
            ))
        })
    }

    pub fn names(&self) -> Vec<String> {
        self.profiles.keys().cloned().collect()
    }
}
