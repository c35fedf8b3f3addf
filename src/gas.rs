//! Gas pricing and escalation.
//!
//! [`GasPolicy`] is pure: it turns fetched prices into gas fields and
//! escalates the fields of a failed attempt. [`GasGate`] is the only part
//! that talks to the network.

use crate::blockchain::RpcGateway;
use crate::chains::ChainProfile;
use crate::errors::EngineResult;
use alloy::primitives::U256;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::info;

const WEI_PER_GWEI: f64 = 1_000_000_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PricingMode {
    Legacy,
    FeeMarket,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GasPricing {
    Legacy {
        gas_price: u128,
    },
    FeeMarket {
        max_fee_per_gas: u128,
        max_priority_fee_per_gas: u128,
    },
}

impl GasPricing {
    pub fn mode(&self) -> PricingMode {
        match self {
            GasPricing::Legacy { .. } => PricingMode::Legacy,
            GasPricing::FeeMarket { .. } => PricingMode::FeeMarket,
        }
    }

    /// The per-gas price the sender pays at most.
    pub fn price_cap(&self) -> u128 {
        match self {
            GasPricing::Legacy { gas_price } => *gas_price,
            GasPricing::FeeMarket {
                max_fee_per_gas, ..
            } => *max_fee_per_gas,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasFields {
    pub gas_limit: u64,
    pub pricing: GasPricing,
}

/// `factor` as the exact fraction of its shortest decimal form, so `1.1`
/// is 11/10 rather than the nearest binary double.
fn decimal_ratio(factor: f64) -> Option<(U256, U256)> {
    if !factor.is_finite() || factor <= 0.0 {
        return None;
    }

    let text = factor.to_string();
    let (whole, fraction) = text.split_once('.').unwrap_or((text.as_str(), ""));
    let digits = format!("{}{}", whole, fraction);

    let numerator = U256::from_str(&digits).ok()?;
    let denominator = U256::from(10u8).checked_pow(U256::from(fraction.len()))?;
    Some((numerator, denominator))
}

/// `floor(value * factor)`, saturating at `u128::MAX`.
pub fn scale(value: u128, factor: f64) -> u128 {
    let Some((numerator, denominator)) = decimal_ratio(factor) else {
        // Too large or too small to write as a U256 fraction
        return if factor > 1.0 && value > 0 { u128::MAX } else { 0 };
    };

    match U256::from(value).checked_mul(numerator) {
        Some(product) => (product / denominator).saturating_to::<u128>(),
        None => u128::MAX,
    }
}

fn scale_u64(value: u64, factor: f64) -> u64 {
    u64::try_from(scale(u128::from(value), factor)).unwrap_or(u64::MAX)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GasPolicy {
    mode: PricingMode,
    price_multiplier: f64,
}

impl GasPolicy {
    pub fn new(mode: PricingMode, price_multiplier: f64) -> Self {
        Self {
            mode,
            price_multiplier,
        }
    }

    pub fn for_profile(profile: &ChainProfile) -> Self {
        Self::new(profile.pricing_mode(), profile.gas_price_multiplier)
    }

    /// Pricing mode for a call, honouring a per-call override.
    pub fn mode(&self, requested: Option<PricingMode>) -> PricingMode {
        requested.unwrap_or(self.mode)
    }

    pub fn legacy(&self, network_gas_price: u128) -> GasPricing {
        GasPricing::Legacy {
            gas_price: scale(network_gas_price, self.price_multiplier),
        }
    }

    /// Fee-market fields from the node's gas price and suggested tip.
    pub fn fee_market(&self, network_gas_price: u128, priority_fee: u128) -> GasPricing {
        let max_priority_fee_per_gas = scale(priority_fee, self.price_multiplier);
        let max_fee_per_gas = scale(network_gas_price, self.price_multiplier)
            .saturating_add(max_priority_fee_per_gas);

        GasPricing::FeeMarket {
            max_fee_per_gas,
            max_priority_fee_per_gas,
        }
    }

    /// Gas fields for `attempt` given the fields of the previous one.
    ///
    /// Attempt 0 keeps `previous` as is; later attempts multiply the gas
    /// limit and every price field by `increment`, rounding down.
    pub fn escalate(&self, previous: &GasFields, attempt: u32, increment: f64) -> GasFields {
        if attempt == 0 {
            return *previous;
        }

        let pricing = match previous.pricing {
            GasPricing::Legacy { gas_price } => GasPricing::Legacy {
                gas_price: scale(gas_price, increment),
            },
            GasPricing::FeeMarket {
                max_fee_per_gas,
                max_priority_fee_per_gas,
            } => GasPricing::FeeMarket {
                max_fee_per_gas: scale(max_fee_per_gas, increment),
                max_priority_fee_per_gas: scale(max_priority_fee_per_gas, increment),
            },
        };

        GasFields {
            gas_limit: scale_u64(previous.gas_limit, increment),
            pricing,
        }
    }
}

/// Holds legacy submissions back until a reference chain's gas price is low enough.
#[derive(Clone)]
pub struct GasGate {
    gateway: Arc<dyn RpcGateway>,
    ceiling_wei: u128,
    check_interval: Duration,
}

impl GasGate {
    pub fn new(gateway: Arc<dyn RpcGateway>, max_gwei: f64, check_interval: Duration) -> Self {
        Self {
            gateway,
            ceiling_wei: (max_gwei * WEI_PER_GWEI) as u128,
            check_interval,
        }
    }

    pub fn ceiling_wei(&self) -> u128 {
        self.ceiling_wei
    }

    pub async fn wait_for_cheap_gas(&self) -> EngineResult<()> {
        loop {
            let gas_price = self.gateway.gas_price().await?;
            if gas_price <= self.ceiling_wei {
                return Ok(());
            }

            info!(
                current_gwei = gas_price as f64 / WEI_PER_GWEI,
                max_gwei = self.ceiling_wei as f64 / WEI_PER_GWEI,
                "⛽ Gas above ceiling, waiting"
            );
            sleep(self.check_interval).await;
        }
    }
}
