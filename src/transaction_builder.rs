use crate::blockchain::RpcGateway;
use crate::errors::{EngineError, EngineResult};
use crate::gas::{GasFields, GasGate, GasPolicy, GasPricing, PricingMode};
use crate::wallet::Wallet;
use alloy::network::TransactionBuilder as _;
use alloy::primitives::{Address, Bytes, U256};
use alloy::rpc::types::TransactionRequest;
use std::sync::Arc;
use tracing::debug;

/// The on-chain effect a caller wants, before nonce and gas are known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxCall {
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
    /// Estimated by the node when absent.
    pub gas_limit: Option<u64>,
    /// Overrides the chain's default pricing mode.
    pub pricing: Option<PricingMode>,
}

impl TxCall {
    pub fn transfer(to: Address, value: U256) -> Self {
        Self {
            to,
            value,
            data: Bytes::new(),
            gas_limit: None,
            pricing: None,
        }
    }

    pub fn contract_call(to: Address, data: impl Into<Bytes>) -> Self {
        Self {
            to,
            value: U256::ZERO,
            data: data.into(),
            gas_limit: None,
            pricing: None,
        }
    }

    pub fn with_gas_limit(mut self, gas_limit: u64) -> Self {
        self.gas_limit = Some(gas_limit);
        self
    }

    pub fn with_pricing(mut self, mode: PricingMode) -> Self {
        self.pricing = Some(mode);
        self
    }
}

/// A complete request plus the nonce and gas it was built with.
#[derive(Debug, Clone)]
pub struct PreparedTransaction {
    pub request: TransactionRequest,
    pub nonce: u64,
    pub gas: GasFields,
}

/// Assembles ready-to-sign requests from fresh network data.
#[derive(Clone)]
pub struct TransactionBuilder {
    wallet: Arc<Wallet>,
    gateway: Arc<dyn RpcGateway>,
    policy: GasPolicy,
    gas_gate: Option<GasGate>,
}

impl TransactionBuilder {
    pub fn new(
        wallet: Arc<Wallet>,
        gateway: Arc<dyn RpcGateway>,
        gas_gate: Option<GasGate>,
    ) -> Self {
        let policy = GasPolicy::for_profile(wallet.profile());
        Self {
            wallet,
            gateway,
            policy,
            gas_gate,
        }
    }

    pub fn policy(&self) -> &GasPolicy {
        &self.policy
    }

    /// Build the first attempt: nonce, gas price and (if needed) gas limit
    /// are all queried now.
    pub async fn build(&self, call: &TxCall) -> EngineResult<PreparedTransaction> {
        let mode = self.policy.mode(call.pricing);
        self.wait_for_gate(mode).await?;

        let nonce = self.fetch_nonce().await?;
        let network_price = self.gateway.gas_price().await.map_err(EngineError::build)?;
        let pricing = match mode {
            PricingMode::Legacy => self.policy.legacy(network_price),
            PricingMode::FeeMarket => {
                let tip = self
                    .gateway
                    .max_priority_fee()
                    .await
                    .map_err(EngineError::build)?;
                self.policy.fee_market(network_price, tip)
            }
        };

        let gas_limit = match call.gas_limit {
            Some(limit) => limit,
            None => self
                .gateway
                .estimate_gas(self.base_request(call))
                .await
                .map_err(EngineError::build)?,
        };

        Ok(self.assemble(call, nonce, GasFields { gas_limit, pricing }))
    }

    /// Build a retry: escalated gas from the previous attempt, nonce re-read.
    pub async fn rebuild(
        &self,
        call: &TxCall,
        previous: &GasFields,
        attempt: u32,
        increment: f64,
    ) -> EngineResult<PreparedTransaction> {
        self.wait_for_gate(previous.pricing.mode()).await?;

        let nonce = self.fetch_nonce().await?;
        let gas = self.policy.escalate(previous, attempt, increment);
        Ok(self.assemble(call, nonce, gas))
    }

    async fn wait_for_gate(&self, mode: PricingMode) -> EngineResult<()> {
        match (&self.gas_gate, mode) {
            (Some(gate), PricingMode::Legacy) => {
                gate.wait_for_cheap_gas().await.map_err(EngineError::build)
            }
            _ => Ok(()),
        }
    }

    async fn fetch_nonce(&self) -> EngineResult<u64> {
        self.gateway
            .transaction_count(self.wallet.address())
            .await
            .map_err(EngineError::build)
    }

    fn base_request(&self, call: &TxCall) -> TransactionRequest {
        TransactionRequest::default()
            .with_from(self.wallet.address())
            .with_to(call.to)
            .with_value(call.value)
            .with_input(call.data.clone())
    }

    fn assemble(&self, call: &TxCall, nonce: u64, gas: GasFields) -> PreparedTransaction {
        let request = self
            .base_request(call)
            .with_chain_id(self.wallet.chain_id())
            .with_nonce(nonce)
            .with_gas_limit(gas.gas_limit);

        let request = match gas.pricing {
            GasPricing::Legacy { gas_price } => request.with_gas_price(gas_price),
            GasPricing::FeeMarket {
                max_fee_per_gas,
                max_priority_fee_per_gas,
            } => request
                .with_max_fee_per_gas(max_fee_per_gas)
                .with_max_priority_fee_per_gas(max_priority_fee_per_gas),
        };

        debug!(nonce, gas_limit = gas.gas_limit, pricing = ?gas.pricing, "Transaction built");

        PreparedTransaction {
            request,
            nonce,
            gas,
        }
    }
}
