use crate::blockchain::{BlockchainClient, RpcGateway, RpcOptions};
use crate::chains::{ChainProfile, ChainRegistry};
use crate::config::EngineConfig;
use crate::errors::{EngineError, EngineResult};
use crate::gas::GasGate;
use crate::jobs::random_transfer::{PercentageRange, RandomTransferSelector};
use crate::jobs::token_operations::TokenOperations;
use crate::retry::RetryConfig;
use crate::submitter::{TransactionOutcome, TransactionSubmitter};
use crate::transaction_builder::{TransactionBuilder, TxCall};
use crate::transaction_monitor::TransactionMonitor;
use crate::wallet::Wallet;
use alloy::primitives::{Address, U256};
use std::sync::Arc;
use std::time::Duration;

/// Timing and retry knobs for one account, taken from [`EngineConfig`].
#[derive(Debug, Clone)]
pub struct AccountSettings {
    pub retry: RetryConfig,
    pub transaction_timeout: Duration,
    pub poll_interval: Duration,
    pub approve_cooldown: (Duration, Duration),
    pub transfer_gas_limit: u64,
}

impl AccountSettings {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            retry: RetryConfig::from_settings(&config.retry),
            transaction_timeout: config.monitoring.transaction_timeout(),
            poll_interval: config.monitoring.poll_interval(),
            approve_cooldown: (
                Duration::from_secs(config.approve.cooldown_min_seconds),
                Duration::from_secs(config.approve.cooldown_max_seconds),
            ),
            transfer_gas_limit: config.transfer.gas_limit,
        }
    }
}

/// Everything one keyed account can do on one chain.
pub struct Account {
    wallet: Arc<Wallet>,
    gateway: Arc<dyn RpcGateway>,
    submitter: Arc<TransactionSubmitter>,
    tokens: TokenOperations,
    transfers: RandomTransferSelector,
}

impl Account {
    pub fn new(
        wallet: Arc<Wallet>,
        gateway: Arc<dyn RpcGateway>,
        settings: AccountSettings,
        gas_gate: Option<GasGate>,
    ) -> Self {
        let builder = TransactionBuilder::new(wallet.clone(), gateway.clone(), gas_gate);
        let monitor = TransactionMonitor::new(
            gateway.clone(),
            settings.transaction_timeout,
            settings.poll_interval,
        );
        let submitter = Arc::new(TransactionSubmitter::new(
            wallet.clone(),
            gateway.clone(),
            builder,
            monitor,
            settings.retry,
        ));

        let tokens = TokenOperations::new(
            wallet.clone(),
            gateway.clone(),
            submitter.clone(),
            settings.approve_cooldown.0,
            settings.approve_cooldown.1,
        );
        let transfers = RandomTransferSelector::new(
            wallet.clone(),
            gateway.clone(),
            submitter.clone(),
            settings.transfer_gas_limit,
        );

        Self {
            wallet,
            gateway,
            submitter,
            tokens,
            transfers,
        }
    }

    /// Connect `private_key` to the chain described by `profile`.
    pub async fn connect(
        private_key: &str,
        label: &str,
        profile: Arc<ChainProfile>,
        config: &EngineConfig,
        gas_gate: Option<GasGate>,
    ) -> EngineResult<Self> {
        let wallet = Arc::new(Wallet::from_private_key(private_key, profile.clone(), label)?);
        let rpc = RpcOptions::from_settings(&config.monitoring);
        let client = BlockchainClient::connect(&profile, &rpc).await?;

        Ok(Self::new(
            wallet,
            Arc::new(client),
            AccountSettings::from_config(config),
            gas_gate,
        ))
    }

    pub fn address(&self) -> Address {
        self.wallet.address()
    }

    pub fn wallet(&self) -> &Arc<Wallet> {
        &self.wallet
    }

    pub fn gateway(&self) -> &Arc<dyn RpcGateway> {
        &self.gateway
    }

    pub async fn submit(&self, call: TxCall, label: &str) -> TransactionOutcome {
        self.submitter.submit(call, label).await
    }

    pub async fn get_balance(&self, token: Option<Address>) -> EngineResult<U256> {
        self.tokens.get_balance(token).await
    }

    pub async fn get_allowance(&self, token: Address, spender: Address) -> EngineResult<U256> {
        self.tokens.get_allowance(token, spender).await
    }

    pub fn tokens(&self) -> &TokenOperations {
        &self.tokens
    }

    pub async fn approve(
        &self,
        token: Address,
        spender: Address,
        amount: U256,
    ) -> EngineResult<TransactionOutcome> {
        self.tokens.approve(token, spender, amount).await
    }

    pub async fn send_random_transfer(
        &self,
        range: PercentageRange,
    ) -> EngineResult<TransactionOutcome> {
        self.transfers.send_random_transfer(range).await
    }
}

/// Build the gas gate described by `[gas_gate]`, if any.
pub async fn gas_gate_from_config(
    config: &EngineConfig,
    registry: &ChainRegistry,
) -> EngineResult<Option<GasGate>> {
    let Some(settings) = &config.gas_gate else {
        return Ok(None);
    };

    let profile = registry.get(&settings.chain)?;
    let client = BlockchainClient::connect(&profile, &RpcOptions::from_settings(&config.monitoring))
        .await
        .map_err(|e| EngineError::Config(format!("gas gate chain {}: {}", settings.chain, e)))?;

    Ok(Some(GasGate::new(
        Arc::new(client),
        settings.max_gwei,
        Duration::from_secs(settings.check_interval_seconds),
    )))
}
