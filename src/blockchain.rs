use crate::chains::ChainProfile;
use crate::config::MonitoringSettings;
use crate::errors::{EngineError, EngineResult, TRANSIENT_HTTP_STATUSES};
use alloy::network::Ethereum;
use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::client::RpcClient;
use alloy::rpc::types::TransactionRequest;
use alloy::transports::layers::{RateLimitRetryPolicy, RetryBackoffLayer, RetryPolicy};
use alloy::transports::{RpcError, TransportError, TransportErrorKind};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::info;
use url::Url;

/// What a receipt says about a mined (or almost mined) transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiptSummary {
    pub hash: B256,
    pub block_number: Option<u64>,
    pub gas_used: u64,
    /// `None` while the node reports the receipt without a block.
    pub success: Option<bool>,
}

/// Ledger operations the engine consumes.
#[async_trait]
pub trait RpcGateway: Send + Sync {
    async fn chain_id(&self) -> EngineResult<u64>;

    async fn gas_price(&self) -> EngineResult<u128>;

    async fn max_priority_fee(&self) -> EngineResult<u128>;

    /// Latest transaction count of `address`.
    async fn transaction_count(&self, address: Address) -> EngineResult<u64>;

    async fn balance(&self, address: Address) -> EngineResult<U256>;

    async fn estimate_gas(&self, tx: TransactionRequest) -> EngineResult<u64>;

    async fn call(&self, tx: TransactionRequest) -> EngineResult<Bytes>;

    async fn send_raw_transaction(&self, raw: &[u8]) -> EngineResult<B256>;

    async fn transaction_receipt(&self, hash: B256) -> EngineResult<Option<ReceiptSummary>>;
}

/// Per-call timeout and transport retry knobs for [`BlockchainClient`].
#[derive(Debug, Clone)]
pub struct RpcOptions {
    pub timeout: Duration,
    /// Transport-level retries of one RPC call on a transient failure.
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub compute_units_per_second: u64,
}

impl RpcOptions {
    pub fn from_settings(settings: &MonitoringSettings) -> Self {
        Self {
            timeout: settings.rpc_timeout(),
            max_retries: settings.rpc_max_retries,
            initial_backoff_ms: settings.rpc_initial_backoff_ms,
            compute_units_per_second: settings.rpc_compute_units_per_second,
        }
    }

    pub fn retry_layer(&self) -> RetryBackoffLayer<TransientRpcPolicy> {
        RetryBackoffLayer::new_with_policy(
            self.max_retries,
            self.initial_backoff_ms,
            self.compute_units_per_second,
            TransientRpcPolicy,
        )
    }
}

/// Retries what alloy treats as rate limiting plus the HTTP statuses of an
/// overloaded node. Node verdicts such as reverts are returned at once.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransientRpcPolicy;

impl RetryPolicy for TransientRpcPolicy {
    fn should_retry(&self, error: &TransportError) -> bool {
        if RateLimitRetryPolicy::default().should_retry(error) {
            return true;
        }
        matches!(
            error,
            RpcError::Transport(TransportErrorKind::HttpError(http))
                if TRANSIENT_HTTP_STATUSES.contains(&http.status)
        )
    }

    fn backoff_hint(&self, error: &TransportError) -> Option<Duration> {
        RateLimitRetryPolicy::default().backoff_hint(error)
    }
}

/// [`RpcGateway`] over an alloy HTTP provider.
#[derive(Clone)]
pub struct BlockchainClient {
    provider: Arc<dyn Provider<Ethereum>>,
    rpc_timeout: Duration,
}

impl BlockchainClient {
    pub fn new(rpc_url: &str, options: &RpcOptions) -> EngineResult<Self> {
        let url = Url::parse(rpc_url)
            .map_err(|e| EngineError::Config(format!("Invalid RPC URL {}: {}", rpc_url, e)))?;

        let client = RpcClient::builder()
            .layer(options.retry_layer())
            .http(url);

        Ok(Self::from_client(client, options.timeout))
    }

    /// Wrap an already configured RPC client.
    pub fn from_client(client: RpcClient, rpc_timeout: Duration) -> Self {
        let provider = ProviderBuilder::new().connect_client(client);

        Self {
            provider: Arc::new(provider),
            rpc_timeout,
        }
    }

    /// Connect to the profile's RPC and check that it serves the expected chain.
    pub async fn connect(profile: &ChainProfile, options: &RpcOptions) -> EngineResult<Self> {
        info!(chain = %profile.name, rpc = %profile.rpc_url, "🔗 Connecting to RPC");

        let client = Self::new(&profile.rpc_url, options)?;
        let chain_id = client.chain_id().await?;
        if chain_id != profile.chain_id {
            return Err(EngineError::Config(format!(
                "Chain ID mismatch: expected {}, got {}",
                profile.chain_id, chain_id
            )));
        }

        info!(chain_id, "✅ Connected");
        Ok(client)
    }

    pub fn provider(&self) -> Arc<dyn Provider<Ethereum>> {
        self.provider.clone()
    }

    async fn with_timeout<T, F>(&self, fut: F) -> EngineResult<T>
    where
        F: Future<Output = Result<T, TransportError>>,
    {
        match timeout(self.rpc_timeout, fut).await {
            Ok(result) => result.map_err(EngineError::from),
            Err(_) => Err(EngineError::Network(format!(
                "RPC call timed out after {:?}",
                self.rpc_timeout
            ))),
        }
    }
}

#[async_trait]
impl RpcGateway for BlockchainClient {
    async fn chain_id(&self) -> EngineResult<u64> {
        self.with_timeout(async { self.provider.get_chain_id().await })
            .await
    }

    async fn gas_price(&self) -> EngineResult<u128> {
        self.with_timeout(async { self.provider.get_gas_price().await })
            .await
    }

    async fn max_priority_fee(&self) -> EngineResult<u128> {
        self.with_timeout(async { self.provider.get_max_priority_fee_per_gas().await })
            .await
    }

    async fn transaction_count(&self, address: Address) -> EngineResult<u64> {
        self.with_timeout(async { self.provider.get_transaction_count(address).await })
            .await
    }

    async fn balance(&self, address: Address) -> EngineResult<U256> {
        self.with_timeout(async { self.provider.get_balance(address).await })
            .await
    }

    async fn estimate_gas(&self, tx: TransactionRequest) -> EngineResult<u64> {
        self.with_timeout(async { self.provider.estimate_gas(tx).await })
            .await
    }

    async fn call(&self, tx: TransactionRequest) -> EngineResult<Bytes> {
        self.with_timeout(async { self.provider.call(tx).await })
            .await
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> EngineResult<B256> {
        let pending = self
            .with_timeout(async { self.provider.send_raw_transaction(raw).await })
            .await?;
        Ok(*pending.tx_hash())
    }

    async fn transaction_receipt(&self, hash: B256) -> EngineResult<Option<ReceiptSummary>> {
        let receipt = self
            .with_timeout(async { self.provider.get_transaction_receipt(hash).await })
            .await?;

        Ok(receipt.map(|receipt| ReceiptSummary {
            hash,
            block_number: receipt.block_number,
            gas_used: receipt.gas_used,
            success: receipt.block_number.map(|_| receipt.status()),
        }))
    }
}
