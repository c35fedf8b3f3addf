//! In-memory ledger used by the integration tests.
#![allow(dead_code)]

use alloy::consensus::{Transaction, TxEnvelope};
use alloy::eips::eip2718::Decodable2718;
use alloy::primitives::{keccak256, Address, Bytes, B256, U256};
use alloy::rpc::types::TransactionRequest;
use alloy::sol_types::{SolCall, SolValue};
use async_trait::async_trait;
use evm_tx_runner::account::{Account, AccountSettings};
use evm_tx_runner::blockchain::{ReceiptSummary, RpcGateway};
use evm_tx_runner::chains::{builtin_profiles, ChainProfile};
use evm_tx_runner::contracts::erc20::IERC20;
use evm_tx_runner::errors::{EngineError, EngineResult};
use evm_tx_runner::retry::RetryConfig;
use evm_tx_runner::wallet::Wallet;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

// Anvil's first account
pub const TEST_PRIVATE_KEY: &str =
    "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

pub const TEST_GAS_PRICE: u128 = 1_000_000_000;
pub const TEST_GAS_ESTIMATE: u64 = 46_000;

/// What happens after a transaction is broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptScript {
    Success,
    Revert,
    /// Never mined.
    Missing,
    /// Receipt without a block for `n` polls, then success.
    PendingThenSuccess(u32),
    /// Not mined until [`MockGateway::release_held`], then success.
    Held,
}

/// A broadcast transaction as decoded by the mock.
#[derive(Debug, Clone)]
pub struct Broadcast {
    pub hash: B256,
    pub to: Option<Address>,
    pub value: U256,
    pub nonce: u64,
    pub gas_limit: u64,
    pub gas_price: Option<u128>,
    pub max_fee_per_gas: u128,
    pub input: Bytes,
}

#[derive(Debug)]
struct MockState {
    chain_id: u64,
    gas_price: u128,
    priority_fee: u128,
    /// Returned by the next nonce query; grows by `nonce_step` per query.
    nonce: u64,
    nonce_step: u64,
    nonce_queries: u32,
    native_balance: U256,
    token_balance: U256,
    allowance: U256,
    decimals: u8,
    symbol: String,
    broadcast_failures: VecDeque<EngineError>,
    nonce_failures: VecDeque<EngineError>,
    gas_price_failures: VecDeque<EngineError>,
    estimate_failures: VecDeque<EngineError>,
    held_released: bool,
    receipt_scripts: VecDeque<ReceiptScript>,
    default_receipt: ReceiptScript,
    scripted: Vec<(B256, ReceiptScript, u32)>,
    broadcasts: Vec<Broadcast>,
    broadcast_attempts: u32,
    receipt_queries: u32,
    gas_price_queries: u32,
    gas_price_sequence: VecDeque<u128>,
}

pub struct MockGateway {
    state: Mutex<MockState>,
}

impl MockGateway {
    pub fn new(chain_id: u64) -> Self {
        Self {
            state: Mutex::new(MockState {
                chain_id,
                gas_price: TEST_GAS_PRICE,
                priority_fee: 1_000_000,
                nonce: 0,
                nonce_step: 0,
                nonce_queries: 0,
                native_balance: U256::from(1_000_000_000_000_000_000u128),
                token_balance: U256::ZERO,
                allowance: U256::ZERO,
                decimals: 18,
                symbol: "TKN".to_string(),
                broadcast_failures: VecDeque::new(),
                nonce_failures: VecDeque::new(),
                gas_price_failures: VecDeque::new(),
                estimate_failures: VecDeque::new(),
                held_released: false,
                receipt_scripts: VecDeque::new(),
                default_receipt: ReceiptScript::Success,
                scripted: Vec::new(),
                broadcasts: Vec::new(),
                broadcast_attempts: 0,
                receipt_queries: 0,
                gas_price_queries: 0,
                gas_price_sequence: VecDeque::new(),
            }),
        }
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut MockState) -> T) -> T {
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }

    pub fn set_nonce(&self, nonce: u64, step: u64) {
        self.with_state(|s| {
            s.nonce = nonce;
            s.nonce_step = step;
        });
    }

    pub fn set_native_balance(&self, balance: U256) {
        self.with_state(|s| s.native_balance = balance);
    }

    pub fn set_token(&self, balance: U256, allowance: U256) {
        self.with_state(|s| {
            s.token_balance = balance;
            s.allowance = allowance;
        });
    }

    /// Gas prices returned by successive queries before falling back to the fixed price.
    pub fn queue_gas_prices(&self, prices: &[u128]) {
        self.with_state(|s| s.gas_price_sequence.extend(prices.iter().copied()));
    }

    pub fn fail_broadcasts(&self, errors: Vec<EngineError>) {
        self.with_state(|s| s.broadcast_failures.extend(errors));
    }

    pub fn fail_nonce_queries(&self, errors: Vec<EngineError>) {
        self.with_state(|s| s.nonce_failures.extend(errors));
    }

    pub fn fail_gas_prices(&self, errors: Vec<EngineError>) {
        self.with_state(|s| s.gas_price_failures.extend(errors));
    }

    pub fn fail_estimates(&self, errors: Vec<EngineError>) {
        self.with_state(|s| s.estimate_failures.extend(errors));
    }

    /// Mine every transaction scripted as [`ReceiptScript::Held`].
    pub fn release_held(&self) {
        self.with_state(|s| s.held_released = true);
    }

    pub fn script_receipts(&self, scripts: &[ReceiptScript]) {
        self.with_state(|s| s.receipt_scripts.extend(scripts.iter().copied()));
    }

    pub fn set_default_receipt(&self, script: ReceiptScript) {
        self.with_state(|s| s.default_receipt = script);
    }

    pub fn broadcasts(&self) -> Vec<Broadcast> {
        self.with_state(|s| s.broadcasts.clone())
    }

    pub fn broadcast_attempts(&self) -> u32 {
        self.with_state(|s| s.broadcast_attempts)
    }

    pub fn nonce_queries(&self) -> u32 {
        self.with_state(|s| s.nonce_queries)
    }

    pub fn receipt_queries(&self) -> u32 {
        self.with_state(|s| s.receipt_queries)
    }

    pub fn gas_price_queries(&self) -> u32 {
        self.with_state(|s| s.gas_price_queries)
    }

    /// Simulate an already-broadcast transaction for poller tests.
    pub fn register_hash(&self, hash: B256, script: ReceiptScript) {
        self.with_state(|s| s.scripted.push((hash, script, 0)));
    }
}

fn word(value: U256) -> Bytes {
    Bytes::from(value.to_be_bytes::<32>().to_vec())
}

#[async_trait]
impl RpcGateway for MockGateway {
    async fn chain_id(&self) -> EngineResult<u64> {
        Ok(self.with_state(|s| s.chain_id))
    }

    async fn gas_price(&self) -> EngineResult<u128> {
        self.with_state(|s| {
            s.gas_price_queries += 1;
            if let Some(error) = s.gas_price_failures.pop_front() {
                return Err(error);
            }
            Ok(s.gas_price_sequence.pop_front().unwrap_or(s.gas_price))
        })
    }

    async fn max_priority_fee(&self) -> EngineResult<u128> {
        Ok(self.with_state(|s| s.priority_fee))
    }

    async fn transaction_count(&self, _address: Address) -> EngineResult<u64> {
        self.with_state(|s| {
            s.nonce_queries += 1;
            if let Some(error) = s.nonce_failures.pop_front() {
                return Err(error);
            }
            let nonce = s.nonce;
            s.nonce += s.nonce_step;
            Ok(nonce)
        })
    }

    async fn balance(&self, _address: Address) -> EngineResult<U256> {
        Ok(self.with_state(|s| s.native_balance))
    }

    async fn estimate_gas(&self, _tx: TransactionRequest) -> EngineResult<u64> {
        self.with_state(|s| match s.estimate_failures.pop_front() {
            Some(error) => Err(error),
            None => Ok(TEST_GAS_ESTIMATE),
        })
    }

    async fn call(&self, tx: TransactionRequest) -> EngineResult<Bytes> {
        let data = tx.input.input().cloned().unwrap_or_default();
        if data.len() < 4 {
            return Err(EngineError::Node {
                code: -32000,
                message: "execution reverted".to_string(),
                transient: false,
            });
        }
        let selector: [u8; 4] = [data[0], data[1], data[2], data[3]];

        self.with_state(|s| {
            if selector == IERC20::balanceOfCall::SELECTOR {
                Ok(word(s.token_balance))
            } else if selector == IERC20::allowanceCall::SELECTOR {
                Ok(word(s.allowance))
            } else if selector == IERC20::decimalsCall::SELECTOR {
                Ok(word(U256::from(s.decimals)))
            } else if selector == IERC20::symbolCall::SELECTOR {
                Ok(Bytes::from((s.symbol.clone(),).abi_encode_params()))
            } else {
                Err(EngineError::Node {
                    code: -32000,
                    message: "execution reverted".to_string(),
                    transient: false,
                })
            }
        })
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> EngineResult<B256> {
        self.with_state(|s| {
            s.broadcast_attempts += 1;
            if let Some(error) = s.broadcast_failures.pop_front() {
                return Err(error);
            }

            let envelope = TxEnvelope::decode_2718(&mut &raw[..])
                .map_err(|e| EngineError::Node {
                    code: -32602,
                    message: format!("rlp: {}", e),
                    transient: false,
                })?;
            let hash = keccak256(raw);

            s.broadcasts.push(Broadcast {
                hash,
                to: envelope.to(),
                value: envelope.value(),
                nonce: envelope.nonce(),
                gas_limit: envelope.gas_limit(),
                gas_price: envelope.gas_price(),
                max_fee_per_gas: envelope.max_fee_per_gas(),
                input: envelope.input().clone(),
            });

            let script = s.receipt_scripts.pop_front().unwrap_or(s.default_receipt);
            s.scripted.push((hash, script, 0));
            Ok(hash)
        })
    }

    async fn transaction_receipt(&self, hash: B256) -> EngineResult<Option<ReceiptSummary>> {
        self.with_state(|s| {
            s.receipt_queries += 1;
            let Some(entry) = s.scripted.iter_mut().find(|(h, _, _)| *h == hash) else {
                return Ok(None);
            };
            entry.2 += 1;
            let polls = entry.2;
            let released = s.held_released;

            let summary = |success: Option<bool>| ReceiptSummary {
                hash,
                block_number: success.map(|_| 100),
                gas_used: 21_000,
                success,
            };

            Ok(match entry.1 {
                ReceiptScript::Success => Some(summary(Some(true))),
                ReceiptScript::Revert => Some(summary(Some(false))),
                ReceiptScript::Missing => None,
                ReceiptScript::PendingThenSuccess(pending) => {
                    if polls <= pending {
                        Some(summary(None))
                    } else {
                        Some(summary(Some(true)))
                    }
                }
                ReceiptScript::Held if released => Some(summary(Some(true))),
                ReceiptScript::Held => None,
            })
        })
    }
}

pub fn test_profile(eip1559: bool) -> Arc<ChainProfile> {
    let mut profile = builtin_profiles()
        .into_iter()
        .find(|p| p.name == "base")
        .unwrap();
    profile.eip1559 = eip1559;
    Arc::new(profile)
}

pub fn test_wallet(profile: Arc<ChainProfile>) -> Arc<Wallet> {
    Arc::new(Wallet::from_private_key(TEST_PRIVATE_KEY, profile, "[1/1]").unwrap())
}

/// Millisecond timings so retry scenarios finish quickly.
pub fn fast_settings(max_retries: u32) -> AccountSettings {
    AccountSettings {
        retry: RetryConfig::new(max_retries, Duration::from_millis(1), Duration::from_millis(3)),
        transaction_timeout: Duration::from_millis(40),
        poll_interval: Duration::from_millis(10),
        approve_cooldown: (Duration::ZERO, Duration::ZERO),
        transfer_gas_limit: 21_000,
    }
}

pub fn test_account(max_retries: u32) -> (Account, Arc<MockGateway>) {
    let profile = test_profile(false);
    let gateway = Arc::new(MockGateway::new(profile.chain_id));
    let account = Account::new(
        test_wallet(profile),
        gateway.clone(),
        fast_settings(max_retries),
        None,
    );
    (account, gateway)
}

pub fn transient_error() -> EngineError {
    EngineError::Network("connection reset by peer".to_string())
}
