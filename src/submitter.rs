//! Retrying submission of one logical transaction.
//!
//! ```text
//! Built → Signed → Broadcast → Confirmed
//!                            → Reverted | TimedOut → Retrying → Built
//! any retryable failure      → Retrying → Built
//! Retrying, earlier hash mined → Confirmed
//! fatal failure / no attempts left → Abandoned
//! ```

use crate::blockchain::{ReceiptSummary, RpcGateway};
use crate::errors::{EngineError, EngineResult};
use crate::gas::GasFields;
use crate::retry::RetryConfig;
use crate::transaction_builder::{PreparedTransaction, TransactionBuilder, TxCall};
use crate::transaction_monitor::{ConfirmationStatus, TransactionMonitor};
use crate::wallet::Wallet;
use alloy::primitives::B256;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// One broadcast attempt of a logical submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    pub index: u32,
    pub nonce: u64,
    pub gas: GasFields,
    pub tx_hash: Option<B256>,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    ZeroBalance,
    AlreadyApproved,
}

/// Terminal result of a logical submission.
#[derive(Debug)]
pub enum TransactionOutcome {
    Confirmed {
        hash: B256,
        block_number: Option<u64>,
        link: String,
        attempts: Vec<Attempt>,
    },
    Abandoned {
        error: EngineError,
        attempts: Vec<Attempt>,
    },
    /// Nothing needed to be sent.
    Skipped(SkipReason),
}

impl TransactionOutcome {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, TransactionOutcome::Confirmed { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, TransactionOutcome::Skipped(_))
    }

    /// Whether anything was broadcast or attempted.
    pub fn was_submitted(&self) -> bool {
        !self.is_skipped()
    }

    pub fn attempts(&self) -> &[Attempt] {
        match self {
            TransactionOutcome::Confirmed { attempts, .. }
            | TransactionOutcome::Abandoned { attempts, .. } => attempts,
            TransactionOutcome::Skipped(_) => &[],
        }
    }
}

pub struct TransactionSubmitter {
    wallet: Arc<Wallet>,
    gateway: Arc<dyn RpcGateway>,
    builder: TransactionBuilder,
    monitor: TransactionMonitor,
    retry: RetryConfig,
    /// Serialises submissions of this wallet so nonces never race.
    in_flight: Mutex<()>,
}

impl TransactionSubmitter {
    pub fn new(
        wallet: Arc<Wallet>,
        gateway: Arc<dyn RpcGateway>,
        builder: TransactionBuilder,
        monitor: TransactionMonitor,
        retry: RetryConfig,
    ) -> Self {
        Self {
            wallet,
            gateway,
            builder,
            monitor,
            retry,
            in_flight: Mutex::new(()),
        }
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    /// Submit `call` with the default gas increment.
    pub async fn submit(&self, call: TxCall, label: &str) -> TransactionOutcome {
        self.submit_with_increment(call, label, self.retry.gas_increment)
            .await
    }

    pub async fn submit_with_increment(
        &self,
        call: TxCall,
        label: &str,
        increment: f64,
    ) -> TransactionOutcome {
        let _guard = self.in_flight.lock().await;

        let mut attempts: Vec<Attempt> = Vec::new();
        let mut index = 0u32;

        loop {
            // A slow earlier broadcast may have landed while we waited out the jitter
            if index > 0 {
                if let Some(receipt) = self.find_landed(label, &attempts).await {
                    return self.confirmed(label, receipt, attempts);
                }
            }

            // Escalate from the last attempt that got as far as building
            let previous_gas = attempts.last().map(|attempt| attempt.gas);

            let error = match self
                .run_attempt(&call, label, index, previous_gas, increment, &mut attempts)
                .await
            {
                Ok(receipt) => return self.confirmed(label, receipt, attempts),
                Err(error) => error,
            };

            if !error.is_retryable() {
                error!(label, attempt = index, error = %error, "Fatal error, abandoning transaction");
                return TransactionOutcome::Abandoned { error, attempts };
            }

            if index >= self.retry.max_retries {
                error!(label, attempts = index + 1, error = %error, "Retries exhausted");
                return TransactionOutcome::Abandoned {
                    error: EngineError::MaxRetriesExceeded {
                        attempts: index + 1,
                        last: Box::new(error),
                    },
                    attempts,
                };
            }

            let delay = self.retry.jitter_delay();
            warn!(
                label,
                attempt = index,
                error = %error,
                "🔄 Attempt {}/{} failed, retrying in {:?}",
                index + 1,
                self.retry.max_attempts(),
                delay
            );
            sleep(delay).await;
            index += 1;
        }
    }

    fn confirmed(
        &self,
        label: &str,
        receipt: ReceiptSummary,
        attempts: Vec<Attempt>,
    ) -> TransactionOutcome {
        let link = self.wallet.profile().tx_link(receipt.hash);
        info!(label, attempts = attempts.len(), %link, "🎉 Transaction confirmed");
        TransactionOutcome::Confirmed {
            hash: receipt.hash,
            block_number: receipt.block_number,
            link,
            attempts,
        }
    }

    /// First earlier broadcast that has since been mined successfully.
    async fn find_landed(&self, label: &str, attempts: &[Attempt]) -> Option<ReceiptSummary> {
        for hash in attempts.iter().filter_map(|attempt| attempt.tx_hash) {
            match self.gateway.transaction_receipt(hash).await {
                Ok(Some(receipt)) if receipt.success == Some(true) => {
                    info!(label, %hash, "✅ Earlier attempt landed, not resending");
                    return Some(receipt);
                }
                Ok(_) => {}
                Err(e) => debug!(label, %hash, error = %e, "Receipt re-check failed"),
            }
        }
        None
    }

    async fn run_attempt(
        &self,
        call: &TxCall,
        label: &str,
        index: u32,
        previous_gas: Option<GasFields>,
        increment: f64,
        attempts: &mut Vec<Attempt>,
    ) -> EngineResult<ReceiptSummary> {
        let prepared: PreparedTransaction = match previous_gas {
            Some(gas) => self.builder.rebuild(call, &gas, index, increment).await?,
            None => self.builder.build(call).await?,
        };

        attempts.push(Attempt {
            index,
            nonce: prepared.nonce,
            gas: prepared.gas,
            tx_hash: None,
            started_at: Utc::now(),
        });

        let signed = self.wallet.sign(prepared.request).await?;
        let tx_hash = self.gateway.send_raw_transaction(&signed.raw).await?;
        if let Some(attempt) = attempts.last_mut() {
            attempt.tx_hash = Some(tx_hash);
        }

        info!(
            label,
            attempt = index,
            nonce = prepared.nonce,
            link = %self.wallet.profile().tx_link(tx_hash),
            "📤 Transaction sent"
        );

        match self.monitor.monitor_transaction(label, tx_hash).await {
            ConfirmationStatus::Confirmed(receipt) => Ok(receipt),
            ConfirmationStatus::Reverted(_) => Err(EngineError::Reverted(tx_hash)),
            ConfirmationStatus::TimedOut => Err(EngineError::ConfirmationTimeout {
                hash: tx_hash,
                timeout: self.monitor.max_wait_time(),
            }),
        }
    }
}
