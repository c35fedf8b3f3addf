use crate::blockchain::{ReceiptSummary, RpcGateway};
use alloy::primitives::B256;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// How a broadcast transaction ended up after polling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmationStatus {
    Confirmed(ReceiptSummary),
    Reverted(ReceiptSummary),
    TimedOut,
}

pub struct TransactionMonitor {
    gateway: Arc<dyn RpcGateway>,
    max_wait_time: Duration,
    poll_interval: Duration,
}

impl TransactionMonitor {
    pub fn new(gateway: Arc<dyn RpcGateway>, max_wait_time: Duration, poll_interval: Duration) -> Self {
        Self {
            gateway,
            max_wait_time,
            poll_interval,
        }
    }

    pub fn max_wait_time(&self) -> Duration {
        self.max_wait_time
    }

    /// Poll for the receipt of `tx_hash` until it is decided or the budget runs out.
    ///
    /// A missing receipt, a receipt without a block and a failed receipt query
    /// all mean "keep waiting". The total wait is bounded by the timeout plus
    /// one poll interval.
    pub async fn monitor_transaction(&self, label: &str, tx_hash: B256) -> ConfirmationStatus {
        let start_time = Instant::now();

        loop {
            match self.gateway.transaction_receipt(tx_hash).await {
                Ok(Some(receipt)) => match receipt.success {
                    Some(true) => {
                        info!(label, %tx_hash, block = ?receipt.block_number, "✅ Tx confirmed");
                        return ConfirmationStatus::Confirmed(receipt);
                    }
                    Some(false) => {
                        error!(label, %tx_hash, "❌ Transaction failed");
                        return ConfirmationStatus::Reverted(receipt);
                    }
                    None => debug!(label, %tx_hash, "Receipt has no block yet"),
                },
                Ok(None) => {}
                Err(e) => warn!(label, %tx_hash, error = %e, "Error checking transaction status"),
            }

            if start_time.elapsed() >= self.max_wait_time {
                error!(
                    label,
                    %tx_hash,
                    "⏰ Transaction is not in the chain after {:?}",
                    self.max_wait_time
                );
                return ConfirmationStatus::TimedOut;
            }

            warn!(label, "⏳ Waiting for tx confirmation...");
            sleep(self.poll_interval).await;
        }
    }
}
