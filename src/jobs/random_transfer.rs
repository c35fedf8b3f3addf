use crate::blockchain::RpcGateway;
use crate::errors::{EngineError, EngineResult};
use crate::gas::PricingMode;
use crate::submitter::{SkipReason, TransactionOutcome, TransactionSubmitter};
use crate::transaction_builder::TxCall;
use crate::wallet::{disposable_address, Wallet};
use alloy::primitives::U256;
use rand::Rng;
use std::sync::Arc;
use tracing::{info, warn};

/// Inclusive percentage range, `0 <= min <= max <= 100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PercentageRange {
    min: u8,
    max: u8,
}

impl PercentageRange {
    pub fn new(min: u8, max: u8) -> EngineResult<Self> {
        if min > max || max > 100 {
            return Err(EngineError::Config(format!(
                "Invalid percentage range {}..={}",
                min, max
            )));
        }
        Ok(Self { min, max })
    }

    pub fn pick<R: Rng + ?Sized>(&self, rng: &mut R) -> u8 {
        rng.gen_range(self.min..=self.max)
    }
}

/// `floor(balance * percentage / 100)`.
pub fn transfer_amount(balance: U256, percentage: u8) -> U256 {
    balance.saturating_mul(U256::from(percentage)) / U256::from(100u8)
}

/// Sends a random share of the native balance to a throwaway address.
pub struct RandomTransferSelector {
    wallet: Arc<Wallet>,
    gateway: Arc<dyn RpcGateway>,
    submitter: Arc<TransactionSubmitter>,
    gas_limit: u64,
}

impl RandomTransferSelector {
    pub fn new(
        wallet: Arc<Wallet>,
        gateway: Arc<dyn RpcGateway>,
        submitter: Arc<TransactionSubmitter>,
        gas_limit: u64,
    ) -> Self {
        Self {
            wallet,
            gateway,
            submitter,
            gas_limit,
        }
    }

    pub async fn send_random_transfer(
        &self,
        range: PercentageRange,
    ) -> EngineResult<TransactionOutcome> {
        let label = self.wallet.label();
        let balance = self.gateway.balance(self.wallet.address()).await?;

        if balance.is_zero() {
            warn!(label, "This wallet has no balance, skipping");
            return Ok(TransactionOutcome::Skipped(SkipReason::ZeroBalance));
        }

        let percentage = range.pick(&mut rand::thread_rng());
        let amount = transfer_amount(balance, percentage);
        // Nobody keeps the key for this address
        let recipient = disposable_address();

        info!(
            label,
            %recipient,
            %amount,
            percentage,
            "Sending {} to a random wallet",
            self.wallet.profile().native_symbol
        );

        let call = TxCall::transfer(recipient, amount)
            .with_gas_limit(self.gas_limit)
            .with_pricing(PricingMode::Legacy);
        let increment = self.submitter.retry_config().transfer_gas_increment;

        Ok(self
            .submitter
            .submit_with_increment(
                call,
                &format!("{} Send {}", label, self.wallet.profile().native_symbol),
                increment,
            )
            .await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_amount_floors() {
        assert_eq!(transfer_amount(U256::from(1_000_000u64), 10), U256::from(100_000u64));
        assert_eq!(transfer_amount(U256::from(999u64), 10), U256::from(99u64));
        assert_eq!(transfer_amount(U256::from(5u64), 0), U256::ZERO);
        assert_eq!(transfer_amount(U256::from(5u64), 100), U256::from(5u64));
    }

    #[test]
    fn test_pick_is_inclusive() {
        let range = PercentageRange::new(10, 12).unwrap();
        let mut rng = rand::thread_rng();
        let mut seen = [false; 3];
        for _ in 0..500 {
            let pick = range.pick(&mut rng);
            assert!((10..=12).contains(&pick));
            seen[(pick - 10) as usize] = true;
        }
        assert!(seen.iter().all(|s| *s));
    }

    #[test]
    fn test_single_value_range() {
        let range = PercentageRange::new(10, 10).unwrap();
        assert_eq!(range.pick(&mut rand::thread_rng()), 10);
    }

    #[test]
    fn test_invalid_ranges() {
        assert!(PercentageRange::new(20, 10).is_err());
        assert!(PercentageRange::new(0, 101).is_err());
    }
}
