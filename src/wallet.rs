//! Account keys and transaction signing.
//!
//! The private key lives only inside the [`PrivateKeySigner`]; it is never
//! logged, serialized or included in an error.

use crate::chains::ChainProfile;
use crate::errors::{EngineError, EngineResult};
use alloy::eips::eip2718::Encodable2718;
use alloy::network::{Ethereum, EthereumWallet, TransactionBuilder};
use alloy::primitives::{Address, Bytes, B256};
use alloy::rpc::types::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::{Signature, Signer};
use rand::RngCore;
use std::fmt;
use std::sync::Arc;

/// A signed, EIP-2718 encoded transaction ready for broadcast.
#[derive(Debug, Clone)]
pub struct SignedTransaction {
    pub hash: B256,
    pub raw: Bytes,
}

pub struct Wallet {
    signer: PrivateKeySigner,
    wallet: EthereumWallet,
    profile: Arc<ChainProfile>,
    label: String,
}

impl Wallet {
    /// Create a wallet from a hex-encoded private key, with or without `0x`.
    pub fn from_private_key(
        private_key_hex: &str,
        profile: Arc<ChainProfile>,
        label: impl Into<String>,
    ) -> EngineResult<Self> {
        let key_hex = private_key_hex
            .trim()
            .strip_prefix("0x")
            .unwrap_or(private_key_hex.trim());

        // The parse error would echo the input
        let signer: PrivateKeySigner = key_hex
            .parse()
            .map_err(|_| EngineError::Signature("Invalid private key format".to_string()))?;
        let signer = signer.with_chain_id(Some(profile.chain_id));
        let wallet = EthereumWallet::from(signer.clone());

        Ok(Self {
            label: format!("{} {} |", label.into(), signer.address()),
            signer,
            wallet,
            profile,
        })
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    pub fn chain_id(&self) -> u64 {
        self.profile.chain_id
    }

    pub fn profile(&self) -> &Arc<ChainProfile> {
        &self.profile
    }

    /// Log prefix: `<caller label> <address> |`.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Sign a fully populated request; the envelope type follows its pricing fields.
    pub async fn sign(&self, request: TransactionRequest) -> EngineResult<SignedTransaction> {
        let envelope = <TransactionRequest as TransactionBuilder<Ethereum>>::build(
            request,
            &self.wallet,
        )
        .await
        .map_err(|e| EngineError::Signature(e.to_string()))?;

        Ok(SignedTransaction {
            hash: *envelope.tx_hash(),
            raw: envelope.encoded_2718().into(),
        })
    }

    /// Personal-sign a message (EIP-191 prefix).
    pub async fn sign_message(&self, message: &[u8]) -> EngineResult<Signature> {
        self.signer
            .sign_message(message)
            .await
            .map_err(|e| EngineError::Signature(format!("Message signing failed: {}", e)))
    }
}

impl fmt::Debug for Wallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wallet")
            .field("address", &self.address())
            .field("chain", &self.profile.name)
            .finish()
    }
}

/// Address of a freshly generated key that is dropped before returning.
pub fn disposable_address() -> Address {
    let mut rng = rand::thread_rng();
    loop {
        let mut bytes = [0u8; 32];
        rng.fill_bytes(&mut bytes);
        // Rejects zero and values above the curve order
        if let Ok(signer) = PrivateKeySigner::from_bytes(&B256::from(bytes)) {
            return signer.address();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chains::builtin_profiles;
    use alloy::primitives::U256;

    // Anvil's first account
    const TEST_PRIVATE_KEY: &str =
        "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const TEST_ADDRESS: &str = "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266";

    fn profile() -> Arc<ChainProfile> {
        Arc::new(builtin_profiles().remove(0))
    }

    #[test]
    fn test_address_derivation() {
        let wallet = Wallet::from_private_key(TEST_PRIVATE_KEY, profile(), "[1/1]").unwrap();
        assert_eq!(wallet.address().to_string().to_lowercase(), TEST_ADDRESS);

        let prefixed =
            Wallet::from_private_key(&format!("0x{}", TEST_PRIVATE_KEY), profile(), "[1/1]")
                .unwrap();
        assert_eq!(prefixed.address(), wallet.address());
        assert!(wallet.label().starts_with("[1/1] 0x"));
    }

    #[test]
    fn test_invalid_key_does_not_leak_input() {
        let err = Wallet::from_private_key("not-a-key-deadbeef", profile(), "").unwrap_err();
        assert!(matches!(err, EngineError::Signature(_)));
        assert!(!err.to_string().contains("deadbeef"));
    }

    #[test]
    fn test_debug_hides_key() {
        let wallet = Wallet::from_private_key(TEST_PRIVATE_KEY, profile(), "").unwrap();
        let debug = format!("{:?}", wallet);
        assert!(!debug.contains(TEST_PRIVATE_KEY));
        assert!(debug.contains("address"));
    }

    #[tokio::test]
    async fn test_sign_legacy_transaction() {
        let wallet = Wallet::from_private_key(TEST_PRIVATE_KEY, profile(), "").unwrap();
        let request = TransactionRequest::default()
            .with_from(wallet.address())
            .with_to(Address::repeat_byte(0x11))
            .with_value(U256::from(1u64))
            .with_nonce(0)
            .with_chain_id(1)
            .with_gas_limit(21_000)
            .with_gas_price(1_000_000_000);

        let signed = wallet.sign(request.clone()).await.unwrap();
        assert_ne!(signed.hash, B256::ZERO);
        assert!(!signed.raw.is_empty());

        // Deterministic signatures give the same hash for the same request
        let again = wallet.sign(request).await.unwrap();
        assert_eq!(signed.hash, again.hash);
    }

    #[tokio::test]
    async fn test_sign_incomplete_request_fails() {
        let wallet = Wallet::from_private_key(TEST_PRIVATE_KEY, profile(), "").unwrap();
        let request = TransactionRequest::default().with_to(Address::repeat_byte(0x11));
        let err = wallet.sign(request).await.unwrap_err();
        assert!(matches!(err, EngineError::Signature(_)));
    }

    #[tokio::test]
    async fn test_sign_message() {
        let wallet = Wallet::from_private_key(TEST_PRIVATE_KEY, profile(), "").unwrap();
        let signature = wallet.sign_message(b"Nonce: 42").await.unwrap();
        assert_eq!(signature.as_bytes().len(), 65);
    }

    #[test]
    fn test_disposable_addresses_are_fresh() {
        let first = disposable_address();
        let second = disposable_address();
        assert_ne!(first, second);
        assert_ne!(first, Address::ZERO);
    }
}
