pub mod account;
pub mod blockchain;
pub mod chains;
pub mod config;
pub mod contracts;
pub mod errors;
pub mod gas;
pub mod jobs;
pub mod retry;
pub mod submitter;
pub mod transaction_builder;
pub mod transaction_monitor;
pub mod wallet;

pub use account::{Account, AccountSettings};
pub use blockchain::{BlockchainClient, ReceiptSummary, RpcGateway};
pub use chains::{ChainProfile, ChainRegistry};
pub use config::EngineConfig;
pub use errors::{EngineError, EngineResult};
pub use retry::RetryConfig;
pub use submitter::{Attempt, SkipReason, TransactionOutcome, TransactionSubmitter};
pub use transaction_builder::TxCall;
pub use transaction_monitor::{ConfirmationStatus, TransactionMonitor};
pub use wallet::Wallet;
