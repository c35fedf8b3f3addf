use alloy::primitives::B256;
use alloy::transports::{RpcError, TransportError, TransportErrorKind};
use std::time::Duration;
use thiserror::Error;

/// HTTP statuses a node returns while overloaded or briefly unavailable.
pub(crate) const TRANSIENT_HTTP_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

/// JSON-RPC codes used by providers for rate limiting.
const RATE_LIMIT_CODES: [i64; 2] = [429, -32005];

/// Node messages that a fresh nonce or a higher gas price resolves.
const TRANSIENT_NODE_MESSAGES: [&str; 7] = [
    "rate limit",
    "too many requests",
    "nonce too low",
    "replacement transaction underpriced",
    "transaction underpriced",
    "already known",
    "temporarily unavailable",
];

#[derive(Debug, Error)]
pub enum EngineError {
    /// Transport failure or per-call timeout.
    #[error("network error: {0}")]
    Network(String),

    #[error("node error {code}: {message}")]
    Node {
        code: i64,
        message: String,
        transient: bool,
    },

    #[error("signature error: {0}")]
    Signature(String),

    #[error("insufficient funds: {0}")]
    InsufficientFunds(String),

    #[error("transaction {0} reverted")]
    Reverted(B256),

    #[error("transaction {hash} not confirmed within {timeout:?}")]
    ConfirmationTimeout { hash: B256, timeout: Duration },

    #[error("gave up after {attempts} attempts, last error: {last}")]
    MaxRetriesExceeded {
        attempts: u32,
        last: Box<EngineError>,
    },

    /// A required field for the transaction could not be fetched.
    #[error("failed to build transaction: {0}")]
    Build(Box<EngineError>),

    #[error("contract call failed: {0}")]
    Contract(String),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    /// Whether a submission attempt that failed with this error may be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::Network(_) => true,
            EngineError::Node { transient, .. } => *transient,
            EngineError::Reverted(_) | EngineError::ConfirmationTimeout { .. } => true,
            EngineError::Build(source) => source.is_retryable(),
            EngineError::Signature(_)
            | EngineError::InsufficientFunds(_)
            | EngineError::MaxRetriesExceeded { .. }
            | EngineError::Contract(_)
            | EngineError::Config(_) => false,
        }
    }

    pub fn build(source: EngineError) -> Self {
        match source {
            already @ EngineError::Build(_) => already,
            other => EngineError::Build(Box::new(other)),
        }
    }

    /// Classify a node error payload by code and message.
    pub fn from_node(code: i64, message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();

        if lower.contains("insufficient funds") {
            return EngineError::InsufficientFunds(message);
        }

        let transient = RATE_LIMIT_CODES.contains(&code)
            || TRANSIENT_NODE_MESSAGES
                .iter()
                .any(|pattern| lower.contains(pattern));

        EngineError::Node {
            code,
            message,
            transient,
        }
    }
}

impl From<TransportError> for EngineError {
    fn from(err: TransportError) -> Self {
        match err {
            RpcError::ErrorResp(payload) => {
                EngineError::from_node(payload.code, payload.message.to_string())
            }
            RpcError::Transport(TransportErrorKind::HttpError(http)) => EngineError::Node {
                code: i64::from(http.status),
                transient: TRANSIENT_HTTP_STATUSES.contains(&http.status),
                message: http.body,
            },
            RpcError::LocalUsageError(e) => EngineError::Node {
                code: 0,
                message: e.to_string(),
                transient: false,
            },
            other => EngineError::Network(other.to_string()),
        }
    }
}
