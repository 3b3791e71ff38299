use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArcError {
    #[error("unknown network: {0}")]
    UnknownNetwork(String),

    #[error("{0}")]
    MissingSetting(&'static str),

    #[error("Please connect your wallet to {expected} (it is currently on {actual})")]
    WrongNetwork { expected: String, actual: String },

    #[error("wallet connection cancelled: {0}")]
    WalletCancelled(String),

    #[error("wallet did not respond within {0:?}")]
    WalletTimeout(Duration),

    #[error("invalid wallet: {0}")]
    InvalidWallet(String),

    #[error("{} for {}", utils::errors::ARC_NOT_INITIALIZED, .0)]
    NotInitialized(String),

    #[error("{}", utils::errors::WALLET_NOT_ENABLED)]
    WalletNotEnabled,

    #[error("{}: {}", utils::errors::CONTRACT_NOT_FOUND_ERROR, .0)]
    ContractNotFound(String),

    #[error("rpc error: {0}")]
    Rpc(String),

    #[error("transport error: {0}")]
    Transport(#[from] alloy::transports::TransportError),

    #[error("contract call failed: {0}")]
    Contract(#[from] alloy::contract::Error),

    #[error("transaction failed: {0}")]
    PendingTransaction(#[from] alloy::providers::PendingTransactionError),

    #[error("failed to decode {event} log: {reason}")]
    Decode { event: &'static str, reason: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("subgraph returned HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("graphql error: {0}")]
    GraphQl(String),

    #[error("invalid {field}: {value}")]
    InvalidValue { field: &'static str, value: String },

    #[error("local storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ArcError {
    /// Errors worth retrying: dropped connections, timeouts, overloaded servers
    /// and a subgraph that has not caught up yet.
    pub fn is_transient(&self) -> bool {
        match self {
            ArcError::Http(err) => err.is_timeout() || err.is_connect() || err.is_request(),
            ArcError::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            ArcError::Transport(err) => matches!(err, alloy::transports::RpcError::Transport(_)),
            ArcError::GraphQl(message) => {
                let message = message.to_lowercase();
                message.contains("timeout")
                    || message.contains("indexing")
                    || message.contains("too many requests")
            }
            _ => false,
        }
    }
}

/// Classifies an error message coming back from a wallet-bound RPC call.
pub fn classify_rpc_error(message: &str) -> ArcError {
    if message.to_lowercase().contains("user denied") {
        ArcError::WalletCancelled(message.to_string())
    } else {
        ArcError::Rpc(message.to_string())
    }
}
