//! Error types for the smart transaction service.

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SmartTxError {
    /// Non-2xx relay response; `body` has its keys camel-cased
    #[error("Relay responded with {status}: {body}")]
    Relay { status: u16, body: Value },
    /// Non-2xx response from the regular transaction service
    #[error("Transaction service responded with {status}: {body}")]
    TransactionService { status: u16, body: String },
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("Nonce lock failed: {0}")]
    NonceLock(String),
    #[error("Chain query failed: {0}")]
    Chain(String),
    #[error("Invalid chain id: {0}")]
    InvalidChainId(String),
    #[error("Chain {0} is not served by the relay")]
    UnsupportedChain(String),
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("{0} not found")]
    NotFound(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Timed out waiting for {0}")]
    Timeout(String),
}

pub type Result<T> = std::result::Result<T, SmartTxError>;
