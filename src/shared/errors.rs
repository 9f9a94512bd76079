//! Error handling for the application

use thiserror::Error;

use crate::shared::types::Address;

/// Amount conversion and slippage errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AmountError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Negative amount: {0}")]
    Negative(String),

    #[error("Amount overflow while scaling by {0} decimals")]
    Overflow(u32),

    #[error("Invalid slippage tolerance: {0}")]
    InvalidSlippage(String),
}

/// Quote-related errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QuoteError {
    #[error("No swap found: {0}")]
    NoSwapFound(String),

    #[error("Unknown token: {0}")]
    UnknownToken(Address),

    #[error("Wrapper conversion failed: {0}")]
    WrapperConversion(String),

    #[error("Background wrap rate lookup failed: {0}")]
    RateLookup(String),

    #[error("Oracle call timed out after {0}ms")]
    Timeout(u64),

    #[error("Amount error: {0}")]
    Amount(#[from] AmountError),
}

/// Routing / pricing oracle errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OracleError {
    #[error("Oracle not initialized")]
    NotInitialized,

    #[error("Pool fetch failed: {0}")]
    PoolFetch(String),

    #[error("Oracle request failed: {0}")]
    Request(String),
}

/// Failure reported by the signing/submission collaborator
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Submission failed: {message}")]
pub struct SubmissionError {
    pub message: String,
}

/// Protocol error code raised when a swap limit is exceeded on-chain.
pub const SLIPPAGE_ERROR_MARKER: &str = "BAL#507";

impl SubmissionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }

    pub fn is_slippage_error(&self) -> bool {
        self.message.contains(SLIPPAGE_ERROR_MARKER)
    }
}

/// Confirmation listener failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ListenerError {
    #[error("Transaction reverted: {0}")]
    Reverted(String),

    #[error("Transaction dropped: {0}")]
    Dropped(String),
}

/// Transaction registry errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("The transaction {0} already exists.")]
    DuplicateTransaction(String),

    #[error("Illegal status transition for {id}: {from} -> {to}")]
    StatusRegression { id: String, from: String, to: String },

    #[error("Receipt kind does not match record type for {0}")]
    ReceiptMismatch(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Persistence errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

/// Blockchain provider / order book errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Request timed out after {0}ms")]
    Timeout(u64),
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        ProviderError::Network(err.to_string())
    }
}

/// Trade orchestration errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TradeError {
    #[error("Unknown token: {0}")]
    UnknownToken(Address),

    #[error("No quote available")]
    NoQuote,

    #[error("Trade already in progress")]
    TradeInProgress,

    #[error("Price impact {0} exceeds the configured threshold")]
    HighPriceImpact(rust_decimal::Decimal),

    #[error("Amount error: {0}")]
    Amount(#[from] AmountError),

    #[error(transparent)]
    Submission(#[from] SubmissionError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),
}

/// General application error
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Blockchain error: {0}")]
    BlockchainError(String),

    #[error("Execution error: {0}")]
    ExecutionError(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl From<RegistryError> for AppError {
    fn from(err: RegistryError) -> Self {
        AppError::StorageError(err.to_string())
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        AppError::StorageError(err.to_string())
    }
}

impl From<ProviderError> for AppError {
    fn from(err: ProviderError) -> Self {
        AppError::BlockchainError(err.to_string())
    }
}

impl From<TradeError> for AppError {
    fn from(err: TradeError) -> Self {
        AppError::ExecutionError(err.to_string())
    }
}

impl From<AmountError> for AppError {
    fn from(err: AmountError) -> Self {
        AppError::Unknown(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slippage_marker_detection() {
        let err = SubmissionError::new("execution reverted: BAL#507");
        assert!(err.is_slippage_error());

        let err = SubmissionError::new("user rejected transaction");
        assert!(!err.is_slippage_error());
    }
}
