//! Error types for the ledger core

use thiserror::Error;

/// Coarse classification of every failure the core can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub enum ErrorKind {
    Validation,
    Capacity,
    Replay,
    Conflict,
    Consistency,
    NotFound,
    Internal,
}

#[derive(Debug, Clone, Error)]
pub enum ChainError {
    #[error("Invalid transaction: {0}")]
    InvalidTransaction(String),
    #[error("Invalid block: {0}")]
    InvalidBlock(String),
    #[error("Capacity exceeded: {0}")]
    Capacity(String),
    #[error("Nonce mismatch for {address}: expected {expected}, got {got}")]
    Replay {
        address: String,
        expected: u64,
        got: u64,
    },
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Consistency failure: {0}")]
    Consistency(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Double spend detected: {0}")]
    DoubleSpendDetected(String),
    #[error("Cryptographic error: {0}")]
    CryptoError(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Persistence error: {0}")]
    Persistence(String),
}

impl ChainError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ChainError::InvalidTransaction(_)
            | ChainError::InvalidBlock(_)
            | ChainError::DoubleSpendDetected(_)
            | ChainError::CryptoError(_) => ErrorKind::Validation,
            ChainError::Capacity(_) => ErrorKind::Capacity,
            ChainError::Replay { .. } => ErrorKind::Replay,
            ChainError::Conflict(_) => ErrorKind::Conflict,
            ChainError::Consistency(_) => ErrorKind::Consistency,
            ChainError::NotFound(_) => ErrorKind::NotFound,
            ChainError::Serialization(_) | ChainError::Config(_) | ChainError::Persistence(_) => {
                ErrorKind::Internal
            }
        }
    }
}

impl From<Box<bincode::ErrorKind>> for ChainError {
    fn from(err: Box<bincode::ErrorKind>) -> Self {
        ChainError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for ChainError {
    fn from(err: serde_json::Error) -> Self {
        ChainError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for ChainError {
    fn from(err: toml::de::Error) -> Self {
        ChainError::Config(err.to_string())
    }
}

impl From<std::io::Error> for ChainError {
    fn from(err: std::io::Error) -> Self {
        ChainError::Config(err.to_string())
    }
}

/// Convenience alias used across the crate
pub type Result<T> = std::result::Result<T, ChainError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(ChainError::InvalidBlock("x".into()).kind(), ErrorKind::Validation);
        assert_eq!(ChainError::Capacity("full".into()).kind(), ErrorKind::Capacity);
        assert_eq!(
            ChainError::Replay { address: "ab".into(), expected: 2, got: 5 }.kind(),
            ErrorKind::Replay
        );
        assert_eq!(ChainError::NotFound("tx".into()).kind(), ErrorKind::NotFound);
        assert_eq!(ChainError::Consistency("rebuild".into()).kind(), ErrorKind::Consistency);
    }

    #[test]
    fn test_replay_display() {
        let err = ChainError::Replay { address: "ab".into(), expected: 2, got: 5 };
        assert_eq!(err.to_string(), "Nonce mismatch for ab: expected 2, got 5");
    }
}
