//! Error types for HomeLedger

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    #[error("Integrity violation: {0}")]
    IntegrityViolation(String),
    #[error("Persistence error: {0}")]
    Persistence(String),
    #[error("Corrupt store: {0}")]
    CorruptStore(String),
    #[error("Database error: {0}")]
    Database(String),
    #[error("IO error: {0}")]
    Io(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Mining gave up after {iterations} iterations at difficulty {difficulty}")]
    MiningExhausted { difficulty: usize, iterations: u64 },
    #[error("Invalid difficulty {0}: must be at most 64 hex characters")]
    InvalidDifficulty(usize),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Invalid schedule: {0}")]
    InvalidSchedule(String),
}

impl From<std::io::Error> for LedgerError {
    fn from(err: std::io::Error) -> Self {
        LedgerError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(err: serde_json::Error) -> Self {
        LedgerError::Serialization(err.to_string())
    }
}

impl From<rusqlite::Error> for LedgerError {
    fn from(err: rusqlite::Error) -> Self {
        LedgerError::Database(err.to_string())
    }
}

/// Convenience alias used across the crate
pub type Result<T> = std::result::Result<T, LedgerError>;
