//! Error types for the keeper service

use stakepool_core::StakingCoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum KeeperError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Journal line {line}: {message}")]
    Journal { line: u64, message: String },

    #[error("Unhealthy: escrow holds {balance} but {locked} is locked for withdrawals")]
    EscrowShortfall { balance: u128, locked: u128 },

    #[error("Pool error: {0}")]
    Pool(#[from] StakingCoreError),
}

/// Result type for keeper operations
pub type KeeperResult<T> = Result<T, KeeperError>;

impl From<std::io::Error> for KeeperError {
    fn from(err: std::io::Error) -> Self {
        KeeperError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for KeeperError {
    fn from(err: serde_json::Error) -> Self {
        KeeperError::SerializationError(err.to_string())
    }
}

impl From<toml::de::Error> for KeeperError {
    fn from(err: toml::de::Error) -> Self {
        KeeperError::InvalidConfig(err.to_string())
    }
}

impl From<toml::ser::Error> for KeeperError {
    fn from(err: toml::ser::Error) -> Self {
        KeeperError::SerializationError(err.to_string())
    }
}
