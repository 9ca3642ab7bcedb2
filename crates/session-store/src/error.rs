//! Store error types

use crypto_session::CryptoError;
use thiserror::Error;

/// Persistence error
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Stored record is corrupt: {0}")]
    Corrupt(String),

    #[error("Stored key material is invalid: {0}")]
    Crypto(#[from] CryptoError),
}

pub type StoreResult<T> = Result<T, StoreError>;
