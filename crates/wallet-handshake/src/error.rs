//! Handshake error types

use crypto_session::CryptoError;
use deeplink_protocol::{AttemptId, ProtocolError};
use session_store::StoreError;
use thiserror::Error;

/// Handshake client error
#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to open link: {0}")]
    Open(String),

    #[error("Wallet rejected the request ({code}): {message}")]
    WalletRejected { code: String, message: String },

    #[error("Redirect belongs to another attempt (expected {expected}, got {received:?})")]
    StaleAttempt {
        expected: AttemptId,
        received: Option<String>,
    },

    #[error("Redirect carries no wallet response")]
    NoResponse,

    #[error("No handshake attempt is pending")]
    NoPendingAttempt,

    #[error("Wallet not connected")]
    NotConnected,
}

impl HandshakeError {
    /// Whether the error came from a hostile or corrupted wallet response
    pub fn is_authentication_failure(&self) -> bool {
        matches!(self, Self::Crypto(CryptoError::DecryptionFailed))
    }

    /// Whether the redirect was turned away before it could affect any attempt
    pub fn is_ignored_redirect(&self) -> bool {
        matches!(
            self,
            Self::StaleAttempt { .. }
                | Self::NoResponse
                | Self::NoPendingAttempt
                | Self::NotConnected
                | Self::Protocol(ProtocolError::InvalidStateTransition { .. })
        )
    }
}

pub type HandshakeResult<T> = Result<T, HandshakeError>;
