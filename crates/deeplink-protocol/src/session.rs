//! Handshake state and session messages

use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{ProtocolError, ProtocolResult};

/// Identifier binding a wallet redirect to the key pair that started it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttemptId(pub Uuid);

impl AttemptId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse from the redirect query value
    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s.trim()).ok().map(Self)
    }
}

impl Default for AttemptId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AttemptId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handshake state
///
/// `SessionEstablished` and `HandshakeFailed` are terminal for an attempt;
/// a new attempt always restarts from `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandshakeState {
    /// No attempt in progress
    Idle,
    /// Ephemeral key pair created and stored
    KeypairGenerated,
    /// Connect link handed to the wallet, awaiting redirect
    ConnectUrlSent,
    /// Wallet redirected back with a response
    ResponseReceived,
    /// Response decrypted and session stored
    SessionEstablished,
    /// Any decode, decrypt or wallet-reported error
    HandshakeFailed,
}

impl HandshakeState {
    /// Whether `self -> next` is a legal transition
    pub fn can_transition_to(self, next: HandshakeState) -> bool {
        use HandshakeState::*;

        match (self, next) {
            // Every attempt starts over with a new key pair
            (_, Idle) => true,
            (Idle, KeypairGenerated) => true,
            (KeypairGenerated, ConnectUrlSent) => true,
            (ConnectUrlSent, ResponseReceived) => true,
            (ResponseReceived, SessionEstablished) => true,
            (KeypairGenerated | ConnectUrlSent | ResponseReceived, HandshakeFailed) => true,
            _ => false,
        }
    }

    /// Validate and perform a transition
    pub fn transition(&mut self, next: HandshakeState) -> ProtocolResult<()> {
        if !self.can_transition_to(next) {
            return Err(ProtocolError::InvalidStateTransition {
                from: *self,
                to: next,
            });
        }
        *self = next;
        Ok(())
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::SessionEstablished | Self::HandshakeFailed)
    }
}

impl Default for HandshakeState {
    fn default() -> Self {
        Self::Idle
    }
}

/// Established wallet session, as persisted by the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletSession {
    /// Attempt that produced this session
    pub attempt_id: AttemptId,
    /// Opaque session token issued by the wallet
    pub session: String,
    /// Wallet's Solana address (base58)
    pub wallet_address: String,
    /// Wallet's encryption public key (base58)
    pub peer_public_key: String,
    /// Creation time in milliseconds since the Unix epoch
    pub created_at_ms: u64,
}

impl WalletSession {
    /// Whether the session is past `expiry` at `now_ms`; `None` never expires
    pub fn is_expired(&self, now_ms: u64, expiry: Option<Duration>) -> bool {
        match expiry {
            Some(window) => now_ms.saturating_sub(self.created_at_ms) > window.as_millis() as u64,
            None => false,
        }
    }
}

/// Decrypted `data` of a successful connect redirect
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectResponse {
    /// Wallet address
    pub public_key: String,
    /// Session token to echo in later requests
    pub session: String,
}

/// Encrypted payload of a disconnect request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionPayload {
    pub session: String,
}

/// Options forwarded to the RPC node when the wallet submits a transaction
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_preflight: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preflight_commitment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
}

/// Encrypted payload of a sign-and-send request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignAndSendPayload {
    /// Serialized transaction, base58
    pub transaction: String,
    pub session: String,
    #[serde(rename = "sendOptions", skip_serializing_if = "Option::is_none")]
    pub send_options: Option<SendOptions>,
}

/// Decrypted `data` of a successful sign-and-send redirect
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignAndSendResponse {
    /// Transaction signature, base58
    pub signature: String,
}

/// How the wallet should render a message to sign
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageDisplay {
    Utf8,
    Hex,
}

impl Default for MessageDisplay {
    fn default() -> Self {
        Self::Utf8
    }
}

/// Encrypted payload of a sign-message request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignMessagePayload {
    /// Message bytes, base58
    pub message: String,
    pub session: String,
    pub display: MessageDisplay,
}

/// Decrypted `data` of a successful sign-message redirect
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignMessageResponse {
    pub signature: String,
    #[serde(rename = "publicKey")]
    pub public_key: String,
}
