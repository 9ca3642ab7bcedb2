//! Handshake records on top of a [`KeyValueStore`]

use std::sync::Arc;
use std::time::Duration;

use crypto_session::{KeyPair, SECRET_KEY_SIZE, decode_base58, encode_base58};
use deeplink_protocol::{AttemptId, WalletSession};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::{Clock, KeyValueStore, StoreError, StoreResult, SystemClock};

/// Storage keys, namespaced away from unrelated application storage
pub mod keys {
    pub const DAPP_PUBLIC_KEY: &str = "ccoin.phantom.dapp_public_key";
    pub const DAPP_SECRET_KEY: &str = "ccoin.phantom.dapp_secret_key";
    pub const ATTEMPT_ID: &str = "ccoin.phantom.attempt_id";
    pub const SESSION_ID: &str = "ccoin.phantom.session_id";
    pub const SESSION_DATA: &str = "ccoin.phantom.session_data";
    pub const SESSION_TIMESTAMP: &str = "ccoin.phantom.session_timestamp";

    /// Everything removed by `clear_session`
    pub const ALL: [&str; 6] = [
        DAPP_PUBLIC_KEY,
        DAPP_SECRET_KEY,
        ATTEMPT_ID,
        SESSION_ID,
        SESSION_DATA,
        SESSION_TIMESTAMP,
    ];
}

/// Default session lifetime (5 minutes)
pub const DEFAULT_SESSION_EXPIRY: Duration = Duration::from_millis(300_000);

/// Key pair stored for an attempt
#[derive(Debug, Clone)]
pub struct StoredKeypair {
    pub attempt_id: AttemptId,
    pub keypair: KeyPair,
}

/// Session fields kept in the `session_data` blob
#[derive(Debug, Serialize, Deserialize)]
struct SessionData {
    attempt_id: AttemptId,
    wallet_address: String,
    peer_public_key: String,
}

/// Keypair and session persistence with read-time expiry
pub struct HandshakeStore<S: KeyValueStore> {
    kv: S,
    clock: Arc<dyn Clock>,
    expiry: Option<Duration>,
}

impl<S: KeyValueStore> HandshakeStore<S> {
    /// Store with the system clock and the default 5 minute expiry
    pub fn new(kv: S) -> Self {
        Self {
            kv,
            clock: Arc::new(SystemClock),
            expiry: Some(DEFAULT_SESSION_EXPIRY),
        }
    }

    /// Replace the clock used for timestamps and expiry checks
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Set the session lifetime; `None` keeps sessions until cleared
    pub fn with_expiry(mut self, expiry: Option<Duration>) -> Self {
        self.expiry = expiry;
        self
    }

    pub fn expiry(&self) -> Option<Duration> {
        self.expiry
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    pub fn backend(&self) -> &S {
        &self.kv
    }

    /// Persist the key pair of a new attempt, replacing any previous one
    pub fn store_keypair(&self, attempt_id: AttemptId, keypair: &KeyPair) -> StoreResult<()> {
        let secret = keypair.secret_key_bytes();
        self.kv.set_many(&[
            (keys::DAPP_PUBLIC_KEY, keypair.public_key_base58()),
            (keys::DAPP_SECRET_KEY, encode_base58(&secret[..])),
            (keys::ATTEMPT_ID, attempt_id.to_string()),
        ])?;
        debug!(%attempt_id, "Stored handshake key pair");
        Ok(())
    }

    /// Load the stored key pair, verifying the public half matches the secret
    pub fn retrieve_keypair(&self) -> StoreResult<Option<StoredKeypair>> {
        let Some(secret_b58) = self.kv.get(keys::DAPP_SECRET_KEY)?.map(Zeroizing::new) else {
            return Ok(None);
        };

        let secret = Zeroizing::new(decode_base58(&secret_b58)?);
        let secret: [u8; SECRET_KEY_SIZE] = secret.as_slice().try_into().map_err(|_| {
            StoreError::Corrupt(format!("secret key has {} bytes", secret.len()))
        })?;
        let keypair = KeyPair::from_secret_bytes(secret);

        let public = self
            .kv
            .get(keys::DAPP_PUBLIC_KEY)?
            .ok_or_else(|| StoreError::Corrupt("public key missing".into()))?;
        if public != keypair.public_key_base58() {
            return Err(StoreError::Corrupt(
                "public key does not match secret key".into(),
            ));
        }

        let attempt_id = self
            .kv
            .get(keys::ATTEMPT_ID)?
            .as_deref()
            .and_then(AttemptId::parse)
            .ok_or_else(|| StoreError::Corrupt("attempt id missing".into()))?;

        Ok(Some(StoredKeypair {
            attempt_id,
            keypair,
        }))
    }

    /// Persist an established session
    pub fn store_session(&self, session: &WalletSession) -> StoreResult<()> {
        let data = SessionData {
            attempt_id: session.attempt_id,
            wallet_address: session.wallet_address.clone(),
            peer_public_key: session.peer_public_key.clone(),
        };
        self.kv.set_many(&[
            (keys::SESSION_ID, session.session.clone()),
            (keys::SESSION_DATA, serde_json::to_string(&data)?),
            (keys::SESSION_TIMESTAMP, session.created_at_ms.to_string()),
        ])?;
        info!(wallet = %session.wallet_address, "Stored wallet session");
        Ok(())
    }

    /// Load the session, treating an expired one as absent
    ///
    /// An expired session is cleared together with the key pair before
    /// `None` is returned.
    pub fn retrieve_session(&self) -> StoreResult<Option<WalletSession>> {
        let Some(timestamp) = self.kv.get(keys::SESSION_TIMESTAMP)? else {
            return Ok(None);
        };
        let created_at_ms: u64 = timestamp
            .parse()
            .map_err(|_| StoreError::Corrupt(format!("bad session timestamp {:?}", timestamp)))?;

        let session = self
            .kv
            .get(keys::SESSION_ID)?
            .ok_or_else(|| StoreError::Corrupt("session id missing".into()))?;
        let data: SessionData = serde_json::from_str(
            &self
                .kv
                .get(keys::SESSION_DATA)?
                .ok_or_else(|| StoreError::Corrupt("session data missing".into()))?,
        )?;

        let record = WalletSession {
            attempt_id: data.attempt_id,
            session,
            wallet_address: data.wallet_address,
            peer_public_key: data.peer_public_key,
            created_at_ms,
        };

        if record.is_expired(self.clock.now_ms(), self.expiry) {
            warn!(wallet = %record.wallet_address, "Wallet session expired");
            self.clear_session()?;
            return Ok(None);
        }

        Ok(Some(record))
    }

    /// Remove every handshake key
    pub fn clear_session(&self) -> StoreResult<()> {
        self.kv.remove_many(&keys::ALL)?;
        debug!("Cleared handshake storage");
        Ok(())
    }
}
