//! Key agreement for NaCl `crypto_box`

use crypto_box::SalsaBox;
use rand::{RngCore, rngs::OsRng};
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroizing;

use crate::{
    CryptoError, CryptoResult, PUBLIC_KEY_SIZE, SECRET_KEY_SIZE, decode_public_key,
    encode_base58,
};

/// Key pair for one handshake attempt
///
/// The secret half is zeroized when the pair is dropped.
#[derive(Clone)]
pub struct KeyPair {
    secret: StaticSecret,
    public: PublicKey,
}

impl KeyPair {
    /// Generate a new key pair from the OS random source
    ///
    /// Fails instead of falling back to a weaker source when the OS RNG
    /// cannot be read.
    pub fn generate() -> CryptoResult<Self> {
        let mut seed = Zeroizing::new([0u8; SECRET_KEY_SIZE]);
        OsRng
            .try_fill_bytes(&mut seed[..])
            .map_err(|e| CryptoError::RngUnavailable(e.to_string()))?;
        Ok(Self::from_secret_bytes(*seed))
    }

    /// Rebuild a key pair from stored secret key bytes
    pub fn from_secret_bytes(secret: [u8; SECRET_KEY_SIZE]) -> Self {
        let secret = StaticSecret::from(secret);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Get the public key bytes
    pub fn public_key_bytes(&self) -> [u8; PUBLIC_KEY_SIZE] {
        *self.public.as_bytes()
    }

    /// Public key as base58, the form embedded in deep links
    pub fn public_key_base58(&self) -> String {
        encode_base58(self.public.as_bytes())
    }

    /// Copy of the secret key bytes for local persistence only
    pub fn secret_key_bytes(&self) -> Zeroizing<[u8; SECRET_KEY_SIZE]> {
        Zeroizing::new(self.secret.to_bytes())
    }

    /// Precompute the box key with a peer's raw public key
    pub fn shared_secret(&self, their_public: &[u8; PUBLIC_KEY_SIZE]) -> CryptoResult<SharedSecret> {
        // A low-order peer key forces an all-zero output
        let dh = self.secret.diffie_hellman(&PublicKey::from(*their_public));
        if !dh.was_contributory() {
            return Err(CryptoError::InvalidPublicKey);
        }

        let secret = crypto_box::SecretKey::from(*self.secret_key_bytes());
        let peer = crypto_box::PublicKey::from(*their_public);
        Ok(SharedSecret(SalsaBox::new(&peer, &secret)))
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &self.public_key_base58())
            .finish_non_exhaustive()
    }
}

/// Box key shared with the wallet for the lifetime of a session
///
/// Holds the precomputed `crypto_box_beforenm` key, zeroized on drop.
pub struct SharedSecret(SalsaBox);

impl SharedSecret {
    /// Derive from the peer's base58 public key and our key pair
    pub fn derive(peer_public_key: &str, local: &KeyPair) -> CryptoResult<Self> {
        let peer = decode_public_key(peer_public_key)?;
        local.shared_secret(&peer)
    }

    pub(crate) fn cipher(&self) -> &SalsaBox {
        &self.0
    }
}

impl std::fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SharedSecret(..)")
    }
}
