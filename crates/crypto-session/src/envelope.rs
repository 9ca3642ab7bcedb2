//! Authenticated envelopes exchanged through deep links
//!
//! Layout matches NaCl `crypto_box_afternm`: the 16-byte Poly1305 tag is
//! prepended to the XSalsa20 ciphertext.

use crypto_box::aead::{Aead, generic_array::GenericArray};
use rand::{RngCore, rngs::OsRng};
use serde::{Serialize, de::DeserializeOwned};
use tracing::debug;
use zeroize::Zeroizing;

use crate::{
    CryptoError, CryptoResult, NONCE_SIZE, SharedSecret, TAG_SIZE, decode_base58, decode_nonce,
    encode_base58,
};

/// Nonce plus ciphertext, immutable once created
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    nonce: [u8; NONCE_SIZE],
    encrypted_payload: Vec<u8>,
}

impl Envelope {
    /// Serialize `payload` as JSON and encrypt it under a fresh random nonce
    pub fn seal<T: Serialize + ?Sized>(payload: &T, secret: &SharedSecret) -> CryptoResult<Self> {
        let plaintext = Zeroizing::new(
            serde_json::to_vec(payload).map_err(|e| CryptoError::Serialization(e.to_string()))?,
        );
        Self::seal_bytes(&plaintext, secret)
    }

    /// Encrypt raw bytes under a fresh random nonce
    pub fn seal_bytes(plaintext: &[u8], secret: &SharedSecret) -> CryptoResult<Self> {
        let mut nonce = [0u8; NONCE_SIZE];
        OsRng
            .try_fill_bytes(&mut nonce)
            .map_err(|e| CryptoError::RngUnavailable(e.to_string()))?;

        let encrypted_payload = secret
            .cipher()
            .encrypt(GenericArray::from_slice(&nonce), plaintext)
            .map_err(|e| CryptoError::Encryption(e.to_string()))?;

        debug!(
            plaintext_len = plaintext.len(),
            ciphertext_len = encrypted_payload.len(),
            "Sealed envelope"
        );

        Ok(Self {
            nonce,
            encrypted_payload,
        })
    }

    /// Rebuild an envelope from its base58 transport form
    pub fn from_base58(encrypted_payload: &str, nonce: &str) -> CryptoResult<Self> {
        Ok(Self {
            nonce: decode_nonce(nonce)?,
            encrypted_payload: decode_base58(encrypted_payload)?,
        })
    }

    /// Rebuild an envelope from raw parts
    pub fn from_parts(nonce: [u8; NONCE_SIZE], encrypted_payload: Vec<u8>) -> Self {
        Self {
            nonce,
            encrypted_payload,
        }
    }

    pub fn nonce(&self) -> &[u8; NONCE_SIZE] {
        &self.nonce
    }

    pub fn encrypted_payload(&self) -> &[u8] {
        &self.encrypted_payload
    }

    pub fn nonce_base58(&self) -> String {
        encode_base58(&self.nonce)
    }

    pub fn encrypted_payload_base58(&self) -> String {
        encode_base58(&self.encrypted_payload)
    }

    /// Verify and decrypt, returning the raw plaintext
    ///
    /// Any authentication failure yields [`CryptoError::DecryptionFailed`]
    /// with no plaintext exposed.
    pub fn open_bytes(&self, secret: &SharedSecret) -> CryptoResult<Zeroizing<Vec<u8>>> {
        if self.encrypted_payload.len() < TAG_SIZE {
            return Err(CryptoError::DecryptionFailed);
        }

        let plaintext = secret
            .cipher()
            .decrypt(
                GenericArray::from_slice(&self.nonce),
                self.encrypted_payload.as_slice(),
            )
            .map_err(|_| CryptoError::DecryptionFailed)?;

        Ok(Zeroizing::new(plaintext))
    }

    /// Verify, decrypt and parse the plaintext as JSON
    ///
    /// Invalid UTF-8 is a decode error; valid text that is not the expected
    /// JSON shape is [`CryptoError::MalformedResponse`].
    pub fn open<T: DeserializeOwned>(&self, secret: &SharedSecret) -> CryptoResult<T> {
        let plaintext = self.open_bytes(secret)?;
        let text = std::str::from_utf8(&plaintext)
            .map_err(|e| CryptoError::Decode(format!("plaintext is not UTF-8: {}", e)))?;
        serde_json::from_str(text).map_err(|e| CryptoError::MalformedResponse(e.to_string()))
    }
}
