//! Base58 transport encoding

use crate::{CryptoError, CryptoResult, NONCE_SIZE, PUBLIC_KEY_SIZE};

/// Encode bytes as a base58 string (Bitcoin alphabet)
pub fn encode_base58(bytes: &[u8]) -> String {
    bs58::encode(bytes).into_string()
}

/// Decode a base58 string into raw bytes
pub fn decode_base58(encoded: &str) -> CryptoResult<Vec<u8>> {
    bs58::decode(encoded.trim())
        .into_vec()
        .map_err(|e| CryptoError::Decode(e.to_string()))
}

/// Decode a base58 public key, rejecting anything that is not exactly 32 bytes
pub fn decode_public_key(encoded: &str) -> CryptoResult<[u8; PUBLIC_KEY_SIZE]> {
    let bytes = decode_base58(encoded)?;
    bytes
        .as_slice()
        .try_into()
        .map_err(|_| CryptoError::InvalidKeyLength {
            expected: PUBLIC_KEY_SIZE,
            actual: bytes.len(),
        })
}

/// Decode a base58 nonce, rejecting anything that is not exactly 24 bytes
pub fn decode_nonce(encoded: &str) -> CryptoResult<[u8; NONCE_SIZE]> {
    let bytes = decode_base58(encoded)?;
    bytes
        .as_slice()
        .try_into()
        .map_err(|_| CryptoError::InvalidNonceLength {
            expected: NONCE_SIZE,
            actual: bytes.len(),
        })
}
