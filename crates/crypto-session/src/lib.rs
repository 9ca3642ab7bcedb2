//! Crypto Session - NaCl box primitives for the Phantom deep-link handshake
//!
//! Provides X25519 key agreement with the `crypto_box_beforenm` precomputation
//! and XSalsa20Poly1305 envelopes, all transported as base58 strings.

mod encoding;
mod envelope;
mod error;
mod session;

pub use encoding::*;
pub use envelope::*;
pub use error::*;
pub use session::*;

/// Nonce size for XSalsa20Poly1305 (192 bits / 24 bytes)
pub const NONCE_SIZE: usize = 24;

/// Authentication tag size (128 bits / 16 bytes)
pub const TAG_SIZE: usize = 16;

/// Public key size (256 bits / 32 bytes)
pub const PUBLIC_KEY_SIZE: usize = 32;

/// Secret key size (256 bits / 32 bytes)
pub const SECRET_KEY_SIZE: usize = 32;

