//! Session Store - client-side persistence for the wallet handshake
//!
//! String-keyed, string-valued storage with base58 for binary values, the
//! same shape as browser local storage, plus the handshake records kept on
//! top of it.

mod clock;
mod error;
mod handshake;
mod kv;

pub use clock::*;
pub use error::*;
pub use handshake::*;
pub use kv::*;

/// Prefix of every key this crate writes
pub const KEY_NAMESPACE: &str = "ccoin.phantom.";
