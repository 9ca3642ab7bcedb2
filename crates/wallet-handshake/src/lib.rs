//! Wallet Handshake - Phantom deep-link client for the CCOIN Mini-App
//!
//! Drives the connect handshake state machine on top of the crypto, protocol
//! and storage crates, and issues follow-up signing and disconnect requests
//! for an established session.

mod client;
mod config;
mod error;
mod opener;

pub use client::*;
pub use config::*;
pub use error::*;
pub use opener::*;

/// Redirect routes appended to the configured redirect base
pub mod routes {
    pub const CONNECTED: &str = "connected";
    pub const SIGNED: &str = "signed";
    pub const MESSAGE_SIGNED: &str = "message-signed";
    pub const DISCONNECTED: &str = "disconnected";
}
