//! Deep-link Protocol Definitions for the CCOIN wallet link
//!
//! This crate contains the Phantom deep-link wire types: clusters, request
//! and response payloads, URL builders, redirect parsing and the handshake
//! state machine shared by the client and the callback server.

mod error;
mod redirect;
mod session;
mod urls;

pub use error::*;
pub use redirect::*;
pub use session::*;
pub use urls::*;

/// Phantom universal-link base for protocol version 1
pub const PHANTOM_BASE_URL: &str = "https://phantom.app/ul/v1/";

/// Query parameter this client appends to its own redirect links
pub const ATTEMPT_PARAM: &str = "attempt";
