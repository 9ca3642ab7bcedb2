//! Outbound deep-link construction

use std::str::FromStr;

use crypto_session::{Envelope, PUBLIC_KEY_SIZE, encode_base58};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{PHANTOM_BASE_URL, ProtocolError, ProtocolResult};

/// Solana network the wallet should connect to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Cluster {
    MainnetBeta,
    Devnet,
    Testnet,
}

impl Cluster {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MainnetBeta => "mainnet-beta",
            Self::Devnet => "devnet",
            Self::Testnet => "testnet",
        }
    }
}

impl Default for Cluster {
    fn default() -> Self {
        Self::MainnetBeta
    }
}

impl std::fmt::Display for Cluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Cluster {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mainnet-beta" | "mainnet" => Ok(Self::MainnetBeta),
            "devnet" => Ok(Self::Devnet),
            "testnet" => Ok(Self::Testnet),
            other => Err(ProtocolError::InvalidCluster(other.to_string())),
        }
    }
}

/// Wallet methods reachable through universal links
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeepLinkMethod {
    Connect,
    Disconnect,
    SignAndSendTransaction,
    SignMessage,
}

impl DeepLinkMethod {
    pub fn path(self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Disconnect => "disconnect",
            Self::SignAndSendTransaction => "signAndSendTransaction",
            Self::SignMessage => "signMessage",
        }
    }
}

/// Parameters of a connect request
#[derive(Debug, Clone)]
pub struct ConnectRequest {
    pub dapp_public_key: [u8; PUBLIC_KEY_SIZE],
    /// Origin of the calling application, shown by the wallet
    pub app_url: Url,
    pub redirect_link: Url,
    pub cluster: Cluster,
}

/// Parameters of any request whose payload travels encrypted
///
/// Holding an [`Envelope`] means the payload was sealed before the link
/// could be built.
#[derive(Debug, Clone)]
pub struct EncryptedRequest {
    pub dapp_public_key: [u8; PUBLIC_KEY_SIZE],
    pub envelope: Envelope,
    pub redirect_link: Url,
}

/// Builds wallet deep links against a universal-link base
#[derive(Debug, Clone)]
pub struct DeepLinkBuilder {
    base: Url,
}

impl DeepLinkBuilder {
    /// Builder for a custom base such as a staging wallet
    pub fn with_base(base: &str) -> ProtocolResult<Self> {
        let mut base = Url::parse(base)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self { base })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// `/connect?dapp_encryption_public_key&cluster&app_url&redirect_link`
    pub fn connect_url(&self, request: &ConnectRequest) -> ProtocolResult<Url> {
        let mut url = self.base.join(DeepLinkMethod::Connect.path())?;
        url.query_pairs_mut()
            .append_pair(
                "dapp_encryption_public_key",
                &encode_base58(&request.dapp_public_key),
            )
            .append_pair("cluster", request.cluster.as_str())
            .append_pair("app_url", request.app_url.as_str())
            .append_pair("redirect_link", request.redirect_link.as_str());
        Ok(url)
    }

    /// `/signAndSendTransaction` with an encrypted [`SignAndSendPayload`](crate::SignAndSendPayload)
    pub fn sign_and_send_url(&self, request: &EncryptedRequest) -> ProtocolResult<Url> {
        self.encrypted_url(DeepLinkMethod::SignAndSendTransaction, request)
    }

    /// `/signMessage` with an encrypted [`SignMessagePayload`](crate::SignMessagePayload)
    pub fn sign_message_url(&self, request: &EncryptedRequest) -> ProtocolResult<Url> {
        self.encrypted_url(DeepLinkMethod::SignMessage, request)
    }

    /// `/disconnect` with an encrypted [`SessionPayload`](crate::SessionPayload)
    pub fn disconnect_url(&self, request: &EncryptedRequest) -> ProtocolResult<Url> {
        self.encrypted_url(DeepLinkMethod::Disconnect, request)
    }

    fn encrypted_url(&self, method: DeepLinkMethod, request: &EncryptedRequest) -> ProtocolResult<Url> {
        let mut url = self.base.join(method.path())?;
        url.query_pairs_mut()
            .append_pair(
                "dapp_encryption_public_key",
                &encode_base58(&request.dapp_public_key),
            )
            .append_pair("nonce", &request.envelope.nonce_base58())
            .append_pair("redirect_link", request.redirect_link.as_str())
            .append_pair("payload", &request.envelope.encrypted_payload_base58());
        Ok(url)
    }
}

impl Default for DeepLinkBuilder {
    fn default() -> Self {
        Self {
            base: Url::parse(PHANTOM_BASE_URL).expect("static base URL is valid"),
        }
    }
}
