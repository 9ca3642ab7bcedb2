//! Handshake client configuration
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `CCOIN_CLUSTER` | `mainnet-beta`, `devnet` or `testnet` | `mainnet-beta` |
//! | `CCOIN_APP_URL` | Origin shown by the wallet | `https://ccoin.app` |
//! | `CCOIN_REDIRECT_URL` | Base the wallet redirects back to | `http://127.0.0.1:8787/phantom/` |
//! | `CCOIN_SESSION_EXPIRY_MS` | Session lifetime, `0` disables expiry | `300000` |
//! | `CCOIN_STORE_PATH` | JSON file holding handshake state | `~/.ccoin/wallet-link.json` |
//! | `CCOIN_HOST_OPENER` | Host container command for opening links | unset |
//! | `CCOIN_WALLET_BASE` | Wallet universal-link base | `https://phantom.app/ul/v1/` |

use std::path::PathBuf;
use std::time::Duration;

use deeplink_protocol::{Cluster, PHANTOM_BASE_URL};
use session_store::DEFAULT_SESSION_EXPIRY;
use url::Url;

use crate::{HandshakeError, HandshakeResult};

pub const CLUSTER_ENV: &str = "CCOIN_CLUSTER";
pub const APP_URL_ENV: &str = "CCOIN_APP_URL";
pub const REDIRECT_URL_ENV: &str = "CCOIN_REDIRECT_URL";
pub const SESSION_EXPIRY_ENV: &str = "CCOIN_SESSION_EXPIRY_MS";
pub const STORE_PATH_ENV: &str = "CCOIN_STORE_PATH";
pub const HOST_OPENER_ENV: &str = "CCOIN_HOST_OPENER";
pub const WALLET_BASE_ENV: &str = "CCOIN_WALLET_BASE";

pub const DEFAULT_APP_URL: &str = "https://ccoin.app";
pub const DEFAULT_REDIRECT_URL: &str = "http://127.0.0.1:8787/phantom/";

/// Handshake client configuration
#[derive(Debug, Clone)]
pub struct HandshakeConfig {
    /// Network embedded in connect requests
    pub cluster: Cluster,
    /// Calling application's origin
    pub app_url: Url,
    /// Base URL the wallet redirects back to; routes are joined onto it
    pub redirect_base: Url,
    /// Session lifetime (None never expires)
    pub session_expiry: Option<Duration>,
    /// Handshake state file
    pub store_path: PathBuf,
    /// Host container command that intercepts external links
    pub host_opener: Option<String>,
    /// Wallet universal-link base
    pub wallet_base: String,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            cluster: Cluster::default(),
            app_url: Url::parse(DEFAULT_APP_URL).expect("default app URL is valid"),
            redirect_base: Url::parse(DEFAULT_REDIRECT_URL).expect("default redirect URL is valid"),
            session_expiry: Some(DEFAULT_SESSION_EXPIRY),
            store_path: default_store_path(),
            host_opener: None,
            wallet_base: PHANTOM_BASE_URL.to_string(),
        }
    }
}

impl HandshakeConfig {
    /// Defaults overlaid with any `CCOIN_*` environment variables
    pub fn from_env() -> HandshakeResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Defaults overlaid with values from `lookup`
    pub fn from_lookup<F>(lookup: F) -> HandshakeResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(cluster) = lookup(CLUSTER_ENV) {
            config.cluster = cluster.parse()?;
        }
        if let Some(app_url) = lookup(APP_URL_ENV) {
            config.app_url = parse_url(APP_URL_ENV, &app_url)?;
        }
        if let Some(redirect) = lookup(REDIRECT_URL_ENV) {
            config.redirect_base = parse_url(REDIRECT_URL_ENV, &redirect)?;
        }
        if let Some(expiry) = lookup(SESSION_EXPIRY_ENV) {
            let ms: u64 = expiry.trim().parse().map_err(|_| {
                HandshakeError::Config(format!("{} must be milliseconds, got {:?}", SESSION_EXPIRY_ENV, expiry))
            })?;
            config.session_expiry = (ms > 0).then(|| Duration::from_millis(ms));
        }
        if let Some(path) = lookup(STORE_PATH_ENV) {
            config.store_path = PathBuf::from(path);
        }
        if let Some(opener) = lookup(HOST_OPENER_ENV).filter(|s| !s.trim().is_empty()) {
            config.host_opener = Some(opener);
        }
        if let Some(base) = lookup(WALLET_BASE_ENV) {
            config.wallet_base = base;
        }

        config.normalize();
        Ok(config)
    }

    /// Ensure the redirect base ends in `/` so routes join beneath it
    pub fn normalize(&mut self) {
        if !self.redirect_base.path().ends_with('/') {
            let path = format!("{}/", self.redirect_base.path());
            self.redirect_base.set_path(&path);
        }
    }
}

fn parse_url(name: &str, value: &str) -> HandshakeResult<Url> {
    Url::parse(value).map_err(|e| HandshakeError::Config(format!("{} is not a URL: {}", name, e)))
}

/// `~/.ccoin/wallet-link.json`, or the working directory without a home
pub fn default_store_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".ccoin")
        .join("wallet-link.json")
}
