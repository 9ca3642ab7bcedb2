//! Inbound redirect parsing

use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::{ATTEMPT_PARAM, AttemptId, ProtocolError, ProtocolResult};

/// Raw fields of a wallet redirect, unvalidated
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedirectParams {
    #[serde(rename = "errorCode")]
    pub error_code: Option<String>,
    #[serde(rename = "errorMessage")]
    pub error_message: Option<String>,
    pub phantom_encryption_public_key: Option<String>,
    pub nonce: Option<String>,
    pub data: Option<String>,
    /// Attempt id this client appended to its own redirect link
    pub attempt: Option<String>,
}

/// What a redirect carries once classified
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedirectOutcome {
    /// The wallet reported an error (user rejected, unauthorized, ...)
    Rejected { code: String, message: Option<String> },
    /// Encrypted response data
    Encrypted {
        peer_public_key: Option<String>,
        nonce: String,
        data: String,
    },
}

impl RedirectParams {
    /// Extract the fields from a full redirect URL
    pub fn from_url(url: &Url) -> Self {
        Self::from_pairs(url.query_pairs())
    }

    /// Extract the fields from a bare query string, with or without `?`
    pub fn from_query(query: &str) -> Self {
        let query = query.strip_prefix('?').unwrap_or(query);
        Self::from_pairs(url::form_urlencoded::parse(query.as_bytes()))
    }

    fn from_pairs<'a>(pairs: impl Iterator<Item = (Cow<'a, str>, Cow<'a, str>)>) -> Self {
        let mut params = Self::default();
        for (key, value) in pairs {
            let slot = match key.as_ref() {
                "errorCode" => &mut params.error_code,
                "errorMessage" => &mut params.error_message,
                "phantom_encryption_public_key" => &mut params.phantom_encryption_public_key,
                "nonce" => &mut params.nonce,
                "data" => &mut params.data,
                ATTEMPT_PARAM => &mut params.attempt,
                _ => continue,
            };
            // First occurrence wins
            if slot.is_none() {
                *slot = Some(value.into_owned());
            }
        }
        params
    }

    /// Whether the redirect carries a wallet response at all
    pub fn is_response(&self) -> bool {
        self.error_code.is_some() || (self.nonce.is_some() && self.data.is_some())
    }

    /// Attempt id, if present and well formed
    pub fn attempt_id(&self) -> Option<AttemptId> {
        self.attempt.as_deref().and_then(AttemptId::parse)
    }

    /// Classify the redirect as an error report or encrypted data
    pub fn outcome(&self) -> ProtocolResult<RedirectOutcome> {
        if let Some(code) = &self.error_code {
            return Ok(RedirectOutcome::Rejected {
                code: code.clone(),
                message: self.error_message.clone(),
            });
        }

        let nonce = self.nonce.clone().ok_or(ProtocolError::MissingField("nonce"))?;
        let data = self.data.clone().ok_or(ProtocolError::MissingField("data"))?;

        Ok(RedirectOutcome::Encrypted {
            peer_public_key: self.phantom_encryption_public_key.clone(),
            nonce,
            data,
        })
    }
}
