//! Credential Validator
//!
//! Detects Alpaca key/secret tokens in chat text, holds a half-entered pair
//! as pending, and checks a complete pair for shape and liveness. Nothing
//! here writes to the user store; the caller persists a pair only after
//! [`CredentialValidator::verify`] succeeds.

use std::fmt;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{AdvisorError, Result};
use crate::exchange::{BrokerageClient, BrokerageConnector};

static KEY_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:PK|AK)[A-Z0-9]{16,29}\b").expect("valid regex"));
static SECRET_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Za-z0-9]{40}\b").expect("valid regex"));
static KEY_FORMAT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:PK|AK)[A-Z0-9]{18}$").expect("valid regex"));
static SECRET_FORMAT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9]{40}$").expect("valid regex"));

/// Brokerage API key and secret
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialPair {
    pub api_key: String,
    pub secret_key: String,
}

impl CredentialPair {
    pub fn new(api_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            secret_key: secret_key.into(),
        }
    }

    /// Shape check only; never touches the network
    pub fn validate_format(&self) -> Result<()> {
        if !KEY_FORMAT.is_match(&self.api_key) {
            return Err(AdvisorError::CredentialFormat(
                "the API key must be 20 characters starting with PK or AK".into(),
            ));
        }
        if !SECRET_FORMAT.is_match(&self.secret_key) {
            return Err(AdvisorError::CredentialFormat(
                "the secret key must be 40 letters and digits".into(),
            ));
        }
        Ok(())
    }

    /// Key with everything but the first four characters hidden
    pub fn masked_key(&self) -> String {
        mask(&self.api_key)
    }
}

impl fmt::Debug for CredentialPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialPair")
            .field("api_key", &self.masked_key())
            .field("secret_key", &"****")
            .finish()
    }
}

fn mask(token: &str) -> String {
    let visible: String = token.chars().take(4).collect();
    format!("{visible}****")
}

/// Tokens spotted in one message
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DetectedTokens {
    pub api_key: Option<String>,
    pub secret_key: Option<String>,
}

impl DetectedTokens {
    pub const fn is_empty(&self) -> bool {
        self.api_key.is_none() && self.secret_key.is_none()
    }
}

/// Secrets mix letters and digits; single-case hex is a digest, not a secret
fn secret_shaped(candidate: &str) -> bool {
    let has_letter = candidate.bytes().any(|b| b.is_ascii_alphabetic());
    let has_digit = candidate.bytes().any(|b| b.is_ascii_digit());
    let lower_hex = candidate.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'));
    let upper_hex = candidate.bytes().all(|b| matches!(b, b'0'..=b'9' | b'A'..=b'F'));
    has_letter && has_digit && !lower_hex && !upper_hex
}

/// Find a key-shaped and a secret-shaped token in free text
pub fn detect(text: &str) -> DetectedTokens {
    let api_key = KEY_TOKEN.find(text).map(|m| m.as_str().to_string());
    let secret_key = SECRET_TOKEN
        .find_iter(text)
        .map(|m| m.as_str())
        .find(|candidate| api_key.as_deref() != Some(*candidate) && secret_shaped(candidate))
        .map(str::to_string);
    DetectedTokens {
        api_key,
        secret_key,
    }
}

/// Whether the text carries anything credential-shaped
pub fn contains_credentials(text: &str) -> bool {
    !detect(text).is_empty()
}

/// Where a capture stands after absorbing a message
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CaptureStep {
    /// The message had no credential tokens
    NotCredentials,
    /// Holding a key; waiting for the secret
    NeedSecret,
    /// Holding a secret; waiting for the key
    NeedKey,
    /// Both halves present
    Complete(CredentialPair),
}

/// Pending half of a credential pair, scoped to one session
#[derive(Clone, Default)]
pub struct CredentialCapture {
    api_key: Option<String>,
    secret_key: Option<String>,
}

impl CredentialCapture {
    /// Merge tokens found in `text` into the pending pair.
    ///
    /// A complete pair is taken out of the capture; the caller decides
    /// whether it is kept.
    pub fn absorb(&mut self, text: &str) -> CaptureStep {
        let found = detect(text);
        if found.is_empty() {
            return CaptureStep::NotCredentials;
        }
        if found.api_key.is_some() {
            self.api_key = found.api_key;
        }
        if found.secret_key.is_some() {
            self.secret_key = found.secret_key;
        }

        match (&self.api_key, &self.secret_key) {
            (Some(_), Some(_)) => {
                let api_key = self.api_key.take().unwrap_or_default();
                let secret_key = self.secret_key.take().unwrap_or_default();
                CaptureStep::Complete(CredentialPair::new(api_key, secret_key))
            }
            (Some(_), None) => CaptureStep::NeedSecret,
            (None, _) => CaptureStep::NeedKey,
        }
    }

    pub fn clear(&mut self) {
        self.api_key = None;
        self.secret_key = None;
    }

    pub const fn is_pending(&self) -> bool {
        self.api_key.is_some() || self.secret_key.is_some()
    }

    pub fn pending_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    pub fn pending_secret(&self) -> Option<&str> {
        self.secret_key.as_deref()
    }
}

impl fmt::Debug for CredentialCapture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialCapture")
            .field("api_key", &self.api_key.as_deref().map(mask))
            .field("secret_key", &self.secret_key.as_ref().map(|_| "****"))
            .finish()
    }
}

/// Format and liveness checks for a complete pair
#[derive(Clone)]
pub struct CredentialValidator {
    connector: Arc<dyn BrokerageConnector>,
}

impl CredentialValidator {
    pub fn new(connector: Arc<dyn BrokerageConnector>) -> Self {
        Self { connector }
    }

    /// Check shape, then ask the brokerage for the account.
    ///
    /// On success returns a client bound to the pair.
    pub async fn verify(&self, pair: &CredentialPair) -> Result<Arc<dyn BrokerageClient>> {
        pair.validate_format()?;

        let client = self.connector.connect(pair)?;
        match client.get_account().await {
            Ok(_) => {
                tracing::info!(api_key = %pair.masked_key(), "Brokerage credentials verified");
                Ok(client)
            }
            Err(AdvisorError::Auth(_)) => {
                tracing::warn!(api_key = %pair.masked_key(), "Brokerage rejected credentials");
                Err(AdvisorError::CredentialAuth)
            }
            Err(e) => Err(e),
        }
    }

    /// Connect without a liveness check
    pub fn connect(&self, pair: &CredentialPair) -> Result<Arc<dyn BrokerageClient>> {
        self.connector.connect(pair)
    }
}
