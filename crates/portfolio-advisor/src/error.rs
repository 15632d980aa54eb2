//! Error Types for the Portfolio Advisor

use assistant_core::{AgentError, DirectiveError, UserFacing};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AdvisorError>;

#[derive(Error, Debug)]
pub enum AdvisorError {
    #[error("Brokerage rejected the request: {0}")]
    Auth(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Malformed credentials: {0}")]
    CredentialFormat(String),

    #[error("Credentials rejected by the brokerage")]
    CredentialAuth,

    #[error("Brokerage account not connected")]
    CredentialsRequired,

    #[error("{order_type} order requires {field}")]
    MissingPriceField {
        order_type: String,
        field: &'static str,
    },

    #[error("Invalid order: {0}")]
    InvalidOrder(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not enough data to compute performance")]
    InsufficientData,

    #[error("An authenticated user is required")]
    IdentityRequired,

    #[error("Invalid directive: {0}")]
    InvalidDirective(#[from] DirectiveError),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Report error: {0}")]
    Report(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Language model error: {0}")]
    Agent(#[from] AgentError),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AdvisorError {
    /// Transient failures a caller may retry on a later turn
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ProviderUnavailable(_) => true,
            Self::Network(e) => e.is_timeout() || e.is_connect(),
            Self::Agent(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Message safe to show the end user
    pub fn user_message(&self) -> String {
        match self {
            Self::Auth(_) => {
                "Your brokerage rejected the request. Please check your API credentials.".into()
            }
            Self::NotFound(what) => format!("I couldn't find {what}."),
            Self::ProviderUnavailable(_) | Self::Network(_) => {
                "The market data service is temporarily unavailable. Please try again in a moment."
                    .into()
            }
            Self::CredentialFormat(detail) => format!(
                "Those credentials don't look right: {detail}. Alpaca API keys are 20 characters \
                 starting with PK or AK, and secret keys are 40 characters."
            ),
            Self::CredentialAuth => {
                "Alpaca rejected those credentials, so I didn't save them. Please double-check \
                 both keys and try again."
                    .into()
            }
            Self::CredentialsRequired => {
                "I need your Alpaca API credentials before I can access your account. Paste your \
                 API key and secret key here to connect."
                    .into()
            }
            Self::MissingPriceField { order_type, field } => {
                format!("A {order_type} order needs a {field}. Please include it and try again.")
            }
            Self::InvalidOrder(detail) | Self::InvalidArgument(detail) => {
                format!("I couldn't do that: {detail}.")
            }
            Self::InsufficientData => {
                "There isn't enough portfolio history yet to analyze performance.".into()
            }
            Self::IdentityRequired => "Please sign in so I can remember that for you.".into(),
            Self::InvalidDirective(_) => {
                "Sorry, I couldn't work out how to run that request. Could you rephrase it?".into()
            }
            Self::Agent(e) => e.user_message(),
            _ => "I apologize, but I encountered an error. Please try again.".into(),
        }
    }
}

impl UserFacing for AdvisorError {
    fn user_message(&self) -> String {
        Self::user_message(self)
    }
}
