//! Error Types

use thiserror::Error;

use crate::directive::DirectiveError;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, AgentError>;

/// Engine error types
#[derive(Error, Debug)]
pub enum AgentError {
    /// LLM provider returned an error response
    #[error("Provider error: {0}")]
    Provider(String),

    /// Provider unavailable or not responding
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Directive failed the grammar or arity check
    #[error("Invalid directive: {0}")]
    InvalidDirective(#[from] DirectiveError),

    /// Parse error (e.g., malformed provider payload)
    #[error("Parse error: {0}")]
    Parse(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Rate limited
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Authentication with the provider failed
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other/unknown error
    #[error("{0}")]
    Other(String),
}

impl AgentError {
    /// Check if error is retryable
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ProviderUnavailable(_) | Self::RateLimited(_)
        )
    }

    /// Convert to a user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            Self::Provider(_) | Self::ProviderUnavailable(_) => {
                "The AI service is currently unavailable. Please try again.".into()
            }
            Self::InvalidDirective(_) => {
                "Sorry, I couldn't work out how to run that request.".into()
            }
            Self::RateLimited(_) => "You've made too many requests. Please wait a moment.".into(),
            Self::Auth(_) => "The AI service rejected our credentials.".into(),
            _ => "I apologize, but I encountered an error. Please try again.".into(),
        }
    }
}

impl From<anyhow::Error> for AgentError {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

/// Errors that can be shown to the end user.
///
/// Tool error types implement this so the engine can fold a failure back into
/// the conversation without leaking internal detail.
pub trait UserFacing {
    fn user_message(&self) -> String;
}

impl UserFacing for AgentError {
    fn user_message(&self) -> String {
        Self::user_message(self)
    }
}
