//! # assistant-runtime
//!
//! Runtime providers for the portfolio assistant.
//!
//! ## Providers
//!
//! - **OpenAI-compatible** (default): any `/chat/completions` endpoint,
//!   including Ollama's `/v1` compatibility layer
//! - **Ollama** (feature `ollama`): native client via `ollama-rs`
//!
//! ## Usage
//!
//! ```rust,ignore
//! use assistant_runtime::{ProviderConfig, OpenAiProvider};
//!
//! let config = ProviderConfig::from_env();
//! let provider = OpenAiProvider::from_config(&config)?;
//! let agent = AgentBuilder::new()
//!     .provider(Arc::new(provider))
//!     .model(config.model.clone())
//!     .build()?;
//! ```

pub mod openai;

#[cfg(feature = "ollama")]
pub mod ollama;

pub use openai::{OpenAiProvider, ProviderConfig};

#[cfg(feature = "ollama")]
pub use ollama::OllamaProvider;

// Re-export core types for convenience
pub use assistant_core::{
    Agent, AgentError, GenerationOptions, LlmProvider, Message, Result, Role, Session,
};
