//! # assistant-core
//!
//! Conversation engine with provider-agnostic LLM abstraction, a line-oriented
//! directive grammar and an extensible tool system.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Agent                                 │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────┐  │
//! │  │  Directive  │  │    Tools    │  │   LlmProvider       │  │
//! │  │    Loop     │──│   Registry  │──│   (Strategy)        │  │
//! │  └─────────────┘  └─────────────┘  └─────────────────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Tools are generic over a caller-supplied context, so the same engine
//! drives any domain that can describe its capabilities as directives.

pub mod directive;
pub mod error;
pub mod message;
pub mod provider;
pub mod reasoning;
pub mod session;
pub mod tool;

pub use directive::{Directive, DirectiveError, ToolSpec, DIRECTIVE_MARKER};
pub use error::{AgentError, Result, UserFacing};
pub use message::{History, Message, Role, DEFAULT_HISTORY_BOUND};
pub use provider::{Completion, GenerationOptions, LlmProvider, ScriptedProvider};
pub use reasoning::{Agent, AgentBuilder, AgentConfig, Turn};
pub use session::{Session, SessionId};
pub use tool::{Tool, ToolOutput, ToolRegistry};
