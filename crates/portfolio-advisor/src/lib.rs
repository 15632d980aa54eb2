//! # portfolio-advisor
//!
//! Conversational portfolio assistant for Alpaca paper-trading accounts.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  Assistant (orchestrator)                                     │
//! │   greeting · credential capture · shortcuts · directive loop  │
//! └───────────────┬──────────────────────────────┬───────────────┘
//!                 │ ACTION:tool:args             │ portfolio-performance
//!        ┌────────▼────────┐            ┌────────▼─────────┐
//!        │  svckit tools   │            │ PerformanceAnalyzer│
//!        └────────┬────────┘            └────────┬─────────┘
//!   ┌─────────────┼──────────────┬───────────────┘
//!   ▼             ▼              ▼
//! Account      Trading        Market          (gateways)
//!   └──────┬──────┘              │
//!    BrokerageClient       MarketDataClient   (Alpaca REST or mocks)
//! ```
//!
//! Everything the model may do goes through a directive line validated
//! against the tool table before any provider is called.

pub mod analysis;
pub mod assistant;
pub mod config;
pub mod credentials;
pub mod error;
pub mod exchange;
pub mod gateway;
pub mod intent;
pub mod model;
pub mod store;
pub mod svckit;

pub use assistant::{Assistant, AssistantReply, AssistantSession, ProgressUpdate, UserContext};
pub use config::{AdvisorConfig, AlpacaConfig};
pub use credentials::{CredentialPair, CredentialValidator};
pub use error::{AdvisorError, Result};
pub use store::{MemoryUserStore, UserStore};

/// System prompt for the portfolio assistant
pub const ADVISOR_PROMPT: &str = r"You are an AI financial assistant helping users manage their investment portfolio through an Alpaca paper-trading account.
You can help with portfolio analysis, market trends and trading strategies.
Be professional but friendly, and always provide clear, actionable insights.
If you don't know something, admit it and suggest alternatives.
Keep responses concise but informative.

## Using Tools

When you need live data or want to act on the account, reply with exactly one
directive line and nothing else on that line, for example:

ACTION:get_price:AAPL
ACTION:place_order:AAPL:buy:10:limit:185.50

Fields are separated by colons. Leave an optional field empty or omit it.
You will receive the tool result and can then answer the user in plain language.

## Rules

- Use a tool rather than guessing prices, balances or positions.
- Only place, cancel or close orders when the user clearly asked for it.
- cancel_all_orders and close_all_positions act on the whole account; confirm with the user first.
- Limit orders need a limit price; stop orders need a stop price.
- This is paper trading; never promise real-money outcomes.
- Use save_info to remember goals, risk tolerance and preferences the user shares.";
