//! Gateways
//!
//! Thin, stateless layers over one provider each. They add derived metrics
//! (allocation, history summaries, indicators) and enforce request rules, but
//! never cache and never retry.

mod account;
mod market;
mod trading;

pub use account::{AccountGateway, HistorySummary, PortfolioSummary};
pub use market::{IndexSnapshot, MarketGateway, PriceSnapshot, MARKET_INDICES};
pub use trading::TradingGateway;
