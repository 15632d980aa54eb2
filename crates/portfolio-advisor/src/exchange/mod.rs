//! Provider Integration
//!
//! Abstractions over the brokerage and market-data providers, plus the
//! Alpaca REST implementation and in-memory mocks.

mod alpaca;
mod mock;

pub use alpaca::{AlpacaClient, AlpacaConnector};
pub use mock::{MockBrokerage, MockConnector, MockMarketData, daily_bars};

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::credentials::CredentialPair;
use crate::error::Result;
use crate::model::{
    Account, Bar, BarsRequest, CompanyProfile, MarketClock, Order, OrderQuery, OrderRequest,
    PortfolioHistory, Position, Quote, Trade, TradingDay,
};

/// Brokerage client trait (Strategy pattern)
///
/// One instance is bound to one credential pair. "Not found" is `Ok(None)`.
#[async_trait]
pub trait BrokerageClient: Send + Sync {
    /// Provider name
    fn name(&self) -> &str;

    async fn get_account(&self) -> Result<Account>;

    async fn get_positions(&self) -> Result<Vec<Position>>;

    async fn get_position(&self, symbol: &str) -> Result<Option<Position>>;

    async fn list_orders(&self, query: &OrderQuery) -> Result<Vec<Order>>;

    async fn submit_order(&self, request: &OrderRequest) -> Result<Order>;

    /// Returns `false` when no such order exists
    async fn cancel_order(&self, order_id: &str) -> Result<bool>;

    /// Liquidate a position; `None` when nothing was held
    async fn close_position(&self, symbol: &str) -> Result<Option<Order>>;

    /// Cancel every open order; returns how many were canceled
    async fn cancel_all_orders(&self) -> Result<usize>;

    /// Liquidate every position; returns the closing orders
    async fn close_all_positions(&self) -> Result<Vec<Order>>;

    /// Equity curve for `period` (`1M`, `3M`, `6M`, `1A`) sampled at `timeframe`
    async fn get_portfolio_history(&self, period: &str, timeframe: &str)
    -> Result<PortfolioHistory>;

    async fn get_clock(&self) -> Result<MarketClock>;

    async fn get_calendar(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<TradingDay>>;

    async fn get_asset(&self, symbol: &str) -> Result<Option<CompanyProfile>>;
}

/// Market data client trait
#[async_trait]
pub trait MarketDataClient: Send + Sync {
    /// Provider name
    fn name(&self) -> &str;

    async fn latest_quote(&self, symbol: &str) -> Result<Quote>;

    async fn latest_trade(&self, symbol: &str) -> Result<Trade>;

    async fn bars(&self, symbol: &str, request: &BarsRequest) -> Result<Vec<Bar>>;

    /// Bars for several symbols; symbols without data are absent
    async fn multi_bars(
        &self,
        symbols: &[String],
        request: &BarsRequest,
    ) -> Result<HashMap<String, Vec<Bar>>> {
        let mut out = HashMap::new();
        for symbol in symbols {
            let bars = self.bars(symbol, request).await?;
            if !bars.is_empty() {
                out.insert(symbol.clone(), bars);
            }
        }
        Ok(out)
    }

    async fn company_profile(&self, symbol: &str) -> Result<Option<CompanyProfile>>;
}

/// Builds a brokerage client for a credential pair.
///
/// Construction is local; the first network call happens on use.
pub trait BrokerageConnector: Send + Sync {
    fn connect(&self, credentials: &CredentialPair) -> Result<Arc<dyn BrokerageClient>>;
}
