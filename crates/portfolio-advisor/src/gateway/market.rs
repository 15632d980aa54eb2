//! Market Data Gateway

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use futures::future::join_all;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::analysis::indicators::Indicators;
use crate::error::{AdvisorError, Result};
use crate::exchange::MarketDataClient;
use crate::model::{Bar, BarTimeframe, BarsRequest, CompanyProfile, Quote, Trade};

/// Index ETFs shown by the market summary
pub const MARKET_INDICES: [(&str, &str); 4] = [
    ("SPY", "S&P 500"),
    ("QQQ", "Nasdaq 100"),
    ("DIA", "Dow Jones Industrial Average"),
    ("IWM", "Russell 2000"),
];

const DEFAULT_BARS_LOOKBACK_DAYS: i64 = 30;
const DEFAULT_BARS_LIMIT: u32 = 100;
const INDICATOR_LOOKBACK_DAYS: i64 = 300;
const INDICATOR_BARS: usize = 200;

/// Latest quote and trade for one symbol
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PriceSnapshot {
    pub symbol: String,
    pub quote: Quote,
    pub trade: Trade,
}

impl PriceSnapshot {
    pub fn spread(&self) -> Decimal {
        self.quote.ask_price - self.quote.bid_price
    }
}

/// One row of the market summary
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IndexSnapshot {
    pub symbol: String,
    pub name: String,
    pub price: Decimal,

    /// Change against the previous daily close, in percent
    pub change_percent: Option<Decimal>,
}

#[derive(Clone)]
pub struct MarketGateway {
    client: Arc<dyn MarketDataClient>,
}

impl MarketGateway {
    pub fn new(client: Arc<dyn MarketDataClient>) -> Self {
        Self { client }
    }

    pub async fn snapshot(&self, symbol: &str) -> Result<PriceSnapshot> {
        let (quote, trade) =
            futures::try_join!(self.client.latest_quote(symbol), self.client.latest_trade(symbol))?;
        Ok(PriceSnapshot {
            symbol: symbol.to_uppercase(),
            quote,
            trade,
        })
    }

    /// Bars over the last 30 days, at most `limit` of them
    pub async fn bars(
        &self,
        symbol: &str,
        timeframe: BarTimeframe,
        limit: Option<u32>,
    ) -> Result<Vec<Bar>> {
        let request = BarsRequest {
            timeframe,
            start: Some(Utc::now() - Duration::days(DEFAULT_BARS_LOOKBACK_DAYS)),
            end: None,
            limit: Some(limit.unwrap_or(DEFAULT_BARS_LIMIT)),
        };
        self.client.bars(symbol, &request).await
    }

    /// Daily bars from `start` until now
    pub async fn daily_bars_since(&self, symbol: &str, start: DateTime<Utc>) -> Result<Vec<Bar>> {
        self.client
            .bars(symbol, &BarsRequest::daily_since(start))
            .await
    }

    /// SMA 20/50/200 and RSI-14 over the most recent 200 daily bars
    pub async fn technical_analysis(&self, symbol: &str) -> Result<Indicators> {
        let start = Utc::now() - Duration::days(INDICATOR_LOOKBACK_DAYS);
        let bars = self.daily_bars_since(symbol, start).await?;
        let closes: Vec<Decimal> = bars.iter().map(|b| b.close).collect();
        let recent = &closes[closes.len().saturating_sub(INDICATOR_BARS)..];

        Indicators::from_closes(symbol, recent)
            .ok_or_else(|| AdvisorError::NotFound(format!("price history for {}", symbol.to_uppercase())))
    }

    /// Index ETF snapshot; indices that fail to load are left out
    pub async fn market_summary(&self) -> Vec<IndexSnapshot> {
        let start = Utc::now() - Duration::days(7);
        let fetches = MARKET_INDICES.iter().map(|(symbol, name)| async move {
            let trade = self.client.latest_trade(symbol).await?;
            let bars = self.daily_bars_since(symbol, start).await.unwrap_or_default();
            let previous_close = bars.iter().rev().nth(1).map(|b| b.close);
            let change_percent = previous_close
                .filter(|p| !p.is_zero())
                .map(|p| (trade.price - p) / p * Decimal::ONE_HUNDRED);
            Ok::<_, AdvisorError>(IndexSnapshot {
                symbol: (*symbol).to_string(),
                name: (*name).to_string(),
                price: trade.price,
                change_percent,
            })
        });

        join_all(fetches)
            .await
            .into_iter()
            .filter_map(|result| match result {
                Ok(snapshot) => Some(snapshot),
                Err(e) => {
                    tracing::warn!(error = %e, "Index snapshot unavailable");
                    None
                }
            })
            .collect()
    }

    pub async fn company_info(&self, symbol: &str) -> Result<Option<CompanyProfile>> {
        self.client.company_profile(symbol).await
    }
}
