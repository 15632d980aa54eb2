//! Market Data Tools
//!
//! Quotes, bars, indicators, index summary and company lookup. These run on
//! the service-level market client and never need a bound brokerage.

use std::fmt::Write as _;

use assistant_core::{Directive, Tool, ToolOutput, ToolSpec};
use async_trait::async_trait;
use serde_json::json;

use super::{money, signed_pct, symbol_arg, ToolContext};
use crate::error::{AdvisorError, Result};
use crate::model::BarTimeframe;

const MAX_BARS_SHOWN: usize = 10;
const MAX_BARS_LIMIT: u32 = 1000;

/// Latest quote and trade
pub struct GetPriceTool;

#[async_trait]
impl Tool<ToolContext> for GetPriceTool {
    type Error = AdvisorError;

    fn spec(&self) -> ToolSpec {
        ToolSpec::new("get_price", "Latest trade price and bid/ask quote for a stock")
            .required("symbol")
            .category("market_data")
    }

    async fn execute(&self, ctx: &ToolContext, directive: &Directive) -> Result<ToolOutput> {
        let symbol = symbol_arg(directive, 0)?;
        let snapshot = ctx.market().snapshot(&symbol).await?;

        let text = format!(
            "{symbol}: last trade {} ({} shares)\n  Bid {} x {} / Ask {} x {} (spread {})",
            money(snapshot.trade.price),
            snapshot.trade.size,
            money(snapshot.quote.bid_price),
            snapshot.quote.bid_size,
            money(snapshot.quote.ask_price),
            snapshot.quote.ask_size,
            money(snapshot.spread()),
        );
        Ok(ToolOutput::text("get_price", text).with_data(serde_json::to_value(&snapshot)?))
    }
}

/// Historical bars
pub struct GetBarsTool;

#[async_trait]
impl Tool<ToolContext> for GetBarsTool {
    type Error = AdvisorError;

    fn spec(&self) -> ToolSpec {
        ToolSpec::new(
            "get_bars",
            "Price bars for the last 30 days. Timeframe: 1Min, 5Min, 15Min, 1H or 1D (default 1D)",
        )
        .required("symbol")
        .optional("timeframe")
        .optional("limit")
        .category("market_data")
    }

    async fn execute(&self, ctx: &ToolContext, directive: &Directive) -> Result<ToolOutput> {
        let symbol = symbol_arg(directive, 0)?;
        let timeframe: BarTimeframe = directive.arg(1).map_or(Ok(BarTimeframe::Day), str::parse)?;
        let limit = directive
            .arg(2)
            .map(|l| {
                l.parse::<u32>()
                    .ok()
                    .filter(|l| (1..=MAX_BARS_LIMIT).contains(l))
                    .ok_or_else(|| {
                        AdvisorError::InvalidArgument(format!(
                            "limit must be between 1 and {MAX_BARS_LIMIT}"
                        ))
                    })
            })
            .transpose()?;

        let bars = ctx.market().bars(&symbol, timeframe, limit).await?;
        if bars.is_empty() {
            return Ok(ToolOutput::text(
                "get_bars",
                format!("No {} bars available for {symbol} in the last 30 days.", timeframe.as_param()),
            ));
        }

        let high = bars.iter().map(|b| b.high).max().unwrap_or_default();
        let low = bars.iter().map(|b| b.low).min().unwrap_or_default();
        let mut text = format!(
            "{symbol} {} bars: {} bars, high {}, low {}\n",
            timeframe.as_param(),
            bars.len(),
            money(high),
            money(low)
        );
        for bar in bars.iter().rev().take(MAX_BARS_SHOWN) {
            let _ = writeln!(
                text,
                "  {}  O {}  H {}  L {}  C {}  V {}",
                bar.timestamp.format("%Y-%m-%d %H:%M"),
                money(bar.open),
                money(bar.high),
                money(bar.low),
                money(bar.close),
                bar.volume
            );
        }

        Ok(ToolOutput::text("get_bars", text.trim_end())
            .with_data(json!({ "symbol": symbol, "bars": bars })))
    }
}

/// Moving averages and RSI
pub struct TechnicalAnalysisTool;

#[async_trait]
impl Tool<ToolContext> for TechnicalAnalysisTool {
    type Error = AdvisorError;

    fn spec(&self) -> ToolSpec {
        ToolSpec::new(
            "technical_analysis",
            "20/50/200-day simple moving averages and 14-day RSI",
        )
        .required("symbol")
        .category("market_data")
    }

    async fn execute(&self, ctx: &ToolContext, directive: &Directive) -> Result<ToolOutput> {
        let symbol = symbol_arg(directive, 0)?;
        let indicators = ctx.market().technical_analysis(&symbol).await?;

        let rsi = indicators
            .rsi_14
            .map_or_else(|| "n/a".to_string(), |r| format!("{r:.2}"));
        let text = format!(
            "{symbol} technical indicators ({} daily bars):\n  \
             Last close: {}\n  \
             SMA 20: {}\n  \
             SMA 50: {}\n  \
             SMA 200: {}\n  \
             RSI 14: {rsi} ({})",
            indicators.bars_used,
            money(indicators.last_close),
            money(indicators.sma_20),
            money(indicators.sma_50),
            money(indicators.sma_200),
            indicators.rsi_reading(),
        );
        Ok(ToolOutput::text("technical_analysis", text)
            .with_data(serde_json::to_value(&indicators)?))
    }
}

/// Major index ETFs
pub struct MarketSummaryTool;

#[async_trait]
impl Tool<ToolContext> for MarketSummaryTool {
    type Error = AdvisorError;

    fn spec(&self) -> ToolSpec {
        ToolSpec::new("market_summary", "Snapshot of the major US index ETFs")
            .category("market_data")
    }

    async fn execute(&self, ctx: &ToolContext, _directive: &Directive) -> Result<ToolOutput> {
        let indices = ctx.market().market_summary().await;
        if indices.is_empty() {
            return Err(AdvisorError::ProviderUnavailable(
                "no index data available".into(),
            ));
        }

        let mut text = String::from("Market Summary:\n");
        for index in &indices {
            let change = index
                .change_percent
                .map_or_else(|| "n/a".to_string(), signed_pct);
            let _ = writeln!(
                text,
                "  {:<4} {:<30} {} ({change})",
                index.symbol,
                index.name,
                money(index.price)
            );
        }
        Ok(ToolOutput::text("market_summary", text.trim_end())
            .with_data(serde_json::to_value(&indices)?))
    }
}

/// Company / asset profile
pub struct CompanyInfoTool;

#[async_trait]
impl Tool<ToolContext> for CompanyInfoTool {
    type Error = AdvisorError;

    fn spec(&self) -> ToolSpec {
        ToolSpec::new("company_info", "Company name, exchange and trading flags")
            .required("symbol")
            .category("market_data")
    }

    async fn execute(&self, ctx: &ToolContext, directive: &Directive) -> Result<ToolOutput> {
        let symbol = symbol_arg(directive, 0)?;
        let Some(profile) = ctx.market().company_info(&symbol).await? else {
            return Ok(ToolOutput::text(
                "company_info",
                format!("No company information found for {symbol}."),
            ));
        };

        let yes_no = |flag: bool| if flag { "yes" } else { "no" };
        let text = format!(
            "{} ({})\n  Exchange: {}\n  Class: {}\n  Status: {}\n  Tradable: {}, shortable: {}, fractionable: {}",
            profile.name,
            profile.symbol,
            profile.exchange,
            profile.asset_class,
            profile.status,
            yes_no(profile.tradable),
            yes_no(profile.shortable),
            yes_no(profile.fractionable),
        );
        Ok(ToolOutput::text("company_info", text).with_data(serde_json::to_value(&profile)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::{daily_bars, MockMarketData};
    use crate::model::CompanyProfile;
    use crate::svckit::test_support::context;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_get_price_text() {
        let ctx = context(None, MockMarketData::new().with_price("AAPL", dec!(1234.5)));
        let output = GetPriceTool
            .execute(&ctx, &Directive::new("get_price", ["aapl"]))
            .await
            .unwrap();
        assert!(output.text.starts_with("AAPL: last trade $1,234.50"));
        assert!(output.data.is_some());
    }

    #[tokio::test]
    async fn test_get_bars_rejects_bad_timeframe() {
        let ctx = context(None, MockMarketData::new());
        let result = GetBarsTool
            .execute(&ctx, &Directive::new("get_bars", ["AAPL", "2Weeks"]))
            .await;
        assert!(matches!(result, Err(AdvisorError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_get_bars_defaults() {
        let closes: Vec<Decimal> = (100..110).map(Decimal::from).collect();
        let ctx = context(None, MockMarketData::new().with_bars("MSFT", daily_bars(Utc::now(), &closes)));
        let output = GetBarsTool
            .execute(&ctx, &Directive::new("get_bars", ["MSFT", ""]))
            .await
            .unwrap();
        assert!(output.text.contains("10 bars, high $109.00, low $100.00"));
    }

    #[tokio::test]
    async fn test_technical_analysis_text() {
        let closes: Vec<Decimal> = (1..=60).map(Decimal::from).collect();
        let ctx = context(None, MockMarketData::new().with_bars("SPY", daily_bars(Utc::now(), &closes)));
        let output = TechnicalAnalysisTool
            .execute(&ctx, &Directive::new("technical_analysis", ["SPY"]))
            .await
            .unwrap();
        assert!(output.text.contains("SMA 20: $50.50"));
        assert!(output.text.contains("RSI 14: 100.00 (overbought)"));
    }

    #[tokio::test]
    async fn test_company_info_not_found_is_normal() {
        let ctx = context(
            None,
            MockMarketData::new().with_profile(CompanyProfile {
                symbol: "AAPL".into(),
                name: "Apple Inc.".into(),
                exchange: "NASDAQ".into(),
                asset_class: "us_equity".into(),
                status: "active".into(),
                tradable: true,
                shortable: true,
                fractionable: true,
            }),
        );
        let found = CompanyInfoTool
            .execute(&ctx, &Directive::new("company_info", ["AAPL"]))
            .await
            .unwrap();
        assert!(found.text.starts_with("Apple Inc. (AAPL)"));

        let missing = CompanyInfoTool
            .execute(&ctx, &Directive::new("company_info", ["ZZZZ"]))
            .await
            .unwrap();
        assert!(missing.text.contains("No company information"));
    }
}
