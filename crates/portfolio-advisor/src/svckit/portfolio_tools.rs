//! Portfolio Tools
//!
//! Account summary, positions and equity history. All require a bound
//! brokerage.

use std::fmt::Write as _;

use assistant_core::{Directive, Tool, ToolOutput, ToolSpec};
use async_trait::async_trait;
use serde_json::json;

use super::{money, signed_pct, symbol_arg, ToolContext};
use crate::error::{AdvisorError, Result};
use crate::gateway::HistorySummary;
use crate::model::Position;

fn position_line(position: &Position) -> String {
    format!(
        "{:<6} {:>10} sh @ {} = {} (P&L {} / {}, today {})",
        position.symbol,
        position.qty.normalize(),
        money(position.avg_entry_price),
        money(position.market_value),
        money(position.unrealized_pl),
        signed_pct(position.unrealized_plpc),
        signed_pct(position.change_today),
    )
}

/// Value, day change, cash, buying power and allocation
pub struct PortfolioSummaryTool;

#[async_trait]
impl Tool<ToolContext> for PortfolioSummaryTool {
    type Error = AdvisorError;

    fn spec(&self) -> ToolSpec {
        ToolSpec::new(
            "portfolio_summary",
            "Total value, daily change, cash, buying power and allocation",
        )
        .category("portfolio")
    }

    async fn execute(&self, ctx: &ToolContext, _directive: &Directive) -> Result<ToolOutput> {
        let summary = ctx.account()?.summary().await?;
        let account = &summary.account;

        let mut text = format!(
            "Portfolio Summary\n  \
             Total Value:    {}\n  \
             Daily Change:   {} ({})\n  \
             Cash Available: {}\n  \
             Buying Power:   {}\n",
            money(account.portfolio_value),
            signed_pct(account.day_change_percent),
            money(account.day_change),
            money(account.cash),
            money(account.buying_power),
        );

        if summary.allocation.is_empty() {
            text.push_str("No holdings or cash yet.");
        } else {
            text.push_str("Allocation:\n");
            for slice in &summary.allocation {
                let _ = writeln!(
                    text,
                    "  {:<6} {:>6.2}%  {}",
                    slice.symbol,
                    slice.percent.round_dp(2),
                    money(slice.market_value)
                );
            }
        }

        Ok(ToolOutput::text("portfolio_summary", text.trim_end())
            .with_data(serde_json::to_value(&summary)?))
    }
}

/// Every open position
pub struct GetPositionsTool;

#[async_trait]
impl Tool<ToolContext> for GetPositionsTool {
    type Error = AdvisorError;

    fn spec(&self) -> ToolSpec {
        ToolSpec::new("get_positions", "All open positions with P&L").category("portfolio")
    }

    async fn execute(&self, ctx: &ToolContext, _directive: &Directive) -> Result<ToolOutput> {
        let positions = ctx.account()?.positions().await?;
        if positions.is_empty() {
            return Ok(ToolOutput::text("get_positions", "You have no open positions."));
        }

        let mut text = format!("Open positions ({}):\n", positions.len());
        for position in &positions {
            let _ = writeln!(text, "  {}", position_line(position));
        }
        Ok(ToolOutput::text("get_positions", text.trim_end())
            .with_data(serde_json::to_value(&positions)?))
    }
}

/// One position; holding nothing is a normal answer
pub struct GetPositionTool;

#[async_trait]
impl Tool<ToolContext> for GetPositionTool {
    type Error = AdvisorError;

    fn spec(&self) -> ToolSpec {
        ToolSpec::new("get_position", "Details of the position in one symbol")
            .required("symbol")
            .category("portfolio")
    }

    async fn execute(&self, ctx: &ToolContext, directive: &Directive) -> Result<ToolOutput> {
        let account = ctx.account()?;
        let symbol = symbol_arg(directive, 0)?;

        match account.position(&symbol).await? {
            Some(position) => Ok(ToolOutput::text("get_position", position_line(&position))
                .with_data(serde_json::to_value(&position)?)),
            None => Ok(ToolOutput::text(
                "get_position",
                format!("You don't hold any {symbol}."),
            )
            .with_data(json!({ "symbol": symbol, "position": null }))),
        }
    }
}

/// Equity curve over a period
pub struct PortfolioHistoryTool;

impl PortfolioHistoryTool {
    /// Accepts the user-facing `1Y` as well as the provider's `1A`
    fn period(arg: Option<&str>) -> Result<&'static str> {
        match arg.map(str::to_uppercase).as_deref() {
            None | Some("1M") => Ok("1M"),
            Some("1D") => Ok("1D"),
            Some("1W") => Ok("1W"),
            Some("3M") => Ok("3M"),
            Some("6M") => Ok("6M"),
            Some("1Y" | "1A") => Ok("1A"),
            Some(other) => Err(AdvisorError::InvalidArgument(format!(
                "period must be one of 1D, 1W, 1M, 3M, 6M, 1Y (got '{other}')"
            ))),
        }
    }
}

#[async_trait]
impl Tool<ToolContext> for PortfolioHistoryTool {
    type Error = AdvisorError;

    fn spec(&self) -> ToolSpec {
        ToolSpec::new(
            "portfolio_history",
            "Portfolio equity over a period: 1D, 1W, 1M, 3M, 6M or 1Y (default 1M)",
        )
        .optional("period")
        .category("portfolio")
    }

    async fn execute(&self, ctx: &ToolContext, directive: &Directive) -> Result<ToolOutput> {
        let account = ctx.account()?;
        let period = Self::period(directive.arg(0))?;
        let history = account.history(period).await?;
        let summary = HistorySummary::from_history(period, &history);

        let text = match (summary.start_equity, summary.end_equity, summary.total_return_pct) {
            (Some(start), Some(end), Some(total)) => format!(
                "Portfolio history ({period}, {} points):\n  Start equity: {}\n  End equity:   {}\n  Total return: {}",
                summary.points,
                money(start),
                money(end),
                signed_pct(total),
            ),
            _ => format!("No portfolio history is available for {period} yet."),
        };

        Ok(ToolOutput::text("portfolio_history", text)
            .with_data(json!({ "summary": summary, "history": history })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::{MockBrokerage, MockMarketData};
    use crate::model::{Account, PortfolioHistory};
    use crate::svckit::test_support::context;
    use chrono::{Duration, Utc};
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_portfolio_summary_text() {
        let broker = MockBrokerage::new()
            .with_account(Account::new(dec!(2500), dec!(10500), dec!(5000), dec!(10500), dec!(10000)))
            .with_positions(vec![Position::new("AAPL", dec!(40), dec!(150), dec!(200))]);
        let ctx = context(Some(Arc::new(broker)), MockMarketData::new());

        let output = PortfolioSummaryTool
            .execute(&ctx, &Directive::new("portfolio_summary", Vec::<String>::new()))
            .await
            .unwrap();
        assert!(output.text.contains("Total Value:    $10,500.00"));
        assert!(output.text.contains("Daily Change:   +5.00% ($500.00)"));
        assert!(output.text.contains("CASH"));
    }

    #[tokio::test]
    async fn test_position_not_held() {
        let ctx = context(Some(Arc::new(MockBrokerage::new())), MockMarketData::new());
        let output = GetPositionTool
            .execute(&ctx, &Directive::new("get_position", ["nvda"]))
            .await
            .unwrap();
        assert_eq!(output.text, "You don't hold any NVDA.");
    }

    #[tokio::test]
    async fn test_history_period_mapping() {
        let now = Utc::now();
        let history = PortfolioHistory::from_equity(
            vec![now - Duration::days(1), now],
            vec![Some(dec!(1000)), Some(dec!(1100))],
            "1D",
        );
        let ctx = context(
            Some(Arc::new(MockBrokerage::new().with_history("1A", history))),
            MockMarketData::new(),
        );

        let output = PortfolioHistoryTool
            .execute(&ctx, &Directive::new("portfolio_history", ["1y"]))
            .await
            .unwrap();
        assert!(output.text.contains("Total return: +10.00%"));

        let result = PortfolioHistoryTool
            .execute(&ctx, &Directive::new("portfolio_history", ["5Y"]))
            .await;
        assert!(matches!(result, Err(AdvisorError::InvalidArgument(_))));
    }
}
