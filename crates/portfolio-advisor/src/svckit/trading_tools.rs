//! Trading Tools
//!
//! Orders, fills, position closing and the market clock. All require a bound
//! brokerage; order tools change the (paper) account.

use std::fmt::Write as _;

use assistant_core::{Directive, Tool, ToolOutput, ToolSpec};
use async_trait::async_trait;
use serde_json::json;

use super::{money, required_arg, symbol_arg, ToolContext};
use crate::error::{AdvisorError, Result};
use crate::model::{parse_decimal, Order, OrderRequest};

const DEFAULT_CALENDAR_DAYS: u32 = 7;
const MAX_CALENDAR_DAYS: u32 = 90;

fn order_line(order: &Order) -> String {
    let mut line = format!(
        "{} {} {} {} ({})",
        order.side.to_string().to_uppercase(),
        order.qty.normalize(),
        order.symbol,
        order.order_type,
        order.status,
    );
    if let Some(limit) = order.limit_price {
        let _ = write!(line, " limit {}", money(limit));
    }
    if let Some(stop) = order.stop_price {
        let _ = write!(line, " stop {}", money(stop));
    }
    if let Some(price) = order.filled_avg_price {
        let _ = write!(line, " filled {} @ {}", order.filled_qty.normalize(), money(price));
    }
    let _ = write!(line, " [id {}]", order.id);
    line
}

/// Open orders
pub struct GetOrdersTool;

#[async_trait]
impl Tool<ToolContext> for GetOrdersTool {
    type Error = AdvisorError;

    fn spec(&self) -> ToolSpec {
        ToolSpec::new("get_orders", "Open orders, optionally for one symbol")
            .optional("symbol")
            .category("trading")
    }

    async fn execute(&self, ctx: &ToolContext, directive: &Directive) -> Result<ToolOutput> {
        let trading = ctx.trading()?;
        let symbol = directive.arg(0).map(|_| symbol_arg(directive, 0)).transpose()?;
        let orders = trading.open_orders(symbol.as_deref()).await?;

        if orders.is_empty() {
            let scope = symbol.map(|s| format!(" for {s}")).unwrap_or_default();
            return Ok(ToolOutput::text("get_orders", format!("You have no open orders{scope}.")));
        }

        let mut text = format!("Open orders ({}):\n", orders.len());
        for order in &orders {
            let _ = writeln!(text, "  {}", order_line(order));
        }
        Ok(ToolOutput::text("get_orders", text.trim_end())
            .with_data(serde_json::to_value(&orders)?))
    }
}

/// Filled orders
pub struct RecentTradesTool;

#[async_trait]
impl Tool<ToolContext> for RecentTradesTool {
    type Error = AdvisorError;

    fn spec(&self) -> ToolSpec {
        ToolSpec::new("recent_trades", "Recently filled orders").category("trading")
    }

    async fn execute(&self, ctx: &ToolContext, _directive: &Directive) -> Result<ToolOutput> {
        let trades = ctx.trading()?.recent_trades().await?;
        if trades.is_empty() {
            return Ok(ToolOutput::text("recent_trades", "No filled trades yet."));
        }

        let mut text = format!("Recent trades ({}):\n", trades.len());
        for trade in &trades {
            let when = trade
                .filled_at
                .or(trade.submitted_at)
                .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_default();
            let _ = writeln!(
                text,
                "  {when}  {} {} {} @ {}",
                trade.side.to_string().to_uppercase(),
                trade.filled_qty.normalize(),
                trade.symbol,
                trade.filled_avg_price.map(money).unwrap_or_default(),
            );
        }
        Ok(ToolOutput::text("recent_trades", text.trim_end())
            .with_data(serde_json::to_value(&trades)?))
    }
}

/// Submit a paper order
pub struct PlaceOrderTool;

impl PlaceOrderTool {
    fn request(directive: &Directive) -> Result<OrderRequest> {
        let symbol = symbol_arg(directive, 0)?;
        let side = required_arg(directive, 1, "side")?.parse()?;
        let qty = parse_decimal("qty", required_arg(directive, 2, "qty")?)?;
        let order_type = required_arg(directive, 3, "type")?.parse()?;

        let mut request = OrderRequest::market(symbol, side, qty);
        request.order_type = order_type;
        request.limit_price = directive
            .arg(4)
            .map(|p| parse_decimal("limit_price", p))
            .transpose()?;
        request.stop_price = directive
            .arg(5)
            .map(|p| parse_decimal("stop_price", p))
            .transpose()?;
        Ok(request)
    }
}

#[async_trait]
impl Tool<ToolContext> for PlaceOrderTool {
    type Error = AdvisorError;

    fn spec(&self) -> ToolSpec {
        ToolSpec::new(
            "place_order",
            "Place a paper order. Side buy|sell; type market|limit|stop|stop_limit. \
             Limit orders need LIMIT, stop orders need STOP, stop_limit needs both",
        )
        .required("symbol")
        .required("side")
        .required("qty")
        .required("type")
        .optional("limit")
        .optional("stop")
        .category("trading")
        .side_effects()
    }

    async fn execute(&self, ctx: &ToolContext, directive: &Directive) -> Result<ToolOutput> {
        let trading = ctx.trading()?;
        let request = Self::request(directive)?;
        let order = trading.place_order(&request).await?;

        Ok(ToolOutput::text("place_order", format!("Order placed: {}", order_line(&order)))
            .with_data(serde_json::to_value(&order)?))
    }
}

/// Cancel one open order
pub struct CancelOrderTool;

#[async_trait]
impl Tool<ToolContext> for CancelOrderTool {
    type Error = AdvisorError;

    fn spec(&self) -> ToolSpec {
        ToolSpec::new("cancel_order", "Cancel an open order by id")
            .required("order_id")
            .category("trading")
            .side_effects()
    }

    async fn execute(&self, ctx: &ToolContext, directive: &Directive) -> Result<ToolOutput> {
        let trading = ctx.trading()?;
        let order_id = required_arg(directive, 0, "order_id")?;
        let canceled = trading.cancel_order(order_id).await?;

        let text = if canceled {
            format!("Order {order_id} canceled.")
        } else {
            format!("Order {order_id} was not found or is no longer open.")
        };
        Ok(ToolOutput::text("cancel_order", text)
            .with_data(json!({ "order_id": order_id, "canceled": canceled })))
    }
}

/// Liquidate a position
pub struct ClosePositionTool;

#[async_trait]
impl Tool<ToolContext> for ClosePositionTool {
    type Error = AdvisorError;

    fn spec(&self) -> ToolSpec {
        ToolSpec::new("close_position", "Sell (or cover) the whole position in a symbol")
            .required("symbol")
            .category("trading")
            .side_effects()
    }

    async fn execute(&self, ctx: &ToolContext, directive: &Directive) -> Result<ToolOutput> {
        let trading = ctx.trading()?;
        let symbol = symbol_arg(directive, 0)?;

        match trading.close_position(&symbol).await? {
            Some(order) => Ok(ToolOutput::text(
                "close_position",
                format!("Closing {symbol}: {}", order_line(&order)),
            )
            .with_data(serde_json::to_value(&order)?)),
            None => Ok(ToolOutput::text(
                "close_position",
                format!("You don't hold any {symbol}, so there is nothing to close."),
            )),
        }
    }
}

/// Cancel every open order at once
pub struct CancelAllOrdersTool;

#[async_trait]
impl Tool<ToolContext> for CancelAllOrdersTool {
    type Error = AdvisorError;

    fn spec(&self) -> ToolSpec {
        ToolSpec::new("cancel_all_orders", "Cancel every open order")
            .category("trading")
            .side_effects()
    }

    async fn execute(&self, ctx: &ToolContext, _directive: &Directive) -> Result<ToolOutput> {
        let canceled = ctx.trading()?.cancel_all_orders().await?;
        let text = match canceled {
            0 => "You have no open orders to cancel.".to_string(),
            1 => "Canceled 1 open order.".to_string(),
            n => format!("Canceled {n} open orders."),
        };
        Ok(ToolOutput::text("cancel_all_orders", text)
            .with_data(json!({ "success": true, "canceled": canceled })))
    }
}

/// Liquidate the whole portfolio
pub struct CloseAllPositionsTool;

#[async_trait]
impl Tool<ToolContext> for CloseAllPositionsTool {
    type Error = AdvisorError;

    fn spec(&self) -> ToolSpec {
        ToolSpec::new("close_all_positions", "Sell (or cover) every position in the account")
            .category("trading")
            .side_effects()
    }

    async fn execute(&self, ctx: &ToolContext, _directive: &Directive) -> Result<ToolOutput> {
        let orders = ctx.trading()?.close_all_positions().await?;
        if orders.is_empty() {
            return Ok(ToolOutput::text(
                "close_all_positions",
                "You don't hold any positions, so there is nothing to close.",
            )
            .with_data(json!({ "success": true, "orders": [] })));
        }

        let mut text = format!("Closing {} positions:\n", orders.len());
        for order in &orders {
            let _ = writeln!(text, "- {}", order_line(order));
        }
        Ok(ToolOutput::text("close_all_positions", text.trim_end())
            .with_data(json!({ "success": true, "orders": orders })))
    }
}

/// Market clock
pub struct MarketStatusTool;

#[async_trait]
impl Tool<ToolContext> for MarketStatusTool {
    type Error = AdvisorError;

    fn spec(&self) -> ToolSpec {
        ToolSpec::new("market_status", "Whether the market is open, and the next open/close")
            .category("trading")
    }

    async fn execute(&self, ctx: &ToolContext, _directive: &Directive) -> Result<ToolOutput> {
        let clock = ctx.trading()?.clock().await?;
        let fmt = "%Y-%m-%d %H:%M UTC";
        let text = if clock.is_open {
            format!(
                "The market is open. It closes at {}.",
                clock.next_close.format(fmt)
            )
        } else {
            format!(
                "The market is closed. It next opens at {}.",
                clock.next_open.format(fmt)
            )
        };
        Ok(ToolOutput::text("market_status", text).with_data(serde_json::to_value(&clock)?))
    }
}

/// Upcoming trading sessions
pub struct TradingCalendarTool;

#[async_trait]
impl Tool<ToolContext> for TradingCalendarTool {
    type Error = AdvisorError;

    fn spec(&self) -> ToolSpec {
        ToolSpec::new("trading_calendar", "Trading sessions over the next DAYS days (default 7)")
            .optional("days")
            .category("trading")
    }

    async fn execute(&self, ctx: &ToolContext, directive: &Directive) -> Result<ToolOutput> {
        let trading = ctx.trading()?;
        let days = match directive.arg(0) {
            None => DEFAULT_CALENDAR_DAYS,
            Some(d) => d
                .parse::<u32>()
                .ok()
                .filter(|d| (1..=MAX_CALENDAR_DAYS).contains(d))
                .ok_or_else(|| {
                    AdvisorError::InvalidArgument(format!(
                        "days must be between 1 and {MAX_CALENDAR_DAYS}"
                    ))
                })?,
        };

        let sessions = trading.calendar(days).await?;
        if sessions.is_empty() {
            return Ok(ToolOutput::text(
                "trading_calendar",
                format!("No trading sessions in the next {days} days."),
            ));
        }

        let mut text = format!("Trading sessions, next {days} days:\n");
        for day in &sessions {
            let _ = writeln!(
                text,
                "  {}  {}-{}",
                day.date.format("%a %Y-%m-%d"),
                day.open,
                day.close
            );
        }
        Ok(ToolOutput::text("trading_calendar", text.trim_end())
            .with_data(serde_json::to_value(&sessions)?))
    }
}
