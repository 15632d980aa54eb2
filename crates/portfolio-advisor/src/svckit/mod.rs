//! Service Kit - Directive Tools
//!
//! One tool per directive name. Each tool makes a single gateway call and
//! renders a short text summary plus the structured record.

mod market_tools;
mod memory_tools;
mod portfolio_tools;
mod trading_tools;

use std::sync::Arc;

use assistant_core::{Directive, ToolRegistry};
use rust_decimal::Decimal;

use crate::error::{AdvisorError, Result};
use crate::exchange::{BrokerageClient, MarketDataClient};
use crate::gateway::{AccountGateway, MarketGateway, TradingGateway};
use crate::store::UserStore;

pub use market_tools::{
    CompanyInfoTool, GetBarsTool, GetPriceTool, MarketSummaryTool, TechnicalAnalysisTool,
};
pub use memory_tools::SaveInfoTool;
pub use portfolio_tools::{
    GetPositionTool, GetPositionsTool, PortfolioHistoryTool, PortfolioSummaryTool,
};
pub use trading_tools::{
    CancelAllOrdersTool, CancelOrderTool, CloseAllPositionsTool, ClosePositionTool, GetOrdersTool,
    MarketStatusTool, PlaceOrderTool, RecentTradesTool, TradingCalendarTool,
};

/// Registry type used by the advisor
pub type AdvisorRegistry = ToolRegistry<ToolContext, AdvisorError>;

/// Per-call services handed to every tool
#[derive(Clone)]
pub struct ToolContext {
    /// Bound brokerage client; `None` until credentials are validated
    pub brokerage: Option<Arc<dyn BrokerageClient>>,
    pub market: Arc<dyn MarketDataClient>,
    pub user_id: Option<String>,
    pub user_store: Arc<dyn UserStore>,
}

impl ToolContext {
    fn brokerage(&self) -> Result<Arc<dyn BrokerageClient>> {
        self.brokerage
            .clone()
            .ok_or(AdvisorError::CredentialsRequired)
    }

    /// Fails with `CredentialsRequired` before any network call
    pub fn account(&self) -> Result<AccountGateway> {
        self.brokerage().map(AccountGateway::new)
    }

    /// Fails with `CredentialsRequired` before any network call
    pub fn trading(&self) -> Result<TradingGateway> {
        self.brokerage().map(TradingGateway::new)
    }

    pub fn market(&self) -> MarketGateway {
        MarketGateway::new(self.market.clone())
    }

    /// Authenticated user id, required for durable writes
    pub fn user_id(&self) -> Result<&str> {
        self.user_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or(AdvisorError::IdentityRequired)
    }
}

/// Every directive tool
pub fn registry() -> AdvisorRegistry {
    let mut tools = AdvisorRegistry::new();

    tools.register(GetPriceTool);
    tools.register(GetBarsTool);
    tools.register(TechnicalAnalysisTool);
    tools.register(MarketSummaryTool);
    tools.register(CompanyInfoTool);

    tools.register(PortfolioSummaryTool);
    tools.register(GetPositionsTool);
    tools.register(GetPositionTool);
    tools.register(PortfolioHistoryTool);

    tools.register(GetOrdersTool);
    tools.register(RecentTradesTool);
    tools.register(PlaceOrderTool);
    tools.register(CancelOrderTool);
    tools.register(ClosePositionTool);
    tools.register(CancelAllOrdersTool);
    tools.register(CloseAllPositionsTool);
    tools.register(MarketStatusTool);
    tools.register(TradingCalendarTool);

    tools.register(SaveInfoTool);
    tools
}

/// Positional argument the tool declares as required
fn required_arg<'d>(directive: &'d Directive, index: usize, name: &str) -> Result<&'d str> {
    directive
        .arg(index)
        .ok_or_else(|| AdvisorError::InvalidArgument(format!("{name} is required")))
}

fn symbol_arg(directive: &Directive, index: usize) -> Result<String> {
    let symbol = required_arg(directive, index, "symbol")?.to_uppercase();
    if !symbol
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '/')
    {
        return Err(AdvisorError::InvalidArgument(format!(
            "'{symbol}' is not a ticker symbol"
        )));
    }
    Ok(symbol)
}

/// `$1,234.56`
pub(crate) fn money(value: Decimal) -> String {
    let rounded = format!("{:.2}", value.abs().round_dp(2));
    let (whole, cents) = rounded.split_once('.').unwrap_or((rounded.as_str(), "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, digit) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    let sign = if value.is_sign_negative() && !value.round_dp(2).is_zero() {
        "-"
    } else {
        ""
    };
    format!("{sign}${grouped}.{cents}")
}

/// `+1.23%`
pub(crate) fn signed_pct(value: Decimal) -> String {
    let value = value.round_dp(2);
    if value.is_sign_negative() && !value.is_zero() {
        format!("{value:.2}%")
    } else {
        format!("+{:.2}%", value.abs())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use super::ToolContext;
    use crate::exchange::{BrokerageClient, MockBrokerage, MockMarketData};
    use crate::store::MemoryUserStore;

    pub fn context(brokerage: Option<Arc<MockBrokerage>>, market: MockMarketData) -> ToolContext {
        ToolContext {
            brokerage: brokerage.map(|b| b as Arc<dyn BrokerageClient>),
            market: Arc::new(market),
            user_id: Some("user-1".into()),
            user_store: Arc::new(MemoryUserStore::new()),
        }
    }
}
