//! Domain Models
//!
//! Normalized records returned by the gateways. Provider wire formats never
//! leave the `exchange` module.
//! Uses `rust_decimal` for all monetary values - never use f64 for money!

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{AdvisorError, Result};

const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// Brokerage account snapshot
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Account {
    /// Account status reported by the brokerage (e.g. "ACTIVE")
    pub status: String,

    /// Settled cash
    pub cash: Decimal,

    /// Cash plus market value of all positions
    pub portfolio_value: Decimal,

    pub buying_power: Decimal,

    /// Current equity
    pub equity: Decimal,

    /// Equity at the previous close
    pub last_equity: Decimal,

    pub long_market_value: Decimal,
    pub short_market_value: Decimal,

    /// `equity - last_equity`
    pub day_change: Decimal,

    /// Day change relative to `last_equity`, in percent
    pub day_change_percent: Decimal,
}

impl Account {
    /// Build a snapshot, deriving the day-change metrics
    pub fn new(
        cash: Decimal,
        portfolio_value: Decimal,
        buying_power: Decimal,
        equity: Decimal,
        last_equity: Decimal,
    ) -> Self {
        let day_change = equity - last_equity;
        let day_change_percent = if last_equity.is_zero() {
            Decimal::ZERO
        } else {
            day_change / last_equity * HUNDRED
        };
        Self {
            status: "ACTIVE".into(),
            cash,
            portfolio_value,
            buying_power,
            equity,
            last_equity,
            long_market_value: portfolio_value - cash,
            short_market_value: Decimal::ZERO,
            day_change,
            day_change_percent,
        }
    }
}

/// A position in one symbol
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,

    /// Quantity held (negative when short)
    pub qty: Decimal,

    pub market_value: Decimal,

    /// Total cost of the position
    pub cost_basis: Decimal,

    /// Unrealized P&L in dollars
    pub unrealized_pl: Decimal,

    /// Unrealized P&L in percent
    pub unrealized_plpc: Decimal,

    pub current_price: Decimal,
    pub avg_entry_price: Decimal,

    /// Price change since the previous close, in percent
    pub change_today: Decimal,
}

impl Position {
    /// Build a position from quantity, entry and current price
    pub fn new(
        symbol: impl Into<String>,
        qty: Decimal,
        avg_entry_price: Decimal,
        current_price: Decimal,
    ) -> Self {
        let market_value = qty * current_price;
        let cost_basis = qty * avg_entry_price;
        let unrealized_pl = market_value - cost_basis;
        let unrealized_plpc = if cost_basis.is_zero() {
            Decimal::ZERO
        } else {
            unrealized_pl / cost_basis * HUNDRED
        };
        Self {
            symbol: symbol.into().to_uppercase(),
            qty,
            market_value,
            cost_basis,
            unrealized_pl,
            unrealized_plpc,
            current_price,
            avg_entry_price,
            change_today: Decimal::ZERO,
        }
    }
}

/// One slice of the allocation breakdown
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationSlice {
    /// Position symbol, or `CASH`
    pub symbol: String,
    pub market_value: Decimal,

    /// Share of `Σ market_value + cash`, in percent
    pub percent: Decimal,
}

/// Allocation over positions plus cash.
///
/// Cash is included as its own `CASH` slice when positive. Empty when the
/// total is not positive.
pub fn allocation(positions: &[Position], cash: Decimal) -> Vec<AllocationSlice> {
    let invested: Decimal = positions.iter().map(|p| p.market_value).sum();
    let total = invested + cash;
    if total <= Decimal::ZERO {
        return Vec::new();
    }

    let mut slices: Vec<AllocationSlice> = positions
        .iter()
        .map(|p| AllocationSlice {
            symbol: p.symbol.clone(),
            market_value: p.market_value,
            percent: p.market_value / total * HUNDRED,
        })
        .collect();

    if cash > Decimal::ZERO {
        slices.push(AllocationSlice {
            symbol: "CASH".into(),
            market_value: cash,
            percent: cash / total * HUNDRED,
        });
    }

    slices
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "buy"),
            Self::Sell => write!(f, "sell"),
        }
    }
}

impl FromStr for OrderSide {
    type Err = AdvisorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "buy" => Ok(Self::Buy),
            "sell" => Ok(Self::Sell),
            other => Err(AdvisorError::InvalidOrder(format!(
                "side must be buy or sell, got '{other}'"
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    Market,
    Limit,
    Stop,
    StopLimit,
}

impl OrderType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Market => "market",
            Self::Limit => "limit",
            Self::Stop => "stop",
            Self::StopLimit => "stop_limit",
        }
    }

    const fn needs_limit_price(self) -> bool {
        matches!(self, Self::Limit | Self::StopLimit)
    }

    const fn needs_stop_price(self) -> bool {
        matches!(self, Self::Stop | Self::StopLimit)
    }
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderType {
    type Err = AdvisorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "market" => Ok(Self::Market),
            "limit" => Ok(Self::Limit),
            "stop" => Ok(Self::Stop),
            "stop_limit" | "stoplimit" => Ok(Self::StopLimit),
            other => Err(AdvisorError::InvalidOrder(format!(
                "unknown order type '{other}'"
            ))),
        }
    }
}

/// Order submission
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub qty: Decimal,
    pub order_type: OrderType,
    pub limit_price: Option<Decimal>,
    pub stop_price: Option<Decimal>,

    /// Alpaca time-in-force, `day` unless set otherwise
    pub time_in_force: String,
}

impl OrderRequest {
    pub fn market(symbol: impl Into<String>, side: OrderSide, qty: Decimal) -> Self {
        Self {
            symbol: symbol.into().to_uppercase(),
            side,
            qty,
            order_type: OrderType::Market,
            limit_price: None,
            stop_price: None,
            time_in_force: "day".into(),
        }
    }

    /// Check quantity and the price fields the order type demands
    pub fn validate(&self) -> Result<()> {
        if self.symbol.is_empty() {
            return Err(AdvisorError::InvalidOrder("symbol is required".into()));
        }
        if self.qty <= Decimal::ZERO {
            return Err(AdvisorError::InvalidOrder(
                "quantity must be positive".into(),
            ));
        }
        if self.order_type.needs_limit_price() && self.limit_price.is_none() {
            return Err(AdvisorError::MissingPriceField {
                order_type: self.order_type.to_string(),
                field: "limit_price",
            });
        }
        if self.order_type.needs_stop_price() && self.stop_price.is_none() {
            return Err(AdvisorError::MissingPriceField {
                order_type: self.order_type.to_string(),
                field: "stop_price",
            });
        }
        for price in [self.limit_price, self.stop_price].into_iter().flatten() {
            if price <= Decimal::ZERO {
                return Err(AdvisorError::InvalidOrder("prices must be positive".into()));
            }
        }
        Ok(())
    }
}

/// An order as reported by the brokerage
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub qty: Decimal,
    pub filled_qty: Decimal,

    /// Brokerage status string (`new`, `filled`, `canceled`, ...)
    pub status: String,

    pub limit_price: Option<Decimal>,
    pub stop_price: Option<Decimal>,
    pub filled_avg_price: Option<Decimal>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub filled_at: Option<DateTime<Utc>>,
}

impl Order {
    pub fn is_filled(&self) -> bool {
        self.status == "filled"
    }
}

/// Which orders to list
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatusFilter {
    #[default]
    Open,
    Closed,
    All,
}

impl OrderStatusFilter {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
            Self::All => "all",
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OrderQuery {
    pub status: OrderStatusFilter,
    pub symbols: Vec<String>,
    pub limit: Option<u32>,
}

/// Equity curve as parallel arrays, ascending by time.
///
/// Providers report gaps as nulls, kept here as `None`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PortfolioHistory {
    pub timestamps: Vec<DateTime<Utc>>,
    pub equity: Vec<Option<Decimal>>,
    pub profit_loss_pct: Vec<Option<Decimal>>,
    pub base_value: Option<Decimal>,
    pub timeframe: String,
}

impl PortfolioHistory {
    /// Build from observed equity values, filling P&L relative to the first
    pub fn from_equity(
        timestamps: Vec<DateTime<Utc>>,
        equity: Vec<Option<Decimal>>,
        timeframe: impl Into<String>,
    ) -> Self {
        let base_value = equity.iter().flatten().next().copied();
        let profit_loss_pct = equity
            .iter()
            .map(|e| match (e, base_value) {
                (Some(e), Some(base)) if !base.is_zero() => Some((*e - base) / base),
                _ => None,
            })
            .collect();
        Self {
            timestamps,
            equity,
            profit_loss_pct,
            base_value,
            timeframe: timeframe.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Parallel arrays have equal length
    pub fn is_consistent(&self) -> bool {
        self.equity.len() == self.timestamps.len()
            && (self.profit_loss_pct.is_empty()
                || self.profit_loss_pct.len() == self.timestamps.len())
    }

    /// Most recent non-null equity value
    pub fn latest_equity(&self) -> Option<Decimal> {
        self.equity.iter().rev().flatten().next().copied()
    }
}

/// Latest NBBO quote
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: String,
    pub ask_price: Decimal,
    pub ask_size: Decimal,
    pub bid_price: Decimal,
    pub bid_size: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// Latest trade print
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Trade {
    pub symbol: String,
    pub price: Decimal,
    pub size: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// OHLCV bar
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: u64,
    pub trade_count: Option<u64>,
    pub vwap: Option<Decimal>,
}

impl Bar {
    /// Flat bar at a single price, used by fixtures and mocks
    pub fn flat(timestamp: DateTime<Utc>, price: Decimal) -> Self {
        Self {
            timestamp,
            open: price,
            high: price,
            low: price,
            close: price,
            volume: 0,
            trade_count: None,
            vwap: None,
        }
    }
}

/// Bar width
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BarTimeframe {
    Minute,
    FiveMinutes,
    FifteenMinutes,
    Hour,
    #[default]
    Day,
}

impl BarTimeframe {
    /// Alpaca query parameter
    pub const fn as_param(self) -> &'static str {
        match self {
            Self::Minute => "1Min",
            Self::FiveMinutes => "5Min",
            Self::FifteenMinutes => "15Min",
            Self::Hour => "1Hour",
            Self::Day => "1Day",
        }
    }
}

impl FromStr for BarTimeframe {
    type Err = AdvisorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "1Min" | "1m" | "1min" => Ok(Self::Minute),
            "5Min" | "5m" | "5min" => Ok(Self::FiveMinutes),
            "15Min" | "15m" | "15min" => Ok(Self::FifteenMinutes),
            "1H" | "1Hour" | "1h" => Ok(Self::Hour),
            "1D" | "1Day" | "1d" | "day" => Ok(Self::Day),
            other => Err(AdvisorError::InvalidArgument(format!(
                "timeframe must be one of 1Min, 5Min, 15Min, 1H, 1D (got '{other}')"
            ))),
        }
    }
}

/// Parameters for a historical bars fetch
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BarsRequest {
    pub timeframe: BarTimeframe,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
}

impl BarsRequest {
    /// Daily bars from `start` until now
    pub fn daily_since(start: DateTime<Utc>) -> Self {
        Self {
            timeframe: BarTimeframe::Day,
            start: Some(start),
            end: None,
            limit: None,
        }
    }
}

/// Company / asset profile
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CompanyProfile {
    pub symbol: String,
    pub name: String,
    pub exchange: String,
    pub asset_class: String,
    pub status: String,
    pub tradable: bool,
    pub shortable: bool,
    pub fractionable: bool,
}

/// Market clock
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MarketClock {
    pub timestamp: DateTime<Utc>,
    pub is_open: bool,
    pub next_open: DateTime<Utc>,
    pub next_close: DateTime<Utc>,
}

/// One trading session from the calendar
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TradingDay {
    pub date: NaiveDate,

    /// Local open time, `HH:MM`
    pub open: String,

    /// Local close time, `HH:MM`
    pub close: String,
}

/// A durable fact the user asked the assistant to remember
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserFact {
    pub user_id: String,
    pub info_type: String,
    pub content: String,
    pub recorded_at: DateTime<Utc>,
}

/// Parse a decimal directive argument
pub fn parse_decimal(field: &str, value: &str) -> Result<Decimal> {
    value
        .trim()
        .trim_start_matches('$')
        .parse::<Decimal>()
        .map_err(|_| AdvisorError::InvalidArgument(format!("{field} must be a number, got '{value}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_position_pnl() {
        let pos = Position::new("aapl", dec!(10), dec!(150), dec!(165));
        assert_eq!(pos.symbol, "AAPL");
        assert_eq!(pos.market_value, dec!(1650));
        assert_eq!(pos.cost_basis, dec!(1500));
        assert_eq!(pos.unrealized_pl, dec!(150));
        assert_eq!(pos.unrealized_plpc, dec!(10));
    }

    #[test]
    fn test_account_day_change() {
        let account = Account::new(dec!(500), dec!(10500), dec!(1000), dec!(10500), dec!(10000));
        assert_eq!(account.day_change, dec!(500));
        assert_eq!(account.day_change_percent, dec!(5));

        let flat = Account::new(dec!(0), dec!(0), dec!(0), dec!(0), dec!(0));
        assert_eq!(flat.day_change_percent, Decimal::ZERO);
    }

    #[test]
    fn test_allocation_sums_to_hundred_without_cash() {
        let positions = [
            Position::new("A", dec!(6), dec!(100), dec!(100)),
            Position::new("B", dec!(4), dec!(100), dec!(100)),
        ];
        let slices = allocation(&positions, Decimal::ZERO);

        assert_eq!(slices.len(), 2);
        assert_eq!(slices[0].percent, dec!(60));
        assert_eq!(slices[1].percent, dec!(40));
        let total: Decimal = slices.iter().map(|s| s.percent).sum();
        assert!((total - dec!(100)).abs() <= dec!(0.01));
    }

    #[test]
    fn test_allocation_includes_cash() {
        let positions = [Position::new("A", dec!(3), dec!(100), dec!(100))];
        let slices = allocation(&positions, dec!(700));
        assert_eq!(slices[1].symbol, "CASH");
        assert_eq!(slices[1].percent, dec!(70));
        assert!(allocation(&[], Decimal::ZERO).is_empty());
    }

    #[test]
    fn test_limit_order_requires_limit_price() {
        let mut order = OrderRequest::market("AAPL", OrderSide::Buy, dec!(10));
        order.order_type = OrderType::Limit;
        assert!(matches!(
            order.validate(),
            Err(AdvisorError::MissingPriceField { field: "limit_price", .. })
        ));

        order.limit_price = Some(dec!(150));
        assert!(order.validate().is_ok());
    }

    #[test]
    fn test_stop_limit_requires_both_prices() {
        let mut order = OrderRequest::market("AAPL", OrderSide::Sell, dec!(1));
        order.order_type = OrderType::StopLimit;
        order.limit_price = Some(dec!(140));
        assert!(matches!(
            order.validate(),
            Err(AdvisorError::MissingPriceField { field: "stop_price", .. })
        ));
    }

    #[test]
    fn test_order_parsing() {
        assert_eq!("SELL".parse::<OrderSide>().unwrap(), OrderSide::Sell);
        assert_eq!("stop-limit".parse::<OrderType>().unwrap(), OrderType::StopLimit);
        assert!("hold".parse::<OrderSide>().is_err());
        assert_eq!("1D".parse::<BarTimeframe>().unwrap().as_param(), "1Day");
    }

    #[test]
    fn test_history_from_equity() {
        let now = Utc::now();
        let history = PortfolioHistory::from_equity(
            vec![now, now],
            vec![None, Some(dec!(110))],
            "1D",
        );
        assert!(history.is_consistent());
        assert_eq!(history.base_value, Some(dec!(110)));
        assert_eq!(history.latest_equity(), Some(dec!(110)));
    }
}
