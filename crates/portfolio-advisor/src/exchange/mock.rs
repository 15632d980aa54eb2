//! Mock Providers
//!
//! In-memory brokerage and market data for tests and demos. Every call is
//! counted so tests can assert that nothing reached a provider.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc, Weekday};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::{BrokerageClient, BrokerageConnector, MarketDataClient};
use crate::credentials::CredentialPair;
use crate::error::{AdvisorError, Result};
use crate::model::{
    Account, Bar, BarsRequest, CompanyProfile, MarketClock, Order, OrderQuery, OrderRequest,
    OrderSide, OrderStatusFilter, PortfolioHistory, Position, Quote, Trade, TradingDay,
};

const OPEN_STATUSES: [&str; 4] = ["new", "accepted", "partially_filled", "pending_new"];

/// Daily bars ending on `last_day`, one per close, oldest first
pub fn daily_bars(last_day: DateTime<Utc>, closes: &[Decimal]) -> Vec<Bar> {
    let len = closes.len() as i64;
    closes
        .iter()
        .enumerate()
        .map(|(i, close)| Bar::flat(last_day - Duration::days(len - 1 - i as i64), *close))
        .collect()
}

#[derive(Default)]
struct BrokerageState {
    account: Option<Account>,
    positions: Vec<Position>,
    orders: Vec<Order>,
    histories: HashMap<String, PortfolioHistory>,
    assets: HashMap<String, CompanyProfile>,
    clock: Option<MarketClock>,
    submitted: Vec<OrderRequest>,
}

/// In-memory brokerage account
pub struct MockBrokerage {
    state: Mutex<BrokerageState>,
    unauthorized: bool,
    unavailable: bool,
    calls: AtomicUsize,
}

impl Default for MockBrokerage {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBrokerage {
    /// Account with $10,000 cash and nothing else
    pub fn new() -> Self {
        let state = BrokerageState {
            account: Some(Account::new(
                dec!(10000),
                dec!(10000),
                dec!(20000),
                dec!(10000),
                dec!(10000),
            )),
            ..BrokerageState::default()
        };
        Self {
            state: Mutex::new(state),
            unauthorized: false,
            unavailable: false,
            calls: AtomicUsize::new(0),
        }
    }

    /// Every call fails with an authentication error
    pub fn unauthorized() -> Self {
        Self {
            unauthorized: true,
            ..Self::new()
        }
    }

    /// Every call fails as if the provider were down
    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::new()
        }
    }

    pub fn with_account(self, account: Account) -> Self {
        self.lock().account = Some(account);
        self
    }

    pub fn with_positions(self, positions: Vec<Position>) -> Self {
        self.lock().positions = positions;
        self
    }

    pub fn with_orders(self, orders: Vec<Order>) -> Self {
        self.lock().orders = orders;
        self
    }

    /// Equity curve returned for one history period (`1M`, `3M`, `6M`, `1A`)
    pub fn with_history(self, period: &str, history: PortfolioHistory) -> Self {
        self.lock().histories.insert(period.to_string(), history);
        self
    }

    pub fn with_asset(self, profile: CompanyProfile) -> Self {
        self.lock()
            .assets
            .insert(profile.symbol.to_uppercase(), profile);
        self
    }

    pub fn with_clock(self, clock: MarketClock) -> Self {
        self.lock().clock = Some(clock);
        self
    }

    /// Number of provider calls made so far
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Order requests received, oldest first
    pub fn submitted(&self) -> Vec<OrderRequest> {
        self.lock().submitted.clone()
    }

    fn lock(&self) -> MutexGuard<'_, BrokerageState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn enter(&self) -> Result<MutexGuard<'_, BrokerageState>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.unauthorized {
            return Err(AdvisorError::Auth("invalid API key or secret".into()));
        }
        if self.unavailable {
            return Err(AdvisorError::ProviderUnavailable("mock brokerage is down".into()));
        }
        Ok(self.lock())
    }
}

fn order_from_request(request: &OrderRequest, id: String, status: &str) -> Order {
    Order {
        id,
        symbol: request.symbol.clone(),
        side: request.side,
        order_type: request.order_type,
        qty: request.qty,
        filled_qty: Decimal::ZERO,
        status: status.to_string(),
        limit_price: request.limit_price,
        stop_price: request.stop_price,
        filled_avg_price: None,
        submitted_at: Some(Utc::now()),
        filled_at: None,
    }
}

#[async_trait]
impl BrokerageClient for MockBrokerage {
    fn name(&self) -> &str {
        "mock"
    }

    async fn get_account(&self) -> Result<Account> {
        self.enter()?
            .account
            .clone()
            .ok_or_else(|| AdvisorError::NotFound("account".into()))
    }

    async fn get_positions(&self) -> Result<Vec<Position>> {
        Ok(self.enter()?.positions.clone())
    }

    async fn get_position(&self, symbol: &str) -> Result<Option<Position>> {
        let state = self.enter()?;
        Ok(state
            .positions
            .iter()
            .find(|p| p.symbol.eq_ignore_ascii_case(symbol))
            .cloned())
    }

    async fn list_orders(&self, query: &OrderQuery) -> Result<Vec<Order>> {
        let state = self.enter()?;
        let matches = |order: &&Order| {
            let open = OPEN_STATUSES.contains(&order.status.as_str());
            let status_ok = match query.status {
                OrderStatusFilter::Open => open,
                OrderStatusFilter::Closed => !open,
                OrderStatusFilter::All => true,
            };
            let symbol_ok = query.symbols.is_empty()
                || query
                    .symbols
                    .iter()
                    .any(|s| s.eq_ignore_ascii_case(&order.symbol));
            status_ok && symbol_ok
        };

        let limit = query.limit.map_or(usize::MAX, |l| l as usize);
        Ok(state
            .orders
            .iter()
            .rev()
            .filter(matches)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn submit_order(&self, request: &OrderRequest) -> Result<Order> {
        let mut state = self.enter()?;
        let order = order_from_request(request, uuid::Uuid::new_v4().to_string(), "accepted");
        state.submitted.push(request.clone());
        state.orders.push(order.clone());
        Ok(order)
    }

    async fn cancel_order(&self, order_id: &str) -> Result<bool> {
        let mut state = self.enter()?;
        match state
            .orders
            .iter_mut()
            .find(|o| o.id == order_id && OPEN_STATUSES.contains(&o.status.as_str()))
        {
            Some(order) => {
                order.status = "canceled".into();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn close_position(&self, symbol: &str) -> Result<Option<Order>> {
        let mut state = self.enter()?;
        let Some(index) = state
            .positions
            .iter()
            .position(|p| p.symbol.eq_ignore_ascii_case(symbol))
        else {
            return Ok(None);
        };

        let position = state.positions.remove(index);
        let side = if position.qty < Decimal::ZERO {
            OrderSide::Buy
        } else {
            OrderSide::Sell
        };
        let request = OrderRequest::market(position.symbol, side, position.qty.abs());
        let order = order_from_request(&request, uuid::Uuid::new_v4().to_string(), "accepted");
        state.orders.push(order.clone());
        Ok(Some(order))
    }

    async fn cancel_all_orders(&self) -> Result<usize> {
        let mut state = self.enter()?;
        let mut canceled = 0;
        for order in state
            .orders
            .iter_mut()
            .filter(|o| OPEN_STATUSES.contains(&o.status.as_str()))
        {
            order.status = "canceled".into();
            canceled += 1;
        }
        Ok(canceled)
    }

    async fn close_all_positions(&self) -> Result<Vec<Order>> {
        let mut state = self.enter()?;
        let positions = std::mem::take(&mut state.positions);
        let orders: Vec<Order> = positions
            .into_iter()
            .map(|position| {
                let side = if position.qty < Decimal::ZERO {
                    OrderSide::Buy
                } else {
                    OrderSide::Sell
                };
                let request = OrderRequest::market(position.symbol, side, position.qty.abs());
                order_from_request(&request, uuid::Uuid::new_v4().to_string(), "accepted")
            })
            .collect();
        state.orders.extend(orders.iter().cloned());
        Ok(orders)
    }

    async fn get_portfolio_history(
        &self,
        period: &str,
        _timeframe: &str,
    ) -> Result<PortfolioHistory> {
        Ok(self
            .enter()?
            .histories
            .get(period)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_clock(&self) -> Result<MarketClock> {
        let state = self.enter()?;
        Ok(state.clock.clone().unwrap_or_else(|| {
            let now = Utc::now();
            MarketClock {
                timestamp: now,
                is_open: false,
                next_open: now + Duration::hours(12),
                next_close: now + Duration::hours(18),
            }
        }))
    }

    async fn get_calendar(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<TradingDay>> {
        let _state = self.enter()?;
        Ok(start
            .iter_days()
            .take_while(|d| *d <= end)
            .filter(|d| !matches!(d.weekday(), Weekday::Sat | Weekday::Sun))
            .map(|date| TradingDay {
                date,
                open: "09:30".into(),
                close: "16:00".into(),
            })
            .collect())
    }

    async fn get_asset(&self, symbol: &str) -> Result<Option<CompanyProfile>> {
        Ok(self.enter()?.assets.get(&symbol.to_uppercase()).cloned())
    }
}

/// Hands out the shared mock for accepted pairs and a rejecting one otherwise
pub struct MockConnector {
    client: Arc<MockBrokerage>,
    accepted: Vec<CredentialPair>,
    connects: AtomicUsize,
}

impl MockConnector {
    pub fn new(client: Arc<MockBrokerage>) -> Self {
        Self {
            client,
            accepted: Vec::new(),
            connects: AtomicUsize::new(0),
        }
    }

    pub fn accepting(mut self, pair: CredentialPair) -> Self {
        self.accepted.push(pair);
        self
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

impl BrokerageConnector for MockConnector {
    fn connect(&self, credentials: &CredentialPair) -> Result<Arc<dyn BrokerageClient>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.accepted.contains(credentials) {
            Ok(self.client.clone())
        } else {
            Ok(Arc::new(MockBrokerage::unauthorized()))
        }
    }
}

/// In-memory market data
#[derive(Default)]
pub struct MockMarketData {
    prices: HashMap<String, Decimal>,
    bars: HashMap<String, Vec<Bar>>,
    profiles: HashMap<String, CompanyProfile>,
    failing: Vec<String>,
    max_lookback: HashMap<String, Duration>,
    calls: AtomicUsize,
}

impl MockMarketData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest trade and quote for a symbol
    pub fn with_price(mut self, symbol: &str, price: Decimal) -> Self {
        self.prices.insert(symbol.to_uppercase(), price);
        self
    }

    pub fn with_bars(mut self, symbol: &str, bars: Vec<Bar>) -> Self {
        self.bars.insert(symbol.to_uppercase(), bars);
        self
    }

    pub fn with_profile(mut self, profile: CompanyProfile) -> Self {
        self.profiles.insert(profile.symbol.to_uppercase(), profile);
        self
    }

    /// Every request for `symbol` fails
    pub fn failing(mut self, symbol: &str) -> Self {
        self.failing.push(symbol.to_uppercase());
        self
    }

    /// Bar requests for `symbol` starting further back than `lookback` fail
    pub fn fail_bars_older_than(mut self, symbol: &str, lookback: Duration) -> Self {
        self.max_lookback.insert(symbol.to_uppercase(), lookback);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn enter(&self, symbol: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let symbol = symbol.to_uppercase();
        if self.failing.contains(&symbol) {
            return Err(AdvisorError::ProviderUnavailable(format!(
                "no data service for {symbol}"
            )));
        }
        Ok(symbol)
    }

    fn price(&self, symbol: &str) -> Result<Decimal> {
        self.prices
            .get(symbol)
            .copied()
            .or_else(|| self.bars.get(symbol).and_then(|b| b.last()).map(|b| b.close))
            .ok_or_else(|| AdvisorError::NotFound(format!("no market data for {symbol}")))
    }
}

#[async_trait]
impl MarketDataClient for MockMarketData {
    fn name(&self) -> &str {
        "mock"
    }

    async fn latest_quote(&self, symbol: &str) -> Result<Quote> {
        let symbol = self.enter(symbol)?;
        let price = self.price(&symbol)?;
        Ok(Quote {
            symbol,
            ask_price: price + dec!(0.01),
            ask_size: dec!(100),
            bid_price: price - dec!(0.01),
            bid_size: dec!(100),
            timestamp: Utc::now(),
        })
    }

    async fn latest_trade(&self, symbol: &str) -> Result<Trade> {
        let symbol = self.enter(symbol)?;
        let price = self.price(&symbol)?;
        Ok(Trade {
            symbol,
            price,
            size: dec!(100),
            timestamp: Utc::now(),
        })
    }

    async fn bars(&self, symbol: &str, request: &BarsRequest) -> Result<Vec<Bar>> {
        let symbol = self.enter(symbol)?;
        if let (Some(lookback), Some(start)) = (self.max_lookback.get(&symbol), request.start) {
            if start < Utc::now() - *lookback {
                return Err(AdvisorError::ProviderUnavailable(format!(
                    "{symbol} history unavailable that far back"
                )));
            }
        }

        let limit = request.limit.map_or(usize::MAX, |l| l as usize);
        Ok(self
            .bars
            .get(&symbol)
            .map(|bars| {
                bars.iter()
                    .filter(|b| request.start.is_none_or(|s| b.timestamp >= s))
                    .filter(|b| request.end.is_none_or(|e| b.timestamp <= e))
                    .take(limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn company_profile(&self, symbol: &str) -> Result<Option<CompanyProfile>> {
        let symbol = self.enter(symbol)?;
        Ok(self.profiles.get(&symbol).cloned())
    }
}
