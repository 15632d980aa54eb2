//! Alpaca REST Client
//!
//! Trading API (`/v2/account`, `/v2/positions`, `/v2/orders`, ...) and
//! market data API (`/v2/stocks/...`). Wire records are private to this
//! module and mapped into `crate::model` types.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{BrokerageClient, BrokerageConnector, MarketDataClient};
use crate::config::AlpacaConfig;
use crate::credentials::CredentialPair;
use crate::error::{AdvisorError, Result};
use crate::model::{
    Account, Bar, BarsRequest, CompanyProfile, MarketClock, Order, OrderQuery, OrderRequest,
    OrderSide, OrderType, PortfolioHistory, Position, Quote, Trade, TradingDay,
};

const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// Alpaca client bound to one credential pair
pub struct AlpacaClient {
    http: Client,
    trading_url: String,
    data_url: String,
    credentials: CredentialPair,
}

impl AlpacaClient {
    pub fn new(config: &AlpacaConfig, credentials: CredentialPair) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AdvisorError::Config(e.to_string()))?;
        Ok(Self {
            http,
            trading_url: config.trading_url.trim_end_matches('/').to_string(),
            data_url: config.data_url.trim_end_matches('/').to_string(),
            credentials,
        })
    }

    /// Client on the service-level credentials, if configured
    pub fn service(config: &AlpacaConfig) -> Result<Option<Self>> {
        config
            .service_credentials
            .clone()
            .map(|creds| Self::new(config, creds))
            .transpose()
    }

    fn trading(&self, path: &str) -> String {
        format!("{}{path}", self.trading_url)
    }

    fn data(&self, path: &str) -> String {
        format!("{}{path}", self.data_url)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("APCA-API-KEY-ID", &self.credentials.api_key)
            .header("APCA-API-SECRET-KEY", &self.credentials.secret_key)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = self.authorized(request).send().await.map_err(|e| {
            if e.is_timeout() || e.is_connect() {
                AdvisorError::ProviderUnavailable(e.to_string())
            } else {
                AdvisorError::Network(e)
            }
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiError>(&body)
            .map_or(body, |e| e.message);
        tracing::debug!(%status, %message, "Alpaca request failed");

        Err(match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => AdvisorError::Auth(message),
            StatusCode::NOT_FOUND => AdvisorError::NotFound(message),
            StatusCode::UNPROCESSABLE_ENTITY | StatusCode::BAD_REQUEST => {
                AdvisorError::InvalidOrder(message)
            }
            _ => AdvisorError::ProviderUnavailable(format!("{status}: {message}")),
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, url: String, query: &[(&str, String)]) -> Result<T> {
        let response = self.send(self.http.get(url).query(query)).await?;
        Ok(response.json().await?)
    }

    /// Like `get_json`, with 404 mapped to `None`
    async fn get_optional<T: DeserializeOwned>(&self, url: String) -> Result<Option<T>> {
        match self.get_json(url, &[]).await {
            Ok(value) => Ok(Some(value)),
            Err(AdvisorError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl BrokerageClient for AlpacaClient {
    fn name(&self) -> &str {
        "alpaca"
    }

    async fn get_account(&self) -> Result<Account> {
        let wire: WireAccount = self.get_json(self.trading("/v2/account"), &[]).await?;
        Ok(wire.into())
    }

    async fn get_positions(&self) -> Result<Vec<Position>> {
        let wire: Vec<WirePosition> = self.get_json(self.trading("/v2/positions"), &[]).await?;
        Ok(wire.into_iter().map(Into::into).collect())
    }

    async fn get_position(&self, symbol: &str) -> Result<Option<Position>> {
        let url = self.trading(&format!("/v2/positions/{}", symbol.to_uppercase()));
        let wire: Option<WirePosition> = self.get_optional(url).await?;
        Ok(wire.map(Into::into))
    }

    async fn list_orders(&self, query: &OrderQuery) -> Result<Vec<Order>> {
        let mut params = vec![
            ("status", query.status.as_str().to_string()),
            ("direction", "desc".to_string()),
        ];
        if !query.symbols.is_empty() {
            params.push(("symbols", query.symbols.join(",")));
        }
        if let Some(limit) = query.limit {
            params.push(("limit", limit.to_string()));
        }
        let wire: Vec<WireOrder> = self.get_json(self.trading("/v2/orders"), &params).await?;
        Ok(wire.into_iter().map(Into::into).collect())
    }

    async fn submit_order(&self, request: &OrderRequest) -> Result<Order> {
        let body = WireOrderRequest {
            symbol: &request.symbol,
            qty: request.qty,
            side: request.side,
            order_type: request.order_type,
            time_in_force: &request.time_in_force,
            limit_price: request.limit_price,
            stop_price: request.stop_price,
        };
        let response = self
            .send(self.http.post(self.trading("/v2/orders")).json(&body))
            .await?;
        let wire: WireOrder = response.json().await?;
        Ok(wire.into())
    }

    async fn cancel_order(&self, order_id: &str) -> Result<bool> {
        let url = self.trading(&format!("/v2/orders/{order_id}"));
        match self.send(self.http.delete(url)).await {
            Ok(_) => Ok(true),
            Err(AdvisorError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn close_position(&self, symbol: &str) -> Result<Option<Order>> {
        let url = self.trading(&format!("/v2/positions/{}", symbol.to_uppercase()));
        match self.send(self.http.delete(url)).await {
            Ok(response) => {
                let wire: WireOrder = response.json().await?;
                Ok(Some(wire.into()))
            }
            Err(AdvisorError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn cancel_all_orders(&self) -> Result<usize> {
        let response = self.send(self.http.delete(self.trading("/v2/orders"))).await?;
        let results: Vec<WireBulkStatus<serde_json::Value>> = response.json().await?;
        Ok(results.iter().filter(|r| r.succeeded()).count())
    }

    async fn close_all_positions(&self) -> Result<Vec<Order>> {
        let request = self
            .http
            .delete(self.trading("/v2/positions"))
            .query(&[("cancel_orders", "false")]);
        let results: Vec<WireBulkStatus<serde_json::Value>> =
            self.send(request).await?.json().await?;

        let mut orders = Vec::with_capacity(results.len());
        for result in results {
            if !result.succeeded() {
                tracing::warn!(status = result.status, body = ?result.body, "Position failed to close");
                continue;
            }
            if let Some(body) = result.body {
                orders.push(serde_json::from_value::<WireOrder>(body)?.into());
            }
        }
        Ok(orders)
    }

    async fn get_portfolio_history(
        &self,
        period: &str,
        timeframe: &str,
    ) -> Result<PortfolioHistory> {
        let params = [
            ("period", period.to_string()),
            ("timeframe", timeframe.to_string()),
            ("extended_hours", "true".to_string()),
        ];
        let wire: WireHistory = self
            .get_json(self.trading("/v2/account/portfolio/history"), &params)
            .await?;
        Ok(wire.into())
    }

    async fn get_clock(&self) -> Result<MarketClock> {
        let wire: WireClock = self.get_json(self.trading("/v2/clock"), &[]).await?;
        Ok(MarketClock {
            timestamp: wire.timestamp,
            is_open: wire.is_open,
            next_open: wire.next_open,
            next_close: wire.next_close,
        })
    }

    async fn get_calendar(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<TradingDay>> {
        let params = [("start", start.to_string()), ("end", end.to_string())];
        let wire: Vec<WireCalendarDay> =
            self.get_json(self.trading("/v2/calendar"), &params).await?;
        Ok(wire
            .into_iter()
            .map(|d| TradingDay {
                date: d.date,
                open: d.open,
                close: d.close,
            })
            .collect())
    }

    async fn get_asset(&self, symbol: &str) -> Result<Option<CompanyProfile>> {
        let url = self.trading(&format!("/v2/assets/{}", symbol.to_uppercase()));
        let wire: Option<WireAsset> = self.get_optional(url).await?;
        Ok(wire.map(Into::into))
    }
}

#[async_trait]
impl MarketDataClient for AlpacaClient {
    fn name(&self) -> &str {
        "alpaca"
    }

    async fn latest_quote(&self, symbol: &str) -> Result<Quote> {
        let symbol = symbol.to_uppercase();
        let url = self.data(&format!("/v2/stocks/{symbol}/quotes/latest"));
        let wire: WireLatestQuote = self.get_json(url, &[]).await?;
        Ok(Quote {
            symbol,
            ask_price: wire.quote.ap,
            ask_size: wire.quote.ask_size,
            bid_price: wire.quote.bp,
            bid_size: wire.quote.bs,
            timestamp: wire.quote.t,
        })
    }

    async fn latest_trade(&self, symbol: &str) -> Result<Trade> {
        let symbol = symbol.to_uppercase();
        let url = self.data(&format!("/v2/stocks/{symbol}/trades/latest"));
        let wire: WireLatestTrade = self.get_json(url, &[]).await?;
        Ok(Trade {
            symbol,
            price: wire.trade.p,
            size: wire.trade.s,
            timestamp: wire.trade.t,
        })
    }

    async fn bars(&self, symbol: &str, request: &BarsRequest) -> Result<Vec<Bar>> {
        let url = self.data(&format!("/v2/stocks/{}/bars", symbol.to_uppercase()));
        let wire: WireBars = self.get_json(url, &bars_params(request)).await?;
        Ok(wire.bars.unwrap_or_default().into_iter().map(Into::into).collect())
    }

    async fn multi_bars(
        &self,
        symbols: &[String],
        request: &BarsRequest,
    ) -> Result<HashMap<String, Vec<Bar>>> {
        let mut params = bars_params(request);
        params.push(("symbols", symbols.join(",").to_uppercase()));
        let wire: WireMultiBars = self.get_json(self.data("/v2/stocks/bars"), &params).await?;
        Ok(wire
            .bars
            .into_iter()
            .map(|(symbol, bars)| (symbol, bars.into_iter().map(Into::into).collect()))
            .collect())
    }

    async fn company_profile(&self, symbol: &str) -> Result<Option<CompanyProfile>> {
        self.get_asset(symbol).await
    }
}

fn bars_params(request: &BarsRequest) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("timeframe", request.timeframe.as_param().to_string()),
        ("adjustment", "all".to_string()),
    ];
    if let Some(start) = request.start {
        params.push(("start", start.to_rfc3339()));
    }
    if let Some(end) = request.end {
        params.push(("end", end.to_rfc3339()));
    }
    if let Some(limit) = request.limit {
        params.push(("limit", limit.to_string()));
    }
    params
}

/// Builds [`AlpacaClient`]s for user credentials
pub struct AlpacaConnector {
    config: AlpacaConfig,
}

impl AlpacaConnector {
    pub const fn new(config: AlpacaConfig) -> Self {
        Self { config }
    }
}

impl BrokerageConnector for AlpacaConnector {
    fn connect(&self, credentials: &CredentialPair) -> Result<Arc<dyn BrokerageClient>> {
        Ok(Arc::new(AlpacaClient::new(&self.config, credentials.clone())?))
    }
}

// ---------------------------------------------------------------------------
// Wire records
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct ApiError {
    message: String,
}

#[derive(Deserialize)]
struct WireAccount {
    #[serde(default)]
    status: String,
    cash: Decimal,
    portfolio_value: Decimal,
    buying_power: Decimal,
    equity: Decimal,
    last_equity: Decimal,
    #[serde(default)]
    long_market_value: Decimal,
    #[serde(default)]
    short_market_value: Decimal,
}

impl From<WireAccount> for Account {
    fn from(w: WireAccount) -> Self {
        let mut account = Self::new(w.cash, w.portfolio_value, w.buying_power, w.equity, w.last_equity);
        account.status = w.status;
        account.long_market_value = w.long_market_value;
        account.short_market_value = w.short_market_value;
        account
    }
}

#[derive(Deserialize)]
struct WirePosition {
    symbol: String,
    qty: Decimal,
    #[serde(default)]
    market_value: Option<Decimal>,
    cost_basis: Decimal,
    #[serde(default)]
    unrealized_pl: Option<Decimal>,
    #[serde(default)]
    unrealized_plpc: Option<Decimal>,
    #[serde(default)]
    current_price: Option<Decimal>,
    avg_entry_price: Decimal,
    #[serde(default)]
    change_today: Option<Decimal>,
}

impl From<WirePosition> for Position {
    fn from(w: WirePosition) -> Self {
        Self {
            symbol: w.symbol,
            qty: w.qty,
            market_value: w.market_value.unwrap_or_default(),
            cost_basis: w.cost_basis,
            unrealized_pl: w.unrealized_pl.unwrap_or_default(),
            unrealized_plpc: w.unrealized_plpc.unwrap_or_default() * HUNDRED,
            current_price: w.current_price.unwrap_or_default(),
            avg_entry_price: w.avg_entry_price,
            change_today: w.change_today.unwrap_or_default() * HUNDRED,
        }
    }
}

#[derive(Deserialize)]
struct WireOrder {
    id: String,
    symbol: String,
    side: OrderSide,
    #[serde(rename = "type")]
    order_type: String,
    #[serde(default)]
    qty: Option<Decimal>,
    #[serde(default)]
    filled_qty: Option<Decimal>,
    status: String,
    #[serde(default)]
    limit_price: Option<Decimal>,
    #[serde(default)]
    stop_price: Option<Decimal>,
    #[serde(default)]
    filled_avg_price: Option<Decimal>,
    #[serde(default)]
    submitted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    filled_at: Option<DateTime<Utc>>,
}

impl From<WireOrder> for Order {
    fn from(w: WireOrder) -> Self {
        let order_type = w.order_type.parse().unwrap_or_else(|_| {
            tracing::debug!(order_type = %w.order_type, "Unmapped order type");
            OrderType::Market
        });
        Self {
            id: w.id,
            symbol: w.symbol,
            side: w.side,
            order_type,
            qty: w.qty.unwrap_or_default(),
            filled_qty: w.filled_qty.unwrap_or_default(),
            status: w.status,
            limit_price: w.limit_price,
            stop_price: w.stop_price,
            filled_avg_price: w.filled_avg_price,
            submitted_at: w.submitted_at,
            filled_at: w.filled_at,
        }
    }
}

/// One entry of a multi-status bulk response
#[derive(Deserialize)]
struct WireBulkStatus<T> {
    status: u16,
    #[serde(default)]
    body: Option<T>,
}

impl<T> WireBulkStatus<T> {
    const fn succeeded(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

#[derive(Serialize)]
struct WireOrderRequest<'a> {
    symbol: &'a str,
    qty: Decimal,
    side: OrderSide,
    #[serde(rename = "type")]
    order_type: OrderType,
    time_in_force: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    limit_price: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop_price: Option<Decimal>,
}

#[derive(Deserialize)]
struct WireHistory {
    #[serde(default)]
    timestamp: Vec<i64>,
    #[serde(default)]
    equity: Vec<Option<Decimal>>,
    #[serde(default)]
    profit_loss_pct: Vec<Option<Decimal>>,
    #[serde(default)]
    base_value: Option<Decimal>,
    #[serde(default)]
    timeframe: String,
}

impl From<WireHistory> for PortfolioHistory {
    fn from(w: WireHistory) -> Self {
        Self {
            timestamps: w
                .timestamp
                .into_iter()
                .filter_map(|ts| DateTime::from_timestamp(ts, 0))
                .collect(),
            equity: w.equity,
            profit_loss_pct: w.profit_loss_pct,
            base_value: w.base_value,
            timeframe: w.timeframe,
        }
    }
}

#[derive(Deserialize)]
struct WireClock {
    timestamp: DateTime<Utc>,
    is_open: bool,
    next_open: DateTime<Utc>,
    next_close: DateTime<Utc>,
}

#[derive(Deserialize)]
struct WireCalendarDay {
    date: NaiveDate,
    open: String,
    close: String,
}

#[derive(Deserialize)]
struct WireAsset {
    symbol: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    exchange: String,
    #[serde(rename = "class", default)]
    asset_class: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    tradable: bool,
    #[serde(default)]
    shortable: bool,
    #[serde(default)]
    fractionable: bool,
}

impl From<WireAsset> for CompanyProfile {
    fn from(w: WireAsset) -> Self {
        Self {
            symbol: w.symbol,
            name: w.name,
            exchange: w.exchange,
            asset_class: w.asset_class,
            status: w.status,
            tradable: w.tradable,
            shortable: w.shortable,
            fractionable: w.fractionable,
        }
    }
}

#[derive(Deserialize)]
struct WireLatestQuote {
    quote: WireQuote,
}

#[derive(Deserialize)]
struct WireQuote {
    ap: Decimal,
    #[serde(rename = "as")]
    ask_size: Decimal,
    bp: Decimal,
    bs: Decimal,
    t: DateTime<Utc>,
}

#[derive(Deserialize)]
struct WireLatestTrade {
    trade: WireTrade,
}

#[derive(Deserialize)]
struct WireTrade {
    p: Decimal,
    s: Decimal,
    t: DateTime<Utc>,
}

#[derive(Deserialize)]
struct WireBars {
    #[serde(default)]
    bars: Option<Vec<WireBar>>,
}

#[derive(Deserialize)]
struct WireMultiBars {
    #[serde(default)]
    bars: HashMap<String, Vec<WireBar>>,
}

#[derive(Deserialize)]
struct WireBar {
    t: DateTime<Utc>,
    o: Decimal,
    h: Decimal,
    l: Decimal,
    c: Decimal,
    v: u64,
    #[serde(default)]
    n: Option<u64>,
    #[serde(default)]
    vw: Option<Decimal>,
}

impl From<WireBar> for Bar {
    fn from(w: WireBar) -> Self {
        Self {
            timestamp: w.t,
            open: w.o,
            high: w.h,
            low: w.l,
            close: w.c,
            volume: w.v,
            trade_count: w.n,
            vwap: w.vw,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_account_mapping() {
        let json = r#"{
            "status": "ACTIVE",
            "cash": "2500.00",
            "portfolio_value": "10500.00",
            "buying_power": "5000.00",
            "equity": "10500.00",
            "last_equity": "10000.00",
            "long_market_value": "8000.00",
            "short_market_value": "0"
        }"#;
        let account: Account = serde_json::from_str::<WireAccount>(json).unwrap().into();
        assert_eq!(account.cash, dec!(2500));
        assert_eq!(account.day_change, dec!(500));
        assert_eq!(account.day_change_percent, dec!(5));
        assert_eq!(account.long_market_value, dec!(8000));
    }

    #[test]
    fn test_position_percentages() {
        let json = r#"{
            "symbol": "AAPL", "qty": "10", "market_value": "1650",
            "cost_basis": "1500", "unrealized_pl": "150", "unrealized_plpc": "0.1",
            "current_price": "165", "avg_entry_price": "150", "change_today": "0.012"
        }"#;
        let position: Position = serde_json::from_str::<WirePosition>(json).unwrap().into();
        assert_eq!(position.unrealized_plpc, dec!(10));
        assert_eq!(position.change_today, dec!(1.2));
    }

    #[test]
    fn test_history_with_nulls() {
        let json = r#"{
            "timestamp": [1700000000, 1700086400, 1700172800],
            "equity": [null, 100.5, 101.0],
            "profit_loss_pct": [null, 0, 0.005],
            "base_value": 100.5,
            "timeframe": "1D"
        }"#;
        let history: PortfolioHistory = serde_json::from_str::<WireHistory>(json).unwrap().into();
        assert_eq!(history.len(), 3);
        assert!(history.is_consistent());
        assert_eq!(history.equity[0], None);
        assert_eq!(history.latest_equity(), Some(dec!(101.0)));
    }

    #[test]
    fn test_latest_quote_mapping() {
        let json = r#"{"symbol":"AAPL","quote":{"ap":150.1,"as":3,"bp":149.9,"bs":2,"t":"2024-01-02T15:30:00Z"}}"#;
        let wire: WireLatestQuote = serde_json::from_str(json).unwrap();
        assert_eq!(wire.quote.ask_size, dec!(3));
    }

    #[test]
    fn test_order_request_body() {
        let body = WireOrderRequest {
            symbol: "AAPL",
            qty: dec!(10),
            side: OrderSide::Buy,
            order_type: OrderType::StopLimit,
            time_in_force: "day",
            limit_price: Some(dec!(150)),
            stop_price: None,
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["type"], "stop_limit");
        assert_eq!(value["side"], "buy");
        assert!(value.get("stop_price").is_none());
    }

    #[test]
    fn test_bulk_close_keeps_successful_orders() {
        let json = r#"[
            {"symbol": "AAPL", "status": 200, "body": {"id": "o1", "symbol": "AAPL", "side": "sell",
                "type": "market", "qty": "10", "status": "accepted"}},
            {"symbol": "MSFT", "status": 403, "body": {"code": 40310000, "message": "insufficient qty"}}
        ]"#;
        let results: Vec<WireBulkStatus<serde_json::Value>> = serde_json::from_str(json).unwrap();
        assert_eq!(results.iter().filter(|r| r.succeeded()).count(), 1);

        let body = results.into_iter().find(WireBulkStatus::succeeded).unwrap().body.unwrap();
        let order: Order = serde_json::from_value::<WireOrder>(body).unwrap().into();
        assert_eq!(order.symbol, "AAPL");
        assert_eq!(order.side, OrderSide::Sell);
    }

    #[test]
    fn test_unknown_order_type_falls_back() {
        let json = r#"{"id":"o1","symbol":"AAPL","side":"sell","type":"trailing_stop","status":"new"}"#;
        let order: Order = serde_json::from_str::<WireOrder>(json).unwrap().into();
        assert_eq!(order.order_type, OrderType::Market);
        assert_eq!(order.qty, Decimal::ZERO);
    }
}
