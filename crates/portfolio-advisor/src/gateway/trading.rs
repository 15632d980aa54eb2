//! Trading Gateway
//!
//! Order placement and order/position state. Paper trading only.

use std::sync::Arc;

use chrono::{Duration, Utc};

use crate::error::Result;
use crate::exchange::BrokerageClient;
use crate::model::{MarketClock, Order, OrderQuery, OrderRequest, OrderStatusFilter, TradingDay};

const RECENT_TRADES_LIMIT: u32 = 50;

#[derive(Clone)]
pub struct TradingGateway {
    client: Arc<dyn BrokerageClient>,
}

impl TradingGateway {
    pub fn new(client: Arc<dyn BrokerageClient>) -> Self {
        Self { client }
    }

    /// Validate price fields for the order type, then submit
    pub async fn place_order(&self, request: &OrderRequest) -> Result<Order> {
        request.validate()?;
        let order = self.client.submit_order(request).await?;
        tracing::info!(
            order_id = %order.id,
            symbol = %order.symbol,
            side = %order.side,
            order_type = %order.order_type,
            "Order submitted"
        );
        Ok(order)
    }

    /// `false` when the order does not exist or is no longer open
    pub async fn cancel_order(&self, order_id: &str) -> Result<bool> {
        self.client.cancel_order(order_id).await
    }

    /// `None` when nothing is held in `symbol`
    pub async fn close_position(&self, symbol: &str) -> Result<Option<Order>> {
        self.client.close_position(symbol).await
    }

    /// Cancel every open order
    pub async fn cancel_all_orders(&self) -> Result<usize> {
        let canceled = self.client.cancel_all_orders().await?;
        tracing::info!(canceled, "Open orders canceled");
        Ok(canceled)
    }

    /// Liquidate the whole portfolio
    pub async fn close_all_positions(&self) -> Result<Vec<Order>> {
        let orders = self.client.close_all_positions().await?;
        tracing::info!(closed = orders.len(), "Positions closed");
        Ok(orders)
    }

    pub async fn open_orders(&self, symbol: Option<&str>) -> Result<Vec<Order>> {
        let query = OrderQuery {
            status: OrderStatusFilter::Open,
            symbols: symbol.map(|s| vec![s.to_uppercase()]).unwrap_or_default(),
            limit: None,
        };
        self.client.list_orders(&query).await
    }

    /// Filled orders, newest first
    pub async fn recent_trades(&self) -> Result<Vec<Order>> {
        let query = OrderQuery {
            status: OrderStatusFilter::Closed,
            symbols: Vec::new(),
            limit: Some(RECENT_TRADES_LIMIT),
        };
        let orders = self.client.list_orders(&query).await?;
        Ok(orders.into_iter().filter(Order::is_filled).collect())
    }

    pub async fn clock(&self) -> Result<MarketClock> {
        self.client.get_clock().await
    }

    /// Sessions from today through `days` days ahead
    pub async fn calendar(&self, days: u32) -> Result<Vec<TradingDay>> {
        let start = Utc::now().date_naive();
        let end = start + Duration::days(i64::from(days));
        self.client.get_calendar(start, end).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AdvisorError;
    use crate::exchange::MockBrokerage;
    use crate::model::{OrderSide, OrderType, Position};
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_limit_without_price_never_submits() {
        let broker = Arc::new(MockBrokerage::new());
        let gateway = TradingGateway::new(broker.clone());

        let mut request = OrderRequest::market("AAPL", OrderSide::Buy, dec!(10));
        request.order_type = OrderType::Limit;

        let result = gateway.place_order(&request).await;
        assert!(matches!(result, Err(AdvisorError::MissingPriceField { .. })));
        assert_eq!(broker.call_count(), 0);
    }

    #[tokio::test]
    async fn test_recent_trades_only_filled() {
        let mut filled = Order {
            id: "o1".into(),
            symbol: "AAPL".into(),
            side: OrderSide::Buy,
            order_type: OrderType::Market,
            qty: dec!(1),
            filled_qty: dec!(1),
            status: "filled".into(),
            limit_price: None,
            stop_price: None,
            filled_avg_price: Some(dec!(150)),
            submitted_at: None,
            filled_at: Some(Utc::now()),
        };
        let mut canceled = filled.clone();
        canceled.id = "o2".into();
        canceled.status = "canceled".into();
        filled.symbol = "MSFT".into();

        let gateway =
            TradingGateway::new(Arc::new(MockBrokerage::new().with_orders(vec![filled, canceled])));
        let trades = gateway.recent_trades().await.unwrap();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].symbol, "MSFT");
    }

    #[tokio::test]
    async fn test_cancel_all_and_close_all() {
        let open = Order {
            id: "o1".into(),
            symbol: "AAPL".into(),
            side: OrderSide::Buy,
            order_type: OrderType::Limit,
            qty: dec!(5),
            filled_qty: dec!(0),
            status: "new".into(),
            limit_price: Some(dec!(100)),
            stop_price: None,
            filled_avg_price: None,
            submitted_at: None,
            filled_at: None,
        };
        let mut filled = open.clone();
        filled.id = "o2".into();
        filled.status = "filled".into();
        let broker = Arc::new(
            MockBrokerage::new()
                .with_orders(vec![open, filled])
                .with_positions(vec![
                    Position::new("AAPL", dec!(10), dec!(150), dec!(200)),
                    Position::new("TSLA", dec!(-2), dec!(250), dec!(240)),
                ]),
        );
        let gateway = TradingGateway::new(broker.clone());

        assert_eq!(gateway.cancel_all_orders().await.unwrap(), 1);
        assert_eq!(gateway.cancel_all_orders().await.unwrap(), 0);

        let closing = gateway.close_all_positions().await.unwrap();
        assert_eq!(closing.len(), 2);
        assert_eq!(closing[0].side, OrderSide::Sell);
        assert_eq!(closing[1].side, OrderSide::Buy);
        assert_eq!(closing[1].qty, dec!(2));
        assert!(broker.get_positions().await.unwrap().is_empty());
        assert!(gateway.close_all_positions().await.unwrap().is_empty());

        assert!(gateway.open_orders(None).await.unwrap().iter().all(|o| o.id != "o1"));
    }

    #[tokio::test]
    async fn test_calendar_window() {
        let gateway = TradingGateway::new(Arc::new(MockBrokerage::new()));
        let days = gateway.calendar(7).await.unwrap();
        assert!((4..=6).contains(&days.len()));
    }
}
