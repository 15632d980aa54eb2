//! Account / Portfolio Gateway

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{AdvisorError, Result};
use crate::exchange::BrokerageClient;
use crate::model::{allocation, Account, AllocationSlice, PortfolioHistory, Position};

/// Account snapshot with positions and allocation
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PortfolioSummary {
    pub account: Account,
    pub positions: Vec<Position>,
    pub allocation: Vec<AllocationSlice>,
}

/// Headline numbers for an equity curve
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistorySummary {
    pub period: String,
    pub points: usize,
    pub start_equity: Option<Decimal>,
    pub end_equity: Option<Decimal>,

    /// `end / start - 1`, in percent
    pub total_return_pct: Option<Decimal>,

    /// Last reported profit/loss, in percent
    pub latest_pl_pct: Option<Decimal>,
}

impl HistorySummary {
    pub fn from_history(period: &str, history: &PortfolioHistory) -> Self {
        let start_equity = history
            .equity
            .iter()
            .flatten()
            .copied()
            .find(|e| *e > Decimal::ZERO);
        let end_equity = history.latest_equity();
        let total_return_pct = match (start_equity, end_equity) {
            (Some(start), Some(end)) => Some((end / start - Decimal::ONE) * Decimal::ONE_HUNDRED),
            _ => None,
        };
        let latest_pl_pct = history
            .profit_loss_pct
            .iter()
            .rev()
            .flatten()
            .next()
            .map(|p| *p * Decimal::ONE_HUNDRED);

        Self {
            period: period.to_string(),
            points: history.len(),
            start_equity,
            end_equity,
            total_return_pct,
            latest_pl_pct,
        }
    }
}

/// Read-only view of one brokerage account
#[derive(Clone)]
pub struct AccountGateway {
    client: Arc<dyn BrokerageClient>,
}

impl AccountGateway {
    pub fn new(client: Arc<dyn BrokerageClient>) -> Self {
        Self { client }
    }

    pub async fn account(&self) -> Result<Account> {
        self.client.get_account().await
    }

    /// Account, positions and allocation in one record
    pub async fn summary(&self) -> Result<PortfolioSummary> {
        let (account, positions) =
            futures::try_join!(self.client.get_account(), self.client.get_positions())?;
        let allocation = allocation(&positions, account.cash);
        Ok(PortfolioSummary {
            account,
            positions,
            allocation,
        })
    }

    pub async fn positions(&self) -> Result<Vec<Position>> {
        self.client.get_positions().await
    }

    /// `None` when nothing is held in `symbol`
    pub async fn position(&self, symbol: &str) -> Result<Option<Position>> {
        self.client.get_position(symbol).await
    }

    /// Daily equity curve for a provider period (`1M`, `3M`, `6M`, `1A`)
    pub async fn history(&self, period: &str) -> Result<PortfolioHistory> {
        let history = self.client.get_portfolio_history(period, "1D").await?;
        if !history.is_consistent() {
            tracing::warn!(
                period,
                timestamps = history.timestamps.len(),
                equity = history.equity.len(),
                "Portfolio history arrays differ in length"
            );
            return Err(AdvisorError::ProviderUnavailable(
                "portfolio history arrived malformed".into(),
            ));
        }
        Ok(history)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::MockBrokerage;
    use chrono::{Duration, Utc};
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_summary_allocation() {
        let broker = MockBrokerage::new()
            .with_account(Account::new(dec!(0), dec!(1000), dec!(0), dec!(1000), dec!(1000)))
            .with_positions(vec![
                Position::new("AAPL", dec!(6), dec!(100), dec!(100)),
                Position::new("MSFT", dec!(4), dec!(100), dec!(100)),
            ]);
        let gateway = AccountGateway::new(Arc::new(broker));

        let summary = gateway.summary().await.unwrap();
        let total: Decimal = summary.allocation.iter().map(|s| s.percent).sum();
        assert_eq!(summary.allocation.len(), 2);
        assert_eq!(total, dec!(100));
    }

    #[tokio::test]
    async fn test_missing_position_is_none() {
        let gateway = AccountGateway::new(Arc::new(MockBrokerage::new()));
        assert!(gateway.position("TSLA").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_inconsistent_history_rejected() {
        let mut history = PortfolioHistory::from_equity(
            vec![Utc::now(), Utc::now()],
            vec![Some(dec!(100)), Some(dec!(101))],
            "1D",
        );
        history.equity.pop();
        let gateway =
            AccountGateway::new(Arc::new(MockBrokerage::new().with_history("1M", history)));
        assert!(matches!(
            gateway.history("1M").await,
            Err(AdvisorError::ProviderUnavailable(_))
        ));
    }

    #[test]
    fn test_history_summary_skips_leading_nulls() {
        let now = Utc::now();
        let history = PortfolioHistory::from_equity(
            vec![now - Duration::days(2), now - Duration::days(1), now],
            vec![None, Some(dec!(200)), Some(dec!(250))],
            "1D",
        );
        let summary = HistorySummary::from_history("1M", &history);
        assert_eq!(summary.start_equity, Some(dec!(200)));
        assert_eq!(summary.total_return_pct, Some(dec!(25)));
        assert_eq!(summary.latest_pl_pct, Some(dec!(25)));
    }
}
