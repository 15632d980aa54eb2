//! Performance Analyzer
//!
//! Portfolio returns per timeframe, compared against a benchmark index and
//! broken down by held asset. Every series is rebased to 100 at its first
//! valid (present and positive) observation, so returns read as `last - 100`.
//!
//! Brokerage equity curves are zero-padded before an account is funded, so
//! zeros count as missing rather than as a base.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use futures::future::join_all;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{AdvisorError, Result};
use crate::gateway::{AccountGateway, MarketGateway};
use crate::model::{Bar, PortfolioHistory, Position};

const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// Analysis window
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1M")]
    OneMonth,
    #[serde(rename = "3M")]
    ThreeMonths,
    #[serde(rename = "6M")]
    SixMonths,
    #[serde(rename = "1Y")]
    OneYear,
}

impl Timeframe {
    pub const ALL: [Self; 4] = [Self::OneMonth, Self::ThreeMonths, Self::SixMonths, Self::OneYear];

    pub const fn label(self) -> &'static str {
        match self {
            Self::OneMonth => "1M",
            Self::ThreeMonths => "3M",
            Self::SixMonths => "6M",
            Self::OneYear => "1Y",
        }
    }

    /// Brokerage portfolio-history period
    pub const fn history_period(self) -> &'static str {
        match self {
            Self::OneMonth => "1M",
            Self::ThreeMonths => "3M",
            Self::SixMonths => "6M",
            Self::OneYear => "1A",
        }
    }

}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

fn valid(value: Option<Decimal>) -> Option<Decimal> {
    value.filter(|v| *v > Decimal::ZERO)
}

/// Series rebased so its first positive value is 100.
///
/// Missing and non-positive observations come out as `None`. `None` overall
/// when no observation is positive.
pub fn rebase(values: &[Option<Decimal>]) -> Option<Vec<Option<Decimal>>> {
    let base = values.iter().copied().find_map(valid)?;
    Some(values.iter().map(|v| valid(*v).map(|v| v / base * HUNDRED)).collect())
}

/// `(last / first) * 100 - 100` over the positive observations.
///
/// `None` with fewer than two of them.
pub fn period_return(values: &[Option<Decimal>]) -> Option<Decimal> {
    if values.iter().copied().filter_map(valid).count() < 2 {
        return None;
    }
    let rebased = rebase(values)?;
    let last = rebased.iter().rev().flatten().next().copied()?;
    Some(last - HUNDRED)
}

/// Midnight UTC of the first day with a positive equity value
pub fn window_start(history: &PortfolioHistory) -> Option<DateTime<Utc>> {
    history
        .timestamps
        .iter()
        .zip(&history.equity)
        .find(|(_, equity)| valid(**equity).is_some())
        .map(|(ts, _)| ts.date_naive().and_time(NaiveTime::MIN).and_utc())
}

/// Benchmark closes on the calendar dates of the valid equity observations.
///
/// `None` if any of those dates has no bar.
pub fn align_to_history(history: &PortfolioHistory, bars: &[Bar]) -> Option<Vec<Option<Decimal>>> {
    let closes: HashMap<NaiveDate, Decimal> = bars
        .iter()
        .map(|b| (b.timestamp.date_naive(), b.close))
        .collect();

    history
        .timestamps
        .iter()
        .zip(&history.equity)
        .filter(|(_, equity)| valid(**equity).is_some())
        .map(|(ts, _)| closes.get(&ts.date_naive()).copied().map(Some))
        .collect()
}

fn closes(bars: &[Bar]) -> Vec<Option<Decimal>> {
    bars.iter().map(|b| Some(b.close)).collect()
}

/// Return of one held asset over a timeframe
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetReturn {
    pub symbol: String,
    pub market_value: Decimal,

    /// Share of invested value, in percent; shown next to the return only
    pub weight_pct: Decimal,

    /// `None` when the asset's history could not be loaded
    pub return_pct: Option<Decimal>,
}

/// Return of a secondary reference index over a timeframe
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BenchmarkReturn {
    pub symbol: String,
    pub return_pct: Option<Decimal>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeframeResult {
    pub portfolio_return_pct: Decimal,
    pub benchmark_return_pct: Option<Decimal>,

    /// Secondary indices, in configured order
    #[serde(default)]
    pub comparisons: Vec<BenchmarkReturn>,

    pub assets: Vec<AssetReturn>,
}

impl TimeframeResult {
    pub fn excess_return_pct(&self) -> Option<Decimal> {
        self.benchmark_return_pct
            .map(|b| self.portfolio_return_pct - b)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PerformanceReport {
    pub generated_at: DateTime<Utc>,
    pub benchmark_symbol: String,

    #[serde(default)]
    pub comparison_symbols: Vec<String>,

    /// Only timeframes with a usable equity series are present
    pub timeframes: BTreeMap<Timeframe, TimeframeResult>,
}

impl PerformanceReport {
    pub fn get(&self, timeframe: Timeframe) -> Option<&TimeframeResult> {
        self.timeframes.get(&timeframe)
    }
}

/// Multi-timeframe analysis over one account
pub struct PerformanceAnalyzer {
    account: AccountGateway,
    market: MarketGateway,
    benchmark: String,
    comparisons: Vec<String>,
}

impl PerformanceAnalyzer {
    pub fn new(account: AccountGateway, market: MarketGateway, benchmark: impl Into<String>) -> Self {
        Self {
            account,
            market,
            benchmark: benchmark.into().to_uppercase(),
            comparisons: Vec::new(),
        }
    }

    /// Secondary indices reported next to the main benchmark
    #[must_use]
    pub fn with_comparisons<I, S>(mut self, symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for symbol in symbols {
            let symbol = symbol.as_ref().trim().to_uppercase();
            if !symbol.is_empty() && symbol != self.benchmark && !self.comparisons.contains(&symbol) {
                self.comparisons.push(symbol);
            }
        }
        self
    }

    pub async fn analyze(&self) -> Result<PerformanceReport> {
        self.analyze_with_progress(|_| {}).await
    }

    /// Run the analysis, reporting each step through `on_step`
    pub async fn analyze_with_progress<F>(&self, mut on_step: F) -> Result<PerformanceReport>
    where
        F: FnMut(String) + Send,
    {
        let now = Utc::now();
        on_step("Loading your positions...".into());
        let positions = self.account.positions().await?;
        let invested: Decimal = positions.iter().map(|p| p.market_value).sum();

        let mut timeframes = BTreeMap::new();
        for timeframe in Timeframe::ALL {
            on_step(format!("Analyzing {timeframe} performance..."));
            match self.timeframe(timeframe, &positions, invested).await {
                Some(result) => {
                    timeframes.insert(timeframe, result);
                }
                None => tracing::info!(%timeframe, "Timeframe omitted: not enough equity data"),
            }
        }

        if timeframes.is_empty() {
            return Err(AdvisorError::InsufficientData);
        }

        Ok(PerformanceReport {
            generated_at: now,
            benchmark_symbol: self.benchmark.clone(),
            comparison_symbols: self.comparisons.clone(),
            timeframes,
        })
    }

    async fn timeframe(
        &self,
        timeframe: Timeframe,
        positions: &[Position],
        invested: Decimal,
    ) -> Option<TimeframeResult> {
        let history = match self.account.history(timeframe.history_period()).await {
            Ok(history) => history,
            Err(e) => {
                tracing::warn!(%timeframe, error = %e, "Equity history unavailable");
                return None;
            }
        };
        let portfolio_return_pct = period_return(&history.equity)?;
        let start = window_start(&history)?;

        let history = &history;
        let comparisons = self.comparisons.iter().map(|symbol| async move {
            BenchmarkReturn {
                symbol: symbol.clone(),
                return_pct: self.benchmark_return(timeframe, symbol, start, history).await,
            }
        });
        let (benchmark_return_pct, comparisons, assets) = futures::join!(
            self.benchmark_return(timeframe, &self.benchmark, start, history),
            join_all(comparisons),
            self.asset_returns(start, positions, invested)
        );

        Some(TimeframeResult {
            portfolio_return_pct,
            benchmark_return_pct,
            comparisons,
            assets,
        })
    }

    async fn benchmark_return(
        &self,
        timeframe: Timeframe,
        symbol: &str,
        start: DateTime<Utc>,
        history: &PortfolioHistory,
    ) -> Option<Decimal> {
        let bars = match self.market.daily_bars_since(symbol, start).await {
            Ok(bars) => bars,
            Err(e) => {
                tracing::warn!(%timeframe, benchmark = %symbol, error = %e, "Benchmark unavailable");
                return None;
            }
        };
        let Some(aligned) = align_to_history(history, &bars) else {
            tracing::warn!(%timeframe, benchmark = %symbol, "Benchmark dates do not match equity history");
            return None;
        };
        period_return(&aligned)
    }

    async fn asset_returns(
        &self,
        start: DateTime<Utc>,
        positions: &[Position],
        invested: Decimal,
    ) -> Vec<AssetReturn> {
        let fetches = positions.iter().map(|position| async move {
            let return_pct = match self.market.daily_bars_since(&position.symbol, start).await {
                Ok(bars) => period_return(&closes(&bars)),
                Err(e) => {
                    tracing::warn!(symbol = %position.symbol, error = %e, "Asset history unavailable");
                    None
                }
            };
            let weight_pct = if invested.is_zero() {
                Decimal::ZERO
            } else {
                position.market_value / invested * HUNDRED
            };
            AssetReturn {
                symbol: position.symbol.clone(),
                market_value: position.market_value,
                weight_pct,
                return_pct,
            }
        });
        join_all(fetches).await
    }
}
