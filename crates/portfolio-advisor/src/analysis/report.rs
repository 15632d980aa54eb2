//! Report Export
//!
//! Renders a [`PerformanceReport`] as a downloadable attachment.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::performance::PerformanceReport;
use crate::error::{AdvisorError, Result};

/// Generated file handed back to the caller
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Report renderer
pub trait ReportGenerator: Send + Sync {
    fn render(&self, report: &PerformanceReport) -> Result<Attachment>;
}

/// Summary table followed by one asset table per timeframe
#[derive(Clone, Copy, Debug, Default)]
pub struct CsvReportGenerator;

fn pct(value: Option<Decimal>) -> String {
    value.map_or_else(|| "N/A".to_string(), |v| format!("{:.2}", v.round_dp(2)))
}

impl CsvReportGenerator {
    fn write(report: &PerformanceReport) -> std::result::Result<Vec<u8>, csv::Error> {
        let mut writer = csv::WriterBuilder::new()
            .flexible(true)
            .from_writer(Vec::new());

        writer.write_record(["Portfolio Performance Report"])?;
        writer.write_record([
            "Generated".to_string(),
            report.generated_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        ])?;
        writer.write_record(["Benchmark", report.benchmark_symbol.as_str()])?;

        writer.write_record([
            "Timeframe",
            "Portfolio Return (%)",
            "Benchmark Return (%)",
            "Excess Return (%)",
        ])?;
        for (timeframe, result) in &report.timeframes {
            writer.write_record([
                timeframe.label().to_string(),
                pct(Some(result.portfolio_return_pct)),
                pct(result.benchmark_return_pct),
                pct(result.excess_return_pct()),
            ])?;
        }

        if !report.comparison_symbols.is_empty() {
            writer.write_record(["Benchmark Comparison (%)"])?;
            let mut header = vec!["Timeframe".to_string(), report.benchmark_symbol.clone()];
            header.extend(report.comparison_symbols.iter().cloned());
            writer.write_record(&header)?;
            for (timeframe, result) in &report.timeframes {
                let mut row = vec![timeframe.label().to_string(), pct(result.benchmark_return_pct)];
                row.extend(result.comparisons.iter().map(|c| pct(c.return_pct)));
                writer.write_record(&row)?;
            }
        }

        for (timeframe, result) in &report.timeframes {
            writer.write_record([format!("Asset Returns ({timeframe})")])?;
            writer.write_record(["Symbol", "Weight (%)", "Market Value", "Return (%)"])?;
            for asset in &result.assets {
                writer.write_record([
                    asset.symbol.clone(),
                    pct(Some(asset.weight_pct)),
                    format!("{:.2}", asset.market_value.round_dp(2)),
                    pct(asset.return_pct),
                ])?;
            }
        }

        writer
            .into_inner()
            .map_err(|e| csv::Error::from(e.into_error()))
    }
}

impl ReportGenerator for CsvReportGenerator {
    fn render(&self, report: &PerformanceReport) -> Result<Attachment> {
        let bytes = Self::write(report).map_err(|e| AdvisorError::Report(e.to_string()))?;
        Ok(Attachment {
            filename: format!(
                "portfolio_performance_{}.csv",
                report.generated_at.format("%Y%m%d_%H%M%S")
            ),
            content_type: "text/csv".into(),
            bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::performance::{AssetReturn, BenchmarkReturn, Timeframe, TimeframeResult};
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;
    use std::collections::BTreeMap;

    fn report() -> PerformanceReport {
        let mut timeframes = BTreeMap::new();
        timeframes.insert(
            Timeframe::OneYear,
            TimeframeResult {
                portfolio_return_pct: dec!(12.346),
                benchmark_return_pct: None,
                comparisons: vec![BenchmarkReturn {
                    symbol: "QQQ".into(),
                    return_pct: Some(dec!(15.5)),
                }],
                assets: vec![AssetReturn {
                    symbol: "AAPL".into(),
                    market_value: dec!(1500),
                    weight_pct: dec!(100),
                    return_pct: Some(dec!(8.5)),
                }],
            },
        );
        timeframes.insert(
            Timeframe::OneMonth,
            TimeframeResult {
                portfolio_return_pct: dec!(21),
                benchmark_return_pct: Some(dec!(10)),
                comparisons: vec![BenchmarkReturn {
                    symbol: "QQQ".into(),
                    return_pct: None,
                }],
                assets: Vec::new(),
            },
        );
        PerformanceReport {
            generated_at: Utc.with_ymd_and_hms(2024, 3, 5, 14, 30, 0).unwrap(),
            benchmark_symbol: "SPY".into(),
            comparison_symbols: vec!["QQQ".into()],
            timeframes,
        }
    }

    #[test]
    fn test_csv_attachment() {
        let attachment = CsvReportGenerator.render(&report()).unwrap();
        assert_eq!(attachment.filename, "portfolio_performance_20240305_143000.csv");
        assert_eq!(attachment.content_type, "text/csv");

        let text = String::from_utf8(attachment.bytes).unwrap();
        assert!(text.contains("1M,21.00,10.00,11.00"));
        assert!(text.contains("1Y,12.35,N/A,N/A"));
        assert!(text.contains("AAPL,100.00,1500.00,8.50"));
        assert!(text.contains("Timeframe,SPY,QQQ"));
        assert!(text.contains("1M,10.00,N/A"));
        assert!(text.contains("1Y,N/A,15.50"));

        // Timeframes appear in chronological order
        let one_month = text.find("1M,").unwrap();
        let one_year = text.find("1Y,").unwrap();
        assert!(one_month < one_year);
    }
}
