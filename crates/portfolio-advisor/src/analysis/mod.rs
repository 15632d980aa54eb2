//! Analysis
//!
//! Indicators, multi-timeframe performance and report export.

pub mod indicators;
pub mod performance;
pub mod report;

pub use indicators::Indicators;
pub use performance::{
    AssetReturn, BenchmarkReturn, PerformanceAnalyzer, PerformanceReport, Timeframe, TimeframeResult,
};
pub use report::{Attachment, CsvReportGenerator, ReportGenerator};
