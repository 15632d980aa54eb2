//! Configuration
//!
//! Environment-driven settings with sensible paper-trading defaults.

use assistant_core::DEFAULT_HISTORY_BOUND;

use crate::credentials::CredentialPair;

pub const DEFAULT_TRADING_URL: &str = "https://paper-api.alpaca.markets";
pub const DEFAULT_DATA_URL: &str = "https://data.alpaca.markets";
pub const DEFAULT_BENCHMARK: &str = "SPY";
pub const DEFAULT_COMPARISONS: [&str; 3] = ["QQQ", "IWM", "AGG"];
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

/// Alpaca endpoints and service-level credentials
#[derive(Clone, Debug)]
pub struct AlpacaConfig {
    /// Trading API root (paper by default)
    pub trading_url: String,

    /// Market data API root
    pub data_url: String,

    /// Credentials used for market data before a user connects an account
    pub service_credentials: Option<CredentialPair>,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for AlpacaConfig {
    fn default() -> Self {
        Self {
            trading_url: DEFAULT_TRADING_URL.into(),
            data_url: DEFAULT_DATA_URL.into(),
            service_credentials: None,
            timeout_secs: 30,
        }
    }
}

impl AlpacaConfig {
    /// Read `ALPACA_TRADING_URL`, `ALPACA_DATA_URL`, `ALPACA_API_KEY` and
    /// `ALPACA_SECRET_KEY`
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let service_credentials = match (
            std::env::var("ALPACA_API_KEY"),
            std::env::var("ALPACA_SECRET_KEY"),
        ) {
            (Ok(key), Ok(secret)) if !key.is_empty() && !secret.is_empty() => {
                Some(CredentialPair::new(key, secret))
            }
            _ => None,
        };

        Self {
            trading_url: std::env::var("ALPACA_TRADING_URL").unwrap_or(defaults.trading_url),
            data_url: std::env::var("ALPACA_DATA_URL").unwrap_or(defaults.data_url),
            service_credentials,
            timeout_secs: std::env::var("ALPACA_TIMEOUT_SECS")
                .ok()
                .and_then(|t| t.parse().ok())
                .unwrap_or(defaults.timeout_secs),
        }
    }
}

/// Orchestrator settings
#[derive(Clone, Debug)]
pub struct AdvisorConfig {
    /// Non-system messages kept in each session
    pub history_bound: usize,

    /// Index the portfolio is compared against
    pub benchmark_symbol: String,

    /// Secondary indices shown next to the benchmark
    pub comparison_symbols: Vec<String>,

    /// Chat model requested from the provider
    pub model: String,
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        Self {
            history_bound: DEFAULT_HISTORY_BOUND,
            benchmark_symbol: DEFAULT_BENCHMARK.into(),
            comparison_symbols: DEFAULT_COMPARISONS.iter().map(|s| (*s).to_string()).collect(),
            model: DEFAULT_MODEL.into(),
        }
    }
}

impl AdvisorConfig {
    /// Read `HISTORY_BOUND`, `BENCHMARK_SYMBOL`, `COMPARISON_SYMBOLS`
    /// (comma-separated, empty for none) and `LLM_MODEL`
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            history_bound: std::env::var("HISTORY_BOUND")
                .ok()
                .and_then(|b| b.parse().ok())
                .unwrap_or(defaults.history_bound),
            benchmark_symbol: std::env::var("BENCHMARK_SYMBOL")
                .map(|s| s.to_uppercase())
                .unwrap_or(defaults.benchmark_symbol),
            comparison_symbols: std::env::var("COMPARISON_SYMBOLS")
                .map(|list| parse_symbols(&list))
                .unwrap_or(defaults.comparison_symbols),
            model: std::env::var("LLM_MODEL")
                .ok()
                .filter(|m| !m.is_empty())
                .unwrap_or(defaults.model),
        }
    }
}

fn parse_symbols(list: &str) -> Vec<String> {
    list.split(',')
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect()
}
