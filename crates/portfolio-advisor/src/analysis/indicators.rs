//! Technical Indicators
//!
//! Simple moving averages and RSI over daily closes, oldest first.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub const RSI_PERIOD: usize = 14;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Indicators {
    pub symbol: String,
    pub last_close: Decimal,
    pub sma_20: Decimal,
    pub sma_50: Decimal,
    pub sma_200: Decimal,

    /// `None` when fewer than two closes are available
    pub rsi_14: Option<Decimal>,

    pub bars_used: usize,
}

impl Indicators {
    /// `None` when `closes` is empty
    pub fn from_closes(symbol: &str, closes: &[Decimal]) -> Option<Self> {
        let last_close = *closes.last()?;
        Some(Self {
            symbol: symbol.to_uppercase(),
            last_close,
            sma_20: sma(closes, 20)?,
            sma_50: sma(closes, 50)?,
            sma_200: sma(closes, 200)?,
            rsi_14: rsi(closes, RSI_PERIOD),
            bars_used: closes.len(),
        })
    }

    /// Plain-language reading of the RSI
    pub fn rsi_reading(&self) -> &'static str {
        match self.rsi_14 {
            Some(r) if r >= Decimal::from(70) => "overbought",
            Some(r) if r <= Decimal::from(30) => "oversold",
            Some(_) => "neutral",
            None => "unavailable",
        }
    }
}

/// Mean of the last `period` closes, or of all of them when fewer exist
pub fn sma(closes: &[Decimal], period: usize) -> Option<Decimal> {
    if closes.is_empty() || period == 0 {
        return None;
    }
    let window = &closes[closes.len().saturating_sub(period)..];
    let sum: Decimal = window.iter().sum();
    Some((sum / Decimal::from(window.len())).round_dp(2))
}

/// RSI over the last `period` close-to-close changes.
///
/// A window with gains and no losses reads 100.
pub fn rsi(closes: &[Decimal], period: usize) -> Option<Decimal> {
    if closes.len() < 2 || period == 0 {
        return None;
    }
    let window = &closes[closes.len().saturating_sub(period + 1)..];
    let (mut gains, mut losses) = (Decimal::ZERO, Decimal::ZERO);
    for pair in window.windows(2) {
        let change = pair[1] - pair[0];
        if change >= Decimal::ZERO {
            gains += change;
        } else {
            losses -= change;
        }
    }

    let hundred = Decimal::ONE_HUNDRED;
    if losses.is_zero() {
        return Some(if gains.is_zero() { Decimal::from(50) } else { hundred });
    }
    let rs = gains / losses;
    Some((hundred - hundred / (Decimal::ONE + rs)).round_dp(2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_sma_short_series_uses_all_closes() {
        let closes = [dec!(10), dec!(20), dec!(30)];
        assert_eq!(sma(&closes, 2), Some(dec!(25)));
        assert_eq!(sma(&closes, 200), Some(dec!(20)));
        assert_eq!(sma(&[], 20), None);
    }

    #[test]
    fn test_rsi_balanced_moves() {
        let closes = [dec!(10), dec!(11), dec!(10), dec!(11), dec!(10)];
        assert_eq!(rsi(&closes, 14), Some(dec!(50)));
    }

    #[test]
    fn test_rsi_only_gains() {
        let closes: Vec<Decimal> = (1..=20).map(Decimal::from).collect();
        assert_eq!(rsi(&closes, 14), Some(dec!(100)));
    }

    #[test]
    fn test_rsi_uses_latest_window() {
        // Early crash, then 14 straight gains
        let mut closes = vec![dec!(100), dec!(50)];
        closes.extend((51..=65).map(Decimal::from));
        assert_eq!(rsi(&closes, 14), Some(dec!(100)));
    }

    #[test]
    fn test_indicator_reading() {
        let closes: Vec<Decimal> = (1..=30).rev().map(Decimal::from).collect();
        let indicators = Indicators::from_closes("spy", &closes).unwrap();
        assert_eq!(indicators.symbol, "SPY");
        assert_eq!(indicators.rsi_14, Some(Decimal::ZERO));
        assert_eq!(indicators.rsi_reading(), "oversold");
        assert_eq!(indicators.bars_used, 30);
    }
}
