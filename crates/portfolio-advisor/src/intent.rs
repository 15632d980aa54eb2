//! Command Shortcuts
//!
//! A handful of phrasings map straight to a directive, so the orchestrator
//! can answer them without asking the model what to do first.
//!
//! ```text
//! buy 10 AAPL                  -> ACTION:place_order:AAPL:buy:10:market
//! sell 5 shares of MSFT        -> ACTION:place_order:MSFT:sell:5:market
//! buy 10 of BRK.B              -> ACTION:place_order:BRK.B:buy:10:market
//! quote for TSLA               -> ACTION:get_price:TSLA
//! position for NVDA            -> ACTION:get_position:NVDA
//! portfolio summary            -> ACTION:portfolio_summary
//! technical analysis for SPY   -> ACTION:technical_analysis:SPY
//! market status                -> ACTION:market_status
//! ```
//!
//! Orders only match a whole message ending in an uppercase ticker, so prose
//! such as "buy 100 more if it dips?" goes to the model instead.

use std::sync::LazyLock;

use assistant_core::Directive;
use regex::Regex;

static ORDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*(?i:(buy|sell))\s+(\d+(?:\.\d+)?)\s+(?i:shares?\s+)?(?i:of\s+)?([A-Z]{1,5}(?:\.[A-Z]{1,2})?)\s*[.!]?\s*$",
    )
    .expect("valid regex")
});
static QUOTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:get\s+)?quote\s+(?:for\s+)?([a-z][a-z0-9.]{0,9})\b").expect("valid regex")
});
static POSITION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:get\s+)?position\s+(?:for\s+)?([a-z][a-z0-9.]{0,9})\b").expect("valid regex")
});
static SUMMARY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:get\s+)?portfolio\s+summary\b").expect("valid regex")
});
static TECHNICALS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*(?:get\s+)?(?:technical\s+analysis|indicators)\s+(?:for\s+)?([a-z][a-z0-9.]{0,9})\b",
    )
    .expect("valid regex")
});
static MARKET_STATUS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:get\s+)?market\s+status\b").expect("valid regex")
});

/// Directive for a recognised shortcut phrase
pub fn shortcut(text: &str) -> Option<Directive> {
    if let Some(caps) = ORDER.captures(text) {
        let side = caps[1].to_lowercase();
        return Some(Directive::new(
            "place_order",
            [caps[3].to_uppercase(), side, caps[2].to_string(), "market".into()],
        ));
    }
    if let Some(caps) = QUOTE.captures(text) {
        return Some(Directive::new("get_price", [caps[1].to_uppercase()]));
    }
    if let Some(caps) = POSITION.captures(text) {
        return Some(Directive::new("get_position", [caps[1].to_uppercase()]));
    }
    if SUMMARY.is_match(text) {
        return Some(Directive::new("portfolio_summary", Vec::<String>::new()));
    }
    if let Some(caps) = TECHNICALS.captures(text) {
        return Some(Directive::new("technical_analysis", [caps[1].to_uppercase()]));
    }
    if MARKET_STATUS.is_match(text) {
        return Some(Directive::new("market_status", Vec::<String>::new()));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(text: &str) -> Option<String> {
        shortcut(text).map(|d| d.to_line())
    }

    #[test]
    fn test_orders() {
        assert_eq!(line("buy 10 AAPL").as_deref(), Some("ACTION:place_order:AAPL:buy:10:market"));
        assert_eq!(
            line("Sell 5 shares of MSFT").as_deref(),
            Some("ACTION:place_order:MSFT:sell:5:market")
        );
        assert_eq!(line("buy 10 of AAPL").as_deref(), Some("ACTION:place_order:AAPL:buy:10:market"));
        assert_eq!(line("BUY 2 BRK.B!").as_deref(), Some("ACTION:place_order:BRK.B:buy:2:market"));
        assert_eq!(line("buy some apple stock"), None);
    }

    #[test]
    fn test_order_prose_goes_to_the_model() {
        assert_eq!(line("Buy 100 more if it dips?"), None);
        assert_eq!(line("buy 10 aapl"), None);
        assert_eq!(line("Sell 5 shares of MSFT please"), None);
        assert_eq!(line("buy 10 AAPL and 5 MSFT"), None);
    }

    #[test]
    fn test_lookups() {
        assert_eq!(line("quote for tsla").as_deref(), Some("ACTION:get_price:TSLA"));
        assert_eq!(line("get quote NVDA").as_deref(), Some("ACTION:get_price:NVDA"));
        assert_eq!(line("position for nvda").as_deref(), Some("ACTION:get_position:NVDA"));
        assert_eq!(line("Portfolio summary").as_deref(), Some("ACTION:portfolio_summary"));
        assert_eq!(
            line("technical analysis for spy").as_deref(),
            Some("ACTION:technical_analysis:SPY")
        );
        assert_eq!(line("indicators QQQ").as_deref(), Some("ACTION:technical_analysis:QQQ"));
        assert_eq!(line("market status").as_deref(), Some("ACTION:market_status"));
    }

    #[test]
    fn test_plain_conversation_is_not_a_shortcut() {
        assert_eq!(line("what do you think about my positions?"), None);
        assert_eq!(line("should I buy more index funds"), None);
        assert_eq!(line("positions"), None);
    }
}
