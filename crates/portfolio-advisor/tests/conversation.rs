//! End-to-end conversation scenarios against in-memory providers.
//!
//! The model is scripted, the brokerage and market data are mocks, so every
//! scenario is deterministic and runs offline.

use std::sync::Arc;

use assistant_core::{Role, ScriptedProvider};
use chrono::{DateTime, Duration, NaiveTime, Utc};
use portfolio_advisor::analysis::{PerformanceAnalyzer, Timeframe};
use portfolio_advisor::assistant::{INIT_SENTINEL, PERFORMANCE_COMMAND};
use portfolio_advisor::exchange::{MockBrokerage, MockConnector, MockMarketData};
use portfolio_advisor::gateway::{AccountGateway, MarketGateway};
use portfolio_advisor::model::{Account, Bar, PortfolioHistory, Position};
use portfolio_advisor::{
    AdvisorConfig, AdvisorError, Assistant, AssistantSession, CredentialPair, MemoryUserStore,
    UserContext, UserStore,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

const KEY: &str = "PKABCDEFGHIJ12345678";
const SECRET: &str = "abcdefghijABCDEFGHIJ0123456789abcdefghij";
const OTHER_KEY: &str = "PKZYXWVUTSRQ87654321";
const OTHER_SECRET: &str = "zyxwvutsrqZYXWVUTSRQ9876543210zyxwvutsrq";

struct Harness {
    assistant: Assistant,
    provider: Arc<ScriptedProvider>,
    broker: Arc<MockBrokerage>,
    connector: Arc<MockConnector>,
    store: Arc<MemoryUserStore>,
}

impl Harness {
    fn user() -> UserContext {
        UserContext::new("alice", true)
    }

    async fn session(&self) -> AssistantSession {
        let mut session = self.assistant.new_session();
        self.assistant
            .handle(&mut session, &Self::user(), INIT_SENTINEL)
            .await;
        session
    }
}

struct HarnessBuilder {
    replies: Vec<String>,
    broker: MockBrokerage,
    market: MockMarketData,
    stored: Option<CredentialPair>,
}

impl HarnessBuilder {
    fn new() -> Self {
        Self {
            replies: Vec::new(),
            broker: MockBrokerage::new(),
            market: MockMarketData::new(),
            stored: Some(CredentialPair::new(KEY, SECRET)),
        }
    }

    fn replies<I: IntoIterator<Item = &'static str>>(mut self, replies: I) -> Self {
        self.replies = replies.into_iter().map(String::from).collect();
        self
    }

    fn broker(mut self, broker: MockBrokerage) -> Self {
        self.broker = broker;
        self
    }

    fn market(mut self, market: MockMarketData) -> Self {
        self.market = market;
        self
    }

    fn no_stored_credentials(mut self) -> Self {
        self.stored = None;
        self
    }

    async fn build(self) -> Harness {
        let provider = Arc::new(ScriptedProvider::new(self.replies));
        let broker = Arc::new(self.broker);
        let connector = Arc::new(
            MockConnector::new(broker.clone())
                .accepting(CredentialPair::new(KEY, SECRET))
                .accepting(CredentialPair::new(OTHER_KEY, OTHER_SECRET)),
        );
        let mut store = MemoryUserStore::new();
        if let Some(pair) = self.stored {
            store = store.with_credentials("alice", pair).await;
        }
        let store = Arc::new(store);

        let assistant = Assistant::new(
            provider.clone(),
            connector.clone(),
            Arc::new(self.market),
            store.clone(),
            AdvisorConfig::default(),
        )
        .unwrap();

        Harness {
            assistant,
            provider,
            broker,
            connector,
            store,
        }
    }
}

fn days_ago(now: DateTime<Utc>, days: &[i64]) -> Vec<DateTime<Utc>> {
    days.iter().map(|d| now - Duration::days(*d)).collect()
}

fn history(now: DateTime<Utc>, days: &[i64], equity: &[Option<Decimal>]) -> PortfolioHistory {
    PortfolioHistory::from_equity(days_ago(now, days), equity.to_vec(), "1D")
}

fn bars(now: DateTime<Utc>, days: &[i64], closes: &[Decimal]) -> Vec<Bar> {
    days_ago(now, days)
        .into_iter()
        .zip(closes)
        .map(|(ts, close)| Bar::flat(ts, *close))
        .collect()
}

fn midnight(now: DateTime<Utc>, days_back: i64) -> DateTime<Utc> {
    (now - Duration::days(days_back))
        .date_naive()
        .and_time(NaiveTime::MIN)
        .and_utc()
}

// Conversation memory

#[tokio::test]
async fn history_stays_bounded_and_keeps_system_prompt() {
    let replies: Vec<&'static str> = vec!["Sure."; 8];
    let h = HarnessBuilder::new().replies(replies).build().await;
    let mut session = h.session().await;

    for i in 0..8 {
        let reply = h
            .assistant
            .handle(&mut session, &Harness::user(), &format!("question {i}"))
            .await;
        assert!(!reply.error);
        assert!(session.session().message_count() <= 10);
    }

    let messages = session.session().history.messages();
    assert_eq!(messages.len(), 10);
    assert_eq!(messages[0].role, Role::System);
    assert_eq!(messages[9].content, "Sure.");
    assert_eq!(messages[8].content, "question 7");
}

#[tokio::test]
async fn context_note_is_sent_but_never_stored() {
    let h = HarnessBuilder::new().replies(["Hello!"]).build().await;
    let mut session = h.session().await;

    h.assistant
        .handle(&mut session, &Harness::user(), "hi there")
        .await;

    let sent = &h.provider.requests().await[0];
    assert_eq!(sent[0].role, Role::System);
    assert!(sent[1].content.contains("has Alpaca trading account credentials set up"));
    assert!(session
        .session()
        .history
        .messages()
        .iter()
        .all(|m| !m.content.contains("has Alpaca trading account credentials")));
}

// Credentials

#[tokio::test]
async fn stored_credentials_bind_the_session_on_greeting() {
    let h = HarnessBuilder::new().build().await;
    let session = h.session().await;

    assert!(session.is_bound());
    assert_eq!(h.provider.call_count().await, 0);
}

#[tokio::test]
async fn revoked_credentials_get_a_remediation_greeting() {
    let h = HarnessBuilder::new().build().await;
    h.store
        .save_credentials("alice", &CredentialPair::new("PKREVOKED00000000000", SECRET))
        .await
        .unwrap();

    let mut session = h.assistant.new_session();
    let reply = h
        .assistant
        .handle(&mut session, &Harness::user(), INIT_SENTINEL)
        .await;

    assert!(reply.response_text.contains("couldn't connect to Alpaca"));
    assert!(!session.is_bound());
}

#[tokio::test]
async fn lone_key_is_held_pending_without_validation() {
    let h = HarnessBuilder::new().no_stored_credentials().build().await;
    let mut session = h.session().await;
    let user = UserContext::new("alice", false);

    let reply = h
        .assistant
        .handle(&mut session, &user, &format!("here is my key {KEY}"))
        .await;

    assert!(reply.requires_action);
    assert!(reply.response_text.contains("secret key"));
    assert!(session.has_pending_credentials());
    assert_eq!(h.connector.connect_count(), 0);
    assert!(!h.store.has_credentials("alice").await.unwrap());
    assert_eq!(h.provider.call_count().await, 0);

    let reply = h
        .assistant
        .handle(&mut session, &user, &format!("and the secret: {SECRET}"))
        .await;

    assert!(!reply.error);
    assert!(reply.response_text.contains("connected"));
    assert!(session.is_bound());
    assert!(!session.has_pending_credentials());
    assert_eq!(h.connector.connect_count(), 1);
    assert_eq!(
        h.store.get_credentials("alice").await.unwrap(),
        Some(CredentialPair::new(KEY, SECRET))
    );
}

#[tokio::test]
async fn rejected_credentials_leave_stored_pair_untouched() {
    let h = HarnessBuilder::new().build().await;
    let mut session = h.session().await;
    assert!(session.is_bound());

    let bogus_key = "PKNOTREAL00000000000";
    let bogus_secret = "0000000000aaaaaaaaaaBBBBBBBBBB1111111111";
    let reply = h
        .assistant
        .handle(
            &mut session,
            &Harness::user(),
            &format!("new keys {bogus_key} {bogus_secret}"),
        )
        .await;

    assert!(reply.requires_action);
    assert!(reply.response_text.contains("rejected"));
    assert!(!session.has_pending_credentials());
    assert!(session.is_bound());
    assert_eq!(
        h.store.get_credentials("alice").await.unwrap(),
        Some(CredentialPair::new(KEY, SECRET))
    );
}

#[tokio::test]
async fn malformed_credentials_never_reach_the_brokerage() {
    let h = HarnessBuilder::new().build().await;
    let mut session = h.session().await;
    let connects = h.connector.connect_count();

    let long_key = "PKABCDEFGHIJKLMNOPQRSTUV";
    let reply = h
        .assistant
        .handle(&mut session, &Harness::user(), &format!("{long_key} {SECRET}"))
        .await;

    assert!(reply.response_text.contains("don't look right"));
    assert_eq!(h.connector.connect_count(), connects);
    assert_eq!(
        h.store.get_credentials("alice").await.unwrap(),
        Some(CredentialPair::new(KEY, SECRET))
    );
}

#[tokio::test]
async fn replacing_credentials_rebinds_the_session() {
    let h = HarnessBuilder::new().build().await;
    let mut session = h.session().await;

    let reply = h
        .assistant
        .handle(
            &mut session,
            &Harness::user(),
            &format!("{OTHER_KEY}\n{OTHER_SECRET}"),
        )
        .await;

    assert!(!reply.error);
    assert_eq!(
        h.store.get_credentials("alice").await.unwrap(),
        Some(CredentialPair::new(OTHER_KEY, OTHER_SECRET))
    );
}

// Directives

#[tokio::test]
async fn wrong_arity_fails_closed_without_gateway_call() {
    let h = HarnessBuilder::new()
        .replies(["ACTION:get_position:AAPL:extra", "Sorry, I couldn't look that up."])
        .build()
        .await;
    let mut session = h.session().await;
    let calls = h.broker.call_count();

    let reply = h
        .assistant
        .handle(&mut session, &Harness::user(), "do I own apple?")
        .await;

    assert!(!reply.error);
    assert!(reply.requires_action);
    assert_eq!(reply.response_text, "Sorry, I couldn't look that up.");
    assert_eq!(h.broker.call_count(), calls);

    let injected = &h.provider.requests().await[1];
    assert!(injected
        .iter()
        .any(|m| m.content.starts_with("[get_position failed]")));
}

#[tokio::test]
async fn model_directive_result_is_synthesized() {
    let h = HarnessBuilder::new()
        .replies(["Let me check.\nACTION:get_price:AAPL", "Apple last traded at $190.00."])
        .market(MockMarketData::new().with_price("AAPL", dec!(190)))
        .build()
        .await;
    let mut session = h.session().await;

    let reply = h
        .assistant
        .handle(&mut session, &Harness::user(), "what's apple at?")
        .await;

    assert_eq!(reply.response_text, "Apple last traded at $190.00.");
    assert!(reply.requires_action);
    assert_eq!(h.provider.call_count().await, 2);
}

#[tokio::test]
async fn limit_order_without_price_is_rejected() {
    let h = HarnessBuilder::new().build().await;
    let mut session = h.session().await;

    let reply = h
        .assistant
        .handle(
            &mut session,
            &Harness::user(),
            "ACTION:place_order:AAPL:buy:10:limit",
        )
        .await;

    assert!(reply.response_text.contains("limit order needs a limit_price"));
    assert!(h.broker.submitted().is_empty());
    assert_eq!(h.provider.call_count().await, 0);
}

#[tokio::test]
async fn shortcut_places_market_order_without_model() {
    let h = HarnessBuilder::new().build().await;
    let mut session = h.session().await;

    let reply = h
        .assistant
        .handle(&mut session, &Harness::user(), "buy 10 shares of AAPL")
        .await;

    assert!(reply.response_text.starts_with("Order placed: BUY 10 AAPL market"));
    let submitted = h.broker.submitted();
    assert_eq!(submitted.len(), 1);
    assert_eq!(submitted[0].qty, dec!(10));
    assert_eq!(h.provider.call_count().await, 0);
}

#[tokio::test]
async fn brokerage_tools_need_credentials() {
    let h = HarnessBuilder::new().no_stored_credentials().build().await;
    let mut session = h.session().await;

    let reply = h
        .assistant
        .handle(&mut session, &UserContext::new("alice", false), "portfolio summary")
        .await;

    assert!(reply.response_text.contains("need your Alpaca API credentials"));
    assert_eq!(h.broker.call_count(), 0);
}

#[tokio::test]
async fn stored_credentials_serve_a_conversation_that_skipped_the_greeting() {
    let h = HarnessBuilder::new().build().await;
    let mut session = h.assistant.new_session();

    let reply = h
        .assistant
        .handle(&mut session, &Harness::user(), "portfolio summary")
        .await;

    assert!(!reply.error, "{}", reply.response_text);
    assert!(!reply.response_text.contains("need your Alpaca API credentials"));
    assert!(session.is_bound());
    assert!(h.broker.call_count() > 0);
    assert_eq!(h.connector.connect_count(), 1);

    h.assistant
        .handle(&mut session, &Harness::user(), "portfolio summary")
        .await;
    assert_eq!(h.connector.connect_count(), 1);
    assert_eq!(h.provider.call_count().await, 0);
}

#[tokio::test]
async fn revoked_stored_credentials_are_tried_once_per_conversation() {
    let h = HarnessBuilder::new().build().await;
    h.store
        .save_credentials("alice", &CredentialPair::new("PKREVOKED00000000000", SECRET))
        .await
        .unwrap();
    let mut session = h.assistant.new_session();

    for _ in 0..2 {
        let reply = h
            .assistant
            .handle(&mut session, &Harness::user(), "portfolio summary")
            .await;
        assert!(reply.response_text.contains("need your Alpaca API credentials"));
    }
    assert!(!session.is_bound());
    assert_eq!(h.connector.connect_count(), 1);
}

#[tokio::test]
async fn save_info_requires_signed_in_user() {
    let h = HarnessBuilder::new().no_stored_credentials().build().await;
    let mut session = h.assistant.new_session();

    let reply = h
        .assistant
        .handle(&mut session, &UserContext::anonymous(), "ACTION:save_info:goal:retire early")
        .await;
    assert!(reply.response_text.contains("sign in"));

    let reply = h
        .assistant
        .handle(
            &mut session,
            &UserContext::new("alice", false),
            "ACTION:save_info:note:rebalance on 1/15: quarterly",
        )
        .await;
    assert!(!reply.error);
    let facts = h.store.facts("alice").await.unwrap();
    assert_eq!(facts.len(), 1);
    assert_eq!(facts[0].content, "rebalance on 1/15: quarterly");
}

// Allocation

#[tokio::test]
async fn allocation_covers_positions_and_cash() {
    let broker = MockBrokerage::new().with_positions(vec![
        Position::new("AAPL", dec!(10), dec!(150), dec!(200)),
        Position::new("MSFT", dec!(5), dec!(300), dec!(400)),
    ]);
    let gateway = AccountGateway::new(Arc::new(broker));

    let summary = gateway.summary().await.unwrap();
    let total: Decimal = summary.allocation.iter().map(|s| s.percent).sum();

    assert!((total - dec!(100)).abs() < dec!(0.0001));
    assert!(summary.allocation.iter().any(|s| s.symbol == "CASH"));
}

#[tokio::test]
async fn allocation_without_cash_splits_positions_only() {
    let broker = MockBrokerage::new()
        .with_account(Account::new(dec!(0), dec!(100), dec!(0), dec!(100), dec!(100)))
        .with_positions(vec![
            Position::new("AAA", dec!(6), dec!(10), dec!(10)),
            Position::new("BBB", dec!(4), dec!(10), dec!(10)),
        ]);
    let gateway = AccountGateway::new(Arc::new(broker));

    let summary = gateway.summary().await.unwrap();
    let percent = |symbol: &str| {
        summary
            .allocation
            .iter()
            .find(|s| s.symbol == symbol)
            .map(|s| s.percent)
    };

    assert_eq!(summary.allocation.len(), 2);
    assert_eq!(percent("AAA"), Some(dec!(60)));
    assert_eq!(percent("BBB"), Some(dec!(40)));
    assert_eq!(percent("CASH"), None);
    let total: Decimal = summary.allocation.iter().map(|s| s.percent).sum();
    assert!((total - dec!(100)).abs() <= dec!(0.01));
}

// Performance analysis

#[tokio::test]
async fn performance_reports_portfolio_and_benchmark_returns() {
    let now = Utc::now();
    let days = [20, 10, 0];
    let broker = MockBrokerage::new().with_history(
        "1M",
        history(now, &days, &[Some(dec!(100)), Some(dec!(110)), Some(dec!(121))]),
    );
    let market = MockMarketData::new().with_bars("SPY", bars(now, &days, &[dec!(200), dec!(210), dec!(220)]));
    let h = HarnessBuilder::new().broker(broker).market(market).build().await;
    let mut session = h.session().await;

    let reply = h
        .assistant
        .handle(&mut session, &Harness::user(), PERFORMANCE_COMMAND)
        .await;

    assert!(!reply.error, "{}", reply.response_text);
    assert!(!reply.in_progress);
    assert_eq!(reply.progress_messages.len(), 5);
    assert!(reply.progress_messages.iter().all(|p| p.in_progress));
    assert!(reply.response_text.contains("1M: +21.00% vs SPY +10.00%"));

    let attachment = reply.attachment.unwrap();
    assert_eq!(attachment.content_type, "text/csv");
    assert!(attachment.filename.starts_with("portfolio_performance_"));
    let csv = String::from_utf8(attachment.bytes).unwrap();
    assert!(csv.contains("1M,21.00,10.00,11.00"));
}

#[tokio::test]
async fn timeframes_without_enough_history_are_omitted() {
    let now = Utc::now();
    let broker = MockBrokerage::new()
        .with_history("1M", history(now, &[10, 0], &[Some(dec!(100)), Some(dec!(105))]))
        .with_history("3M", history(now, &[60, 30, 0], &[None, Some(dec!(100)), None]));
    let analyzer = PerformanceAnalyzer::new(
        AccountGateway::new(Arc::new(broker)),
        MarketGateway::new(Arc::new(MockMarketData::new())),
        "SPY",
    );

    let report = analyzer.analyze().await.unwrap();

    assert_eq!(report.timeframes.len(), 1);
    assert_eq!(report.get(Timeframe::OneMonth).unwrap().portfolio_return_pct, dec!(5));
    assert!(report.get(Timeframe::ThreeMonths).is_none());
}

#[tokio::test]
async fn no_usable_timeframe_is_insufficient_data() {
    let analyzer = PerformanceAnalyzer::new(
        AccountGateway::new(Arc::new(MockBrokerage::new())),
        MarketGateway::new(Arc::new(MockMarketData::new())),
        "SPY",
    );
    assert!(matches!(analyzer.analyze().await, Err(AdvisorError::InsufficientData)));

    let h = HarnessBuilder::new().build().await;
    let mut session = h.session().await;
    let reply = h
        .assistant
        .handle(&mut session, &Harness::user(), "run a performance analysis")
        .await;
    assert!(reply.error);
    assert!(reply.response_text.contains("enough portfolio history"));
    assert!(reply.attachment.is_none());
}

#[tokio::test]
async fn benchmark_failure_leaves_portfolio_return() {
    let now = Utc::now();
    let month = [20, 0];
    let year = [300, 20, 0];
    let broker = MockBrokerage::new()
        .with_positions(vec![Position::new("AAPL", dec!(10), dec!(100), dec!(120))])
        .with_history("1M", history(now, &month, &[Some(dec!(1000)), Some(dec!(1100))]))
        .with_history(
            "1A",
            history(now, &year, &[Some(dec!(800)), Some(dec!(1000)), Some(dec!(1100))]),
        );
    let market = MockMarketData::new()
        .with_bars("SPY", bars(now, &year, &[dec!(300), dec!(400), dec!(420)]))
        .with_bars("AAPL", bars(now, &year, &[dec!(80), dec!(100), dec!(120)]))
        .fail_bars_older_than("SPY", Duration::days(200));
    let analyzer = PerformanceAnalyzer::new(
        AccountGateway::new(Arc::new(broker)),
        MarketGateway::new(Arc::new(market)),
        "SPY",
    );

    let report = analyzer.analyze().await.unwrap();

    let month = report.get(Timeframe::OneMonth).unwrap();
    assert_eq!(month.portfolio_return_pct, dec!(10));
    assert_eq!(month.benchmark_return_pct, Some(dec!(5)));

    let year = report.get(Timeframe::OneYear).unwrap();
    assert_eq!(year.portfolio_return_pct, dec!(37.5));
    assert_eq!(year.benchmark_return_pct, None);
    assert_eq!(year.assets[0].return_pct, Some(dec!(50)));
    assert_eq!(year.assets[0].weight_pct, dec!(100));
}

#[tokio::test]
async fn unfunded_days_do_not_start_the_window() {
    let now = Utc::now();
    let days = [25, 20, 10, 0];
    let broker = MockBrokerage::new().with_history(
        "1M",
        history(now, &days, &[Some(dec!(0)), Some(dec!(0)), Some(dec!(100)), Some(dec!(110))]),
    );
    let market = MockMarketData::new().with_bars(
        "SPY",
        bars(now, &days, &[dec!(90), dec!(95), dec!(100), dec!(105)]),
    );
    let analyzer = PerformanceAnalyzer::new(
        AccountGateway::new(Arc::new(broker)),
        MarketGateway::new(Arc::new(market)),
        "SPY",
    );

    let report = analyzer.analyze().await.unwrap();

    let month = report.get(Timeframe::OneMonth).unwrap();
    assert_eq!(month.portfolio_return_pct, dec!(10));
    assert_eq!(month.benchmark_return_pct, Some(dec!(5)));
}

#[tokio::test]
async fn midnight_bars_line_up_with_intraday_equity_stamps() {
    let now = Utc::now();
    let days = [20, 10, 0];
    let broker = MockBrokerage::new().with_history(
        "1M",
        history(now, &days, &[Some(dec!(100)), Some(dec!(110)), Some(dec!(121))]),
    );
    let spy = days
        .iter()
        .zip([dec!(100), dec!(105), dec!(110)])
        .map(|(d, close)| Bar::flat(midnight(now, *d), close))
        .collect();
    let analyzer = PerformanceAnalyzer::new(
        AccountGateway::new(Arc::new(broker)),
        MarketGateway::new(Arc::new(MockMarketData::new().with_bars("SPY", spy))),
        "SPY",
    );

    let report = analyzer.analyze().await.unwrap();

    let month = report.get(Timeframe::OneMonth).unwrap();
    assert_eq!(month.portfolio_return_pct, dec!(21));
    assert_eq!(month.benchmark_return_pct, Some(dec!(10)));
}

#[tokio::test]
async fn performance_compares_against_every_benchmark() {
    let now = Utc::now();
    let days = [20, 10, 0];
    let broker = MockBrokerage::new().with_history(
        "1M",
        history(now, &days, &[Some(dec!(100)), Some(dec!(110)), Some(dec!(121))]),
    );
    let market = MockMarketData::new()
        .with_bars("SPY", bars(now, &days, &[dec!(200), dec!(210), dec!(220)]))
        .with_bars("QQQ", bars(now, &days, &[dec!(100), dec!(110), dec!(120)]))
        .failing("IWM");
    let h = HarnessBuilder::new().broker(broker).market(market).build().await;
    let mut session = h.assistant.new_session();

    let reply = h
        .assistant
        .handle(&mut session, &Harness::user(), PERFORMANCE_COMMAND)
        .await;

    assert!(!reply.error, "{}", reply.response_text);
    assert!(reply
        .response_text
        .contains("1M: +21.00% vs SPY +10.00% (QQQ +20.00%, IWM n/a, AGG n/a)"));
    let csv = String::from_utf8(reply.attachment.unwrap().bytes).unwrap();
    assert!(csv.contains("Timeframe,SPY,QQQ,IWM,AGG"));
    assert!(csv.contains("1M,10.00,20.00,N/A,N/A"));
}
