//! Conversation Orchestrator
//!
//! One call per user message. The turn runs through, in order:
//!
//! 1. the `__init__` greeting (no model call)
//! 2. credential capture, held as pending until both halves arrive
//! 3. `clear`, then binding stored credentials to a session opened without
//!    a greeting, then the performance-analysis command
//! 4. directives typed by the user and shortcut phrases (no first model call)
//! 5. the model-driven directive loop
//!
//! Failures never escape a turn: they come back as a reply with
//! `error: true` and user-safe text.

use std::fmt::Write as _;
use std::sync::Arc;

use assistant_core::{Agent, AgentBuilder, LlmProvider, Message, Session, Turn};
use serde::{Deserialize, Serialize};

use crate::analysis::{Attachment, CsvReportGenerator, PerformanceAnalyzer, PerformanceReport, ReportGenerator};
use crate::config::AdvisorConfig;
use crate::credentials::{CaptureStep, CredentialCapture, CredentialPair, CredentialValidator};
use crate::error::{AdvisorError, Result};
use crate::exchange::{BrokerageClient, BrokerageConnector, MarketDataClient};
use crate::gateway::{AccountGateway, MarketGateway};
use crate::intent;
use crate::store::UserStore;
use crate::svckit::{self, ToolContext};
use crate::ADVISOR_PROMPT;

/// Sentinel message the client sends when a chat window opens
pub const INIT_SENTINEL: &str = "__init__";

/// Command that starts the multi-step performance analysis
pub const PERFORMANCE_COMMAND: &str = "portfolio-performance";

const GENERIC_ERROR: &str = "I apologize, but I encountered an error. Please try again.";

const ONBOARDING_GREETING: &str = "Hello! I'm your AI financial assistant. I can help you manage \
your portfolio and provide market insights.\n\n\
I notice you haven't set up your Alpaca trading account credentials yet. Paste your API key and \
secret key here and I'll connect your paper trading account. That lets me help you with:\n\
• Real-time portfolio tracking\n\
• Trade monitoring\n\
• Market analysis\n\
• Stock information";

const READY_GREETING: &str = "Welcome back! Your Alpaca account is connected. I can help you with:\n\
• Checking your portfolio value and positions\n\
• Viewing your recent trades\n\
• Analyzing market trends\n\
• Getting stock information\n\n\
What would you like to know about?";

const REMEDIATION_GREETING: &str = "Welcome back! I couldn't connect to Alpaca with the \
credentials on file; they may have been revoked or regenerated. Paste a fresh API key and secret \
key here to reconnect. Until then I can still look up market data for you.";

const CONTEXT_WITH_CREDENTIALS: &str =
    "The user has Alpaca trading account credentials set up and can perform portfolio operations.";
const CONTEXT_WITHOUT_CREDENTIALS: &str =
    "The user has not set up their Alpaca trading account credentials yet.";

/// Who is talking
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct UserContext {
    /// Authenticated id; `None` for anonymous chats
    pub user_id: Option<String>,
    pub has_credentials: bool,
}

impl UserContext {
    pub fn new(user_id: impl Into<String>, has_credentials: bool) -> Self {
        Self {
            user_id: Some(user_id.into()),
            has_credentials,
        }
    }

    pub const fn anonymous() -> Self {
        Self {
            user_id: None,
            has_credentials: false,
        }
    }
}

/// Intermediate step of a long-running command
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub response_text: String,
    pub in_progress: bool,
}

/// What the caller shows for one turn
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AssistantReply {
    pub response_text: String,
    pub requires_action: bool,
    pub error: bool,

    /// Set on intermediate progress records only
    pub in_progress: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<Attachment>,

    /// Steps a long-running command went through, in order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub progress_messages: Vec<ProgressUpdate>,
}

impl AssistantReply {
    pub fn text(response_text: impl Into<String>) -> Self {
        Self {
            response_text: response_text.into(),
            ..Self::default()
        }
    }

    fn action(response_text: impl Into<String>) -> Self {
        Self {
            requires_action: true,
            ..Self::text(response_text)
        }
    }

    fn failure(error: &AdvisorError) -> Self {
        let response_text = match error {
            AdvisorError::Agent(_) | AdvisorError::Network(_) | AdvisorError::Storage(_) => {
                GENERIC_ERROR.to_string()
            }
            other => other.user_message(),
        };
        Self {
            error: true,
            ..Self::text(response_text)
        }
    }

    fn from_turn(turn: Turn) -> Self {
        Self {
            requires_action: turn.requires_action(),
            ..Self::text(turn.text)
        }
    }
}

/// Conversation state for one chat window
pub struct AssistantSession {
    session: Session,
    brokerage: Option<Arc<dyn BrokerageClient>>,
    capture: CredentialCapture,

    /// Stored credentials were already tried for this session
    restore_attempted: bool,
}

impl AssistantSession {
    /// Replace the brokerage binding; `None` unbinds
    pub fn rebind(&mut self, brokerage: Option<Arc<dyn BrokerageClient>>) {
        self.brokerage = brokerage;
    }

    pub const fn is_bound(&self) -> bool {
        self.brokerage.is_some()
    }

    /// A half-entered credential pair is waiting for its counterpart
    pub const fn has_pending_credentials(&self) -> bool {
        self.capture.is_pending()
    }

    pub const fn session(&self) -> &Session {
        &self.session
    }

    /// Drop history and any pending credential half
    pub fn clear(&mut self) {
        self.session.clear();
        self.capture.clear();
    }
}

impl std::fmt::Debug for AssistantSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssistantSession")
            .field("session", &self.session.id)
            .field("brokerage", &self.brokerage.as_ref().map(|b| b.name().to_string()))
            .field("capture", &self.capture)
            .finish()
    }
}

/// The portfolio assistant
pub struct Assistant {
    agent: Agent<ToolContext, AdvisorError>,
    validator: CredentialValidator,
    user_store: Arc<dyn UserStore>,
    market: Arc<dyn MarketDataClient>,
    reports: Arc<dyn ReportGenerator>,
    config: AdvisorConfig,
}

impl Assistant {
    /// Assistant with every directive tool and the CSV report generator
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        connector: Arc<dyn BrokerageConnector>,
        market: Arc<dyn MarketDataClient>,
        user_store: Arc<dyn UserStore>,
        config: AdvisorConfig,
    ) -> Result<Self> {
        let agent = AgentBuilder::new()
            .provider(provider)
            .tools(svckit::registry())
            .system_prompt(ADVISOR_PROMPT)
            .model(config.model.clone())
            .build()?;

        Ok(Self {
            agent,
            validator: CredentialValidator::new(connector),
            user_store,
            market,
            reports: Arc::new(CsvReportGenerator),
            config,
        })
    }

    #[must_use]
    pub fn with_report_generator(mut self, reports: Arc<dyn ReportGenerator>) -> Self {
        self.reports = reports;
        self
    }

    pub const fn config(&self) -> &AdvisorConfig {
        &self.config
    }

    /// Fresh, unbound session
    pub fn new_session(&self) -> AssistantSession {
        AssistantSession {
            session: self.agent.new_session(self.config.history_bound),
            brokerage: None,
            capture: CredentialCapture::default(),
            restore_attempted: false,
        }
    }

    /// Handle one user message
    pub async fn handle(
        &self,
        session: &mut AssistantSession,
        user: &UserContext,
        text: &str,
    ) -> AssistantReply {
        match self.turn(session, user, text.trim()).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!(error = %e, "Turn failed");
                AssistantReply::failure(&e)
            }
        }
    }

    async fn turn(
        &self,
        session: &mut AssistantSession,
        user: &UserContext,
        text: &str,
    ) -> Result<AssistantReply> {
        if text == INIT_SENTINEL {
            return self.greet(session, user).await;
        }

        match session.capture.absorb(text) {
            CaptureStep::NotCredentials => {}
            CaptureStep::NeedSecret => {
                tracing::debug!("Holding API key until the secret arrives");
                return Ok(AssistantReply::action(
                    "Got your API key. Now please send your secret key so I can connect your account.",
                ));
            }
            CaptureStep::NeedKey => {
                tracing::debug!("Holding secret key until the API key arrives");
                return Ok(AssistantReply::action(
                    "Got your secret key. Now please send your API key (it starts with PK or AK).",
                ));
            }
            CaptureStep::Complete(pair) => return self.connect(session, user, &pair).await,
        }

        if text.eq_ignore_ascii_case("clear") {
            session.clear();
            return Ok(AssistantReply::text("Conversation cleared. How can I help?"));
        }
        self.restore_binding(session, user).await?;
        if is_performance_request(text) {
            return self.performance(session, text).await;
        }

        let ctx = self.tool_context(session, user);

        if let Some(parsed) = self.agent.find_directive(text) {
            let directive = parsed.map_err(AdvisorError::from)?;
            tracing::debug!(tool = %directive.tool_name, "User supplied a directive");
            let turn = self.agent.run_directive(&mut session.session, &ctx, text, directive).await;
            return Ok(AssistantReply::from_turn(turn));
        }
        if let Some(directive) = intent::shortcut(text) {
            tracing::debug!(tool = %directive.tool_name, "Shortcut phrase");
            let turn = self.agent.run_directive(&mut session.session, &ctx, text, directive).await;
            return Ok(AssistantReply::from_turn(turn));
        }

        let note = if user.has_credentials || session.is_bound() {
            CONTEXT_WITH_CREDENTIALS
        } else {
            CONTEXT_WITHOUT_CREDENTIALS
        };
        let turn = self.agent.reply(&mut session.session, &ctx, text, Some(note)).await?;
        Ok(AssistantReply::from_turn(turn))
    }

    /// Greeting, checking stored credentials against the brokerage
    async fn greet(&self, session: &mut AssistantSession, user: &UserContext) -> Result<AssistantReply> {
        session.restore_attempted = true;
        let stored = match user.user_id.as_deref() {
            Some(user_id) => self.user_store.get_credentials(user_id).await?,
            None => None,
        };
        let Some(pair) = stored else {
            session.rebind(None);
            return Ok(AssistantReply::text(ONBOARDING_GREETING));
        };

        match self.validator.verify(&pair).await {
            Ok(client) => {
                session.rebind(Some(client));
                Ok(AssistantReply::text(READY_GREETING))
            }
            Err(AdvisorError::CredentialAuth | AdvisorError::CredentialFormat(_)) => {
                session.rebind(None);
                Ok(AssistantReply::action(REMEDIATION_GREETING))
            }
            Err(e) => Err(e),
        }
    }

    /// Bind an unbound session to the user's stored credentials. Tried once
    /// per session; a rejected pair leaves the session unbound.
    async fn restore_binding(&self, session: &mut AssistantSession, user: &UserContext) -> Result<()> {
        if session.is_bound() || session.restore_attempted || !user.has_credentials {
            return Ok(());
        }
        let Some(user_id) = user.user_id.as_deref() else {
            return Ok(());
        };
        let Some(pair) = self.user_store.get_credentials(user_id).await? else {
            session.restore_attempted = true;
            return Ok(());
        };

        match self.validator.verify(&pair).await {
            Ok(client) => {
                tracing::debug!(user_id, "Stored credentials bound to session");
                session.rebind(Some(client));
            }
            Err(AdvisorError::CredentialAuth | AdvisorError::CredentialFormat(_)) => {
                tracing::info!(user_id, "Stored credentials no longer accepted");
            }
            Err(e) => return Err(e),
        }
        session.restore_attempted = true;
        Ok(())
    }

    /// Validate a complete pair, then persist and bind it. Nothing changes
    /// unless every step succeeds.
    async fn connect(
        &self,
        session: &mut AssistantSession,
        user: &UserContext,
        pair: &CredentialPair,
    ) -> Result<AssistantReply> {
        let user_id = user
            .user_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or(AdvisorError::IdentityRequired)?;

        let client = match self.validator.verify(pair).await {
            Ok(client) => client,
            Err(e @ (AdvisorError::CredentialAuth | AdvisorError::CredentialFormat(_))) => {
                tracing::info!(user_id, "Credentials rejected; stored state unchanged");
                return Ok(AssistantReply::action(e.user_message()));
            }
            Err(e) => return Err(e),
        };

        self.user_store.save_credentials(user_id, pair).await?;
        session.rebind(Some(client));

        Ok(AssistantReply::text(
            "Your Alpaca account is connected and your credentials are saved. \
             Ask me for a portfolio summary, your positions, or a performance analysis.",
        ))
    }

    async fn performance(&self, session: &mut AssistantSession, text: &str) -> Result<AssistantReply> {
        let brokerage = session
            .brokerage
            .clone()
            .ok_or(AdvisorError::CredentialsRequired)?;
        let analyzer = PerformanceAnalyzer::new(
            AccountGateway::new(brokerage),
            MarketGateway::new(self.market.clone()),
            &self.config.benchmark_symbol,
        )
        .with_comparisons(&self.config.comparison_symbols);

        let mut steps = Vec::new();
        let report = analyzer
            .analyze_with_progress(|step| {
                steps.push(ProgressUpdate {
                    response_text: step,
                    in_progress: true,
                });
            })
            .await?;
        let attachment = self.reports.render(&report)?;

        let summary = performance_summary(&report);
        session.session.record(Message::user(text));
        session.session.record(Message::assistant(&summary));

        Ok(AssistantReply {
            attachment: Some(attachment),
            progress_messages: steps,
            ..AssistantReply::text(summary)
        })
    }

    fn tool_context(&self, session: &AssistantSession, user: &UserContext) -> ToolContext {
        ToolContext {
            brokerage: session.brokerage.clone(),
            market: self.market.clone(),
            user_id: user.user_id.clone(),
            user_store: self.user_store.clone(),
        }
    }
}

fn is_performance_request(text: &str) -> bool {
    text.eq_ignore_ascii_case(PERFORMANCE_COMMAND)
        || text.to_lowercase().contains("performance analysis")
}

fn performance_summary(report: &PerformanceReport) -> String {
    let mut text = String::from("Here's how your portfolio has performed:\n");
    for (timeframe, result) in &report.timeframes {
        let benchmark = result.benchmark_return_pct.map_or_else(
            || format!("{} n/a", report.benchmark_symbol),
            |b| format!("{} {}", report.benchmark_symbol, svckit::signed_pct(b)),
        );
        let _ = write!(
            text,
            "  {timeframe}: {} vs {benchmark}",
            svckit::signed_pct(result.portfolio_return_pct)
        );
        if !result.comparisons.is_empty() {
            let others: Vec<String> = result
                .comparisons
                .iter()
                .map(|c| match c.return_pct {
                    Some(r) => format!("{} {}", c.symbol, svckit::signed_pct(r)),
                    None => format!("{} n/a", c.symbol),
                })
                .collect();
            let _ = write!(text, " ({})", others.join(", "));
        }
        text.push('\n');
    }
    text.push_str("The full report, including per-asset returns, is attached.");
    text
}
