//! Directive Loop
//!
//! One conversational turn: the model sees the bounded history, may answer
//! with a directive line, the directive is dispatched, its result (or the
//! reason it failed) is injected as an assistant turn, and the model is asked
//! once more to turn that into a final answer.
//!
//! At most one directive is dispatched per turn.

use std::fmt::Display;
use std::sync::Arc;

use crate::directive::{self, Directive, DirectiveError};
use crate::error::{AgentError, Result, UserFacing};
use crate::message::{Message, Role};
use crate::provider::{GenerationOptions, LlmProvider};
use crate::session::Session;
use crate::tool::{ToolOutput, ToolRegistry};

/// Agent configuration
#[derive(Clone, Debug)]
pub struct AgentConfig {
    /// System prompt template
    pub system_prompt: String,

    /// Generation options
    pub generation: GenerationOptions,

    /// Whether to append tool descriptions to system prompt
    pub inject_tool_descriptions: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.into(),
            generation: GenerationOptions::default(),
            inject_tool_descriptions: true,
        }
    }
}

const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant. \
If you need external data, reply with a single directive line. \
After receiving a tool result, answer the user in plain language.";

/// What happened during one turn
#[derive(Clone, Debug, Default)]
pub struct Turn {
    /// Final text shown to the user, directive lines removed
    pub text: String,

    /// Directive that was dispatched, if any
    pub directive: Option<Directive>,

    /// Successful tool output
    pub tool_output: Option<ToolOutput>,

    /// User-safe reason the directive failed
    pub tool_error: Option<String>,
}

impl Turn {
    /// Whether the turn reached for a tool
    pub const fn requires_action(&self) -> bool {
        self.directive.is_some() || self.tool_error.is_some()
    }
}

/// Outcome of dispatching one directive
enum Dispatched {
    Ok(ToolOutput),
    Failed { tool: String, reason: String },
}

/// The directive-loop engine
pub struct Agent<C, E> {
    provider: Arc<dyn LlmProvider>,
    tools: Arc<ToolRegistry<C, E>>,
    config: AgentConfig,
}

impl<C, E> Agent<C, E>
where
    C: Send + Sync,
    E: From<DirectiveError> + UserFacing + Display + Send,
{
    /// Create a new agent
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        tools: Arc<ToolRegistry<C, E>>,
        config: AgentConfig,
    ) -> Self {
        Self {
            provider,
            tools,
            config,
        }
    }

    /// Full system prompt including tool descriptions
    pub fn system_prompt(&self) -> String {
        let mut prompt = self.config.system_prompt.clone();

        if self.config.inject_tool_descriptions && !self.tools.is_empty() {
            prompt.push_str("\n\n");
            prompt.push_str(&self.tools.generate_prompt_section());
        }

        prompt
    }

    /// Start a session seeded with this agent's system prompt
    pub fn new_session(&self, history_bound: usize) -> Session {
        Session::new(self.system_prompt(), history_bound)
    }

    /// Run one model-driven turn.
    ///
    /// `context_note` is sent with each model call but never stored.
    pub async fn reply(
        &self,
        session: &mut Session,
        ctx: &C,
        user_text: &str,
        context_note: Option<&str>,
    ) -> Result<Turn> {
        session.record(Message::user(user_text));

        let first = self.complete(session, context_note).await?;
        session.record(Message::assistant(&first));

        let Some(parsed) = self.tools.find_directive(&first) else {
            return Ok(Turn {
                text: first,
                ..Turn::default()
            });
        };

        let (directive, dispatched) = match parsed {
            Ok(directive) => {
                let outcome = self.dispatch(ctx, &directive).await;
                (Some(directive), outcome)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Model emitted a malformed directive");
                let tool = match &e {
                    DirectiveError::UnknownTool(name) => name.clone(),
                    DirectiveError::Arity { tool, .. } | DirectiveError::EmptyField { tool, .. } => {
                        tool.clone()
                    }
                    DirectiveError::MissingToolName => "directive".into(),
                };
                let reason = E::from(e).user_message();
                (None, Dispatched::Failed { tool, reason })
            }
        };

        session.record(Message::assistant(dispatched.injection()));

        let synthesis = self.complete(session, context_note).await?;
        let mut text = directive::strip_directives(&synthesis);
        if text.is_empty() {
            text = dispatched.fallback_text();
        }
        session.record(Message::assistant(&text));

        Ok(dispatched.into_turn(text, directive))
    }

    /// Run a directive the user supplied directly, skipping the model.
    ///
    /// The tool text (or failure reason) becomes the reply.
    pub async fn run_directive(
        &self,
        session: &mut Session,
        ctx: &C,
        user_text: &str,
        directive: Directive,
    ) -> Turn {
        session.record(Message::user(user_text));

        let dispatched = self.dispatch(ctx, &directive).await;
        session.record(Message::assistant(dispatched.injection()));

        let text = dispatched.fallback_text();
        dispatched.into_turn(text, Some(directive))
    }

    /// Parse `text` against the registry
    pub fn find_directive(&self, text: &str) -> Option<std::result::Result<Directive, DirectiveError>> {
        self.tools.find_directive(text)
    }

    pub fn tools(&self) -> &ToolRegistry<C, E> {
        &self.tools
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    async fn dispatch(&self, ctx: &C, directive: &Directive) -> Dispatched {
        match self.tools.dispatch(ctx, directive).await {
            Ok(output) => Dispatched::Ok(output),
            Err(e) => {
                tracing::warn!(tool = %directive.tool_name, error = %e, "Tool failed");
                Dispatched::Failed {
                    tool: directive.tool_name.clone(),
                    reason: e.user_message(),
                }
            }
        }
    }

    /// Model call over the bounded history plus the transient note
    async fn complete(&self, session: &Session, context_note: Option<&str>) -> Result<String> {
        let messages = with_context_note(session.history.messages(), context_note);
        let completion = self
            .provider
            .complete(&messages, &self.config.generation)
            .await?;

        if completion.content.trim().is_empty() {
            return Err(AgentError::Provider("empty completion".into()));
        }
        Ok(completion.content.trim().to_string())
    }
}

impl Dispatched {
    fn injection(&self) -> String {
        match self {
            Self::Ok(output) => format!("[{} result]\n{}", output.name, output.text),
            Self::Failed { tool, reason } => format!("[{tool} failed]\n{reason}"),
        }
    }

    fn fallback_text(&self) -> String {
        match self {
            Self::Ok(output) => output.text.clone(),
            Self::Failed { reason, .. } => reason.clone(),
        }
    }

    fn into_turn(self, text: String, directive: Option<Directive>) -> Turn {
        match self {
            Self::Ok(output) => Turn {
                text,
                directive,
                tool_output: Some(output),
                tool_error: None,
            },
            Self::Failed { reason, .. } => Turn {
                text,
                directive,
                tool_output: None,
                tool_error: Some(reason),
            },
        }
    }
}

/// Insert the note right after the system prompt
fn with_context_note(messages: &[Message], note: Option<&str>) -> Vec<Message> {
    let Some(note) = note else {
        return messages.to_vec();
    };
    let at = usize::from(messages.first().is_some_and(|m| m.role == Role::System));
    let mut out = Vec::with_capacity(messages.len() + 1);
    out.extend_from_slice(&messages[..at]);
    out.push(Message::system(note));
    out.extend_from_slice(&messages[at..]);
    out
}

/// Builder for Agent configuration
pub struct AgentBuilder<C, E> {
    provider: Option<Arc<dyn LlmProvider>>,
    tools: ToolRegistry<C, E>,
    config: AgentConfig,
}

impl<C, E> Default for AgentBuilder<C, E>
where
    C: Send + Sync,
    E: From<DirectiveError> + UserFacing + Display + Send,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<C, E> AgentBuilder<C, E>
where
    C: Send + Sync,
    E: From<DirectiveError> + UserFacing + Display + Send,
{
    pub fn new() -> Self {
        Self {
            provider: None,
            tools: ToolRegistry::new(),
            config: AgentConfig::default(),
        }
    }

    pub fn provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn tool<T: crate::tool::Tool<C, Error = E> + 'static>(mut self, tool: T) -> Self {
        self.tools.register(tool);
        self
    }

    pub fn tools(mut self, tools: ToolRegistry<C, E>) -> Self {
        self.tools = tools;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = prompt.into();
        self
    }

    pub fn generation(mut self, generation: GenerationOptions) -> Self {
        self.config.generation = generation;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.generation.model = model.into();
        self
    }

    pub const fn temperature(mut self, temp: f32) -> Self {
        self.config.generation.temperature = temp;
        self
    }

    pub fn build(self) -> Result<Agent<C, E>> {
        let provider = self
            .provider
            .ok_or_else(|| AgentError::Config("Provider is required".into()))?;

        Ok(Agent::new(provider, Arc::new(self.tools), self.config))
    }
}
