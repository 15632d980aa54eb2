//! Tool System
//!
//! Tools are registered at runtime and invoked when a directive names them.
//! The registry owns the arity table: a directive is checked against its
//! tool's [`ToolSpec`] before the tool ever runs, so a malformed directive
//! can never reach a backend.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::directive::{self, Directive, DirectiveError, ToolSpec, DIRECTIVE_MARKER};

/// Result from tool execution
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolOutput {
    /// Tool that was called
    pub name: String,

    /// Human-readable summary folded back into the conversation
    pub text: String,

    /// Structured data (if applicable)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ToolOutput {
    pub fn text(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
            data: None,
        }
    }

    #[must_use]
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// Tool trait - implement to add new capabilities
///
/// `C` is the per-call context (session-bound services); `Error` is the
/// tool family's error type.
#[async_trait]
pub trait Tool<C>: Send + Sync {
    type Error: Send;

    /// Name and argument shape
    fn spec(&self) -> ToolSpec;

    /// Execute with arguments already checked against [`Tool::spec`]
    async fn execute(&self, ctx: &C, directive: &Directive) -> Result<ToolOutput, Self::Error>;
}

/// Registry for available tools
pub struct ToolRegistry<C, E> {
    tools: BTreeMap<String, (ToolSpec, Arc<dyn Tool<C, Error = E>>)>,
}

impl<C, E> Default for ToolRegistry<C, E> {
    fn default() -> Self {
        Self {
            tools: BTreeMap::new(),
        }
    }
}

impl<C, E> ToolRegistry<C, E>
where
    C: Send + Sync,
    E: From<DirectiveError> + Send,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new tool
    pub fn register<T: Tool<C, Error = E> + 'static>(&mut self, tool: T) {
        self.register_arc(Arc::new(tool));
    }

    /// Register a shared tool
    pub fn register_arc(&mut self, tool: Arc<dyn Tool<C, Error = E>>) {
        let spec = tool.spec();
        self.tools.insert(spec.name.clone(), (spec, tool));
    }

    /// Look up a spec by tool name
    pub fn spec(&self, name: &str) -> Option<&ToolSpec> {
        self.tools.get(name).map(|(spec, _)| spec)
    }

    /// Find the first well-formed directive in `text`
    pub fn find_directive(&self, text: &str) -> Option<Result<Directive, DirectiveError>> {
        directive::find_directive(text, |name| self.spec(name))
    }

    /// Validate and execute a directive.
    ///
    /// Arity is checked here, before the tool is reached.
    pub async fn dispatch(&self, ctx: &C, directive: &Directive) -> Result<ToolOutput, E> {
        let (spec, tool) = self
            .tools
            .get(&directive.tool_name)
            .ok_or_else(|| DirectiveError::UnknownTool(directive.tool_name.clone()))?;
        directive.validate(spec)?;

        tracing::debug!(tool = %directive.tool_name, args = directive.args.len(), "Dispatching directive");
        tool.execute(ctx, directive).await
    }

    /// Tool names in sorted order
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    /// Number of registered tools
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Generate system prompt section describing available tools
    pub fn generate_prompt_section(&self) -> String {
        let mut prompt = String::from("## Available Tools\n\n");
        prompt.push_str(
            "To use a tool, put exactly one line in your reply with this format \
             (colon-separated, no spaces around colons):\n\n",
        );
        prompt.push_str(&format!("{DIRECTIVE_MARKER}tool_name:arg1:arg2\n\n"));
        prompt.push_str("Optional arguments may be left empty. Only use one tool per reply.\n\n");

        for (spec, _) in self.tools.values() {
            prompt.push_str(&format!("- `{}` - {}", spec.usage(), spec.description));
            if spec.has_side_effects {
                prompt.push_str(" (changes the account; confirm with the user first)");
            }
            prompt.push('\n');
        }

        prompt
    }
}
