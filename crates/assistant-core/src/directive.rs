//! Directive Grammar
//!
//! A directive is a single line embedded in free text:
//!
//! ```text
//! ACTION:<tool>:<arg1>:<arg2>...
//! ```
//!
//! Fields are colon-delimited and positional. Each tool declares how many
//! fields it requires and how many optional trailing fields it accepts; an
//! empty optional field counts as absent. A tool may declare a greedy tail,
//! in which case its last field keeps any further colons verbatim.
//!
//! Lines that do not start with the marker are plain conversation. Lines that
//! do start with it but fail the table are errors, never silently ignored.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Prefix that marks a directive line
pub const DIRECTIVE_MARKER: &str = "ACTION:";

/// Grammar violations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DirectiveError {
    #[error("directive has no tool name")]
    MissingToolName,

    #[error("unknown tool '{0}'")]
    UnknownTool(String),

    #[error("'{tool}' takes {expected} argument(s), got {found}")]
    Arity {
        tool: String,
        expected: String,
        found: usize,
    },

    #[error("'{tool}' argument {position} must not be empty")]
    EmptyField { tool: String, position: usize },
}

/// Declared shape of a tool's arguments
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolSpec {
    /// Unique tool identifier (first directive field)
    pub name: String,

    /// Human-readable description (shown to the LLM)
    pub description: String,

    /// Positional argument names, required ones first
    pub params: Vec<String>,

    /// Number of leading params that must be present and non-empty
    pub required: usize,

    /// Last param swallows the remainder of the line
    #[serde(default)]
    pub greedy_tail: bool,

    /// Category for grouping in the prompt
    #[serde(default)]
    pub category: Option<String>,

    /// Whether the tool changes external state
    #[serde(default)]
    pub has_side_effects: bool,
}

impl ToolSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            params: Vec::new(),
            required: 0,
            greedy_tail: false,
            category: None,
            has_side_effects: false,
        }
    }

    /// Append a required param. Must be called before any `optional`.
    pub fn required(mut self, param: impl Into<String>) -> Self {
        debug_assert_eq!(self.required, self.params.len(), "required after optional");
        self.params.push(param.into());
        self.required += 1;
        self
    }

    pub fn optional(mut self, param: impl Into<String>) -> Self {
        self.params.push(param.into());
        self
    }

    pub const fn greedy_tail(mut self) -> Self {
        self.greedy_tail = true;
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub const fn side_effects(mut self) -> Self {
        self.has_side_effects = true;
        self
    }

    pub fn max_args(&self) -> usize {
        self.params.len()
    }

    /// Example line as shown to the model, e.g. `ACTION:get_price:SYMBOL`
    pub fn usage(&self) -> String {
        let mut line = format!("{DIRECTIVE_MARKER}{}", self.name);
        for (i, param) in self.params.iter().enumerate() {
            if i < self.required {
                line.push_str(&format!(":{}", param.to_uppercase()));
            } else {
                line.push_str(&format!(":[{}]", param.to_uppercase()));
            }
        }
        line
    }

    fn expected(&self) -> String {
        if self.required == self.max_args() {
            self.required.to_string()
        } else {
            format!("{}-{}", self.required, self.max_args())
        }
    }
}

/// A parsed, arity-checked command
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Directive {
    pub tool_name: String,
    pub args: Vec<String>,
}

impl Directive {
    pub fn new<I, S>(tool_name: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tool_name: tool_name.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Positional argument; absent and empty fields are both `None`
    pub fn arg(&self, index: usize) -> Option<&str> {
        self.args
            .get(index)
            .map(String::as_str)
            .filter(|s| !s.is_empty())
    }

    /// Render back to directive syntax
    pub fn to_line(&self) -> String {
        let mut line = format!("{DIRECTIVE_MARKER}{}", self.tool_name);
        for arg in &self.args {
            line.push(':');
            line.push_str(arg);
        }
        line
    }

    /// Check the argument count against a spec
    pub fn validate(&self, spec: &ToolSpec) -> Result<(), DirectiveError> {
        let found = self.args.len();
        if found < spec.required || found > spec.max_args() {
            return Err(DirectiveError::Arity {
                tool: self.tool_name.clone(),
                expected: spec.expected(),
                found,
            });
        }
        if let Some(position) = self.args[..spec.required]
            .iter()
            .position(String::is_empty)
        {
            return Err(DirectiveError::EmptyField {
                tool: self.tool_name.clone(),
                position: position + 1,
            });
        }
        Ok(())
    }
}

/// Strip decoration models like to put around a directive line
fn clean_line(line: &str) -> &str {
    line.trim()
        .trim_start_matches(['-', '*', '>'])
        .trim()
        .trim_matches('`')
        .trim()
}

/// Parse one line against the tool table.
///
/// Returns `None` when the line is plain text.
pub fn parse_line<'s, F>(line: &str, spec_for: F) -> Option<Result<Directive, DirectiveError>>
where
    F: Fn(&str) -> Option<&'s ToolSpec>,
{
    let body = clean_line(line).strip_prefix(DIRECTIVE_MARKER)?;
    Some(parse_body(body, spec_for))
}

fn parse_body<'s, F>(body: &str, spec_for: F) -> Result<Directive, DirectiveError>
where
    F: Fn(&str) -> Option<&'s ToolSpec>,
{
    let (name, rest) = match body.split_once(':') {
        Some((name, rest)) => (name.trim(), Some(rest)),
        None => (body.trim(), None),
    };
    if name.is_empty() {
        return Err(DirectiveError::MissingToolName);
    }
    let spec = spec_for(name).ok_or_else(|| DirectiveError::UnknownTool(name.to_string()))?;

    let args: Vec<String> = match rest {
        None => Vec::new(),
        Some(rest) if spec.greedy_tail && spec.max_args() > 0 => rest
            .splitn(spec.max_args(), ':')
            .map(|f| f.trim().to_string())
            .collect(),
        Some(rest) => rest.split(':').map(|f| f.trim().to_string()).collect(),
    };

    let directive = Directive {
        tool_name: spec.name.clone(),
        args,
    };
    directive.validate(spec)?;
    Ok(directive)
}

/// Find the first well-formed directive in free text.
///
/// Returns the first grammar error only if no marker line is well-formed.
pub fn find_directive<'s, F>(
    text: &str,
    spec_for: F,
) -> Option<Result<Directive, DirectiveError>>
where
    F: Fn(&str) -> Option<&'s ToolSpec> + Copy,
{
    let mut first_error = None;
    for line in text.lines() {
        match parse_line(line, spec_for) {
            Some(Ok(directive)) => return Some(Ok(directive)),
            Some(Err(e)) if first_error.is_none() => first_error = Some(e),
            _ => {}
        }
    }
    first_error.map(Err)
}

/// Remove directive lines from a reply before showing it to the user
pub fn strip_directives(text: &str) -> String {
    text.lines()
        .filter(|line| !clean_line(line).starts_with(DIRECTIVE_MARKER))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}
