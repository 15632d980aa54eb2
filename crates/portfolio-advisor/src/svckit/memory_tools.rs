//! Memory Tools

use assistant_core::{Directive, Tool, ToolOutput, ToolSpec};
use async_trait::async_trait;

use super::{required_arg, ToolContext};
use crate::error::{AdvisorError, Result};

/// Remember a fact about the user. The content keeps any colons it contains.
pub struct SaveInfoTool;

#[async_trait]
impl Tool<ToolContext> for SaveInfoTool {
    type Error = AdvisorError;

    fn spec(&self) -> ToolSpec {
        ToolSpec::new(
            "save_info",
            "Remember something about the user (goal, risk_tolerance, preference, note)",
        )
        .required("info_type")
        .required("content")
        .greedy_tail()
        .category("memory")
        .side_effects()
    }

    async fn execute(&self, ctx: &ToolContext, directive: &Directive) -> Result<ToolOutput> {
        let user_id = ctx.user_id()?;
        let info_type = required_arg(directive, 0, "info_type")?.trim().to_lowercase();
        let content = required_arg(directive, 1, "content")?.trim();

        let fact = ctx.user_store.append_fact(user_id, &info_type, content).await?;
        tracing::debug!(user_id, info_type = %fact.info_type, "Fact recorded");

        Ok(ToolOutput::text(
            "save_info",
            format!("Got it, I'll remember that ({info_type})."),
        )
        .with_data(serde_json::to_value(&fact)?))
    }
}
