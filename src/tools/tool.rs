//! The `Tool` trait and helpers shared by every tool.

use std::time::Duration;

use async_trait::async_trait;

use crate::context::ToolContext;
pub use crate::error::ToolError;

/// Output of a tool call.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    /// Plain strings are sent to the model verbatim; anything else as JSON.
    pub result: serde_json::Value,
    pub duration: Duration,
}

impl ToolOutput {
    /// Structured result.
    pub fn success(result: serde_json::Value, duration: Duration) -> Self {
        Self { result, duration }
    }

    /// Plain text result.
    pub fn text(text: impl Into<String>, duration: Duration) -> Self {
        Self {
            result: serde_json::Value::String(text.into()),
            duration,
        }
    }

    /// Content of the tool message sent back to the model.
    pub fn render(&self) -> String {
        match &self.result {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// A callable capability exposed to the model.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON schema of the arguments object. `required` lists the arguments in
    /// signature order.
    fn parameters_schema(&self) -> serde_json::Value;

    async fn execute(
        &self,
        params: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<ToolOutput, ToolError>;
}

/// Fetch a required string argument.
pub fn require_str<'a>(params: &'a serde_json::Value, name: &str) -> Result<&'a str, ToolError> {
    params
        .get(name)
        .and_then(|v| v.as_str())
        .ok_or_else(|| ToolError::InvalidArgument(format!("missing '{name}' parameter")))
}
