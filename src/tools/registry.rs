//! Tool registry for managing available tools.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::context::ToolContext;
use crate::llm::{ChatMessage, ToolCall, ToolDefinition};
use crate::tools::intents;
use crate::tools::tool::{Tool, ToolError, ToolOutput};

/// Registry of available tools.
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, Arc<dyn Tool>>>,
}

impl ToolRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            tools: RwLock::new(HashMap::new()),
        }
    }

    /// Register a tool at startup.
    ///
    /// Rejects duplicate names, names reserved for session intents, and
    /// argument schemas that are not an object schema whose `required` entries
    /// are all declared properties.
    pub fn register_sync(&self, tool: Arc<dyn Tool>) -> Result<(), ToolError> {
        let name = tool.name().to_string();
        if name.is_empty() {
            return Err(ToolError::InvalidArgument("tool name must not be empty".into()));
        }
        if intents::SessionIntent::from_name(&name).is_some() {
            return Err(ToolError::InvalidArgument(format!(
                "tool name '{name}' is reserved for a session intent"
            )));
        }
        validate_schema(&name, &tool.parameters_schema())?;

        let mut tools = self.tools.try_write().map_err(|_| {
            ToolError::StorageFailure("tool registry is locked during registration".into())
        })?;
        if tools.contains_key(&name) {
            return Err(ToolError::InvalidArgument(format!(
                "tool '{name}' is already registered"
            )));
        }
        tools.insert(name.clone(), tool);
        tracing::debug!("Registered tool: {}", name);
        Ok(())
    }

    /// Get a tool by name.
    pub async fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.read().await.get(name).cloned()
    }

    /// Check if a tool exists.
    pub async fn has(&self, name: &str) -> bool {
        self.tools.read().await.contains_key(name)
    }

    /// List all tool names, sorted.
    pub async fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Get the number of registered tools.
    pub fn count(&self) -> usize {
        self.tools.try_read().map(|t| t.len()).unwrap_or(0)
    }

    /// Get tool definitions for LLM function calling, sorted by name.
    pub async fn tool_definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self
            .tools
            .read()
            .await
            .values()
            .map(|tool| ToolDefinition {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters_schema(),
            })
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Validate a call's arguments and run the tool.
    pub async fn execute(
        &self,
        call: &ToolCall,
        ctx: &ToolContext,
    ) -> Result<ToolOutput, ToolError> {
        let tool = self
            .get(&call.name)
            .await
            .ok_or_else(|| ToolError::NotFound(format!("Tool '{}' is not available.", call.name)))?;
        validate_arguments(&tool.parameters_schema(), &call.arguments)?;
        tool.execute(call.arguments.clone(), ctx).await
    }

    /// Run a call and bind the result to the call id as a tool message.
    ///
    /// Errors become the message content so the model can react to them.
    pub async fn dispatch(&self, call: &ToolCall, ctx: &ToolContext) -> ChatMessage {
        let content = match self.execute(call, ctx).await {
            Ok(output) => {
                tracing::info!(
                    tool = %call.name,
                    call_id = %call.id,
                    elapsed_ms = output.duration.as_millis() as u64,
                    "Tool call succeeded"
                );
                output.render()
            }
            Err(e) => {
                tracing::warn!(tool = %call.name, call_id = %call.id, error = %e, "Tool call failed");
                format!("Error: {e}")
            }
        };
        ChatMessage::tool_result(&call.id, &call.name, content)
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_schema(name: &str, schema: &serde_json::Value) -> Result<(), ToolError> {
    let invalid = |reason: &str| {
        ToolError::InvalidArgument(format!("tool '{name}' has an invalid schema: {reason}"))
    };

    if schema.get("type").and_then(|t| t.as_str()) != Some("object") {
        return Err(invalid("top-level type must be \"object\""));
    }
    let properties = schema
        .get("properties")
        .and_then(|p| p.as_object())
        .ok_or_else(|| invalid("missing \"properties\" object"))?;

    if let Some(required) = schema.get("required") {
        let required = required
            .as_array()
            .ok_or_else(|| invalid("\"required\" must be an array"))?;
        for arg in required {
            let arg = arg
                .as_str()
                .ok_or_else(|| invalid("\"required\" entries must be strings"))?;
            if !properties.contains_key(arg) {
                return Err(invalid(&format!("required argument '{arg}' is not declared")));
            }
        }
    }
    Ok(())
}

fn validate_arguments(
    schema: &serde_json::Value,
    arguments: &serde_json::Value,
) -> Result<(), ToolError> {
    let args = arguments
        .as_object()
        .ok_or_else(|| ToolError::InvalidArgument("arguments must be a JSON object".into()))?;

    let required = schema
        .get("required")
        .and_then(|r| r.as_array())
        .into_iter()
        .flatten()
        .filter_map(|r| r.as_str());
    for arg in required {
        if !args.contains_key(arg) {
            return Err(ToolError::InvalidArgument(format!("missing '{arg}' parameter")));
        }
    }

    if let Some(properties) = schema.get("properties").and_then(|p| p.as_object()) {
        for (arg, value) in args {
            let expected = properties
                .get(arg)
                .and_then(|p| p.get("type"))
                .and_then(|t| t.as_str());
            if expected == Some("string") && !value.is_string() {
                return Err(ToolError::InvalidArgument(format!(
                    "'{arg}' must be a string"
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Role;
    use async_trait::async_trait;
    use std::time::Duration;

    #[derive(Debug)]
    struct MockTool {
        name: String,
    }

    #[async_trait]
    impl Tool for MockTool {
        fn name(&self) -> &str {
            &self.name
        }
        fn description(&self) -> &str {
            "A mock tool for testing"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({
                "type": "object",
                "properties": {"word": {"type": "string"}},
                "required": ["word"]
            })
        }
        async fn execute(
            &self,
            params: serde_json::Value,
            _ctx: &ToolContext,
        ) -> Result<ToolOutput, ToolError> {
            let word = crate::tools::require_str(&params, "word")?;
            Ok(ToolOutput::text(format!("echo {word}"), Duration::from_millis(1)))
        }
    }

    struct BadSchema;

    #[async_trait]
    impl Tool for BadSchema {
        fn name(&self) -> &str {
            "bad"
        }
        fn description(&self) -> &str {
            "Schema requires an undeclared argument"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object", "properties": {}, "required": ["ghost"]})
        }
        async fn execute(
            &self,
            _params: serde_json::Value,
            _ctx: &ToolContext,
        ) -> Result<ToolOutput, ToolError> {
            Ok(ToolOutput::text("never", Duration::ZERO))
        }
    }

    fn mock(name: &str) -> Arc<dyn Tool> {
        Arc::new(MockTool {
            name: name.to_string(),
        })
    }

    fn call(name: &str, arguments: serde_json::Value) -> ToolCall {
        ToolCall {
            id: "call_1".into(),
            name: name.into(),
            arguments,
        }
    }

    fn ctx() -> ToolContext {
        ToolContext::new("u1", "t1")
    }

    #[tokio::test]
    async fn test_register_and_get() {
        let registry = ToolRegistry::new();
        registry.register_sync(mock("test_tool")).unwrap();

        assert!(registry.has("test_tool").await);
        assert!(!registry.has("nonexistent").await);
        assert_eq!(registry.get("test_tool").await.unwrap().name(), "test_tool");
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn test_duplicate_and_reserved_names_rejected() {
        let registry = ToolRegistry::new();
        registry.register_sync(mock("echo")).unwrap();
        assert!(registry.register_sync(mock("echo")).is_err());
        assert!(registry.register_sync(mock("LearningSession")).is_err());
        assert!(registry.register_sync(Arc::new(BadSchema)).is_err());
        assert_eq!(registry.count(), 1);
    }

    #[tokio::test]
    async fn test_definitions_sorted() {
        let registry = ToolRegistry::new();
        registry.register_sync(mock("zeta")).unwrap();
        registry.register_sync(mock("alpha")).unwrap();

        let names: Vec<_> = registry
            .tool_definitions()
            .await
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }

    #[tokio::test]
    async fn test_dispatch_binds_call_id() {
        let registry = ToolRegistry::new();
        registry.register_sync(mock("echo")).unwrap();

        let msg = registry
            .dispatch(&call("echo", serde_json::json!({"word": "hi"})), &ctx())
            .await;
        assert_eq!(msg.role, Role::Tool);
        assert_eq!(msg.tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(msg.content, "echo hi");
    }

    #[tokio::test]
    async fn test_dispatch_renders_errors() {
        let registry = ToolRegistry::new();
        registry.register_sync(mock("echo")).unwrap();

        let unknown = registry.dispatch(&call("nope", serde_json::json!({})), &ctx()).await;
        assert_eq!(unknown.content, "Error: Tool 'nope' is not available.");

        let missing = registry.dispatch(&call("echo", serde_json::json!({})), &ctx()).await;
        assert_eq!(missing.content, "Error: Invalid argument: missing 'word' parameter");

        let wrong_type = registry
            .dispatch(&call("echo", serde_json::json!({"word": 7})), &ctx())
            .await;
        assert!(wrong_type.content.contains("'word' must be a string"));

        let not_object = registry
            .dispatch(&call("echo", serde_json::json!("{broken")), &ctx())
            .await;
        assert!(not_object.content.contains("arguments must be a JSON object"));
    }
}
