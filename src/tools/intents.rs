//! Session intents: pseudo-tools the model calls to enter a learning or
//! assessment session. They are advertised like tools but routed by the
//! dispatch loop instead of the registry.

use crate::error::ToolError;
use crate::llm::{ToolCall, ToolDefinition};

pub const LEARNING_SESSION: &str = "LearningSession";
pub const ASSESSMENT_SESSION: &str = "AssessmentSession";

/// Which session a tool call asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionIntent {
    Learning,
    Assessment,
}

impl SessionIntent {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            LEARNING_SESSION => Some(Self::Learning),
            ASSESSMENT_SESSION => Some(Self::Assessment),
            _ => None,
        }
    }

    pub fn of(call: &ToolCall) -> Option<Self> {
        Self::from_name(&call.name)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Learning => LEARNING_SESSION,
            Self::Assessment => ASSESSMENT_SESSION,
        }
    }

    pub fn definition(&self) -> ToolDefinition {
        let (description, input) = match self {
            Self::Learning => (
                "Start a learning session that teaches a topic step by step.",
                "A topic for the learning session based on knowledge graph data.",
            ),
            Self::Assessment => (
                "Start an assessment session that evaluates the user's understanding.",
                "The topic or skill set to be assessed.",
            ),
        };
        ToolDefinition {
            name: self.name().to_string(),
            description: description.to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "input": {
                        "type": "string",
                        "description": input,
                        "minLength": 1
                    }
                },
                "required": ["input"]
            }),
        }
    }
}

/// Definitions for both intents.
pub fn definitions() -> Vec<ToolDefinition> {
    vec![
        SessionIntent::Learning.definition(),
        SessionIntent::Assessment.definition(),
    ]
}

/// The intent's non-empty `input` argument.
pub fn intent_input(call: &ToolCall) -> Result<String, ToolError> {
    match call.arguments.get("input").and_then(|v| v.as_str()) {
        Some(input) if !input.trim().is_empty() => Ok(input.to_string()),
        _ => Err(ToolError::InvalidArgument(format!(
            "{} requires a non-empty 'input' argument",
            call.name
        ))),
    }
}
