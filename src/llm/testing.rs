//! Scripted provider for unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::LlmError;
use crate::llm::{
    CompletionRequest, CompletionResponse, FinishReason, LlmProvider, ToolCall,
    ToolCompletionRequest, ToolCompletionResponse,
};

/// Replays queued replies in order and records every request.
#[derive(Default)]
pub struct ScriptedLlm {
    completions: Mutex<VecDeque<String>>,
    tool_turns: Mutex<VecDeque<ToolCompletionResponse>>,
    pub requests: Mutex<Vec<CompletionRequest>>,
    pub tool_requests: Mutex<Vec<ToolCompletionRequest>>,
}

impl ScriptedLlm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a structured (JSON) completion.
    pub fn complete_with(self, value: serde_json::Value) -> Self {
        self.completions.lock().unwrap().push_back(value.to_string());
        self
    }

    /// Queue a plain text turn for the tool-calling endpoint.
    pub fn say(self, text: &str) -> Self {
        self.tool_turns.lock().unwrap().push_back(ToolCompletionResponse {
            content: Some(text.to_string()),
            tool_calls: Vec::new(),
            input_tokens: 0,
            output_tokens: 0,
            finish_reason: FinishReason::Stop,
        });
        self
    }

    /// Queue a tool-calling turn.
    pub fn call(self, calls: Vec<ToolCall>) -> Self {
        self.tool_turns.lock().unwrap().push_back(ToolCompletionResponse {
            content: None,
            tool_calls: calls,
            input_tokens: 0,
            output_tokens: 0,
            finish_reason: FinishReason::ToolUse,
        });
        self
    }

    pub fn completion_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Text of the last user message in the `n`th structured request.
    pub fn user_prompt(&self, n: usize) -> String {
        let requests = self.requests.lock().unwrap();
        requests[n]
            .messages
            .iter()
            .rev()
            .find(|m| m.role == crate::llm::Role::User)
            .map(|m| m.content.clone())
            .unwrap_or_default()
    }

    fn exhausted() -> LlmError {
        LlmError::RequestFailed {
            provider: "scripted".into(),
            reason: "script exhausted".into(),
        }
    }
}

pub fn tool_call(id: &str, name: &str, arguments: serde_json::Value) -> ToolCall {
    ToolCall {
        id: id.into(),
        name: name.into(),
        arguments,
    }
}

#[async_trait]
impl LlmProvider for ScriptedLlm {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.requests.lock().unwrap().push(request);
        let content = self
            .completions
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(Self::exhausted)?;
        Ok(CompletionResponse {
            content,
            input_tokens: 0,
            output_tokens: 0,
            finish_reason: FinishReason::Stop,
        })
    }

    async fn complete_with_tools(
        &self,
        request: ToolCompletionRequest,
    ) -> Result<ToolCompletionResponse, LlmError> {
        self.tool_requests.lock().unwrap().push(request);
        self.tool_turns
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(Self::exhausted)
    }
}
