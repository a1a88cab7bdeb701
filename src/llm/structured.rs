//! Structured-output client.
//!
//! Each workflow node asks the model for one of a fixed set of typed shapes.
//! The shape's JSON schema is sent as the response format, and the reply is
//! parsed and validated before the node ever sees it.

use std::sync::Arc;

use schemars::JsonSchema;
use serde::de::DeserializeOwned;

use crate::error::LlmError;
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider, ResponseFormat};

/// A typed model result with a schema and field-level validation.
pub trait StructuredOutput: DeserializeOwned + JsonSchema + Send {
    /// Schema name advertised to the provider.
    const NAME: &'static str;

    /// Check constraints the schema cannot express.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

/// JSON schema for `T` as sent to the provider.
pub fn schema_value<T: StructuredOutput>() -> serde_json::Value {
    let schema = schemars::schema_for!(T);
    serde_json::to_value(schema).unwrap_or_else(|_| serde_json::json!({"type": "object"}))
}

/// Calls the model and coerces the reply into a typed shape.
#[derive(Clone)]
pub struct StructuredClient {
    llm: Arc<dyn LlmProvider>,
}

impl StructuredClient {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }

    pub async fn invoke<T: StructuredOutput>(
        &self,
        messages: Vec<ChatMessage>,
    ) -> Result<T, LlmError> {
        let request = CompletionRequest::new(messages).with_response_format(
            ResponseFormat::JsonSchema {
                name: T::NAME.to_string(),
                schema: schema_value::<T>(),
            },
        );

        let response = self.llm.complete(request).await?;
        tracing::debug!(
            shape = T::NAME,
            model = %self.llm.model_name(),
            output_tokens = response.output_tokens,
            "Structured completion received"
        );

        parse_structured(self.llm.model_name(), &response.content)
    }
}

/// Parse and validate a raw model reply.
pub fn parse_structured<T: StructuredOutput>(provider: &str, raw: &str) -> Result<T, LlmError> {
    let body = strip_code_fences(raw);
    let value: T = serde_json::from_str(body).map_err(|e| LlmError::InvalidResponse {
        provider: provider.to_string(),
        reason: format!("failed to parse {}: {e}", T::NAME),
    })?;
    value.validate().map_err(|reason| LlmError::InvalidResponse {
        provider: provider.to_string(),
        reason: format!("{} failed validation: {reason}", T::NAME),
    })?;
    Ok(value)
}

/// Remove a surrounding markdown code fence (```json ... ```), if present.
fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Skip the info string ("json") on the opening fence line.
    let rest = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
