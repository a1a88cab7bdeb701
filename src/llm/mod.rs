//! LLM integration for the mentor agent.
//!
//! A single OpenAI-compatible HTTP backend sits behind the `LlmProvider`
//! trait. Two layers build on it:
//! - [`Reasoning`]: tool-calling turns for the dispatch loop
//! - [`StructuredClient`]: schema-constrained completions for workflow nodes

pub mod openai;
pub mod provider;
pub mod reasoning;
pub mod structured;

#[cfg(test)]
pub(crate) mod testing;

pub use openai::OpenAiProvider;
pub use provider::*;
pub use reasoning::{Reasoning, ReasoningContext, RespondOutput, RespondResult, TokenUsage};
pub use structured::{StructuredClient, StructuredOutput};

use std::sync::Arc;

use crate::config::AppConfig;
use crate::error::LlmError;

/// Configuration for creating an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: secrecy::SecretString,
    pub model: String,
}

impl From<&AppConfig> for LlmConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        }
    }
}

/// Create an LLM provider from configuration.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    let provider = OpenAiProvider::new(&config.base_url, config.api_key.clone(), &config.model)?;
    tracing::info!("Using OpenAI-compatible endpoint {} (model: {})", config.base_url, config.model);
    Ok(Arc::new(provider))
}
