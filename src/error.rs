//! Error types for the mentor agent.

use std::time::Duration;

/// Top-level error type for the agent.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    #[error("Knowledge graph error: {0}")]
    Graph(#[from] GraphDataError),

    #[error("Server error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// LLM provider errors. Transport and schema-validation failures both land
/// here; nothing at this layer retries.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} rate limited, retry after {retry_after:?}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Tool execution errors.
///
/// These never abort the dispatch loop: the registry renders them into the
/// tool message so the model can explain the failure to the user.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ToolError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Storage failure: {0}")]
    StorageFailure(String),
}

/// Workflow engine errors.
///
/// `NoCheckpoint`, `NotSuspended` and `ResumeTypeMismatch` are the
/// workflow-state errors surfaced to callers of `resume`.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("No checkpoint found for thread {thread_id}")]
    NoCheckpoint { thread_id: String },

    #[error("Thread {thread_id} is not suspended (nothing to resume)")]
    NotSuspended { thread_id: String },

    #[error("Thread {thread_id} has no interrupted run to retry")]
    NothingToRetry { thread_id: String },

    #[error("Resume value mismatch at node {node}: expected {expected}, got {actual}")]
    ResumeTypeMismatch {
        node: String,
        expected: String,
        actual: String,
    },

    #[error("Workflow {workflow} exceeded the step limit of {limit}")]
    StepLimitExceeded { workflow: String, limit: usize },

    #[error("Workflow {workflow} has no node named {node}")]
    UnknownNode { workflow: String, node: String },

    #[error("Invalid workflow graph {workflow}: {reason}")]
    InvalidGraph { workflow: String, reason: String },

    #[error("Checkpointed state for thread {thread_id} could not be decoded: {reason}")]
    StateDecode { thread_id: String, reason: String },

    #[error("Node {node} failed: {reason}")]
    NodeFailed { node: String, reason: String },

    #[error("Model call failed: {0}")]
    Llm(#[from] LlmError),

    #[error("Checkpoint store failed: {0}")]
    Store(#[from] DatabaseError),
}

/// Knowledge-graph file errors. Tool and prompt callers degrade these into
/// descriptive strings instead of failing the turn.
#[derive(Debug, thiserror::Error)]
pub enum GraphDataError {
    #[error("Error: File '{path}' does not exist.")]
    MissingFile { path: String },

    #[error("Error reading JSON from '{path}': {reason}")]
    Malformed { path: String, reason: String },

    #[error("Error: 'concepts' key not found in the JSON data.")]
    MissingConcepts,

    #[error("Error opening '{path}': {reason}")]
    Io { path: String, reason: String },

    #[error("Error saving changes to '{path}': {reason}")]
    Write { path: String, reason: String },
}

/// Result type alias for the agent.
pub type Result<T> = std::result::Result<T, Error>;
