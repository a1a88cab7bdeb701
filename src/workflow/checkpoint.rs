//! Checkpoint model: the persisted position of a workflow run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::WorkflowError;

/// Number of prior snapshots retained on a checkpoint.
pub const MAX_HISTORY: usize = 32;

/// What a suspended node is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AwaitKind {
    /// A continue/stop decision.
    Decision,
    /// A free-text answer.
    Answer,
}

impl std::fmt::Display for AwaitKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Decision => write!(f, "decision"),
            Self::Answer => write!(f, "answer"),
        }
    }
}

/// Payload exposed to the caller when a node suspends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interrupt {
    pub kind: AwaitKind,
    /// Node that requested the suspension.
    pub node: String,
    /// Text to show the human.
    pub message: String,
    /// Structured content behind the message (learning object, evaluation).
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl Interrupt {
    pub fn decision(node: impl Into<String>, message: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            kind: AwaitKind::Decision,
            node: node.into(),
            message: message.into(),
            payload,
        }
    }

    pub fn answer(node: impl Into<String>, message: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            kind: AwaitKind::Answer,
            node: node.into(),
            message: message.into(),
            payload,
        }
    }

    /// Serialize a suspension payload for the run on `thread_id`.
    pub fn payload<T: Serialize>(
        thread_id: &str,
        value: &T,
    ) -> Result<serde_json::Value, WorkflowError> {
        serde_json::to_value(value).map_err(|e| WorkflowError::StateDecode {
            thread_id: thread_id.to_string(),
            reason: e.to_string(),
        })
    }
}

/// Value injected into a suspended node on resume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ResumeValue {
    Decision(bool),
    Answer(String),
}

/// Replies that stop a session when a decision is awaited.
const STOP_WORDS: &[&str] = &["no", "n", "stop", "false", "quit", "exit", "end", "done"];

impl ResumeValue {
    pub fn kind(&self) -> AwaitKind {
        match self {
            Self::Decision(_) => AwaitKind::Decision,
            Self::Answer(_) => AwaitKind::Answer,
        }
    }

    /// Interpret free text from the user as the value `kind` expects.
    pub fn from_text(kind: AwaitKind, text: &str) -> Self {
        match kind {
            AwaitKind::Decision => {
                let normalized = text.trim().to_lowercase();
                Self::Decision(!STOP_WORDS.contains(&normalized.as_str()))
            }
            AwaitKind::Answer => Self::Answer(text.to_string()),
        }
    }
}

/// A prior `(state, position)` pair kept for inspection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub state: serde_json::Value,
    pub position: Option<String>,
    pub step: u64,
}

/// Latest snapshot of a workflow run on one thread.
///
/// `position` is the node that runs next (or the node that suspended);
/// `None` means the thread is idle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub state: serde_json::Value,
    pub position: Option<String>,
    pub awaiting: Option<Interrupt>,
    pub step: u64,
    #[serde(default)]
    pub history: Vec<Snapshot>,
    pub updated_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(state: serde_json::Value) -> Self {
        Self {
            state,
            position: None,
            awaiting: None,
            step: 0,
            history: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    pub fn is_idle(&self) -> bool {
        self.position.is_none()
    }

    pub fn is_suspended(&self) -> bool {
        self.awaiting.is_some()
    }

    /// Move to a new snapshot, pushing the current one onto `history`.
    pub fn advance(
        &mut self,
        state: serde_json::Value,
        position: Option<String>,
        awaiting: Option<Interrupt>,
    ) {
        let previous = Snapshot {
            state: std::mem::replace(&mut self.state, state),
            position: self.position.take(),
            step: self.step,
        };
        self.history.push(previous);
        if self.history.len() > MAX_HISTORY {
            let excess = self.history.len() - MAX_HISTORY;
            self.history.drain(..excess);
        }
        self.position = position;
        self.awaiting = awaiting;
        self.step += 1;
        self.updated_at = Utc::now();
    }
}
