//! `AgentService`: the entry point used by the HTTP layer and tests.
//!
//! A chat turn either starts a new run of the conversation workflow or, when
//! a session is waiting on the learner, resumes it with the turn's text.

use std::sync::Arc;

use tracing::{info, warn};

use crate::agent::dispatch::{
    ASSESSMENT_SCOPE, ConversationState, DispatchDeps, LEARNING_SCOPE,
    build_conversation_workflow,
};
use crate::config::AgentConfig;
use crate::context::LearnerContext;
use crate::error::{DatabaseError, WorkflowError};
use crate::llm::{ChatMessage, LlmProvider, StructuredClient};
use crate::store::CheckpointStore;
use crate::tools::ToolRegistry;
use crate::workflow::outputs::{Eval, Step};
use crate::workflow::{
    AssessmentState, AwaitKind, Checkpoint, LearningState, ResumeValue, RunOutcome, RunScope,
    Workflow, build_assessment_workflow, build_learning_workflow,
};

/// Reply when the model produced no text.
const EMPTY_REPLY: &str = "No valid content found in the response.";

/// Result of one chat turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatReply {
    /// Text to show the learner.
    pub content: String,
    /// Set when a session is waiting for the learner's next message.
    pub awaiting: Option<AwaitKind>,
}

/// Shared collaborators for the agent.
pub struct AgentDeps {
    pub llm: Arc<dyn LlmProvider>,
    pub store: Arc<dyn CheckpointStore>,
    pub registry: Arc<ToolRegistry>,
    pub learner: Arc<LearnerContext>,
}

/// Conversation plus the two session workflows, all over one checkpoint store.
pub struct AgentService {
    conversation: Workflow<ConversationState>,
    learning: Workflow<LearningState>,
    assessment: Workflow<AssessmentState>,
    learner: Arc<LearnerContext>,
}

impl AgentService {
    pub fn new(deps: AgentDeps, config: &AgentConfig) -> Result<Self, WorkflowError> {
        let structured = StructuredClient::new(Arc::clone(&deps.llm));
        let learning = build_learning_workflow(
            structured.clone(),
            Arc::clone(&deps.learner),
            Arc::clone(&deps.store),
            config.max_steps,
        )?;
        let assessment =
            build_assessment_workflow(structured, Arc::clone(&deps.store), config.max_steps)?;

        let conversation = build_conversation_workflow(
            DispatchDeps {
                llm: deps.llm,
                registry: deps.registry,
                learner: Arc::clone(&deps.learner),
                store: deps.store,
            },
            learning.clone(),
            assessment.clone(),
            config.history_window,
            config.max_steps,
        )?;

        info!(agent = %config.name, "Agent service ready");
        Ok(Self {
            conversation,
            learning,
            assessment,
            learner: deps.learner,
        })
    }

    /// Run one chat turn on `scope`.
    pub async fn chat(&self, scope: &RunScope, input: &str) -> Result<ChatReply, WorkflowError> {
        let checkpoint = self.conversation.checkpoint(&scope.thread_id).await?;

        let outcome = match checkpoint {
            Some(Checkpoint {
                awaiting: Some(interrupt),
                ..
            }) => {
                info!(
                    thread = %scope.thread_id,
                    node = %interrupt.node,
                    awaiting = %interrupt.kind,
                    "Resuming suspended session"
                );
                let value = ResumeValue::from_text(interrupt.kind, input);
                self.conversation.resume(scope, value).await?
            }
            // Failed mid-run: pending tool calls must be answered before any new user message.
            Some(c) if !c.is_idle() => {
                warn!(
                    thread = %scope.thread_id,
                    node = c.position.as_deref().unwrap_or_default(),
                    "Retrying interrupted turn; new input is dropped"
                );
                self.conversation.retry(scope).await?
            }
            _ => {
                let mut state = self
                    .conversation
                    .state(&scope.thread_id)
                    .await?
                    .unwrap_or_default();
                state.messages.push(ChatMessage::user(input));
                self.conversation.invoke(scope, state).await?
            }
        };

        Ok(match outcome {
            RunOutcome::Completed(state) => ChatReply {
                content: state
                    .last_reply()
                    .filter(|c| !c.is_empty())
                    .unwrap_or(EMPTY_REPLY)
                    .to_string(),
                awaiting: None,
            },
            RunOutcome::Suspended(interrupt) => ChatReply {
                content: interrupt.message,
                awaiting: Some(interrupt.kind),
            },
        })
    }

    /// Node the conversation is suspended at, if a session is waiting.
    pub async fn session_state(&self, thread_id: &str) -> Result<Option<String>, WorkflowError> {
        Ok(self
            .conversation
            .checkpoint(thread_id)
            .await?
            .filter(|c| c.is_suspended())
            .and_then(|c| c.position))
    }

    /// Steps of the current (or last) learning plan.
    pub async fn learning_plan(&self, thread_id: &str) -> Result<Vec<Step>, WorkflowError> {
        let child = format!("{thread_id}/{LEARNING_SCOPE}");
        Ok(self
            .learning
            .state(&child)
            .await?
            .map(|s| s.plan)
            .unwrap_or_default())
    }

    /// Evaluations of the current (or last) assessment.
    pub async fn assessment_plan(&self, thread_id: &str) -> Result<Vec<Eval>, WorkflowError> {
        let child = format!("{thread_id}/{ASSESSMENT_SCOPE}");
        Ok(self
            .assessment
            .state(&child)
            .await?
            .map(|s| s.evaluations)
            .unwrap_or_default())
    }

    pub async fn profile_summary(&self, user_id: &str) -> Result<String, DatabaseError> {
        self.learner.profile_summary(user_id).await
    }

    /// Full conversation state, for inspection.
    pub async fn conversation(
        &self,
        thread_id: &str,
    ) -> Result<Option<ConversationState>, WorkflowError> {
        self.conversation.state(thread_id).await
    }
}
