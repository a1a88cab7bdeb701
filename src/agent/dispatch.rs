//! Main dispatch loop.
//!
//! Each model turn either ends the chat turn, runs ordinary tools, or hands
//! control to one of the session workflows. Only the first tool call decides
//! the route. The loop runs on the same checkpointed engine as the sessions,
//! so a suspended session suspends the loop with it.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::agent::history::trim_history;
use crate::agent::prompts::system_prompt;
use crate::context::{LearnerContext, ToolContext};
use crate::error::WorkflowError;
use crate::llm::{
    ChatMessage, LlmProvider, Reasoning, ReasoningContext, RespondResult, Role, ToolCall,
};
use crate::store::CheckpointStore;
use crate::tools::{SessionIntent, ToolRegistry, intents};
use crate::workflow::{
    AssessmentState, GraphBuilder, LearningState, Node, NodeOutcome, ResumeValue, RunOutcome,
    RunScope, Target, Workflow, WorkflowState,
};

pub const WORKFLOW_NAME: &str = "conversation";

pub const AGENT: &str = "agent";
pub const TOOLS: &str = "tools";
pub const LEARNING_SESSION: &str = "learning_session";
pub const EVALUATION_SESSION: &str = "evaluation_session";

/// Child thread suffixes for the session workflows.
pub const LEARNING_SCOPE: &str = "learning";
pub const ASSESSMENT_SCOPE: &str = "assessment";

const SKIPPED: &str = "Skipped: a session was started by an earlier tool call in this response.";

/// Conversation state checkpointed under the bare thread id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    /// Result of the last completed learning session.
    #[serde(default)]
    pub lesson: Option<LearningState>,
}

impl ConversationState {
    /// Tool calls of the last message, if it is an assistant turn.
    pub fn pending_calls(&self) -> &[ToolCall] {
        match self.messages.last() {
            Some(m) if m.role == Role::Assistant => &m.tool_calls,
            _ => &[],
        }
    }

    /// Content of the most recent assistant message.
    pub fn last_reply(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .map(|m| m.content.as_str())
    }
}

#[derive(Debug, Default)]
pub struct ConversationUpdate {
    pub messages: Vec<ChatMessage>,
    pub lesson: Option<LearningState>,
}

impl WorkflowState for ConversationState {
    type Update = ConversationUpdate;

    fn apply(&mut self, update: ConversationUpdate) {
        self.messages.extend(update.messages);
        if let Some(lesson) = update.lesson {
            self.lesson = Some(lesson);
        }
    }
}

/// Route after a model turn. The first tool call wins.
pub fn route_after_agent(state: &ConversationState) -> Target {
    let Some(first) = state.pending_calls().first() else {
        return Target::End;
    };
    match SessionIntent::of(first) {
        Some(SessionIntent::Learning) => Target::node(LEARNING_SESSION),
        Some(SessionIntent::Assessment) => Target::node(EVALUATION_SESSION),
        None => Target::node(TOOLS),
    }
}

fn first_call<'a>(state: &'a ConversationState, node: &str) -> Result<&'a ToolCall, WorkflowError> {
    state
        .pending_calls()
        .first()
        .ok_or_else(|| WorkflowError::NodeFailed {
            node: node.to_string(),
            reason: "no pending tool call".into(),
        })
}

/// Tool messages closing a session: the result for the intent call, then a
/// skip notice for every other call in the same response.
fn session_messages(calls: &[ToolCall], content: String) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(calls.len());
    if let Some((first, rest)) = calls.split_first() {
        messages.push(ChatMessage::tool_result(&first.id, &first.name, content));
        messages.extend(
            rest.iter()
                .map(|c| ChatMessage::tool_result(&c.id, &c.name, SKIPPED)),
        );
    }
    messages
}

fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|e| format!("Error: {e}"))
}

// ── agent ───────────────────────────────────────────────────────────

struct AgentNode {
    reasoning: Reasoning,
    registry: Arc<ToolRegistry>,
    learner: Arc<LearnerContext>,
    history_window: usize,
}

#[async_trait]
impl Node<ConversationState> for AgentNode {
    async fn run(
        &self,
        scope: &RunScope,
        state: &ConversationState,
        _resume: Option<ResumeValue>,
    ) -> Result<NodeOutcome<ConversationUpdate>, WorkflowError> {
        let profile = self.learner.prompt_profile(&scope.user_id).await?;
        let knowledge_state = self.learner.knowledge_state().await;

        let mut messages = vec![ChatMessage::system(system_prompt(&profile, &knowledge_state))];
        messages.extend(trim_history(&state.messages, self.history_window));

        let mut tools = self.registry.tool_definitions().await;
        tools.extend(intents::definitions());

        debug!(
            thread = %scope.thread_id,
            messages = messages.len(),
            tools = tools.len(),
            "Calling model"
        );
        let context = ReasoningContext::new()
            .with_messages(messages)
            .with_tools(tools)
            .with_metadata("thread_id", &scope.thread_id);
        let output = self.reasoning.respond_with_tools(&context).await?;

        let reply = match output.result {
            RespondResult::Text(text) => ChatMessage::assistant(text),
            RespondResult::ToolCalls {
                tool_calls,
                content,
            } => {
                let names: Vec<&str> = tool_calls.iter().map(|c| c.name.as_str()).collect();
                info!(thread = %scope.thread_id, calls = ?names, "Model requested tools");
                ChatMessage::assistant_with_tool_calls(content.unwrap_or_default(), tool_calls)
            }
        };
        Ok(NodeOutcome::Continue(ConversationUpdate {
            messages: vec![reply],
            ..Default::default()
        }))
    }
}

// ── tools ───────────────────────────────────────────────────────────

struct ToolsNode {
    registry: Arc<ToolRegistry>,
}

#[async_trait]
impl Node<ConversationState> for ToolsNode {
    async fn run(
        &self,
        scope: &RunScope,
        state: &ConversationState,
        _resume: Option<ResumeValue>,
    ) -> Result<NodeOutcome<ConversationUpdate>, WorkflowError> {
        let ctx = ToolContext::from(scope);
        let mut messages = Vec::new();
        for call in state.pending_calls() {
            let message = if SessionIntent::of(call).is_some() {
                ChatMessage::tool_result(
                    &call.id,
                    &call.name,
                    format!("Error: {} must be the first tool call of a response.", call.name),
                )
            } else {
                self.registry.dispatch(call, &ctx).await
            };
            messages.push(message);
        }
        Ok(NodeOutcome::Continue(ConversationUpdate {
            messages,
            ..Default::default()
        }))
    }
}

// ── sessions ────────────────────────────────────────────────────────

/// Start, resume, or retry a session workflow on the child scope.
async fn drive<S: WorkflowState>(
    workflow: &Workflow<S>,
    scope: &RunScope,
    resume: Option<ResumeValue>,
    start: impl FnOnce() -> S,
) -> Result<RunOutcome<S>, WorkflowError> {
    match resume {
        Some(value) => {
            let interrupted = workflow
                .checkpoint(&scope.thread_id)
                .await?
                .is_some_and(|c| !c.is_suspended() && !c.is_idle());
            if interrupted {
                warn!(thread = %scope.thread_id, "Session was interrupted by a failure; retrying");
                workflow.retry(scope).await
            } else {
                workflow.resume(scope, value).await
            }
        }
        None => workflow.invoke(scope, start()).await,
    }
}

struct LearningSessionNode {
    workflow: Workflow<LearningState>,
}

#[async_trait]
impl Node<ConversationState> for LearningSessionNode {
    async fn run(
        &self,
        scope: &RunScope,
        state: &ConversationState,
        resume: Option<ResumeValue>,
    ) -> Result<NodeOutcome<ConversationUpdate>, WorkflowError> {
        let calls = state.pending_calls();
        let call = first_call(state, LEARNING_SESSION)?;

        let topic = if resume.is_none() {
            match intents::intent_input(call) {
                Ok(topic) => topic,
                Err(e) => {
                    return Ok(NodeOutcome::Continue(ConversationUpdate {
                        messages: session_messages(calls, format!("Error: {e}")),
                        ..Default::default()
                    }));
                }
            }
        } else {
            String::new()
        };

        let child = scope.child(LEARNING_SCOPE);
        info!(thread = %scope.thread_id, resuming = resume.is_some(), "Learning session step");
        match drive(&self.workflow, &child, resume, || LearningState::new(topic)).await? {
            RunOutcome::Suspended(interrupt) => Ok(NodeOutcome::Suspend(interrupt)),
            RunOutcome::Completed(lesson) => Ok(NodeOutcome::Continue(ConversationUpdate {
                messages: session_messages(calls, to_json(&lesson)),
                lesson: Some(lesson),
            })),
        }
    }
}

struct EvaluationSessionNode {
    workflow: Workflow<AssessmentState>,
}

#[async_trait]
impl Node<ConversationState> for EvaluationSessionNode {
    async fn run(
        &self,
        scope: &RunScope,
        state: &ConversationState,
        resume: Option<ResumeValue>,
    ) -> Result<NodeOutcome<ConversationUpdate>, WorkflowError> {
        let calls = state.pending_calls();
        let call = first_call(state, EVALUATION_SESSION)?;

        let lesson_content = state
            .lesson
            .as_ref()
            .and_then(|l| l.lo.as_ref())
            .map(|lo| lo.content.clone());
        let input = match (resume.is_some(), lesson_content) {
            (true, _) => String::new(),
            (false, Some(content)) => content,
            (false, None) => match intents::intent_input(call) {
                Ok(input) => input,
                Err(e) => {
                    return Ok(NodeOutcome::Continue(ConversationUpdate {
                        messages: session_messages(calls, format!("Error: {e}")),
                        ..Default::default()
                    }));
                }
            },
        };

        let child = scope.child(ASSESSMENT_SCOPE);
        info!(thread = %scope.thread_id, resuming = resume.is_some(), "Assessment session step");
        match drive(&self.workflow, &child, resume, || AssessmentState::new(input)).await? {
            RunOutcome::Suspended(interrupt) => Ok(NodeOutcome::Suspend(interrupt)),
            RunOutcome::Completed(assessment) => Ok(NodeOutcome::Continue(ConversationUpdate {
                messages: session_messages(calls, to_json(&assessment)),
                ..Default::default()
            })),
        }
    }
}

/// Collaborators of the dispatch loop.
pub struct DispatchDeps {
    pub llm: Arc<dyn LlmProvider>,
    pub registry: Arc<ToolRegistry>,
    pub learner: Arc<LearnerContext>,
    pub store: Arc<dyn CheckpointStore>,
}

/// Build the conversation workflow around the two session workflows.
pub fn build_conversation_workflow(
    deps: DispatchDeps,
    learning: Workflow<LearningState>,
    assessment: Workflow<AssessmentState>,
    history_window: usize,
    max_steps: usize,
) -> Result<Workflow<ConversationState>, WorkflowError> {
    let graph = GraphBuilder::new(WORKFLOW_NAME)
        .node(
            AGENT,
            AgentNode {
                reasoning: Reasoning::new(deps.llm),
                registry: Arc::clone(&deps.registry),
                learner: deps.learner,
                history_window,
            },
        )
        .node(
            TOOLS,
            ToolsNode {
                registry: deps.registry,
            },
        )
        .node(LEARNING_SESSION, LearningSessionNode { workflow: learning })
        .node(EVALUATION_SESSION, EvaluationSessionNode { workflow: assessment })
        .entry(AGENT)
        .conditional(AGENT, route_after_agent)
        .edge(TOOLS, Target::node(AGENT))
        .edge(LEARNING_SESSION, Target::node(AGENT))
        .edge(EVALUATION_SESSION, Target::node(AGENT))
        .compile()?;
    Ok(Workflow::new(graph, deps.store, max_steps))
}
