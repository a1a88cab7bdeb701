//! Assessment workflow: map a lesson to evaluations, present them one at a
//! time, and collect a free-text answer for each.
//!
//! The item being evaluated is always `evaluations[0]`; progress depends on
//! `remap` returning a shorter list or a report. A remap that never drops the
//! current item presents it again on every turn.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::WorkflowError;
use crate::llm::{ChatMessage, StructuredClient};
use crate::store::CheckpointStore;
use crate::workflow::checkpoint::{Interrupt, ResumeValue};
use crate::workflow::engine::{
    GraphBuilder, Node, NodeOutcome, RunScope, Target, Workflow, WorkflowState,
};
use crate::workflow::outputs::{AssessmentAction, Eval, EvalObject, Evaluations};
use crate::workflow::prompts;

pub const WORKFLOW_NAME: &str = "assessment";

pub const MAP: &str = "map";
pub const EVALUATE: &str = "evaluate";
pub const COLLECT_ANSWER: &str = "collect_answer";
pub const REMAP: &str = "remap";

/// State of one assessment session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssessmentState {
    /// Lesson content being assessed.
    pub input: String,
    #[serde(default)]
    pub evaluations: Vec<Eval>,
    #[serde(default)]
    pub past_evals: Vec<Eval>,
    #[serde(default)]
    pub eo: Vec<EvalObject>,
    #[serde(default)]
    pub answer: Vec<String>,
    #[serde(default)]
    pub report: Option<String>,
}

impl AssessmentState {
    pub fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Default)]
pub struct AssessmentUpdate {
    pub evaluations: Option<Vec<Eval>>,
    pub past_evals: Vec<Eval>,
    pub eo: Vec<EvalObject>,
    pub answer: Vec<String>,
    pub report: Option<String>,
}

impl WorkflowState for AssessmentState {
    type Update = AssessmentUpdate;

    fn apply(&mut self, update: AssessmentUpdate) {
        if let Some(evaluations) = update.evaluations {
            self.evaluations = evaluations;
        }
        self.past_evals.extend(update.past_evals);
        self.eo.extend(update.eo);
        self.answer.extend(update.answer);
        if let Some(report) = update.report {
            self.report = Some(report);
        }
    }
}

struct MapNode {
    llm: StructuredClient,
}

#[async_trait]
impl Node<AssessmentState> for MapNode {
    async fn run(
        &self,
        _scope: &RunScope,
        state: &AssessmentState,
        _resume: Option<ResumeValue>,
    ) -> Result<NodeOutcome<AssessmentUpdate>, WorkflowError> {
        let evaluations: Evaluations = self
            .llm
            .invoke(vec![
                ChatMessage::system(prompts::MAPPER),
                ChatMessage::user(&state.input),
            ])
            .await?;
        info!(count = evaluations.evals.len(), "Evaluation plan created");
        Ok(NodeOutcome::Continue(AssessmentUpdate {
            evaluations: Some(evaluations.evals),
            ..Default::default()
        }))
    }
}

struct EvaluateNode {
    llm: StructuredClient,
}

#[async_trait]
impl Node<AssessmentState> for EvaluateNode {
    async fn run(
        &self,
        _scope: &RunScope,
        state: &AssessmentState,
        _resume: Option<ResumeValue>,
    ) -> Result<NodeOutcome<AssessmentUpdate>, WorkflowError> {
        let current = state
            .evaluations
            .first()
            .ok_or_else(|| WorkflowError::NodeFailed {
                node: EVALUATE.into(),
                reason: "no evaluations remaining".into(),
            })?;

        let prompt = prompts::evaluate(&state.input, &state.evaluations, current);
        let eo: EvalObject = self
            .llm
            .invoke(vec![
                ChatMessage::system(prompts::ASSESSOR),
                ChatMessage::user(prompt),
            ])
            .await?;
        info!(evaluation = %current.title, "Assessment item produced");

        Ok(NodeOutcome::Continue(AssessmentUpdate {
            past_evals: vec![current.clone()],
            eo: vec![eo],
            ..Default::default()
        }))
    }
}

/// Presents the latest assessment item and waits for the learner's answer.
struct CollectAnswerNode;

#[async_trait]
impl Node<AssessmentState> for CollectAnswerNode {
    async fn run(
        &self,
        scope: &RunScope,
        state: &AssessmentState,
        resume: Option<ResumeValue>,
    ) -> Result<NodeOutcome<AssessmentUpdate>, WorkflowError> {
        match resume {
            None => {
                let eo = state.eo.last().ok_or_else(|| WorkflowError::NodeFailed {
                    node: COLLECT_ANSWER.into(),
                    reason: "no assessment item to present".into(),
                })?;
                let payload = serde_json::json!({
                    "prompt": prompts::ANSWER_PROMPT,
                    "eval_object": Interrupt::payload(&scope.thread_id, eo)?,
                });
                Ok(NodeOutcome::Suspend(Interrupt::answer(
                    COLLECT_ANSWER,
                    &eo.content,
                    payload,
                )))
            }
            Some(ResumeValue::Answer(answer)) => Ok(NodeOutcome::Continue(AssessmentUpdate {
                answer: vec![answer],
                ..Default::default()
            })),
            Some(other) => Err(WorkflowError::ResumeTypeMismatch {
                node: COLLECT_ANSWER.into(),
                expected: "answer".into(),
                actual: other.kind().to_string(),
            }),
        }
    }
}

struct RemapNode {
    llm: StructuredClient,
}

#[async_trait]
impl Node<AssessmentState> for RemapNode {
    async fn run(
        &self,
        _scope: &RunScope,
        state: &AssessmentState,
        _resume: Option<ResumeValue>,
    ) -> Result<NodeOutcome<AssessmentUpdate>, WorkflowError> {
        let questions: Vec<String> = state.eo.iter().map(|e| e.content.clone()).collect();
        let prompt = prompts::remap(
            &state.input,
            &state.evaluations,
            &state.past_evals,
            &questions,
            &state.answer,
        );
        let action: AssessmentAction = self.llm.invoke(vec![ChatMessage::user(prompt)]).await?;

        let update = match action {
            AssessmentAction::Report(r) => {
                let appendix = prompts::report_appendix(&questions, &state.answer);
                info!(answers = state.answer.len(), "Assessment report composed");
                AssessmentUpdate {
                    report: Some(format!("{}{appendix}", r.report)),
                    ..Default::default()
                }
            }
            AssessmentAction::Evaluations(evals) => {
                info!(remaining = evals.evals.len(), "Evaluation plan revised");
                AssessmentUpdate {
                    evaluations: Some(evals.evals),
                    ..Default::default()
                }
            }
        };
        Ok(NodeOutcome::Continue(update))
    }
}

fn after_remap(state: &AssessmentState) -> Target {
    if state.report.is_some() {
        Target::End
    } else {
        Target::node(EVALUATE)
    }
}

/// Build the assessment workflow over `store`.
pub fn build_assessment_workflow(
    llm: StructuredClient,
    store: Arc<dyn CheckpointStore>,
    max_steps: usize,
) -> Result<Workflow<AssessmentState>, WorkflowError> {
    let graph = GraphBuilder::new(WORKFLOW_NAME)
        .node(MAP, MapNode { llm: llm.clone() })
        .node(EVALUATE, EvaluateNode { llm: llm.clone() })
        .node(COLLECT_ANSWER, CollectAnswerNode)
        .node(REMAP, RemapNode { llm })
        .entry(MAP)
        .edge(MAP, Target::node(EVALUATE))
        .edge(EVALUATE, Target::node(COLLECT_ANSWER))
        .edge(COLLECT_ANSWER, Target::node(REMAP))
        .conditional(REMAP, after_remap)
        .compile()?;
    Ok(Workflow::new(graph, store, max_steps))
}
