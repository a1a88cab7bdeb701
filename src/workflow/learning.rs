//! Learning workflow: plan a topic, teach it step by step, pausing after each
//! step for a continue/stop decision.
//!
//! ```text
//! plan -> teach -> disclose -(continue)-> replan -(more steps)-> teach
//!                     |                      |
//!                   (stop)              (conclusion)
//!                     v                      v
//!                    end                    end
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::context::LearnerContext;
use crate::error::WorkflowError;
use crate::llm::{ChatMessage, StructuredClient};
use crate::store::CheckpointStore;
use crate::workflow::checkpoint::{Interrupt, ResumeValue};
use crate::workflow::engine::{
    GraphBuilder, Node, NodeOutcome, RunScope, Target, Workflow, WorkflowState,
};
use crate::workflow::outputs::{LearningAction, LearningObject, Plan, Step};
use crate::workflow::prompts;

pub const WORKFLOW_NAME: &str = "learning";

pub const PLAN: &str = "plan";
pub const TEACH: &str = "teach";
pub const DISCLOSE: &str = "disclose";
pub const REPLAN: &str = "replan";

/// State of one learning session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LearningState {
    /// Topic requested by the agent.
    pub input: String,
    /// Remaining steps. Replaced wholesale by `plan` and `replan`.
    #[serde(default)]
    pub plan: Vec<Step>,
    /// Steps already taught, in order.
    #[serde(default)]
    pub past_steps: Vec<Step>,
    /// Last produced learning object.
    #[serde(default)]
    pub lo: Option<LearningObject>,
    #[serde(default)]
    pub conclusion: Option<String>,
}

impl LearningState {
    pub fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            ..Self::default()
        }
    }
}

/// Partial update returned by a learning node.
#[derive(Debug, Default)]
pub struct LearningUpdate {
    pub plan: Option<Vec<Step>>,
    pub past_steps: Vec<Step>,
    pub lo: Option<LearningObject>,
    pub conclusion: Option<String>,
}

impl WorkflowState for LearningState {
    type Update = LearningUpdate;

    fn apply(&mut self, update: LearningUpdate) {
        if let Some(plan) = update.plan {
            self.plan = plan;
        }
        self.past_steps.extend(update.past_steps);
        if let Some(lo) = update.lo {
            self.lo = Some(lo);
        }
        if let Some(conclusion) = update.conclusion {
            self.conclusion = Some(conclusion);
        }
    }
}

struct PlanNode {
    llm: StructuredClient,
}

#[async_trait]
impl Node<LearningState> for PlanNode {
    async fn run(
        &self,
        _scope: &RunScope,
        state: &LearningState,
        _resume: Option<ResumeValue>,
    ) -> Result<NodeOutcome<LearningUpdate>, WorkflowError> {
        let plan: Plan = self
            .llm
            .invoke(vec![
                ChatMessage::system(prompts::PLANNER),
                ChatMessage::user(&state.input),
            ])
            .await?;
        info!(topic = %state.input, steps = plan.steps.len(), "Learning plan created");
        Ok(NodeOutcome::Continue(LearningUpdate {
            plan: Some(plan.steps),
            ..Default::default()
        }))
    }
}

struct TeachNode {
    llm: StructuredClient,
    learner: Arc<LearnerContext>,
}

#[async_trait]
impl Node<LearningState> for TeachNode {
    async fn run(
        &self,
        scope: &RunScope,
        state: &LearningState,
        _resume: Option<ResumeValue>,
    ) -> Result<NodeOutcome<LearningUpdate>, WorkflowError> {
        let current = state.plan.first().ok_or_else(|| WorkflowError::NodeFailed {
            node: TEACH.into(),
            reason: "plan has no remaining steps".into(),
        })?;

        let profile = self.learner.profile_summary(&scope.user_id).await?;
        let knowledge_state = self.learner.knowledge_state().await;
        let prompt = prompts::teach(
            &state.plan,
            current,
            &state.past_steps,
            &profile,
            &knowledge_state,
        );

        let lo: LearningObject = self
            .llm
            .invoke(vec![
                ChatMessage::system(prompts::LEARNER),
                ChatMessage::user(prompt),
            ])
            .await?;
        info!(step = %current.title, title = %lo.title, "Learning object produced");

        Ok(NodeOutcome::Continue(LearningUpdate {
            past_steps: vec![current.clone()],
            lo: Some(lo),
            ..Default::default()
        }))
    }
}

/// Presents the learning object and waits for a continue/stop decision.
struct DiscloseNode;

#[async_trait]
impl Node<LearningState> for DiscloseNode {
    async fn run(
        &self,
        scope: &RunScope,
        state: &LearningState,
        resume: Option<ResumeValue>,
    ) -> Result<NodeOutcome<LearningUpdate>, WorkflowError> {
        match resume {
            None => {
                let lo = state.lo.as_ref().ok_or_else(|| WorkflowError::NodeFailed {
                    node: DISCLOSE.into(),
                    reason: "no learning object to present".into(),
                })?;
                let payload = Interrupt::payload(&scope.thread_id, lo)?;
                Ok(NodeOutcome::Suspend(Interrupt::decision(
                    DISCLOSE,
                    &lo.content,
                    payload,
                )))
            }
            Some(ResumeValue::Decision(proceed)) => {
                let next = if proceed {
                    Target::node(REPLAN)
                } else {
                    info!("Learner stopped the session");
                    Target::End
                };
                Ok(NodeOutcome::Goto {
                    update: LearningUpdate::default(),
                    next,
                })
            }
            Some(other) => Err(WorkflowError::ResumeTypeMismatch {
                node: DISCLOSE.into(),
                expected: "decision".into(),
                actual: other.kind().to_string(),
            }),
        }
    }
}

struct ReplanNode {
    llm: StructuredClient,
}

#[async_trait]
impl Node<LearningState> for ReplanNode {
    async fn run(
        &self,
        _scope: &RunScope,
        state: &LearningState,
        _resume: Option<ResumeValue>,
    ) -> Result<NodeOutcome<LearningUpdate>, WorkflowError> {
        let prompt = prompts::replan(&state.input, &state.plan, &state.past_steps);
        let action: LearningAction = self.llm.invoke(vec![ChatMessage::user(prompt)]).await?;

        let update = match action {
            LearningAction::Conclusion(c) => {
                info!("Learning session concluded");
                LearningUpdate {
                    conclusion: Some(format!("{}{}", prompts::CONCLUSION_PREFIX, c.conclusion)),
                    ..Default::default()
                }
            }
            LearningAction::Plan(plan) => {
                info!(remaining = plan.steps.len(), "Learning plan revised");
                LearningUpdate {
                    plan: Some(plan.steps),
                    ..Default::default()
                }
            }
        };
        Ok(NodeOutcome::Continue(update))
    }
}

fn after_replan(state: &LearningState) -> Target {
    if state.conclusion.is_some() {
        Target::End
    } else {
        Target::node(TEACH)
    }
}

/// Build the learning workflow over `store`.
pub fn build_learning_workflow(
    llm: StructuredClient,
    learner: Arc<LearnerContext>,
    store: Arc<dyn CheckpointStore>,
    max_steps: usize,
) -> Result<Workflow<LearningState>, WorkflowError> {
    let graph = GraphBuilder::new(WORKFLOW_NAME)
        .node(PLAN, PlanNode { llm: llm.clone() })
        .node(
            TEACH,
            TeachNode {
                llm: llm.clone(),
                learner,
            },
        )
        .node(DISCLOSE, DiscloseNode)
        .node(REPLAN, ReplanNode { llm })
        .entry(PLAN)
        .edge(PLAN, Target::node(TEACH))
        .edge(TEACH, Target::node(DISCLOSE))
        .edge(DISCLOSE, Target::node(REPLAN))
        .conditional(REPLAN, after_replan)
        .compile()?;
    Ok(Workflow::new(graph, store, max_steps))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::knowledge::KnowledgeGraph;
    use crate::llm::testing::ScriptedLlm;
    use crate::store::LibSqlBackend;
    use crate::workflow::checkpoint::AwaitKind;
    use crate::workflow::engine::RunOutcome;

    fn plan_json(titles: &[&str]) -> serde_json::Value {
        let steps: Vec<_> = titles
            .iter()
            .map(|t| json!({"title": t, "description": "d", "learning_objective": "o"}))
            .collect();
        json!({"steps": steps})
    }

    fn lo_json(content: &str) -> serde_json::Value {
        json!({"title": "Step content", "content": content})
    }

    fn conclusion_json(text: &str) -> serde_json::Value {
        json!({"action_type": "conclusion", "action": {"conclusion": text}})
    }

    struct Harness {
        llm: Arc<ScriptedLlm>,
        workflow: Workflow<LearningState>,
        _dir: tempfile::TempDir,
    }

    async fn harness(llm: ScriptedLlm) -> Harness {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("graph.json");
        tokio::fs::write(&path, r#"{"concepts": {}}"#).await.unwrap();

        let db = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let learner = Arc::new(LearnerContext::new(
            db.clone(),
            Arc::new(KnowledgeGraph::new(path)),
        ));
        let llm = Arc::new(llm);
        let workflow =
            build_learning_workflow(StructuredClient::new(llm.clone()), learner, db, 50).unwrap();
        Harness {
            llm,
            workflow,
            _dir: dir,
        }
    }

    fn scope() -> RunScope {
        RunScope::new("t1/learning", "u1")
    }

    #[tokio::test]
    async fn suspends_with_the_learning_object() {
        let h = harness(
            ScriptedLlm::new()
                .complete_with(plan_json(&["Intro", "Main"]))
                .complete_with(lo_json("Gradients point uphill.")),
        )
        .await;

        let outcome = h
            .workflow
            .invoke(&scope(), LearningState::new("gradient descent"))
            .await
            .unwrap();
        let RunOutcome::Suspended(interrupt) = outcome else {
            panic!("expected suspension");
        };
        assert_eq!(interrupt.kind, AwaitKind::Decision);
        assert_eq!(interrupt.node, DISCLOSE);
        assert_eq!(interrupt.message, "Gradients point uphill.");
        assert!(h.llm.user_prompt(1).contains("provide an introduction / a warm up: Intro"));

        let state = h.workflow.state("t1/learning").await.unwrap().unwrap();
        assert_eq!(state.past_steps.len(), 1);
    }

    #[tokio::test]
    async fn conclusion_on_first_replan_ends_after_one_teach() {
        let h = harness(
            ScriptedLlm::new()
                .complete_with(plan_json(&["Intro", "Main"]))
                .complete_with(lo_json("Intro text"))
                .complete_with(conclusion_json("Covered the basics.")),
        )
        .await;

        h.workflow
            .invoke(&scope(), LearningState::new("loss functions"))
            .await
            .unwrap();
        let outcome = h
            .workflow
            .resume(&scope(), ResumeValue::Decision(true))
            .await
            .unwrap();

        let RunOutcome::Completed(state) = outcome else {
            panic!("expected completion");
        };
        assert_eq!(state.past_steps.len(), 1);
        assert_eq!(
            state.conclusion.as_deref(),
            Some("Learning content that was introduced to the user.Covered the basics.")
        );
        // plan, teach, replan
        assert_eq!(h.llm.completion_count(), 3);
    }

    #[tokio::test]
    async fn stop_decision_skips_replan() {
        let h = harness(
            ScriptedLlm::new()
                .complete_with(plan_json(&["Intro", "Main"]))
                .complete_with(lo_json("Intro text")),
        )
        .await;

        h.workflow
            .invoke(&scope(), LearningState::new("loss functions"))
            .await
            .unwrap();
        let outcome = h
            .workflow
            .resume(&scope(), ResumeValue::from_text(AwaitKind::Decision, " Stop "))
            .await
            .unwrap();

        let RunOutcome::Completed(state) = outcome else {
            panic!("expected completion");
        };
        assert!(state.conclusion.is_none());
        assert_eq!(h.llm.completion_count(), 2);
        assert!(h.workflow.checkpoint("t1/learning").await.unwrap().unwrap().is_idle());
    }

    #[tokio::test]
    async fn revised_plan_teaches_the_next_step() {
        let h = harness(
            ScriptedLlm::new()
                .complete_with(plan_json(&["Intro", "Main"]))
                .complete_with(lo_json("Intro text"))
                .complete_with(json!({"action_type": "plan", "action": plan_json(&["Main"])}))
                .complete_with(lo_json("Main text")),
        )
        .await;

        h.workflow
            .invoke(&scope(), LearningState::new("loss functions"))
            .await
            .unwrap();
        let outcome = h
            .workflow
            .resume(&scope(), ResumeValue::Decision(true))
            .await
            .unwrap();

        assert!(matches!(outcome, RunOutcome::Suspended(ref i) if i.message == "Main text"));
        let state = h.workflow.state("t1/learning").await.unwrap().unwrap();
        let taught: Vec<_> = state.past_steps.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(taught, vec!["Intro", "Main"]);
        assert!(h.llm.user_prompt(3).contains("having already covered introduction: 1. Intro"));
    }

    #[tokio::test]
    async fn model_failure_aborts_the_run() {
        let h = harness(ScriptedLlm::new().complete_with(json!({"steps": "not a list"}))).await;

        let err = h
            .workflow
            .invoke(&scope(), LearningState::new("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Llm(_)));
        assert!(h.workflow.checkpoint("t1/learning").await.unwrap().is_none());
    }

    #[test]
    fn reducer_appends_history_and_replaces_plan() {
        let step = |t: &str| Step {
            title: t.into(),
            description: String::new(),
            learning_objective: String::new(),
        };
        let mut state = LearningState::new("topic");
        state.apply(LearningUpdate {
            plan: Some(vec![step("a"), step("b")]),
            ..Default::default()
        });
        state.apply(LearningUpdate {
            past_steps: vec![step("a")],
            ..Default::default()
        });
        state.apply(LearningUpdate {
            plan: Some(vec![step("b")]),
            past_steps: vec![step("b")],
            ..Default::default()
        });
        assert_eq!(state.plan, vec![step("b")]);
        assert_eq!(state.past_steps, vec![step("a"), step("b")]);
    }
}
