//! Typed shapes the workflow nodes ask the model for.
//!
//! Decision actions are adjacently tagged (`{"action_type": ..., "action": {...}}`)
//! so the variant is always read from the discriminant, never from the shape.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::llm::StructuredOutput;

const MIN_TITLE_CHARS: usize = 3;
const MAX_CONCLUSION_CHARS: usize = 300;
const MIN_REPORT_CHARS: usize = 50;

fn check_title(kind: &str, title: &str) -> Result<(), String> {
    if title.chars().count() < MIN_TITLE_CHARS {
        return Err(format!(
            "{kind} title '{title}' is shorter than {MIN_TITLE_CHARS} characters"
        ));
    }
    Ok(())
}

// ── learning ────────────────────────────────────────────────────────

/// A single learning step within a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Step {
    /// A concise title for the step.
    pub title: String,
    /// A detailed description of what this step entails.
    pub description: String,
    /// The specific learning objective this step addresses.
    pub learning_objective: String,
}

/// A learning plan: ordered steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Plan {
    pub steps: Vec<Step>,
}

impl StructuredOutput for Plan {
    const NAME: &'static str = "Plan";

    fn validate(&self) -> Result<(), String> {
        if self.steps.is_empty() {
            return Err("plan has no steps".into());
        }
        self.steps.iter().try_for_each(|s| check_title("step", &s.title))
    }
}

/// Content produced for one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct LearningObject {
    pub title: String,
    /// The learning content material.
    pub content: String,
}

impl StructuredOutput for LearningObject {
    const NAME: &'static str = "LearningObject";
}

/// Final summary of a learning session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Conclusion {
    /// A brief overview of the lesson's content (approximately 50 words).
    pub conclusion: String,
}

/// Next move after a step was disclosed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "action_type", content = "action", rename_all = "snake_case")]
pub enum LearningAction {
    /// Remaining steps.
    Plan(Plan),
    /// Finish the session.
    Conclusion(Conclusion),
}

impl StructuredOutput for LearningAction {
    const NAME: &'static str = "LearningAction";

    fn validate(&self) -> Result<(), String> {
        match self {
            Self::Plan(plan) => plan.validate(),
            Self::Conclusion(c) if c.conclusion.chars().count() > MAX_CONCLUSION_CHARS => Err(
                format!("conclusion is longer than {MAX_CONCLUSION_CHARS} characters"),
            ),
            Self::Conclusion(_) => Ok(()),
        }
    }
}

// ── assessment ──────────────────────────────────────────────────────

/// A single evaluation item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Eval {
    pub title: String,
    /// What the evaluation covers and why.
    pub description: String,
}

/// An assessment plan: ordered evaluations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Evaluations {
    pub evals: Vec<Eval>,
}

impl StructuredOutput for Evaluations {
    const NAME: &'static str = "Evaluations";

    fn validate(&self) -> Result<(), String> {
        if self.evals.is_empty() {
            return Err("evaluation plan is empty".into());
        }
        self.evals.iter().try_for_each(|e| check_title("evaluation", &e.title))
    }
}

/// A concrete assessment item shown to the learner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct EvalObject {
    pub title: String,
    /// Question, multiple choice, code, etc.
    pub content: String,
    pub evaluation_criteria: Vec<String>,
}

impl StructuredOutput for EvalObject {
    const NAME: &'static str = "EvalObject";
}

/// Final report of an assessment session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Report {
    pub report: String,
}

/// Next move after an answer was collected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "action_type", content = "action", rename_all = "snake_case")]
pub enum AssessmentAction {
    /// Remaining evaluations.
    Evaluations(Evaluations),
    /// Finish the assessment.
    Report(Report),
}

impl StructuredOutput for AssessmentAction {
    const NAME: &'static str = "AssessmentAction";

    fn validate(&self) -> Result<(), String> {
        match self {
            Self::Evaluations(evals) => evals.validate(),
            Self::Report(r) if r.report.chars().count() < MIN_REPORT_CHARS => Err(format!(
                "report is shorter than {MIN_REPORT_CHARS} characters"
            )),
            Self::Report(_) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;
    use crate::llm::structured::parse_structured;

    #[test]
    fn learning_action_reads_the_discriminant() {
        let raw = r#"{"action_type": "conclusion", "action": {"conclusion": "We covered loss."}}"#;
        let action: LearningAction = parse_structured("test", raw).unwrap();
        assert_eq!(
            action,
            LearningAction::Conclusion(Conclusion {
                conclusion: "We covered loss.".into()
            })
        );
    }

    #[test]
    fn mismatched_tag_and_payload_is_rejected() {
        // Tag says plan, payload is a conclusion.
        let raw = r#"{"action_type": "plan", "action": {"conclusion": "done"}}"#;
        let err = parse_structured::<LearningAction>("test", raw).unwrap_err();
        assert!(matches!(err, LlmError::InvalidResponse { .. }));
    }

    #[test]
    fn short_step_title_fails_validation() {
        let raw = r#"{"steps": [{"title": "AB", "description": "d", "learning_objective": "o"}]}"#;
        let err = parse_structured::<Plan>("test", raw).unwrap_err();
        assert!(matches!(err, LlmError::InvalidResponse { ref reason, .. } if reason.contains("shorter")));
    }

    #[test]
    fn conclusion_length_is_capped() {
        let long = "x".repeat(301);
        let action = LearningAction::Conclusion(Conclusion { conclusion: long });
        assert!(action.validate().is_err());
    }

    #[test]
    fn report_has_a_minimum_length() {
        let short = AssessmentAction::Report(Report {
            report: "Good.".into(),
        });
        assert!(short.validate().is_err());

        let raw = format!(
            r#"{{"action_type": "report", "action": {{"report": "{}"}}}}"#,
            "Solid grasp of gradients and loss surfaces overall. ".repeat(2)
        );
        let parsed: AssessmentAction = parse_structured("test", &raw).unwrap();
        assert!(matches!(parsed, AssessmentAction::Report(_)));
    }

    #[test]
    fn action_schema_names_the_discriminant() {
        let schema = crate::llm::structured::schema_value::<AssessmentAction>();
        let text = schema.to_string();
        assert!(text.contains("action_type"));
        assert!(text.contains("evaluations"));
        assert!(text.contains("report"));
    }
}
