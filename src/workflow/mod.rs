//! Checkpointed graph workflows and the two session configurations.

pub mod assessment;
pub mod checkpoint;
pub mod engine;
pub mod learning;
pub mod outputs;
pub mod prompts;

pub use assessment::{AssessmentState, build_assessment_workflow};
pub use checkpoint::{AwaitKind, Checkpoint, Interrupt, ResumeValue, Snapshot};
pub use engine::{
    Graph, GraphBuilder, Node, NodeOutcome, RunOutcome, RunScope, Target, Workflow, WorkflowState,
};
pub use learning::{LearningState, build_learning_workflow};
