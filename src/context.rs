//! Execution context handed to tools, and the learner snapshot used to
//! personalize prompts.

use std::sync::Arc;

use crate::error::DatabaseError;
use crate::knowledge::KnowledgeGraph;
use crate::store::{Namespace, ProfileFilter, ProfileStore, ProfileType};
use crate::workflow::RunScope;

/// Entries per profile type shown in rendered profiles.
const PROFILE_ENTRIES_PER_TYPE: usize = 5;

/// Context for a single tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolContext {
    /// User that owns the profile namespace.
    pub user_id: String,
    /// Conversation thread the call belongs to.
    pub thread_id: String,
}

impl ToolContext {
    pub fn new(user_id: impl Into<String>, thread_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            thread_id: thread_id.into(),
        }
    }

    pub fn namespace(&self) -> Namespace {
        Namespace::profile(&self.user_id)
    }
}

impl From<&RunScope> for ToolContext {
    fn from(scope: &RunScope) -> Self {
        Self::new(&scope.user_id, &scope.thread_id)
    }
}

/// What the agent knows about a learner: their profile and knowledge state.
pub struct LearnerContext {
    profiles: Arc<dyn ProfileStore>,
    graph: Arc<KnowledgeGraph>,
}

impl LearnerContext {
    pub fn new(profiles: Arc<dyn ProfileStore>, graph: Arc<KnowledgeGraph>) -> Self {
        Self { profiles, graph }
    }

    pub fn profiles(&self) -> &Arc<dyn ProfileStore> {
        &self.profiles
    }

    pub fn graph(&self) -> &Arc<KnowledgeGraph> {
        &self.graph
    }

    async fn render_profile(
        &self,
        user_id: &str,
        order: &[ProfileType],
        bullet: &str,
    ) -> Result<String, DatabaseError> {
        let namespace = Namespace::profile(user_id);
        let mut lines = Vec::with_capacity(order.len());
        for profile_type in order {
            let filter = ProfileFilter::of_type(*profile_type).with_limit(PROFILE_ENTRIES_PER_TYPE);
            let entries = self.profiles.search(&namespace, &filter).await?;
            let text = entries
                .iter()
                .map(|e| e.content.as_str())
                .collect::<Vec<_>>()
                .join(" ");
            lines.push(format!("{bullet}{}: {text}", profile_type.label()));
        }
        Ok(lines.join("\n"))
    }

    /// Bulleted profile for the agent's system prompt.
    pub async fn prompt_profile(&self, user_id: &str) -> Result<String, DatabaseError> {
        self.render_profile(user_id, &ProfileType::ALL, "* ").await
    }

    /// Plain profile readout (Name, Goals, Interests, Preferences).
    pub async fn profile_summary(&self, user_id: &str) -> Result<String, DatabaseError> {
        self.render_profile(
            user_id,
            &[
                ProfileType::Name,
                ProfileType::Goals,
                ProfileType::Interests,
                ProfileType::Preferences,
            ],
            "",
        )
        .await
    }

    pub async fn knowledge_state(&self) -> String {
        self.graph.knowledge_state().await
    }
}
