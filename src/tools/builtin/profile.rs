//! Profile tools: store, retrieve and delete learner profile attributes.
//!
//! Entries live in the `(user_id, "profile")` namespace of the profile store.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::context::ToolContext;
use crate::store::{ProfileEntry, ProfileFilter, ProfileStore, ProfileType};
use crate::tools::tool::{Tool, ToolError, ToolOutput, require_str};

/// Entries returned by `retrieve_profile`.
const RETRIEVE_LIMIT: usize = 10;

fn parse_profile_type(params: &serde_json::Value) -> Result<ProfileType, ToolError> {
    require_str(params, "profile_type")?
        .parse()
        .map_err(ToolError::InvalidArgument)
}

fn storage(e: impl std::fmt::Display) -> ToolError {
    ToolError::StorageFailure(e.to_string())
}

// ── store_profile ───────────────────────────────────────────────────

pub struct StoreProfileTool {
    store: Arc<dyn ProfileStore>,
}

impl StoreProfileTool {
    pub fn new(store: Arc<dyn ProfileStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for StoreProfileTool {
    fn name(&self) -> &str {
        "store_profile"
    }

    fn description(&self) -> &str {
        "Stores a user profile attribute. Valid profile types: \
         \"name\", \"interests\", \"preferences\", \"goals\"."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "content": {
                    "type": "string",
                    "description": "The value of the profile attribute to store"
                },
                "profile_type": {
                    "type": "string",
                    "enum": ["name", "interests", "preferences", "goals"],
                    "description": "The category of the profile attribute"
                }
            },
            "required": ["content", "profile_type"]
        })
    }

    async fn execute(
        &self,
        params: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let profile_type = parse_profile_type(&params)?;
        let content = require_str(&params, "content")?;

        let id = Uuid::new_v4().to_string();
        let entry = ProfileEntry {
            key: id.clone(),
            profile_type,
            content: content.to_string(),
            created_at: Utc::now(),
        };
        self.store
            .put(&ctx.namespace(), &entry)
            .await
            .map_err(storage)?;

        Ok(ToolOutput::text(
            format!("Stored information: '{content}' | ID: {id}"),
            start.elapsed(),
        ))
    }
}

// ── retrieve_profile ────────────────────────────────────────────────

pub struct RetrieveProfileTool {
    store: Arc<dyn ProfileStore>,
}

impl RetrieveProfileTool {
    pub fn new(store: Arc<dyn ProfileStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for RetrieveProfileTool {
    fn name(&self) -> &str {
        "retrieve_profile"
    }

    fn description(&self) -> &str {
        "Retrieves user profile entries of one type. Returns a list of {content, id}."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "profile_type": {
                    "type": "string",
                    "enum": ["name", "interests", "preferences", "goals"],
                    "description": "The type of information to retrieve"
                }
            },
            "required": ["profile_type"]
        })
    }

    async fn execute(
        &self,
        params: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let profile_type = parse_profile_type(&params)?;

        let filter = ProfileFilter::of_type(profile_type).with_limit(RETRIEVE_LIMIT);
        let entries = self
            .store
            .search(&ctx.namespace(), &filter)
            .await
            .map_err(storage)?;

        let output = entries
            .iter()
            .map(|e| serde_json::json!({"content": e.content, "id": e.key}))
            .collect::<Vec<_>>();
        Ok(ToolOutput::success(serde_json::Value::Array(output), start.elapsed()))
    }
}

// ── delete_profile ──────────────────────────────────────────────────

pub struct DeleteProfileTool {
    store: Arc<dyn ProfileStore>,
}

impl DeleteProfileTool {
    pub fn new(store: Arc<dyn ProfileStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for DeleteProfileTool {
    fn name(&self) -> &str {
        "delete_profile"
    }

    fn description(&self) -> &str {
        "Deletes a specific user profile entry by its ID."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "key": {
                    "type": "string",
                    "description": "The unique ID of the profile entry to delete"
                }
            },
            "required": ["key"]
        })
    }

    async fn execute(
        &self,
        params: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let key = require_str(&params, "key")?;

        let deleted = self
            .store
            .delete(&ctx.namespace(), key)
            .await
            .map_err(storage)?;

        let message = if deleted {
            format!("Profile entry with ID {key} has been successfully deleted.")
        } else {
            format!("Error: No profile entry found with ID {key}.")
        };
        Ok(ToolOutput::text(message, start.elapsed()))
    }
}
