//! Knowledge graph tools.
//!
//! Graph file problems (missing file, bad JSON, no `concepts` key) are
//! returned as the tool's text result rather than as tool errors.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use crate::context::ToolContext;
use crate::knowledge::{ConceptStatus, KnowledgeGraph, StatusUpdate, is_concept_id};
use crate::tools::tool::{Tool, ToolError, ToolOutput, require_str};

fn require_concept_id<'a>(
    params: &'a serde_json::Value,
    invalid: impl FnOnce(&str) -> String,
) -> Result<&'a str, ToolError> {
    let id = require_str(params, "concept_id")?;
    if !is_concept_id(id) {
        return Err(ToolError::InvalidArgument(invalid(id)));
    }
    Ok(id)
}

fn not_found(id: &str) -> ToolError {
    ToolError::NotFound(format!("Concept with ID '{id}' not found."))
}

fn concept_id_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "string",
        "description": "Concept ID, a letter followed by a dot and a number (e.g. 'A.1')"
    })
}

// ── retrieve_sections ───────────────────────────────────────────────

pub struct RetrieveSectionsTool {
    graph: Arc<KnowledgeGraph>,
}

impl RetrieveSectionsTool {
    pub fn new(graph: Arc<KnowledgeGraph>) -> Self {
        Self { graph }
    }
}

#[async_trait]
impl Tool for RetrieveSectionsTool {
    fn name(&self) -> &str {
        "retrieve_sections"
    }

    fn description(&self) -> &str {
        "Retrieves the concepts belonging to a knowledge graph section. \
         Returns a list of {id, label}."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "section_letter": {
                    "type": "string",
                    "description": "Section letter (e.g. \"A\", \"B\")"
                }
            },
            "required": ["section_letter"]
        })
    }

    async fn execute(
        &self,
        params: serde_json::Value,
        _ctx: &ToolContext,
    ) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let raw = require_str(&params, "section_letter")?;
        let mut chars = raw.chars();
        let letter = match (chars.next(), chars.next()) {
            (Some(c), None) if c.is_alphabetic() => c,
            _ => {
                return Err(ToolError::InvalidArgument(
                    "Invalid section letter. Must be a single alphabet character.".into(),
                ));
            }
        };

        match self.graph.section(letter).await {
            Ok(refs) => Ok(ToolOutput::success(serde_json::json!(refs), start.elapsed())),
            Err(e) => Ok(ToolOutput::text(e.to_string(), start.elapsed())),
        }
    }
}

// ── retrieve_concept ────────────────────────────────────────────────

pub struct RetrieveConceptTool {
    graph: Arc<KnowledgeGraph>,
}

impl RetrieveConceptTool {
    pub fn new(graph: Arc<KnowledgeGraph>) -> Self {
        Self { graph }
    }
}

#[async_trait]
impl Tool for RetrieveConceptTool {
    fn name(&self) -> &str {
        "retrieve_concept"
    }

    fn description(&self) -> &str {
        "Retrieves a concept by its ID: label, section, prerequisites and status."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": { "concept_id": concept_id_schema() },
            "required": ["concept_id"]
        })
    }

    async fn execute(
        &self,
        params: serde_json::Value,
        _ctx: &ToolContext,
    ) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let id = require_str(&params, "concept_id")?;

        match self.graph.concept(id).await {
            Ok(Some(concept)) => Ok(ToolOutput::success(concept, start.elapsed())),
            Ok(None) => Err(not_found(id)),
            Err(e) => Ok(ToolOutput::text(e.to_string(), start.elapsed())),
        }
    }
}

// ── update_concept_status ───────────────────────────────────────────

pub struct UpdateConceptStatusTool {
    graph: Arc<KnowledgeGraph>,
}

impl UpdateConceptStatusTool {
    pub fn new(graph: Arc<KnowledgeGraph>) -> Self {
        Self { graph }
    }
}

#[async_trait]
impl Tool for UpdateConceptStatusTool {
    fn name(&self) -> &str {
        "update_concept_status"
    }

    fn description(&self) -> &str {
        "Updates a concept's learner status (mastery, unlearned or awareness) \
         and saves the knowledge graph."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "concept_id": concept_id_schema(),
                "new_status": {
                    "type": "string",
                    "enum": ["mastery", "unlearned", "awareness"],
                    "description": "The new status for the concept"
                }
            },
            "required": ["concept_id", "new_status"]
        })
    }

    async fn execute(
        &self,
        params: serde_json::Value,
        _ctx: &ToolContext,
    ) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let id = require_concept_id(&params, |_| {
            "Invalid concept ID format. The correct format is a single uppercase letter \
             followed by a dot and a number (e.g., 'A.1')."
                .to_string()
        })?;
        let status: ConceptStatus = require_str(&params, "new_status")?
            .parse()
            .map_err(ToolError::InvalidArgument)?;

        let message = match self.graph.update_status(id, status).await {
            Ok(StatusUpdate::Unchanged) => format!(
                "No update needed: Concept '{id}' is already set to '{}'.",
                status.as_str()
            ),
            Ok(StatusUpdate::Updated { previous }) => format!(
                "Success: Status of concept '{id}' updated from '{previous}' to '{}'.",
                status.as_str()
            ),
            Ok(StatusUpdate::NotFound) => return Err(not_found(id)),
            Err(e) => e.to_string(),
        };
        Ok(ToolOutput::text(message, start.elapsed()))
    }
}

// ── get_prerequisites ───────────────────────────────────────────────

pub struct GetPrerequisitesTool {
    graph: Arc<KnowledgeGraph>,
}

impl GetPrerequisitesTool {
    pub fn new(graph: Arc<KnowledgeGraph>) -> Self {
        Self { graph }
    }
}

#[async_trait]
impl Tool for GetPrerequisitesTool {
    fn name(&self) -> &str {
        "get_prerequisites"
    }

    fn description(&self) -> &str {
        "Lists the prerequisites of a concept with their IDs and labels."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": { "concept_id": concept_id_schema() },
            "required": ["concept_id"]
        })
    }

    async fn execute(
        &self,
        params: serde_json::Value,
        _ctx: &ToolContext,
    ) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let id = require_concept_id(&params, |id| {
            format!(
                "Invalid concept ID format '{id}'. The correct format should be a letter \
                 followed by a dot and number, e.g., 'A.1'."
            )
        })?;

        let prereqs = match self.graph.prerequisites(id).await {
            Ok(Some(prereqs)) => prereqs,
            Ok(None) => return Err(not_found(id)),
            Err(e) => return Ok(ToolOutput::text(e.to_string(), start.elapsed())),
        };

        if prereqs.found.is_empty() && prereqs.missing.is_empty() {
            return Ok(ToolOutput::text(
                format!("Concept '{id}' has no prerequisites."),
                start.elapsed(),
            ));
        }

        let mut lines = vec![format!("Prerequisites for Concept '{id}':")];
        lines.extend(prereqs.found.iter().map(|p| format!(" - {}: {}", p.id, p.label)));
        if !prereqs.missing.is_empty() {
            lines.push(
                "\nWarning: The following prerequisite IDs were not found in the data:".to_string(),
            );
            lines.extend(prereqs.missing.iter().map(|pid| format!(" - {pid}")));
        }
        Ok(ToolOutput::text(lines.join("\n"), start.elapsed()))
    }
}
