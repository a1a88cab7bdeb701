//! File-backed knowledge graph.
//!
//! The file is a JSON document whose top-level `concepts` object maps concept
//! ids (`A.1`, `D.20`, ...) to `{label, section, prerequisites, status?}`.
//! Every read goes back to disk; status updates rewrite the whole file.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::GraphDataError;

static CONCEPT_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z]\.\d+$").expect("concept id pattern is valid"));

/// Whether `id` has the `Letter.Number` shape.
pub fn is_concept_id(id: &str) -> bool {
    CONCEPT_ID.is_match(id)
}

/// Learner status recorded on a concept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConceptStatus {
    Awareness,
    Mastery,
    Unlearned,
}

impl ConceptStatus {
    /// Sorted, for error messages.
    pub const ALLOWED: &'static str = "awareness, mastery, unlearned";

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Awareness => "awareness",
            Self::Mastery => "mastery",
            Self::Unlearned => "unlearned",
        }
    }
}

impl FromStr for ConceptStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "awareness" => Ok(Self::Awareness),
            "mastery" => Ok(Self::Mastery),
            "unlearned" => Ok(Self::Unlearned),
            other => Err(format!(
                "Invalid status '{other}'. Allowed statuses are: {}.",
                Self::ALLOWED
            )),
        }
    }
}

/// `{id, label}` pair returned by section and prerequisite lookups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConceptRef {
    pub id: String,
    pub label: String,
}

/// Prerequisites of a concept, split by whether they resolve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prerequisites {
    pub found: Vec<ConceptRef>,
    pub missing: Vec<String>,
}

/// Result of a status update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusUpdate {
    /// The concept already had this status; the file was not touched.
    Unchanged,
    /// The file was rewritten. `previous` is `"undefined"` if no status was set.
    Updated { previous: String },
    NotFound,
}

/// Knowledge graph stored in a single JSON file.
pub struct KnowledgeGraph {
    path: PathBuf,
    /// Serializes read-modify-write cycles on the file.
    write_lock: Mutex<()>,
}

impl KnowledgeGraph {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn display_path(&self) -> String {
        self.path.display().to_string()
    }

    async fn read_document(&self) -> Result<Value, GraphDataError> {
        let raw = match fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(GraphDataError::MissingFile {
                    path: self.display_path(),
                });
            }
            Err(e) => {
                return Err(GraphDataError::Io {
                    path: self.display_path(),
                    reason: e.to_string(),
                });
            }
        };

        serde_json::from_str(&raw).map_err(|e| GraphDataError::Malformed {
            path: self.display_path(),
            reason: e.to_string(),
        })
    }

    /// Load the `concepts` mapping.
    pub async fn concepts(&self) -> Result<Map<String, Value>, GraphDataError> {
        match self.read_document().await? {
            Value::Object(mut doc) => match doc.remove("concepts") {
                Some(Value::Object(concepts)) => Ok(concepts),
                _ => Err(GraphDataError::MissingConcepts),
            },
            _ => Err(GraphDataError::MissingConcepts),
        }
    }

    /// Concepts in `section` (an uppercase letter), in file order.
    pub async fn section(&self, section: char) -> Result<Vec<ConceptRef>, GraphDataError> {
        let section = section.to_ascii_uppercase().to_string();
        let concepts = self.concepts().await?;
        Ok(concepts
            .iter()
            .filter(|(_, info)| info.get("section").and_then(Value::as_str) == Some(section.as_str()))
            .map(|(id, info)| ConceptRef {
                id: id.clone(),
                label: label_of(info).to_string(),
            })
            .collect())
    }

    /// Full record for one concept.
    pub async fn concept(&self, id: &str) -> Result<Option<Value>, GraphDataError> {
        Ok(self.concepts().await?.remove(id))
    }

    /// Prerequisites for `id`, or `None` if the concept does not exist.
    pub async fn prerequisites(&self, id: &str) -> Result<Option<Prerequisites>, GraphDataError> {
        let concepts = self.concepts().await?;
        let Some(concept) = concepts.get(id) else {
            return Ok(None);
        };

        let ids: Vec<String> = concept
            .get("prerequisites")
            .and_then(Value::as_array)
            .map(|list| {
                list.iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        let mut found = Vec::new();
        let mut missing = Vec::new();
        for pid in ids {
            match concepts.get(&pid) {
                Some(prereq) => found.push(ConceptRef {
                    label: label_of(prereq).to_string(),
                    id: pid,
                }),
                None => missing.push(pid),
            }
        }
        Ok(Some(Prerequisites { found, missing }))
    }

    /// Human-readable summary of concepts that have a status, sorted by id.
    ///
    /// Graph errors are rendered into the returned text.
    pub async fn knowledge_state(&self) -> String {
        let concepts = match self.concepts().await {
            Ok(concepts) => concepts,
            Err(e) => return e.to_string(),
        };

        let mut with_status: Vec<(&String, &str, &str)> = concepts
            .iter()
            .filter_map(|(id, info)| {
                let status = info.get("status").and_then(Value::as_str)?;
                (!status.is_empty()).then(|| (id, label_of(info), status))
            })
            .collect();

        if with_status.is_empty() {
            return "No concepts with a non-empty status found.".to_string();
        }

        with_status.sort_by(|a, b| a.0.cmp(b.0));
        with_status
            .into_iter()
            .map(|(id, label, status)| {
                format!("Concept ID: {id} Label: {} status is {status}", title_case(label))
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Set the status of one concept, rewriting the file only if it changes.
    pub async fn update_status(
        &self,
        id: &str,
        status: ConceptStatus,
    ) -> Result<StatusUpdate, GraphDataError> {
        let _guard = self.write_lock.lock().await;

        let mut doc = self.read_document().await?;
        let Some(concepts) = doc.get_mut("concepts").and_then(Value::as_object_mut) else {
            return Err(GraphDataError::MissingConcepts);
        };
        let Some(concept) = concepts.get_mut(id).and_then(Value::as_object_mut) else {
            return Ok(StatusUpdate::NotFound);
        };

        let previous = concept
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or("undefined")
            .to_string();
        if previous == status.as_str() {
            debug!(concept = id, status = status.as_str(), "Status unchanged");
            return Ok(StatusUpdate::Unchanged);
        }

        concept.insert("status".to_string(), Value::String(status.as_str().to_string()));
        self.write_document(&doc).await?;

        info!(concept = id, from = %previous, to = status.as_str(), "Concept status updated");
        Ok(StatusUpdate::Updated { previous })
    }

    /// Write the document with 4-space indentation via a temp file + rename.
    async fn write_document(&self, doc: &Value) -> Result<(), GraphDataError> {
        let write_err = |reason: String| GraphDataError::Write {
            path: self.display_path(),
            reason,
        };

        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
        doc.serialize(&mut serializer)
            .map_err(|e| write_err(e.to_string()))?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, &buf).await.map_err(|e| write_err(e.to_string()))?;
        fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| write_err(e.to_string()))?;
        Ok(())
    }
}

fn label_of(info: &Value) -> &str {
    info.get("label").and_then(Value::as_str).unwrap_or("N/A")
}

/// Capitalize the first letter of each word, lowercase the rest.
fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut at_word_start = true;
    for ch in s.chars() {
        if ch.is_alphabetic() {
            if at_word_start {
                out.extend(ch.to_uppercase());
            } else {
                out.extend(ch.to_lowercase());
            }
            at_word_start = false;
        } else {
            out.push(ch);
            at_word_start = true;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"{
    "concepts": {
        "A.2": {
            "label": "supervised learning",
            "section": "A",
            "prerequisites": ["A.1"],
            "status": "awareness"
        },
        "A.1": {
            "label": "what is machine learning",
            "section": "A",
            "prerequisites": []
        },
        "B.1": {
            "label": "gradient descent",
            "section": "B",
            "prerequisites": ["A.2", "Z.9"],
            "status": ""
        }
    }
}"#;

    async fn test_graph(contents: &str) -> (KnowledgeGraph, TempDir) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("graph.json");
        fs::write(&path, contents).await.unwrap();
        (KnowledgeGraph::new(path), dir)
    }

    #[test]
    fn concept_id_pattern() {
        assert!(is_concept_id("A.1"));
        assert!(is_concept_id("E.31"));
        assert!(!is_concept_id("a.1"));
        assert!(!is_concept_id("AB.1"));
        assert!(!is_concept_id("A.x"));
    }

    #[test]
    fn title_case_matches_word_capitalization() {
        assert_eq!(title_case("what is machine learning"), "What Is Machine Learning");
        assert_eq!(title_case("k-NEAREST neighbors"), "K-Nearest Neighbors");
    }

    #[tokio::test]
    async fn knowledge_state_lists_statused_concepts_sorted() {
        let (graph, _dir) = test_graph(SAMPLE).await;
        assert_eq!(
            graph.knowledge_state().await,
            "Concept ID: A.2 Label: Supervised Learning status is awareness"
        );
    }

    #[tokio::test]
    async fn knowledge_state_without_statuses() {
        let (graph, _dir) = test_graph(r#"{"concepts": {"A.1": {"label": "x"}}}"#).await;
        assert_eq!(
            graph.knowledge_state().await,
            "No concepts with a non-empty status found."
        );
    }

    #[tokio::test]
    async fn knowledge_state_renders_graph_errors() {
        let dir = TempDir::new().unwrap();
        let graph = KnowledgeGraph::new(dir.path().join("missing.json"));
        let text = graph.knowledge_state().await;
        assert!(text.starts_with("Error: File '"), "{text}");
        assert!(text.ends_with("' does not exist."));

        let (graph, _dir) = test_graph(r#"{"nodes": {}}"#).await;
        assert_eq!(
            graph.knowledge_state().await,
            "Error: 'concepts' key not found in the JSON data."
        );

        let (graph, _dir) = test_graph("{not json").await;
        assert!(graph.knowledge_state().await.starts_with("Error reading JSON from"));
    }

    #[tokio::test]
    async fn section_lookup_is_case_insensitive() {
        let (graph, _dir) = test_graph(SAMPLE).await;
        let refs = graph.section('a').await.unwrap();
        let ids: Vec<_> = refs.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["A.2", "A.1"]);
        assert!(graph.section('Q').await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn prerequisites_split_found_and_missing() {
        let (graph, _dir) = test_graph(SAMPLE).await;
        let prereqs = graph.prerequisites("B.1").await.unwrap().unwrap();
        assert_eq!(
            prereqs.found,
            vec![ConceptRef {
                id: "A.2".into(),
                label: "supervised learning".into()
            }]
        );
        assert_eq!(prereqs.missing, vec!["Z.9"]);
        assert!(graph.prerequisites("C.1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unchanged_status_does_not_write() {
        let (graph, _dir) = test_graph(SAMPLE).await;
        let result = graph
            .update_status("A.2", ConceptStatus::Awareness)
            .await
            .unwrap();
        assert_eq!(result, StatusUpdate::Unchanged);

        let after = fs::read_to_string(graph.path()).await.unwrap();
        assert_eq!(after, SAMPLE);
    }

    #[tokio::test]
    async fn status_update_changes_only_that_concept() {
        let (graph, _dir) = test_graph(SAMPLE).await;
        let before: Value = serde_json::from_str(SAMPLE).unwrap();

        let result = graph
            .update_status("A.1", ConceptStatus::Mastery)
            .await
            .unwrap();
        assert_eq!(
            result,
            StatusUpdate::Updated {
                previous: "undefined".into()
            }
        );

        let raw = fs::read_to_string(graph.path()).await.unwrap();
        let after: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(after["concepts"]["A.1"]["status"], "mastery");
        assert_eq!(after["concepts"]["A.2"], before["concepts"]["A.2"]);
        assert_eq!(after["concepts"]["B.1"], before["concepts"]["B.1"]);

        // Key order and 4-space indentation are preserved.
        let keys: Vec<_> = after["concepts"].as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["A.2", "A.1", "B.1"]);
        assert!(raw.contains("\n    \"concepts\": {\n        \"A.2\""));
        assert!(!graph.path().with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn update_unknown_concept() {
        let (graph, _dir) = test_graph(SAMPLE).await;
        let result = graph
            .update_status("D.4", ConceptStatus::Mastery)
            .await
            .unwrap();
        assert_eq!(result, StatusUpdate::NotFound);
    }

    #[tokio::test]
    async fn concurrent_updates_are_serialized() {
        let (graph, _dir) = test_graph(SAMPLE).await;
        let graph = std::sync::Arc::new(graph);

        let a = {
            let g = graph.clone();
            tokio::spawn(async move { g.update_status("A.1", ConceptStatus::Mastery).await })
        };
        let b = {
            let g = graph.clone();
            tokio::spawn(async move { g.update_status("B.1", ConceptStatus::Unlearned).await })
        };
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        let concepts = graph.concepts().await.unwrap();
        assert_eq!(concepts["A.1"]["status"], "mastery");
        assert_eq!(concepts["B.1"]["status"], "unlearned");
    }

    #[test]
    fn status_parse_lists_allowed() {
        let err = "expert".parse::<ConceptStatus>().unwrap_err();
        assert_eq!(
            err,
            "Invalid status 'expert'. Allowed statuses are: awareness, mastery, unlearned."
        );
    }
}
