//! Knowledge graph collaborator.

pub mod graph;

pub use graph::{ConceptRef, ConceptStatus, KnowledgeGraph, Prerequisites, StatusUpdate, is_concept_id};
