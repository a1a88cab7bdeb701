//! Mentor agent: a tutoring assistant that plans lessons, checks
//! understanding, and tracks what the learner knows.

pub mod agent;
pub mod api;
pub mod config;
pub mod context;
pub mod error;
pub mod knowledge;
pub mod llm;
pub mod store;
pub mod tools;
pub mod workflow;
