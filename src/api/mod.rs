//! HTTP surface over the agent service.

pub mod routes;

pub use routes::{ApiState, api_routes, display_node};
