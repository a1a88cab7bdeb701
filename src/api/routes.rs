//! REST endpoints consumed by the learning frontend.
//!
//! All endpoints act on the single thread and user configured at startup.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::agent::AgentService;
use crate::agent::dispatch::{EVALUATION_SESSION, LEARNING_SESSION};
use crate::error::ConfigError;
use crate::workflow::RunScope;

/// Shared state for the API routes.
#[derive(Clone)]
pub struct ApiState {
    pub service: Arc<AgentService>,
    pub scope: RunScope,
}

/// Failure rendered as `500 {"detail": ...}`.
struct ApiError(String);

impl<E: std::fmt::Display> From<E> for ApiError {
    fn from(err: E) -> Self {
        Self(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error!(detail = %self.0, "Request failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "detail": self.0 })),
        )
            .into_response()
    }
}

/// Name the frontend expects for a suspended node.
pub fn display_node(node: &str) -> &str {
    match node {
        LEARNING_SESSION => "learning session",
        EVALUATION_SESSION => "evaluation session",
        other => other,
    }
}

/// GET /session-state
///
/// `{"next": ...}` names the session waiting on the learner, or is empty.
async fn session_state(State(state): State<ApiState>) -> Result<Json<serde_json::Value>, ApiError> {
    let next = state
        .service
        .session_state(&state.scope.thread_id)
        .await?
        .map(|node| display_node(&node).to_string())
        .unwrap_or_default();
    Ok(Json(json!({ "next": next })))
}

#[derive(Debug, Deserialize)]
struct ChatParams {
    user_input: String,
}

/// GET /chat?user_input=...
async fn chat(
    State(state): State<ApiState>,
    Query(params): Query<ChatParams>,
) -> Result<Json<serde_json::Value>, ApiError> {
    info!(thread = %state.scope.thread_id, "Chat turn");
    let reply = state.service.chat(&state.scope, &params.user_input).await?;
    Ok(Json(json!({ "response": reply.content })))
}

/// GET /plan
async fn plan(State(state): State<ApiState>) -> Result<Json<serde_json::Value>, ApiError> {
    let steps = state
        .service
        .learning_plan(&state.scope.thread_id)
        .await?;
    Ok(Json(json!({ "plan": steps })))
}

/// GET /assessment
async fn assessment(State(state): State<ApiState>) -> Result<Json<serde_json::Value>, ApiError> {
    let evals = state
        .service
        .assessment_plan(&state.scope.thread_id)
        .await?;
    Ok(Json(json!({ "plan": evals })))
}

/// GET /profile
async fn profile(State(state): State<ApiState>) -> Result<Json<serde_json::Value>, ApiError> {
    let profile = state.service.profile_summary(&state.scope.user_id).await?;
    Ok(Json(json!({ "profile": profile })))
}

/// Build the API router with a CORS layer for `frontend_origin`.
pub fn api_routes(state: ApiState, frontend_origin: &str) -> Result<Router, ConfigError> {
    let origin =
        HeaderValue::from_str(frontend_origin).map_err(|e| ConfigError::InvalidValue {
            key: "MENTOR_FRONTEND_ORIGIN".to_string(),
            message: e.to_string(),
        })?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Ok(Router::new()
        .route("/session-state", get(session_state))
        .route("/chat", get(chat))
        .route("/plan", get(plan))
        .route("/assessment", get(assessment))
        .route("/profile", get(profile))
        .layer(cors)
        .with_state(state))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_nodes_use_frontend_names() {
        assert_eq!(display_node("learning_session"), "learning session");
        assert_eq!(display_node("evaluation_session"), "evaluation session");
        assert_eq!(display_node("agent"), "agent");
    }
}
