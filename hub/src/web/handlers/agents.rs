//! Agent registry endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use serde_json::{json, Value};

use super::common::{error_response, ApiError};
use crate::registry::AgentSummary;
use crate::web::auth::ApiKeyAuth;
use crate::web::AppState;

pub async fn list_agents(_auth: ApiKeyAuth, State(state): State<AppState>) -> Json<Value> {
    let agents = state.registry.list().await;
    Json(json!({ "agents": agents }))
}

pub async fn get_agent(
    _auth: ApiKeyAuth,
    Path(agent_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<AgentSummary>, ApiError> {
    state
        .registry
        .summary(&agent_id)
        .await
        .map(Json)
        .ok_or_else(|| error_response(StatusCode::NOT_FOUND, "agent not found"))
}
