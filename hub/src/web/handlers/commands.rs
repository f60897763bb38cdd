//! Command execution and history endpoints.

use std::collections::HashMap;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    response::Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use lookout_protocol::types::{CommandRequest, CommandResponse, HistoryEntry};

use super::common::{bad_request, dispatch_error, ApiError};
use crate::web::auth::ApiKeyAuth;
use crate::web::AppState;

const DEFAULT_HISTORY_LIMIT: usize = 10;
const MAX_HISTORY_LIMIT: usize = 100;

#[derive(Debug, Deserialize)]
pub struct ExecuteCommandBody {
    #[serde(default)]
    command: String,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    timeout: Option<u64>,
    #[serde(default)]
    workdir: Option<String>,
    #[serde(default)]
    env: HashMap<String, String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteCommandReply {
    exit_code: i32,
    stdout: String,
    stderr: String,
    error: String,
    duration: u64,
}

impl From<CommandResponse> for ExecuteCommandReply {
    fn from(response: CommandResponse) -> Self {
        Self {
            exit_code: response.exit_code,
            stdout: response.stdout,
            stderr: response.stderr,
            error: response.error,
            duration: response.duration_ms,
        }
    }
}

pub async fn execute_command(
    auth: ApiKeyAuth,
    Path(agent_id): Path<String>,
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<ExecuteCommandReply>, ApiError> {
    let body: ExecuteCommandBody = serde_json::from_slice(&body)
        .map_err(|e| bad_request(format!("invalid request body: {e}")))?;

    if body.command.trim().is_empty() {
        return Err(bad_request("command is required"));
    }

    let request = CommandRequest {
        command: body.command,
        args: body.args,
        timeout_secs: body.timeout,
        workdir: body.workdir,
        env: body.env,
        client_key: Some(auth.client),
    };

    info!(
        "Dispatching command {:?} to agent {}",
        request.command, agent_id
    );

    let response = state
        .dispatcher
        .execute_command(&agent_id, request)
        .await
        .map_err(dispatch_error)?;

    Ok(Json(response.into()))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    limit: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HistoryEntryReply {
    command: String,
    args: Vec<String>,
    timestamp: String,
    duration: u64,
    exit_code: i32,
    workdir: Option<String>,
}

impl From<&HistoryEntry> for HistoryEntryReply {
    fn from(entry: &HistoryEntry) -> Self {
        Self {
            command: entry.command.clone(),
            args: entry.args.clone(),
            timestamp: entry.started_at.to_rfc3339(),
            duration: entry.duration_ms,
            exit_code: entry.exit_code,
            workdir: entry.workdir.clone(),
        }
    }
}

pub async fn command_history(
    _auth: ApiKeyAuth,
    Path(agent_id): Path<String>,
    Query(query): Query<HistoryQuery>,
    State(state): State<AppState>,
) -> Result<Json<Value>, ApiError> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT);

    let history = state
        .dispatcher
        .command_history(&agent_id, limit)
        .await
        .map_err(dispatch_error)?;

    let entries: Vec<HistoryEntryReply> = history.iter().map(HistoryEntryReply::from).collect();
    Ok(Json(json!({ "history": entries })))
}
