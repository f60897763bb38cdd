//! HTTP request handlers for the hub API.

pub mod agents;
pub mod commands;
pub mod common;

use axum::response::Json;
use chrono::Utc;
use serde_json::{json, Value};

/// Liveness of the hub itself, unauthenticated.
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}
