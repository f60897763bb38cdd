// Shared helpers for API handlers

use axum::{http::StatusCode, response::Json};
use serde_json::{json, Value};

use crate::dispatch::DispatchError;

pub type ApiError = (StatusCode, Json<Value>);

pub fn error_response(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(json!({ "error": message.into() })))
}

pub fn bad_request(message: impl Into<String>) -> ApiError {
    error_response(StatusCode::BAD_REQUEST, message)
}

/// Transport and lookup failures map to HTTP statuses so callers can
/// drive retry logic; everything the RPC itself reported travels as data
/// in a 200 body.
pub fn dispatch_error(error: DispatchError) -> ApiError {
    let status = match error {
        DispatchError::AgentNotFound => StatusCode::NOT_FOUND,
        DispatchError::AgentOffline => StatusCode::SERVICE_UNAVAILABLE,
        DispatchError::Disconnected => StatusCode::SERVICE_UNAVAILABLE,
        DispatchError::RpcTimeout => StatusCode::GATEWAY_TIMEOUT,
        DispatchError::Agent(_) | DispatchError::InvalidResponse(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    error_response(status, error.to_string())
}
