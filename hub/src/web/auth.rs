//! Bearer-token authentication for the HTTP API.

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::Json,
};
use serde_json::{json, Value};

use super::AppState;

/// Extractor that validates the Authorization header against the
/// configured API tokens. The matched token's label identifies the
/// caller and becomes the rate-limit client key on the agent.
pub struct ApiKeyAuth {
    pub client: String,
}

impl FromRequestParts<AppState> for ApiKeyAuth {
    type Rejection = (StatusCode, Json<Value>);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let presented = parts
            .headers
            .get("authorization")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "));

        match presented.and_then(|token| state.config.find_api_token(token)) {
            Some(token) => Ok(ApiKeyAuth {
                client: token.label.clone(),
            }),
            None => Err((
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "unauthorized" })),
            )),
        }
    }
}
