use std::sync::Arc;

use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::HubConfig;
use crate::dispatch::CommandDispatcher;
use crate::registry::AgentRegistry;
use crate::web::{handlers, AppState};

pub async fn start_web_server(
    config: Arc<HubConfig>,
    registry: Arc<AgentRegistry>,
    dispatcher: Arc<CommandDispatcher>,
) -> Result<()> {
    let state = AppState::new(config.clone(), registry, dispatcher);
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.http_addr).await?;
    tracing::info!("HTTP API running on http://{}", config.http_addr);
    axum::serve(listener, app).await?;
    Ok(())
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        // === AGENT REGISTRY ROUTES ===
        .route("/api/lookout/agents", get(handlers::agents::list_agents))
        .route(
            "/api/lookout/agents/{agent_id}",
            get(handlers::agents::get_agent),
        )
        // === COMMAND ROUTES ===
        .route(
            "/api/lookout/agents/{agent_id}/commands/execute",
            post(handlers::commands::execute_command),
        )
        .route(
            "/api/lookout/agents/{agent_id}/commands/history",
            get(handlers::commands::command_history),
        )
        // === HUB LIVENESS ===
        .route("/api/lookout/health", get(handlers::health))
        // Add middleware
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
