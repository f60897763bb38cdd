pub mod auth;
pub mod handlers;
pub mod server;

use std::sync::Arc;

use crate::config::HubConfig;
use crate::dispatch::CommandDispatcher;
use crate::registry::AgentRegistry;

pub use server::{create_router, start_web_server};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<HubConfig>,
    pub registry: Arc<AgentRegistry>,
    pub dispatcher: Arc<CommandDispatcher>,
}

impl AppState {
    pub fn new(
        config: Arc<HubConfig>,
        registry: Arc<AgentRegistry>,
        dispatcher: Arc<CommandDispatcher>,
    ) -> Self {
        Self {
            config,
            registry,
            dispatcher,
        }
    }
}
