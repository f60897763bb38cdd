use std::sync::Arc;

use anyhow::Result;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use lookout_hub::config::HubConfig;
use lookout_hub::dispatch::CommandDispatcher;
use lookout_hub::listener::AgentListener;
use lookout_hub::registry::AgentRegistry;
use lookout_hub::web;

#[tokio::main]
async fn main() -> Result<()> {
    let env_filter = EnvFilter::from_default_env()
        .add_directive("lookout_hub=info".parse()?)
        .add_directive("lookout_protocol=info".parse()?)
        .add_directive("tower_http=warn".parse()?)
        .add_directive("hyper=warn".parse()?);

    fmt().with_env_filter(env_filter).init();

    info!("Starting Lookout hub");

    let config = Arc::new(HubConfig::from_env()?);

    let registry = Arc::new(AgentRegistry::new());
    info!("Agent registry initialized");

    let dispatcher = Arc::new(CommandDispatcher::new(registry.clone()));

    let listener = AgentListener::bind(config.clone(), registry.clone()).await?;
    info!("Agent listener bound on {}", listener.local_addr());
    tokio::spawn(async move {
        if let Err(e) = listener.run().await {
            error!("Agent listener terminated: {e:#}");
        }
    });

    web::start_web_server(config, registry, dispatcher).await
}
