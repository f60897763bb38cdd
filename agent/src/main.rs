use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use lookout_agent::config::AgentConfig;
use lookout_agent::executor::{CommandExecutor, CommandWhitelist};
use lookout_agent::{handlers, session};

#[tokio::main]
async fn main() -> Result<()> {
    let env_filter = EnvFilter::from_default_env()
        .add_directive("lookout_agent=info".parse()?)
        .add_directive("lookout_protocol=info".parse()?);

    fmt().with_env_filter(env_filter).init();

    info!("Starting Lookout agent");

    let config = AgentConfig::from_env()?;
    info!(
        "Configuration loaded: agent id {}, hub {}",
        config.agent_id, config.hub_addr
    );

    if matches!(config.executor.whitelist, CommandWhitelist::AllowAll) {
        warn!("Command whitelist disabled (allow_all) - not recommended outside development");
    }

    let executor = Arc::new(CommandExecutor::new(config.executor.clone()));
    let handlers = Arc::new(handlers::build_registry(executor));

    session::run(config, handlers).await
}
