pub mod config;
pub mod executor;
pub mod handlers;
pub mod session;

pub use config::AgentConfig;
pub use executor::{CommandExecutor, CommandWhitelist, ExecutorConfig};
