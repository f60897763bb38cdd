//! Agent configuration, read once from the environment at startup.

use std::env;

use anyhow::Result;
use tracing::warn;

use crate::executor::{CommandWhitelist, ExecutorConfig};

#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Stable identity presented to the hub; defaults to the hostname.
    pub agent_id: String,
    /// `host:port` of the hub's agent listener.
    pub hub_addr: String,
    pub key: String,
    pub token: String,
    /// Reserved for ancillary transports; parsed but unused by the core.
    pub listen_port: Option<u16>,
    pub executor: ExecutorConfig,
}

impl AgentConfig {
    pub fn from_env() -> Result<Self> {
        let hub_addr = env::var("HUB_URL")
            .map(|url| url.trim_start_matches("tcp://").to_string())
            .unwrap_or_else(|_| "127.0.0.1:8745".to_string());

        let agent_id = env::var("AGENT_ID")
            .ok()
            .filter(|id| !id.trim().is_empty())
            .or_else(|| env::var("HOSTNAME").ok().filter(|h| !h.trim().is_empty()))
            .unwrap_or_else(|| "agent".to_string());

        let token = env::var("TOKEN").unwrap_or_default();
        if token.is_empty() {
            warn!("TOKEN is not set - the hub will refuse the handshake unless it also has no token configured");
        }

        let listen_port = match env::var("LISTEN_PORT") {
            Ok(raw) => match raw.parse::<u16>() {
                Ok(port) => Some(port),
                Err(_) => {
                    warn!("Ignoring unparseable LISTEN_PORT value {:?}", raw);
                    None
                }
            },
            Err(_) => None,
        };

        Ok(Self {
            agent_id,
            hub_addr,
            key: env::var("KEY").unwrap_or_default(),
            token,
            listen_port,
            executor: executor_config_from_env(),
        })
    }
}

fn executor_config_from_env() -> ExecutorConfig {
    let mut config = ExecutorConfig::default();

    if let Ok(raw) = env::var("COMMAND_WHITELIST") {
        if raw.trim().eq_ignore_ascii_case("allow_all") {
            config.whitelist = CommandWhitelist::AllowAll;
        } else if let Some(entries) = parse_list("COMMAND_WHITELIST", &raw) {
            config.whitelist = CommandWhitelist::Commands(entries);
        }
    }

    if let Ok(raw) = env::var("ALLOWED_PATHS") {
        if let Some(paths) = parse_list("ALLOWED_PATHS", &raw) {
            config.allowed_paths = paths;
        }
    }

    if let Some(max_output) = parse_int("COMMAND_MAX_OUTPUT") {
        config.max_output = max_output;
    }
    if let Some(rate_limit) = parse_int("COMMAND_RATE_LIMIT") {
        config.rate_limit = rate_limit;
    }
    if let Some(max_concurrent) = parse_int("COMMAND_MAX_CONCURRENT") {
        config.max_concurrent = max_concurrent;
    }

    config
}

/// Lists can be given either as a JSON array or as a comma-separated
/// string. A malformed value is ignored so a typo cannot silently widen
/// policy; the built-in default stays in force.
fn parse_list(name: &str, raw: &str) -> Option<Vec<String>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if raw.starts_with('[') {
        match serde_json::from_str::<Vec<String>>(raw) {
            Ok(entries) => Some(entries),
            Err(e) => {
                warn!("Ignoring malformed JSON in {}: {}", name, e);
                None
            }
        }
    } else {
        Some(
            raw.split(',')
                .map(|entry| entry.trim().to_string())
                .filter(|entry| !entry.is_empty())
                .collect(),
        )
    }
}

fn parse_int(name: &str) -> Option<usize> {
    let raw = env::var(name).ok()?;
    match raw.trim().parse::<usize>() {
        Ok(value) if value > 0 => Some(value),
        _ => {
            warn!("Ignoring invalid {} value {:?}", name, raw);
            None
        }
    }
}
