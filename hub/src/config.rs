//! Hub configuration, read once from the environment at startup.

use std::env;

use anyhow::Result;
use tracing::warn;

const DEV_API_TOKEN: &str = "lookout-dev-token";
const DEV_AGENT_TOKEN: &str = "lookout-dev-agent-token";

/// One accepted API bearer token. The label identifies the caller in
/// logs and scopes the agent-side rate limiter.
#[derive(Debug, Clone)]
pub struct ApiToken {
    pub label: String,
    pub token: String,
}

#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Bind address of the HTTP API.
    pub http_addr: String,
    /// Bind address of the persistent agent listener.
    pub agent_addr: String,
    /// Accepted HTTP API tokens.
    pub api_tokens: Vec<ApiToken>,
    /// Credential agents must present at handshake.
    pub agent_token: String,
}

impl HubConfig {
    pub fn from_env() -> Result<Self> {
        let http_addr = env::var("HUB_HTTP_ADDR").unwrap_or_else(|_| "0.0.0.0:8090".to_string());
        let agent_addr = env::var("HUB_AGENT_ADDR").unwrap_or_else(|_| "0.0.0.0:8745".to_string());

        let api_tokens = match env::var("HUB_API_TOKENS") {
            Ok(raw) => parse_api_tokens(&raw),
            Err(_) => Vec::new(),
        };
        let api_tokens = if api_tokens.is_empty() {
            match env::var("HUB_API_TOKEN") {
                Ok(token) if !token.trim().is_empty() => vec![ApiToken {
                    label: "admin".to_string(),
                    token,
                }],
                _ => {
                    warn!(
                        "No API token configured - using the development default; \
                         set HUB_API_TOKEN or HUB_API_TOKENS for production"
                    );
                    vec![ApiToken {
                        label: "admin".to_string(),
                        token: DEV_API_TOKEN.to_string(),
                    }]
                }
            }
        } else {
            api_tokens
        };

        let agent_token = match env::var("AGENT_TOKEN") {
            Ok(token) if !token.trim().is_empty() => token,
            _ => {
                warn!("AGENT_TOKEN not set - using the development default");
                DEV_AGENT_TOKEN.to_string()
            }
        };

        Ok(Self {
            http_addr,
            agent_addr,
            api_tokens,
            agent_token,
        })
    }

    pub fn find_api_token(&self, presented: &str) -> Option<&ApiToken> {
        self.api_tokens.iter().find(|t| t.token == presented)
    }
}

/// `HUB_API_TOKENS` is a comma-separated list of `label:token` pairs.
/// Entries without a label get one derived from their position.
fn parse_api_tokens(raw: &str) -> Vec<ApiToken> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .enumerate()
        .map(|(index, entry)| match entry.split_once(':') {
            Some((label, token)) => ApiToken {
                label: label.trim().to_string(),
                token: token.trim().to_string(),
            },
            None => ApiToken {
                label: format!("token-{index}"),
                token: entry.to_string(),
            },
        })
        .filter(|token| !token.token.is_empty())
        .collect()
}
