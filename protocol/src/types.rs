//! Typed payloads exchanged between the hub and its agents.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Exit code reported for validation, policy, and internal failures.
pub const EXIT_CODE_INTERNAL: i32 = -1;
/// Exit code reported when the child process hit its deadline.
pub const EXIT_CODE_TIMEOUT: i32 = -2;
/// Exit code reported when the executable does not exist.
pub const EXIT_CODE_NOT_FOUND: i32 = 127;

pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 30;
pub const MIN_COMMAND_TIMEOUT_SECS: u64 = 1;
pub const MAX_COMMAND_TIMEOUT_SECS: u64 = 300;

/// A requested command execution. `args` are passed to the child as a
/// discrete argv vector; nothing here is ever interpreted by a shell.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandRequest {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub workdir: Option<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Identity the rate limiter buckets by; filled in by the hub from
    /// the authenticated API caller.
    #[serde(default)]
    pub client_key: Option<String>,
}

impl CommandRequest {
    /// Requested timeout clamped to the allowed range, defaulting to 30 s.
    pub fn effective_timeout(&self) -> Duration {
        let secs = self
            .timeout_secs
            .unwrap_or(DEFAULT_COMMAND_TIMEOUT_SECS)
            .clamp(MIN_COMMAND_TIMEOUT_SECS, MAX_COMMAND_TIMEOUT_SECS);
        Duration::from_secs(secs)
    }
}

/// Result of a command execution attempt.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommandResponse {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    /// Human-readable failure description; empty on success.
    pub error: String,
    /// Wall-clock milliseconds spent in the execution phase.
    pub duration_ms: u64,
}

impl CommandResponse {
    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            exit_code: EXIT_CODE_INTERNAL,
            error: error.into(),
            ..Default::default()
        }
    }
}

/// Audit record of one execution attempt that reached the execution
/// phase. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub command: String,
    pub args: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub exit_code: i32,
    pub workdir: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HistoryRequest {
    pub limit: usize,
}

/// Presented by the agent as the first request on a fresh connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandshakeRequest {
    pub agent_id: String,
    pub key: String,
    pub token: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandshakeAck {
    pub accepted: bool,
    pub hub_version: String,
}
