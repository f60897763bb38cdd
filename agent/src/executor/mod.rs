//! Security-hardened command execution.
//!
//! Every request runs the same gauntlet, in order: validation (fail
//! closed), per-caller rate limiting, a non-blocking concurrency cap,
//! environment validation, and only then the actual child process with
//! bounded output capture and a hard deadline. Anything that reaches the
//! execution phase leaves exactly one audit record in the history ring;
//! validation refusals are logged but never invoke the OS.

mod history;
mod rate_limit;
mod validate;

pub use validate::{BLACKLIST_PATTERNS, INJECTION_PATTERNS};

use std::io;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use lookout_protocol::types::{
    CommandRequest, CommandResponse, HistoryEntry, EXIT_CODE_INTERNAL, EXIT_CODE_NOT_FOUND,
    EXIT_CODE_TIMEOUT,
};

use history::HistoryRing;
use rate_limit::RateLimiter;

/// Sliding window the rate limiter operates over. Only the count within
/// the window is configurable.
pub const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);

/// Allow-set of executable paths, or the development-only sentinel that
/// disables the check.
#[derive(Debug, Clone)]
pub enum CommandWhitelist {
    AllowAll,
    Commands(Vec<String>),
}

impl CommandWhitelist {
    /// A candidate passes if it equals an entry exactly or is an entry
    /// followed by a space (legacy compound form).
    fn permits(&self, command: &str) -> bool {
        match self {
            CommandWhitelist::AllowAll => true,
            CommandWhitelist::Commands(entries) => entries.iter().any(|entry| {
                command == entry
                    || (command.len() > entry.len()
                        && command.starts_with(entry.as_str())
                        && command.as_bytes()[entry.len()] == b' ')
            }),
        }
    }
}

/// Executor policy, fixed at construction.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub whitelist: CommandWhitelist,
    /// Directory prefixes an absolute command's parent must start with.
    pub allowed_paths: Vec<String>,
    /// Byte cap per captured stream.
    pub max_output: usize,
    /// Simultaneously running executions.
    pub max_concurrent: usize,
    /// Commands allowed per client key within [`RATE_LIMIT_WINDOW`].
    pub rate_limit: usize,
    pub history_capacity: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            whitelist: CommandWhitelist::Commands(
                [
                    "/bin/ls",
                    "/bin/cat",
                    "/bin/echo",
                    "/bin/df",
                    "/usr/bin/du",
                    "/usr/bin/free",
                    "/usr/bin/uptime",
                ]
                .map(str::to_string)
                .to_vec(),
            ),
            allowed_paths: [
                "/bin/",
                "/sbin/",
                "/usr/bin/",
                "/usr/sbin/",
                "/usr/local/bin/",
            ]
            .map(str::to_string)
            .to_vec(),
            max_output: 1024 * 1024,
            max_concurrent: 5,
            rate_limit: 10,
            history_capacity: 100,
        }
    }
}

pub struct CommandExecutor {
    config: ExecutorConfig,
    running: Arc<Semaphore>,
    rate_limiter: RateLimiter,
    history: HistoryRing,
}

impl CommandExecutor {
    pub fn new(config: ExecutorConfig) -> Self {
        Self {
            running: Arc::new(Semaphore::new(config.max_concurrent)),
            rate_limiter: RateLimiter::new(config.rate_limit, RATE_LIMIT_WINDOW),
            history: HistoryRing::new(config.history_capacity),
            config,
        }
    }

    /// Run one command request through the full policy pipeline. Policy
    /// refusals come back as responses with a sentinel exit code; this
    /// never returns an error to the wire layer.
    pub async fn execute(&self, request: CommandRequest) -> CommandResponse {
        let client_key = request.client_key.as_deref().unwrap_or("default");

        if let Err(reason) = validate::validate_command(&request.command, &self.config) {
            warn!("Refused command {:?}: {}", request.command, reason);
            return CommandResponse::rejected(format!("command validation failed: {reason}"));
        }

        // After validation, so a refused command costs no rate budget.
        if !self.rate_limiter.allow(client_key).await {
            warn!("Rate limit exceeded for client {:?}", client_key);
            return CommandResponse::rejected(format!(
                "rate limit exceeded: {} commands per {}s",
                self.config.rate_limit,
                RATE_LIMIT_WINDOW.as_secs()
            ));
        }

        // Non-blocking: under pressure we refuse instead of queueing.
        let permit = match self.running.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                warn!(
                    "Concurrency cap of {} reached; refusing {:?}",
                    self.config.max_concurrent, request.command
                );
                return CommandResponse::rejected(
                    "maximum concurrent command execution limit reached",
                );
            }
        };

        if let Err(reason) = validate::validate_env(&request.env) {
            return CommandResponse::rejected(format!("command validation failed: {reason}"));
        }

        let started_at = Utc::now();
        let response = self.run_child(&request).await;
        drop(permit);

        self.history
            .record(HistoryEntry {
                command: request.command.clone(),
                args: request.args.clone(),
                started_at,
                duration_ms: response.duration_ms,
                exit_code: response.exit_code,
                workdir: request.workdir.clone(),
            })
            .await;

        response
    }

    /// The most recent `min(limit, size)` entries, oldest first.
    pub async fn history(&self, limit: usize) -> Vec<HistoryEntry> {
        self.history.recent(limit.min(self.config.history_capacity)).await
    }

    /// Execution phase: spawn, capture bounded output, enforce the
    /// deadline. `duration_ms` covers this phase only, not queueing.
    async fn run_child(&self, request: &CommandRequest) -> CommandResponse {
        let timeout = request.effective_timeout();
        let start = Instant::now();

        let mut command = Command::new(&request.command);
        command
            .args(&request.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(workdir) = &request.workdir {
            command.current_dir(workdir);
        }
        for (name, value) in &request.env {
            command.env(name, value);
        }
        // Own process group so a timeout can take the whole tree down.
        #[cfg(unix)]
        command.process_group(0);

        debug!("Spawning {:?} with args {:?}", request.command, request.args);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return CommandResponse {
                    exit_code: EXIT_CODE_NOT_FOUND,
                    error: "command not found".to_string(),
                    duration_ms: start.elapsed().as_millis() as u64,
                    ..Default::default()
                };
            }
            Err(e) => {
                return CommandResponse {
                    exit_code: EXIT_CODE_INTERNAL,
                    error: format!("failed to start command: {e}"),
                    duration_ms: start.elapsed().as_millis() as u64,
                    ..Default::default()
                };
            }
        };

        // Both drains run to EOF even after a kill so no buffered bytes
        // are lost and the child never stalls on a full pipe.
        let stdout_task = child
            .stdout
            .take()
            .map(|reader| tokio::spawn(read_capped(reader, self.config.max_output)));
        let stderr_task = child
            .stderr
            .take()
            .map(|reader| tokio::spawn(read_capped(reader, self.config.max_output)));

        let (exit_code, error) = match tokio::time::timeout(timeout, child.wait()).await {
            Ok(Ok(status)) => match status.code() {
                Some(code) => (code, String::new()),
                None => (EXIT_CODE_INTERNAL, "command terminated by signal".to_string()),
            },
            Ok(Err(e)) => (EXIT_CODE_INTERNAL, format!("failed to wait for command: {e}")),
            Err(_) => {
                info!(
                    "Command {:?} exceeded its {}s deadline; killing it",
                    request.command,
                    timeout.as_secs()
                );
                kill_process_tree(&mut child).await;
                (EXIT_CODE_TIMEOUT, "command execution timed out".to_string())
            }
        };

        let stdout = drain(stdout_task).await;
        let stderr = drain(stderr_task).await;

        CommandResponse {
            exit_code,
            stdout,
            stderr,
            error,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }
}

async fn drain(task: Option<tokio::task::JoinHandle<Vec<u8>>>) -> String {
    match task {
        Some(task) => {
            let bytes = task.await.unwrap_or_default();
            String::from_utf8_lossy(&bytes).into_owned()
        }
        None => String::new(),
    }
}

/// Read a stream to EOF, keeping at most `cap` bytes. Bytes past the cap
/// are consumed and discarded at this boundary.
async fn read_capped<R>(mut reader: R, cap: usize) -> Vec<u8>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut captured = Vec::new();
    let mut chunk = [0u8; 8192];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                if captured.len() < cap {
                    let take = n.min(cap - captured.len());
                    captured.extend_from_slice(&chunk[..take]);
                }
            }
        }
    }
    captured
}

/// Kill the child's whole process group on Unix; the group exists because
/// the child was spawned with `process_group(0)`. After the signal the
/// child still gets reaped by the caller's drains and wait.
#[cfg(unix)]
async fn kill_process_tree(child: &mut Child) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    if let Some(pid) = child.id() {
        if let Err(e) = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
            debug!("killpg({}) failed: {}; falling back to kill", pid, e);
            let _ = child.start_kill();
        }
    } else {
        let _ = child.start_kill();
    }
    let _ = child.wait().await;
}

#[cfg(not(unix))]
async fn kill_process_tree(child: &mut Child) {
    let _ = child.start_kill();
    let _ = child.wait().await;
}
