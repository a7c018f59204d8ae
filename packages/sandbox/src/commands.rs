// ABOUTME: Command execution inside sandboxes, foreground and detached
// ABOUTME: Process listing and kill are derived from shell commands run through the same path

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::engine::{ContainerEngine, ExecRequest};
use crate::error::{Result, SandboxError};
use crate::process_table::{ProcessTableParser, PsAuxParser};
use crate::types::{DetachedProcess, DetachedStatus, ExecResult, ProcessInfo};

/// Shell every command string is handed to
const SHELL: &str = "/bin/sh";

/// User for process inspection and signalling
const PROCESS_ADMIN_USER: &str = "root";

/// Per-call options for `run` and `run_detached`
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub cwd: Option<String>,
    pub env: HashMap<String, String>,
    /// `None` or zero waits indefinitely; ignored for detached runs
    pub timeout_secs: Option<u64>,
    pub user: Option<String>,
}

impl RunOptions {
    pub fn as_user(user: impl Into<String>) -> Self {
        Self {
            user: Some(user.into()),
            ..Default::default()
        }
    }
}

/// Runs shell commands inside sandboxes
#[derive(Clone)]
pub struct CommandRunner {
    engine: Arc<dyn ContainerEngine>,
    parser: Arc<dyn ProcessTableParser>,
}

impl CommandRunner {
    pub fn new(engine: Arc<dyn ContainerEngine>) -> Self {
        Self::with_parser(engine, Arc::new(PsAuxParser))
    }

    pub fn with_parser(
        engine: Arc<dyn ContainerEngine>,
        parser: Arc<dyn ProcessTableParser>,
    ) -> Self {
        Self { engine, parser }
    }

    fn to_request(command: &str, options: &RunOptions) -> Result<ExecRequest> {
        if command.trim().is_empty() {
            return Err(SandboxError::Usage("Command must not be empty".to_string()));
        }

        Ok(ExecRequest {
            cmd: vec![SHELL.to_string(), "-c".to_string(), command.to_string()],
            working_dir: options.cwd.clone(),
            env: options.env.clone(),
            user: options.user.clone(),
        })
    }

    /// Run a command and wait for it to finish
    ///
    /// A non-zero exit code is returned as data, not as an error. When the
    /// timeout elapses the call returns `Timeout` but the process keeps running
    /// inside the sandbox.
    pub async fn run(
        &self,
        sandbox_id: &str,
        command: &str,
        options: &RunOptions,
    ) -> Result<ExecResult> {
        let request = Self::to_request(command, options)?;
        debug!("Running in sandbox {}: {}", sandbox_id, command);

        let started = Instant::now();
        let exec = self.engine.exec(sandbox_id, &request);

        let output = match options.timeout_secs.filter(|secs| *secs > 0) {
            Some(seconds) => tokio::time::timeout(Duration::from_secs(seconds), exec)
                .await
                .map_err(|_| {
                    warn!(
                        "Command in sandbox {} timed out after {}s: {}",
                        sandbox_id, seconds, command
                    );
                    SandboxError::Timeout { seconds }
                })??,
            None => exec.await?,
        };

        Ok(ExecResult {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.exit_code,
            duration_ms: Some(started.elapsed().as_millis() as u64),
        })
    }

    /// Start a command in the background and return once the engine accepts it
    pub async fn run_detached(
        &self,
        sandbox_id: &str,
        command: &str,
        options: &RunOptions,
    ) -> Result<DetachedProcess> {
        let request = Self::to_request(command, options)?;

        let exec_id = self.engine.exec_detached(sandbox_id, &request).await?;
        info!(
            "Started detached command in sandbox {} (exec {}): {}",
            sandbox_id, exec_id, command
        );

        Ok(DetachedProcess {
            sandbox_id: sandbox_id.to_string(),
            exec_id,
            command: command.to_string(),
            started_at: Utc::now(),
        })
    }

    pub async fn detached_status(&self, process: &DetachedProcess) -> Result<DetachedStatus> {
        self.engine.inspect_exec(&process.exec_id).await
    }

    /// Current process table; empty when the listing command fails
    pub async fn list_processes(&self, sandbox_id: &str) -> Result<Vec<ProcessInfo>> {
        let result = self
            .run(
                sandbox_id,
                self.parser.command(),
                &RunOptions::as_user(PROCESS_ADMIN_USER),
            )
            .await?;

        if !result.success() {
            warn!(
                "Process listing failed in sandbox {} (exit {}): {}",
                sandbox_id,
                result.exit_code,
                result.stderr.trim()
            );
            return Ok(Vec::new());
        }

        Ok(self.parser.parse(&result.stdout))
    }

    /// Send SIGTERM to `pid`; true iff `kill` exits cleanly
    pub async fn kill_process(&self, sandbox_id: &str, pid: u32) -> Result<bool> {
        let result = self
            .run(
                sandbox_id,
                &format!("kill {}", pid),
                &RunOptions::as_user(PROCESS_ADMIN_USER),
            )
            .await?;

        if result.success() {
            info!("Killed process {} in sandbox {}", pid, sandbox_id);
        } else {
            debug!(
                "kill {} in sandbox {} exited {}: {}",
                pid,
                sandbox_id,
                result.exit_code,
                result.stderr.trim()
            );
        }

        Ok(result.success())
    }

    pub async fn get_process_status(
        &self,
        sandbox_id: &str,
        pid: u32,
    ) -> Result<Option<ProcessInfo>> {
        Ok(self
            .list_processes(sandbox_id)
            .await?
            .into_iter()
            .find(|process| process.pid == pid))
    }
}
