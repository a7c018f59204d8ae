// ABOUTME: Core type definitions for sandboxes, exec results, processes and files
// ABOUTME: Includes parsers for caller-supplied port, volume and env specifications

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SandboxError};

/// Sandbox lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SandboxStatus {
    Running,
    Paused,
    Stopped,
    /// Terminal: the engine is removing or has removed the container
    Removed,
}

impl SandboxStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Stopped => "stopped",
            Self::Removed => "removed",
        }
    }

    /// Convert an engine state string (`running`, `exited`, ...) to our status
    pub fn from_engine_state(state: &str) -> Self {
        match state.to_lowercase().as_str() {
            "running" | "restarting" => Self::Running,
            "paused" => Self::Paused,
            "removing" => Self::Removed,
            // created, exited, dead, stopped and anything unknown
            _ => Self::Stopped,
        }
    }
}

impl fmt::Display for SandboxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Live sandbox record decoded from the engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sandbox {
    /// Short id (first 12 characters of the engine id)
    pub id: String,
    pub name: String,
    pub status: SandboxStatus,
    /// Image reference the sandbox was created from
    pub template: String,
    pub metadata: BTreeMap<String, String>,
    /// container port -> host port
    pub ports: BTreeMap<u16, u16>,
    pub created_at: Option<DateTime<Utc>>,
    /// Stored only; never enforced
    pub timeout_secs: Option<u64>,
}

/// List-view projection of a sandbox
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxSummary {
    pub id: String,
    pub name: String,
    pub template: String,
    pub status: SandboxStatus,
    pub created_at: Option<DateTime<Utc>>,
}

impl From<Sandbox> for SandboxSummary {
    fn from(sandbox: Sandbox) -> Self {
        Self {
            id: sandbox.id,
            name: sandbox.name,
            template: sandbox.template,
            status: sandbox.status,
            created_at: sandbox.created_at,
        }
    }
}

/// Request to create a new sandbox
#[derive(Debug, Clone, Default)]
pub struct CreateSandboxRequest {
    /// Image to run; falls back to the configured default template
    pub template: Option<String>,
    pub timeout_secs: Option<u64>,
    pub env_vars: HashMap<String, String>,
    /// Values are coerced to strings before being stored as labels
    pub metadata: BTreeMap<String, serde_json::Value>,
    pub ports: Vec<PortMapping>,
    pub volumes: Vec<VolumeSpec>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortMapping {
    pub container_port: u16,
    pub host_port: u16,
}

impl FromStr for PortMapping {
    type Err = SandboxError;

    /// Parse `container:host`
    fn from_str(s: &str) -> Result<Self> {
        let (container, host) = s.split_once(':').ok_or_else(|| {
            SandboxError::Usage(format!("Port mapping must be container:host, got '{}'", s))
        })?;

        let parse = |v: &str| {
            v.trim()
                .parse::<u16>()
                .map_err(|_| SandboxError::Usage(format!("Invalid port '{}' in '{}'", v, s)))
        };

        Ok(PortMapping {
            container_port: parse(container)?,
            host_port: parse(host)?,
        })
    }
}

/// Default bind mode: read-write with SELinux relabeling
pub const DEFAULT_VOLUME_MODE: &str = "rw,Z";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeSpec {
    pub host_path: PathBuf,
    pub container_path: String,
    pub mode: String,
}

impl VolumeSpec {
    /// Engine bind string `host:container:mode`
    pub fn to_bind(&self) -> String {
        format!(
            "{}:{}:{}",
            self.host_path.display(),
            self.container_path,
            self.mode
        )
    }
}

impl FromStr for VolumeSpec {
    type Err = SandboxError;

    /// Parse `host_path:container_path[:mode]`, expanding `~` and absolutizing the host path
    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.splitn(3, ':');
        let host = parts.next().unwrap_or_default().trim();
        let container = parts.next().map(str::trim).unwrap_or_default();

        if host.is_empty() || container.is_empty() {
            return Err(SandboxError::Usage(format!(
                "Volume must be host_path:container_path[:mode], got '{}'",
                s
            )));
        }

        let mode = parts
            .next()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(DEFAULT_VOLUME_MODE);

        Ok(VolumeSpec {
            host_path: absolutize(&expand_home(host))?,
            container_path: container.to_string(),
            mode: mode.to_string(),
        })
    }
}

fn expand_home(path: &str) -> PathBuf {
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    } else if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

fn absolutize(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

/// Parse `KEY=VALUE`; the value may itself contain `=`
pub fn parse_env_pair(s: &str) -> Result<(String, String)> {
    match s.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(SandboxError::Usage(format!(
            "Environment variable must be KEY=VALUE, got '{}'",
            s
        ))),
    }
}

/// Result of a foreground command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i64,
    pub duration_ms: Option<u64>,
}

impl ExecResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Handle for a command started with `run_detached`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetachedProcess {
    pub sandbox_id: String,
    /// Engine exec instance id
    pub exec_id: String,
    pub command: String,
    pub started_at: DateTime<Utc>,
}

/// Status of a detached command as reported by the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetachedStatus {
    pub running: bool,
    /// Present once the command has exited
    pub exit_code: Option<i64>,
    /// Host-side pid reported by the engine, when known
    pub pid: Option<i64>,
}

/// One row of the sandbox process table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessInfo {
    pub pid: u32,
    pub user: String,
    pub cpu_percent: f32,
    pub mem_percent: f32,
    pub command: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    File,
    Dir,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub name: String,
    pub path: String,
    #[serde(rename = "type")]
    pub file_type: FileType,
    pub size: u64,
    pub permissions: String,
}

/// Outcome of `upload`/`download`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferSummary {
    pub path: String,
    pub size: u64,
}
