// ABOUTME: Container engine trait and the request/response types that cross it
// ABOUTME: Lifecycle, command and file subsystems depend only on this interface

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};

use crate::error::Result;
use crate::types::{DetachedStatus, PortMapping};

pub mod docker;
pub mod runtime;

pub use docker::DockerEngine;
pub use runtime::{podman_socket, resolve_runtime, ContainerRuntime};

/// Everything needed to create and start a sandbox container
#[derive(Debug, Clone, Default)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub env: HashMap<String, String>,
    pub labels: HashMap<String, String>,
    pub ports: Vec<PortMapping>,
    /// Bind strings in `host:container:mode` form
    pub binds: Vec<String>,
    pub command: Vec<String>,
    pub tty: bool,
    pub open_stdin: bool,
}

/// Container state as reported by an inspect call
#[derive(Debug, Clone, Default)]
pub struct ContainerDetails {
    /// Full engine id
    pub id: String,
    pub name: String,
    pub image: String,
    /// Raw engine state (`running`, `paused`, `exited`, ...)
    pub state: String,
    pub labels: HashMap<String, String>,
    /// container port -> host port
    pub ports: BTreeMap<u16, u16>,
    pub created: Option<DateTime<Utc>>,
}

/// Filters for listing containers
#[derive(Debug, Clone, Default)]
pub struct ContainerQuery {
    /// `key=value` label filter
    pub label: Option<String>,
    /// Name substring filter
    pub name: Option<String>,
    /// Include stopped containers
    pub all: bool,
    pub limit: Option<usize>,
}

/// A command to run through the engine's exec API
#[derive(Debug, Clone, Default)]
pub struct ExecRequest {
    pub cmd: Vec<String>,
    pub working_dir: Option<String>,
    pub env: HashMap<String, String>,
    pub user: Option<String>,
}

/// Demultiplexed output of a finished exec
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit_code: i64,
}

/// Container engine operations used by the sandbox subsystems
///
/// Implementations map engine "no such object" responses to
/// `SandboxError::NotFound`.
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Check the engine responds on its control channel
    async fn ping(&self) -> Result<()>;

    async fn image_exists(&self, image: &str) -> Result<bool>;

    async fn pull_image(&self, image: &str) -> Result<()>;

    /// Create and start a container, returning its full engine id
    async fn create_container(&self, spec: &ContainerSpec) -> Result<String>;

    /// Look up a container by id, short id or name
    async fn inspect_container(&self, id_or_name: &str) -> Result<ContainerDetails>;

    async fn list_containers(&self, query: &ContainerQuery) -> Result<Vec<ContainerDetails>>;

    /// Run a command and wait for it, collecting stdout and stderr separately
    async fn exec(&self, container_id: &str, request: &ExecRequest) -> Result<ExecOutput>;

    /// Start a command without attaching, returning the exec id
    async fn exec_detached(&self, container_id: &str, request: &ExecRequest) -> Result<String>;

    async fn inspect_exec(&self, exec_id: &str) -> Result<DetachedStatus>;

    /// Tar archive of `path` as produced by the engine
    async fn get_archive(&self, container_id: &str, path: &str) -> Result<Vec<u8>>;

    /// Extract a tar archive into `dest_dir`
    async fn put_archive(&self, container_id: &str, dest_dir: &str, archive: Vec<u8>)
        -> Result<()>;

    async fn pause(&self, container_id: &str) -> Result<()>;

    async fn unpause(&self, container_id: &str) -> Result<()>;

    /// Stop with a grace period; already-stopped is success
    async fn stop(&self, container_id: &str, grace_secs: i64) -> Result<()>;

    /// Force-remove the container and its anonymous volumes
    async fn remove(&self, container_id: &str) -> Result<()>;
}
