// ABOUTME: Sandbox lifecycle manager: create, list, inspect, pause, resume and kill
// ABOUTME: Sandbox state lives entirely in the engine; metadata round-trips through labels

use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::SandboxConfig;
use crate::engine::{ContainerDetails, ContainerEngine, ContainerQuery, ContainerSpec};
use crate::error::{Result, SandboxError};
use crate::labels::{SandboxLabels, TYPE_LABEL, TYPE_VALUE};
use crate::types::{CreateSandboxRequest, Sandbox, SandboxStatus, SandboxSummary};

/// Reserved prefix for sandbox container names
pub const NAME_PREFIX: &str = "csbx-";

/// Length of the short id handed to callers
const SHORT_ID_LEN: usize = 12;

/// Keeps the container alive until it is stopped
const KEEPALIVE_COMMAND: [&str; 2] = ["sleep", "infinity"];

pub fn short_id(engine_id: &str) -> String {
    engine_id.chars().take(SHORT_ID_LEN).collect()
}

/// `csbx-` followed by eight random hex characters
pub fn generate_name() -> String {
    let suffix: String = Uuid::new_v4().simple().to_string().chars().take(8).collect();
    format!("{}{}", NAME_PREFIX, suffix)
}

/// Apply the reserved prefix to a caller-supplied name, or generate one
pub fn normalize_name(name: Option<&str>) -> String {
    match name.map(str::trim).filter(|n| !n.is_empty()) {
        Some(name) if name.starts_with(NAME_PREFIX) => name.to_string(),
        Some(name) => format!("{}{}", NAME_PREFIX, name),
        None => generate_name(),
    }
}

/// Sandbox lifecycle over a container engine
#[derive(Clone)]
pub struct SandboxManager {
    engine: Arc<dyn ContainerEngine>,
    config: SandboxConfig,
}

impl SandboxManager {
    pub fn new(engine: Arc<dyn ContainerEngine>, config: SandboxConfig) -> Self {
        Self { engine, config }
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Check the engine is reachable
    pub async fn ping(&self) -> Result<()> {
        self.engine.ping().await
    }

    fn to_sandbox(details: ContainerDetails) -> Sandbox {
        let labels = SandboxLabels::from_labels(&details.labels);

        Sandbox {
            id: short_id(&details.id),
            name: details.name,
            status: SandboxStatus::from_engine_state(&details.state),
            template: details.image,
            metadata: labels.metadata,
            ports: details.ports,
            created_at: labels.created_at.or(details.created),
            timeout_secs: labels.timeout_secs,
        }
    }

    async fn ensure_image(&self, image: &str) -> Result<()> {
        if self.engine.image_exists(image).await? {
            return Ok(());
        }

        if !self.config.pull_missing_images {
            return Err(SandboxError::Image(format!(
                "Image {} not found locally and pulling is disabled",
                image
            )));
        }

        info!("Image {} not found locally, pulling", image);
        self.engine.pull_image(image).await
    }

    /// Create and start a sandbox
    ///
    /// The stored timeout is metadata only; nothing stops the sandbox when it
    /// elapses.
    pub async fn create(&self, request: CreateSandboxRequest) -> Result<Sandbox> {
        let template = request
            .template
            .clone()
            .unwrap_or_else(|| self.config.default_template.clone());
        let name = normalize_name(request.name.as_deref());

        self.ensure_image(&template).await?;

        let labels = SandboxLabels::new(
            request.timeout_secs,
            SandboxLabels::coerce_metadata(&request.metadata),
        );

        let spec = ContainerSpec {
            name: name.clone(),
            image: template.clone(),
            env: request.env_vars,
            labels: labels.to_labels(),
            ports: request.ports,
            binds: request.volumes.iter().map(|v| v.to_bind()).collect(),
            command: KEEPALIVE_COMMAND.iter().map(|s| s.to_string()).collect(),
            tty: true,
            open_stdin: true,
        };

        let engine_id = self.engine.create_container(&spec).await?;
        info!(
            "Created sandbox {} ({}) from {}",
            name,
            short_id(&engine_id),
            template
        );

        self.get_info(&engine_id).await
    }

    /// Running sandboxes carrying our type label, in engine order
    ///
    /// The limit is applied here: an engine-side limit also returns stopped
    /// containers.
    pub async fn list(&self, limit: Option<usize>) -> Result<Vec<SandboxSummary>> {
        let query = ContainerQuery {
            label: Some(SandboxLabels::managed_filter()),
            name: None,
            all: false,
            limit: None,
        };

        let containers = self.engine.list_containers(&query).await?;
        let running: Vec<SandboxSummary> = containers
            .into_iter()
            .filter(|details| {
                SandboxStatus::from_engine_state(&details.state) == SandboxStatus::Running
            })
            .take(limit.unwrap_or(usize::MAX))
            .map(|details| Self::to_sandbox(details).into())
            .collect();
        debug!("Found {} running sandboxes", running.len());

        Ok(running)
    }

    /// Inspect a container, treating one without our type label as absent
    async fn managed_container(&self, sandbox_id: &str) -> Result<ContainerDetails> {
        let details = self.engine.inspect_container(sandbox_id).await?;

        if details.labels.get(TYPE_LABEL).map(String::as_str) != Some(TYPE_VALUE) {
            debug!(
                "Container {} ({}) is not a sandbox",
                details.name,
                short_id(&details.id)
            );
            return Err(SandboxError::NotFound(format!("sandbox {}", sandbox_id)));
        }

        Ok(details)
    }

    pub async fn get_info(&self, sandbox_id: &str) -> Result<Sandbox> {
        let details = self.managed_container(sandbox_id).await?;
        Ok(Self::to_sandbox(details))
    }

    /// Live record for an id or name
    pub async fn connect(&self, name_or_id: &str) -> Result<Sandbox> {
        let sandbox_id = self.resolve_identifier(name_or_id).await?;
        self.get_info(&sandbox_id).await
    }

    /// Canonical short id for an id or name, including stopped sandboxes
    pub async fn resolve_identifier(&self, name_or_id: &str) -> Result<String> {
        match self.managed_container(name_or_id).await {
            Ok(details) => return Ok(short_id(&details.id)),
            Err(SandboxError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }

        let query = ContainerQuery {
            label: Some(SandboxLabels::managed_filter()),
            name: Some(name_or_id.to_string()),
            all: true,
            limit: None,
        };
        let candidates = self.engine.list_containers(&query).await?;

        // Engine name filters match substrings; prefer an exact name
        let prefixed = format!("{}{}", NAME_PREFIX, name_or_id);
        let best = candidates
            .iter()
            .find(|c| c.name == name_or_id || c.name == prefixed)
            .or_else(|| candidates.first());

        match best {
            Some(details) => Ok(short_id(&details.id)),
            None => Err(SandboxError::NotFound(format!("sandbox {}", name_or_id))),
        }
    }

    /// Stop with the configured grace period, then force-remove
    ///
    /// Returns false when the sandbox was already gone.
    pub async fn kill(&self, sandbox_id: &str) -> Result<bool> {
        let details = match self.managed_container(sandbox_id).await {
            Ok(details) => details,
            Err(SandboxError::NotFound(_)) => {
                debug!("Sandbox {} already gone", sandbox_id);
                return Ok(false);
            }
            Err(e) => return Err(e),
        };

        match self.engine.stop(&details.id, self.config.stop_grace_secs).await {
            Ok(()) => {}
            Err(SandboxError::NotFound(_)) => return Ok(false),
            Err(e) => warn!(
                "Failed to stop sandbox {} cleanly, forcing removal: {}",
                sandbox_id, e
            ),
        }

        match self.engine.remove(&details.id).await {
            Ok(()) => {
                info!("Killed sandbox {} ({})", details.name, short_id(&details.id));
                Ok(true)
            }
            Err(SandboxError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub async fn pause(&self, sandbox_id: &str) -> Result<()> {
        let details = self.managed_container(sandbox_id).await?;
        self.engine.pause(&details.id).await?;
        info!("Paused sandbox {}", sandbox_id);
        Ok(())
    }

    pub async fn resume(&self, sandbox_id: &str) -> Result<()> {
        let details = self.managed_container(sandbox_id).await?;
        self.engine.unpause(&details.id).await?;
        info!("Resumed sandbox {}", sandbox_id);
        Ok(())
    }

    /// URL for a container port, using live port bindings
    ///
    /// Falls back to the container port itself when it is not published.
    pub async fn get_host(&self, sandbox_id: &str, port: u16) -> Result<String> {
        let details = self.managed_container(sandbox_id).await?;

        let host_port = details.ports.get(&port).copied().unwrap_or_else(|| {
            debug!(
                "Port {} not published for sandbox {}, using it directly",
                port, sandbox_id
            );
            port
        });

        Ok(format!("http://{}:{}", self.config.host_address, host_port))
    }

    /// Live running state; an absent sandbox is not running
    pub async fn is_running(&self, sandbox_id: &str) -> Result<bool> {
        match self.managed_container(sandbox_id).await {
            Ok(details) => {
                Ok(SandboxStatus::from_engine_state(&details.state) == SandboxStatus::Running)
            }
            Err(SandboxError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}
