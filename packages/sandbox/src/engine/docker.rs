// ABOUTME: Docker-compatible engine implementation for local container sandboxes
// ABOUTME: Uses bollard against either the Docker daemon or the Podman API socket

use super::{
    ContainerDetails, ContainerEngine, ContainerQuery, ContainerSpec, ExecOutput, ExecRequest,
};
use crate::config::SandboxConfig;
use crate::engine::runtime::{podman_socket, resolve_runtime, ContainerRuntime};
use crate::error::{Result, SandboxError};
use crate::types::DetachedStatus;
use async_trait::async_trait;
use bollard::{
    container::{
        Config, CreateContainerOptions, DownloadFromContainerOptions, ListContainersOptions,
        LogOutput, RemoveContainerOptions, StartContainerOptions, StopContainerOptions,
        UploadToContainerOptions,
    },
    errors::Error as BollardError,
    exec::{CreateExecOptions, StartExecOptions, StartExecResults},
    image::CreateImageOptions,
    models::{ContainerInspectResponse, HostConfig, PortBinding},
    Docker, API_DEFAULT_VERSION,
};
use csbx_config::constants;
use futures::StreamExt;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub struct DockerEngine {
    client: Docker,
    runtime: ContainerRuntime,
    /// Timeout for image pull operations
    pull_timeout: Duration,
}

impl DockerEngine {
    /// Resolve the runtime from configuration and build a client for it
    ///
    /// No request is made here; an unreachable socket fails the first call.
    pub fn connect(config: &SandboxConfig) -> Result<Self> {
        let runtime = resolve_runtime(config.runtime)?;

        let client = match runtime {
            ContainerRuntime::Podman => {
                let socket = podman_socket(config.podman_socket_path.as_deref());
                debug!("Using podman socket {}", socket.display());
                Docker::connect_with_socket(
                    &socket.to_string_lossy(),
                    config.engine_timeout_secs,
                    API_DEFAULT_VERSION,
                )
            }
            ContainerRuntime::Docker => {
                if let Ok(host) = std::env::var(constants::DOCKER_HOST) {
                    debug!("Using DOCKER_HOST {}", host);
                }
                Docker::connect_with_defaults().map(|docker| {
                    docker.with_timeout(Duration::from_secs(config.engine_timeout_secs))
                })
            }
        }
        .map_err(|e| {
            SandboxError::RuntimeUnavailable(format!("Failed to connect to {}: {}", runtime, e))
        })?;

        info!("Using {} container runtime", runtime);

        Ok(Self::with_client(
            client,
            runtime,
            Duration::from_secs(config.pull_timeout_secs),
        ))
    }

    /// Create with a specific client connection
    pub fn with_client(client: Docker, runtime: ContainerRuntime, pull_timeout: Duration) -> Self {
        Self {
            client,
            runtime,
            pull_timeout,
        }
    }

    pub fn runtime(&self) -> ContainerRuntime {
        self.runtime
    }

    /// Convert our spec to bollard config
    fn to_bollard_config(spec: &ContainerSpec) -> Config<String> {
        let mut exposed_ports = HashMap::new();
        let mut port_bindings = HashMap::new();

        for port in &spec.ports {
            let container_port = format!("{}/tcp", port.container_port);
            exposed_ports.insert(container_port.clone(), HashMap::new());

            let binding = vec![PortBinding {
                host_ip: None,
                host_port: Some(port.host_port.to_string()),
            }];
            port_bindings.insert(container_port, Some(binding));
        }

        let env: Vec<String> = spec
            .env
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();

        let host_config = HostConfig {
            binds: if spec.binds.is_empty() {
                None
            } else {
                Some(spec.binds.clone())
            },
            port_bindings: if port_bindings.is_empty() {
                None
            } else {
                Some(port_bindings)
            },
            ..Default::default()
        };

        Config {
            image: Some(spec.image.clone()),
            cmd: if spec.command.is_empty() {
                None
            } else {
                Some(spec.command.clone())
            },
            env: Some(env),
            labels: Some(spec.labels.clone()),
            exposed_ports: if exposed_ports.is_empty() {
                None
            } else {
                Some(exposed_ports)
            },
            tty: Some(spec.tty),
            open_stdin: Some(spec.open_stdin),
            host_config: Some(host_config),
            ..Default::default()
        }
    }

    /// Convert an inspect response into our details struct
    fn to_details(inspect: ContainerInspectResponse, fallback_id: &str) -> ContainerDetails {
        let state = inspect
            .state
            .as_ref()
            .and_then(|s| s.status.as_ref())
            .map(|s| s.to_string())
            .unwrap_or_else(|| "unknown".to_string());

        let mut ports = BTreeMap::new();
        if let Some(port_map) = inspect.network_settings.as_ref().and_then(|ns| ns.ports.as_ref()) {
            for (container_port_str, bindings) in port_map {
                let host_port = bindings
                    .as_ref()
                    .and_then(|b| b.first())
                    .and_then(|b| b.host_port.as_ref())
                    .and_then(|p| p.parse::<u16>().ok());

                // Keys look like "3000/tcp"
                let container_port = container_port_str
                    .split('/')
                    .next()
                    .and_then(|p| p.parse::<u16>().ok());

                if let (Some(container_port), Some(host_port)) = (container_port, host_port) {
                    ports.insert(container_port, host_port);
                }
            }
        }

        let created = inspect
            .created
            .as_ref()
            .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&chrono::Utc));

        let (image, labels) = match inspect.config {
            Some(config) => (
                config.image.unwrap_or_else(|| "unknown".to_string()),
                config.labels.unwrap_or_default(),
            ),
            None => ("unknown".to_string(), HashMap::new()),
        };

        ContainerDetails {
            id: inspect.id.unwrap_or_else(|| fallback_id.to_string()),
            name: inspect
                .name
                .unwrap_or_else(|| fallback_id.to_string())
                .trim_start_matches('/')
                .to_string(),
            image,
            state,
            labels,
            ports,
            created,
        }
    }

    fn to_exec_options(request: &ExecRequest, attach: bool) -> CreateExecOptions<String> {
        let env: Option<Vec<String>> = if request.env.is_empty() {
            None
        } else {
            Some(
                request
                    .env
                    .iter()
                    .map(|(k, v)| format!("{}={}", k, v))
                    .collect(),
            )
        };

        CreateExecOptions {
            cmd: Some(request.cmd.clone()),
            env,
            working_dir: request.working_dir.clone(),
            user: request.user.clone(),
            attach_stdout: Some(attach),
            attach_stderr: Some(attach),
            tty: Some(false),
            ..Default::default()
        }
    }
}

#[async_trait]
impl ContainerEngine for DockerEngine {
    async fn ping(&self) -> Result<()> {
        self.client.ping().await.map_err(|e| {
            error!("Failed to reach {} engine: {}", self.runtime, e);
            SandboxError::RuntimeUnavailable(format!("{} engine not responding: {}", self.runtime, e))
        })?;
        Ok(())
    }

    async fn image_exists(&self, image: &str) -> Result<bool> {
        image_presence(image, self.client.inspect_image(image).await.map(|_| ()))
    }

    async fn pull_image(&self, image: &str) -> Result<()> {
        info!("Pulling image: {} (timeout: {:?})", image, self.pull_timeout);

        let options = CreateImageOptions {
            from_image: image.to_string(),
            ..Default::default()
        };

        let stream = self.client.create_image(Some(options), None, None);

        let result = tokio::time::timeout(self.pull_timeout, async {
            let mut stream = stream;
            let mut last_status = String::new();

            while let Some(result) = stream.next().await {
                match result {
                    Ok(progress) => {
                        if let Some(status) = &progress.status {
                            if status != &last_status {
                                debug!("Pull status: {}", status);
                                last_status = status.clone();
                            }
                        }
                        if let Some(error) = progress.error {
                            return Err(SandboxError::Image(format!(
                                "Failed to pull image {}: {}",
                                image, error
                            )));
                        }
                    }
                    Err(e) => {
                        return Err(SandboxError::Image(format!(
                            "Failed to pull image {}: {}",
                            image, e
                        )));
                    }
                }
            }

            Ok(())
        })
        .await;

        match result {
            Ok(Ok(())) => {
                info!("Successfully pulled image: {}", image);
                Ok(())
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(SandboxError::Image(format!(
                "Timeout pulling image {} after {:?}",
                image, self.pull_timeout
            ))),
        }
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String> {
        info!("Creating container: {} ({})", spec.name, spec.image);

        let options = CreateContainerOptions {
            name: spec.name.clone(),
            platform: None,
        };

        let container = self
            .client
            .create_container(Some(options), Self::to_bollard_config(spec))
            .await
            .map_err(|e| {
                error!("Failed to create container {}: {}", spec.name, e);
                SandboxError::from_engine(e, &format!("image {}", spec.image))
            })?;

        for warning in &container.warnings {
            warn!("Engine warning for {}: {}", spec.name, warning);
        }

        if let Err(e) = self
            .client
            .start_container(&container.id, None::<StartContainerOptions<String>>)
            .await
        {
            error!("Failed to start container {}: {}", container.id, e);
            // Don't leave a created-but-dead container holding the name
            if let Err(cleanup) = self.remove(&container.id).await {
                warn!("Failed to clean up container {}: {}", container.id, cleanup);
            }
            return Err(SandboxError::Engine(e));
        }

        debug!("Started container: {}", container.id);
        Ok(container.id)
    }

    async fn inspect_container(&self, id_or_name: &str) -> Result<ContainerDetails> {
        let inspect = self
            .client
            .inspect_container(id_or_name, None)
            .await
            .map_err(|e| SandboxError::from_engine(e, &format!("sandbox {}", id_or_name)))?;

        Ok(Self::to_details(inspect, id_or_name))
    }

    async fn list_containers(&self, query: &ContainerQuery) -> Result<Vec<ContainerDetails>> {
        let mut filters = HashMap::new();
        if let Some(label) = &query.label {
            filters.insert("label".to_string(), vec![label.clone()]);
        }
        if let Some(name) = &query.name {
            filters.insert("name".to_string(), vec![name.clone()]);
        }

        let options = ListContainersOptions {
            all: query.all,
            limit: query.limit.map(|l| l as isize),
            filters,
            ..Default::default()
        };

        let containers = self.client.list_containers(Some(options)).await?;

        let mut details = Vec::new();
        for container in containers {
            if let Some(id) = container.id {
                match self.inspect_container(&id).await {
                    Ok(info) => details.push(info),
                    // Removed between list and inspect
                    Err(SandboxError::NotFound(_)) => {
                        debug!("Container {} vanished while listing", id);
                    }
                    Err(e) => {
                        warn!("Failed to get info for container {}: {}", id, e);
                    }
                }
            }
        }

        Ok(details)
    }

    async fn exec(&self, container_id: &str, request: &ExecRequest) -> Result<ExecOutput> {
        debug!("Executing in container {}: {:?}", container_id, request.cmd);

        let exec = self
            .client
            .create_exec(container_id, Self::to_exec_options(request, true))
            .await
            .map_err(|e| SandboxError::from_engine(e, &format!("sandbox {}", container_id)))?;

        let start_result = self.client.start_exec(&exec.id, None).await?;

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();

        match start_result {
            StartExecResults::Attached { mut output, .. } => {
                while let Some(msg) = output.next().await {
                    match msg? {
                        LogOutput::StdOut { message } => stdout.extend_from_slice(&message),
                        LogOutput::StdErr { message } => stderr.extend_from_slice(&message),
                        LogOutput::Console { message } => stdout.extend_from_slice(&message),
                        LogOutput::StdIn { .. } => {}
                    }
                }
            }
            StartExecResults::Detached => {
                return Err(SandboxError::Transfer(
                    "Exec was detached unexpectedly".to_string(),
                ))
            }
        }

        let exec_inspect = self.client.inspect_exec(&exec.id).await?;

        let exit_code = exec_inspect.exit_code.unwrap_or_else(|| {
            warn!("Exec {} finished without an exit code", exec.id);
            -1
        });

        Ok(ExecOutput {
            stdout,
            stderr,
            exit_code,
        })
    }

    async fn exec_detached(&self, container_id: &str, request: &ExecRequest) -> Result<String> {
        debug!(
            "Starting detached exec in container {}: {:?}",
            container_id, request.cmd
        );

        let exec = self
            .client
            .create_exec(container_id, Self::to_exec_options(request, false))
            .await
            .map_err(|e| SandboxError::from_engine(e, &format!("sandbox {}", container_id)))?;

        let options = StartExecOptions {
            detach: true,
            ..Default::default()
        };

        self.client.start_exec(&exec.id, Some(options)).await?;

        Ok(exec.id)
    }

    async fn inspect_exec(&self, exec_id: &str) -> Result<DetachedStatus> {
        let inspect = self
            .client
            .inspect_exec(exec_id)
            .await
            .map_err(|e| SandboxError::from_engine(e, &format!("exec {}", exec_id)))?;

        let running = inspect.running.unwrap_or(false);

        Ok(DetachedStatus {
            running,
            exit_code: if running { None } else { inspect.exit_code },
            pid: inspect.pid.filter(|pid| *pid > 0),
        })
    }

    async fn get_archive(&self, container_id: &str, path: &str) -> Result<Vec<u8>> {
        debug!("Downloading archive {}:{}", container_id, path);

        let options = DownloadFromContainerOptions {
            path: path.to_string(),
        };

        let mut stream = self
            .client
            .download_from_container(container_id, Some(options));

        let mut data = Vec::new();
        while let Some(chunk) = stream.next().await {
            let bytes = chunk.map_err(|e| SandboxError::from_engine(e, path))?;
            data.extend_from_slice(&bytes);
        }

        Ok(data)
    }

    async fn put_archive(
        &self,
        container_id: &str,
        dest_dir: &str,
        archive: Vec<u8>,
    ) -> Result<()> {
        debug!(
            "Uploading {} byte archive to {}:{}",
            archive.len(),
            container_id,
            dest_dir
        );

        let options = UploadToContainerOptions {
            path: dest_dir.to_string(),
            ..Default::default()
        };

        self.client
            .upload_to_container(container_id, Some(options), archive.into())
            .await
            .map_err(|e| SandboxError::from_engine(e, dest_dir))?;

        Ok(())
    }

    async fn pause(&self, container_id: &str) -> Result<()> {
        self.client
            .pause_container(container_id)
            .await
            .map_err(|e| SandboxError::from_engine(e, &format!("sandbox {}", container_id)))
    }

    async fn unpause(&self, container_id: &str) -> Result<()> {
        self.client
            .unpause_container(container_id)
            .await
            .map_err(|e| SandboxError::from_engine(e, &format!("sandbox {}", container_id)))
    }

    async fn stop(&self, container_id: &str, grace_secs: i64) -> Result<()> {
        info!(
            "Stopping container: {} (timeout: {}s)",
            container_id, grace_secs
        );

        let options = StopContainerOptions { t: grace_secs };

        match self
            .client
            .stop_container(container_id, Some(options))
            .await
        {
            Ok(_) => Ok(()),
            // Container already stopped is not an error
            Err(BollardError::DockerResponseServerError {
                status_code: 304, ..
            }) => {
                debug!("Container {} already stopped", container_id);
                Ok(())
            }
            Err(e) => Err(SandboxError::from_engine(
                e,
                &format!("sandbox {}", container_id),
            )),
        }
    }

    async fn remove(&self, container_id: &str) -> Result<()> {
        info!("Removing container: {}", container_id);

        let options = RemoveContainerOptions {
            force: true,
            v: true, // Remove anonymous volumes
            ..Default::default()
        };

        self.client
            .remove_container(container_id, Some(options))
            .await
            .map_err(|e| SandboxError::from_engine(e, &format!("sandbox {}", container_id)))
    }
}

/// Interpret an image inspect result; only a 404 means "not present"
fn image_presence(image: &str, inspected: std::result::Result<(), BollardError>) -> Result<bool> {
    match inspected {
        Ok(()) => Ok(true),
        Err(BollardError::DockerResponseServerError {
            status_code: 404, ..
        }) => Ok(false),
        Err(e) => {
            error!("Failed to inspect image {}: {}", image, e);
            Err(SandboxError::from_engine(e, &format!("image {}", image)))
        }
    }
}
