// ABOUTME: Container-backed sandboxes: lifecycle, command execution and file transfer
// ABOUTME: All subsystems share one engine handle and address sandboxes by id

pub mod archive;
pub mod commands;
pub mod config;
pub mod engine;
pub mod error;
pub mod files;
pub mod labels;
pub mod manager;
pub mod process_table;
pub mod types;

pub use commands::{CommandRunner, RunOptions};
pub use config::{ConfigError, RuntimeSelection, SandboxConfig};
pub use engine::{ContainerEngine, ContainerRuntime, DockerEngine};
pub use error::{Result, SandboxError};
pub use files::FileTransfer;
pub use labels::SandboxLabels;
pub use manager::SandboxManager;
pub use process_table::{ProcessTableParser, PsAuxParser};
pub use types::{
    CreateSandboxRequest, DetachedProcess, DetachedStatus, ExecResult, FileInfo, FileType,
    PortMapping, ProcessInfo, Sandbox, SandboxStatus, SandboxSummary, TransferSummary, VolumeSpec,
};

use std::sync::Arc;

/// Entry point bundling the three subsystems over one engine connection
#[derive(Clone)]
pub struct SandboxClient {
    manager: SandboxManager,
    commands: CommandRunner,
    files: FileTransfer,
}

impl SandboxClient {
    /// Connect to the configured runtime
    pub fn connect(config: SandboxConfig) -> Result<Self> {
        let engine = DockerEngine::connect(&config)?;
        Ok(Self::with_engine(Arc::new(engine), config))
    }

    /// Load configuration from the environment, then connect
    pub fn from_env() -> Result<Self> {
        Self::connect(SandboxConfig::from_env()?)
    }

    pub fn with_engine(engine: Arc<dyn ContainerEngine>, config: SandboxConfig) -> Self {
        let files = FileTransfer::new(engine.clone(), config.file_user.clone());
        let commands = CommandRunner::new(engine.clone());
        let manager = SandboxManager::new(engine, config);

        Self {
            manager,
            commands,
            files,
        }
    }

    pub fn manager(&self) -> &SandboxManager {
        &self.manager
    }

    pub fn commands(&self) -> &CommandRunner {
        &self.commands
    }

    pub fn files(&self) -> &FileTransfer {
        &self.files
    }
}
