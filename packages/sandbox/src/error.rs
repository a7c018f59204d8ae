// ABOUTME: Error types for sandbox lifecycle, command execution and file transfer
// ABOUTME: Non-zero exit codes are result data, so only plumbing failures appear here

use thiserror::Error;

use crate::config::ConfigError;

/// Main error type for sandbox operations
#[derive(Error, Debug)]
pub enum SandboxError {
    /// Sandbox, file or process does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Caller supplied an unusable request (empty command, bad spec string)
    #[error("Invalid usage: {0}")]
    Usage(String),

    /// Archive encode/decode failed or a file primitive inside the sandbox failed
    #[error("Transfer failed: {0}")]
    Transfer(String),

    /// No compatible container engine could be found
    #[error("No container runtime available: {0}")]
    RuntimeUnavailable(String),

    /// Caller-supplied timeout elapsed
    #[error("Operation timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    /// Image missing locally and could not be pulled
    #[error("Image error: {0}")]
    Image(String),

    /// Configuration could not be parsed
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Docker/Podman API errors not covered by a more specific variant
    #[error("Container engine error: {0}")]
    Engine(#[from] bollard::errors::Error),

    /// Local filesystem errors during upload/download
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SandboxError {
    /// Map a bollard error, turning 404 responses into `NotFound` for `what`
    pub(crate) fn from_engine(err: bollard::errors::Error, what: &str) -> Self {
        match err {
            bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            } => SandboxError::NotFound(what.to_string()),
            other => SandboxError::Engine(other),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, SandboxError::NotFound(_))
    }
}

/// Type alias for Results that return SandboxError
pub type Result<T> = std::result::Result<T, SandboxError>;
