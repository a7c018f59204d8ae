// ABOUTME: Runtime configuration for sandbox operations loaded from the environment
// ABOUTME: Holds engine selection, socket override, timeouts and creation defaults

use std::env;
use std::num::ParseIntError;
use std::path::PathBuf;
use std::str::FromStr;

use csbx_config::constants;
use thiserror::Error;

/// Image used when `create` is called without a template
pub const DEFAULT_TEMPLATE: &str = "docker-sandbox:base";

const DEFAULT_ENGINE_TIMEOUT_SECS: u64 = 120;
const DEFAULT_STOP_GRACE_SECS: i64 = 5;
const DEFAULT_PULL_TIMEOUT_SECS: u64 = 600;
const DEFAULT_HOST_ADDRESS: &str = "localhost";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid number for {name}: {source}")]
    InvalidNumber {
        name: &'static str,
        #[source]
        source: ParseIntError,
    },
    #[error("Invalid boolean for {name}: {value}")]
    InvalidBool { name: &'static str, value: String },
    #[error("Invalid CONTAINER_RUNTIME: {0}. Use 'auto', 'docker', or 'podman'.")]
    InvalidRuntime(String),
}

/// Which container engine to talk to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RuntimeSelection {
    /// Detect podman first, then docker
    #[default]
    Auto,
    Docker,
    Podman,
}

impl FromStr for RuntimeSelection {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "auto" => Ok(RuntimeSelection::Auto),
            "docker" => Ok(RuntimeSelection::Docker),
            "podman" => Ok(RuntimeSelection::Podman),
            _ => Err(ConfigError::InvalidRuntime(s.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SandboxConfig {
    pub runtime: RuntimeSelection,
    /// Explicit podman socket, skips discovery when set
    pub podman_socket_path: Option<PathBuf>,
    /// Request timeout handed to the engine client
    pub engine_timeout_secs: u64,
    pub default_template: String,
    /// Grace period between stop and force-remove in `kill`
    pub stop_grace_secs: i64,
    pub pull_missing_images: bool,
    pub pull_timeout_secs: u64,
    /// Host name used when building URLs in `get_host`
    pub host_address: String,
    /// User for file primitives; `None` uses the image's default user
    pub file_user: Option<String>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            runtime: RuntimeSelection::Auto,
            podman_socket_path: None,
            engine_timeout_secs: DEFAULT_ENGINE_TIMEOUT_SECS,
            default_template: DEFAULT_TEMPLATE.to_string(),
            stop_grace_secs: DEFAULT_STOP_GRACE_SECS,
            pull_missing_images: true,
            pull_timeout_secs: DEFAULT_PULL_TIMEOUT_SECS,
            host_address: DEFAULT_HOST_ADDRESS.to_string(),
            file_user: None,
        }
    }
}

impl SandboxConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let runtime = env::var(constants::CONTAINER_RUNTIME)
            .unwrap_or_else(|_| "auto".to_string())
            .parse::<RuntimeSelection>()?;

        let podman_socket_path = non_empty_var(constants::PODMAN_SOCKET_PATH).map(PathBuf::from);

        let engine_timeout_secs = parse_var(
            constants::SANDBOX_ENGINE_TIMEOUT_SECS,
            defaults.engine_timeout_secs,
        )?;

        let default_template = non_empty_var(constants::SANDBOX_DEFAULT_TEMPLATE)
            .unwrap_or(defaults.default_template);

        let stop_grace_secs =
            parse_var(constants::SANDBOX_STOP_GRACE_SECS, defaults.stop_grace_secs)?;

        let pull_missing_images = match non_empty_var(constants::SANDBOX_PULL_IMAGES) {
            Some(value) => parse_bool(constants::SANDBOX_PULL_IMAGES, &value)?,
            None => defaults.pull_missing_images,
        };

        let pull_timeout_secs = parse_var(
            constants::SANDBOX_PULL_TIMEOUT_SECS,
            defaults.pull_timeout_secs,
        )?;

        let host_address =
            non_empty_var(constants::SANDBOX_HOST_ADDRESS).unwrap_or(defaults.host_address);

        let file_user = non_empty_var(constants::SANDBOX_FILE_USER);

        Ok(SandboxConfig {
            runtime,
            podman_socket_path,
            engine_timeout_secs,
            default_template,
            stop_grace_secs,
            pull_missing_images,
            pull_timeout_secs,
            host_address,
            file_user,
        })
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_var<T>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr<Err = ParseIntError>,
{
    match non_empty_var(name) {
        Some(value) => value
            .parse::<T>()
            .map_err(|source| ConfigError::InvalidNumber { name, source }),
        None => Ok(default),
    }
}

fn parse_bool(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidBool {
            name,
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const ALL_VARS: &[&str] = &[
        constants::CONTAINER_RUNTIME,
        constants::PODMAN_SOCKET_PATH,
        constants::SANDBOX_ENGINE_TIMEOUT_SECS,
        constants::SANDBOX_DEFAULT_TEMPLATE,
        constants::SANDBOX_STOP_GRACE_SECS,
        constants::SANDBOX_PULL_IMAGES,
        constants::SANDBOX_PULL_TIMEOUT_SECS,
        constants::SANDBOX_HOST_ADDRESS,
        constants::SANDBOX_FILE_USER,
    ];

    fn clear_env() {
        for var in ALL_VARS {
            env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_config_from_env_defaults() {
        clear_env();

        let config = SandboxConfig::from_env().unwrap();

        assert_eq!(config.runtime, RuntimeSelection::Auto);
        assert!(config.podman_socket_path.is_none());
        assert_eq!(config.default_template, "docker-sandbox:base");
        assert_eq!(config.stop_grace_secs, 5);
        assert!(config.pull_missing_images);
        assert_eq!(config.host_address, "localhost");
        assert!(config.file_user.is_none());
    }

    #[test]
    #[serial]
    fn test_config_from_env_with_overrides() {
        clear_env();
        env::set_var(constants::CONTAINER_RUNTIME, "Podman");
        env::set_var(constants::PODMAN_SOCKET_PATH, "/tmp/podman.sock");
        env::set_var(constants::SANDBOX_STOP_GRACE_SECS, "12");
        env::set_var(constants::SANDBOX_PULL_IMAGES, "false");
        env::set_var(constants::SANDBOX_FILE_USER, "user");

        let config = SandboxConfig::from_env().unwrap();

        assert_eq!(config.runtime, RuntimeSelection::Podman);
        assert_eq!(
            config.podman_socket_path,
            Some(PathBuf::from("/tmp/podman.sock"))
        );
        assert_eq!(config.stop_grace_secs, 12);
        assert!(!config.pull_missing_images);
        assert_eq!(config.file_user.as_deref(), Some("user"));

        clear_env();
    }

    #[test]
    #[serial]
    fn test_config_invalid_runtime() {
        clear_env();
        env::set_var(constants::CONTAINER_RUNTIME, "containerd");

        let result = SandboxConfig::from_env();

        assert!(matches!(result, Err(ConfigError::InvalidRuntime(_))));

        clear_env();
    }

    #[test]
    #[serial]
    fn test_config_invalid_number() {
        clear_env();
        env::set_var(constants::SANDBOX_ENGINE_TIMEOUT_SECS, "soon");

        let result = SandboxConfig::from_env();

        assert!(matches!(
            result,
            Err(ConfigError::InvalidNumber {
                name: "SANDBOX_ENGINE_TIMEOUT_SECS",
                ..
            })
        ));

        clear_env();
    }

    #[test]
    fn test_runtime_selection_parsing() {
        assert_eq!(
            "docker".parse::<RuntimeSelection>().unwrap(),
            RuntimeSelection::Docker
        );
        assert_eq!(
            "AUTO".parse::<RuntimeSelection>().unwrap(),
            RuntimeSelection::Auto
        );
        assert!("lxc".parse::<RuntimeSelection>().is_err());
    }
}
