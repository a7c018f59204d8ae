// ABOUTME: Environment variable name constants
// ABOUTME: Centralized definitions of all environment variable names read by csbx

// Container Runtime Selection
pub const CONTAINER_RUNTIME: &str = "CONTAINER_RUNTIME"; // auto, docker, or podman
pub const PODMAN_SOCKET_PATH: &str = "PODMAN_SOCKET_PATH";
pub const DOCKER_HOST: &str = "DOCKER_HOST"; // Read by bollard itself

// Engine Connection
pub const SANDBOX_ENGINE_TIMEOUT_SECS: &str = "SANDBOX_ENGINE_TIMEOUT_SECS";

// Sandbox Defaults
pub const SANDBOX_DEFAULT_TEMPLATE: &str = "SANDBOX_DEFAULT_TEMPLATE";
pub const SANDBOX_STOP_GRACE_SECS: &str = "SANDBOX_STOP_GRACE_SECS";
pub const SANDBOX_HOST_ADDRESS: &str = "SANDBOX_HOST_ADDRESS";

// Image Management
pub const SANDBOX_PULL_IMAGES: &str = "SANDBOX_PULL_IMAGES";
pub const SANDBOX_PULL_TIMEOUT_SECS: &str = "SANDBOX_PULL_TIMEOUT_SECS";

// File Transfer
pub const SANDBOX_FILE_USER: &str = "SANDBOX_FILE_USER";

// System Environment Variables
pub const XDG_RUNTIME_DIR: &str = "XDG_RUNTIME_DIR";
