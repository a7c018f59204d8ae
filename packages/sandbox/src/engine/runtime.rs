// ABOUTME: Container runtime detection and podman socket discovery
// ABOUTME: Selection is explicit configuration passed in, never process-global state

use std::fmt;
use std::path::{Path, PathBuf};

use csbx_config::constants;
use tracing::debug;

use crate::config::RuntimeSelection;
use crate::error::{Result, SandboxError};

/// A concrete engine once auto-detection has been resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerRuntime {
    Docker,
    Podman,
}

impl ContainerRuntime {
    pub fn binary(&self) -> &'static str {
        match self {
            Self::Docker => "docker",
            Self::Podman => "podman",
        }
    }
}

impl fmt::Display for ContainerRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.binary())
    }
}

/// Resolve the selection against binaries on `PATH`, podman first
pub fn resolve_runtime(selection: RuntimeSelection) -> Result<ContainerRuntime> {
    resolve_with(selection, |binary| which::which(binary).is_ok())
}

fn resolve_with(
    selection: RuntimeSelection,
    is_installed: impl Fn(&str) -> bool,
) -> Result<ContainerRuntime> {
    match selection {
        RuntimeSelection::Docker => Ok(ContainerRuntime::Docker),
        RuntimeSelection::Podman => Ok(ContainerRuntime::Podman),
        RuntimeSelection::Auto => {
            for runtime in [ContainerRuntime::Podman, ContainerRuntime::Docker] {
                if is_installed(runtime.binary()) {
                    debug!("Detected container runtime: {}", runtime);
                    return Ok(runtime);
                }
            }
            Err(SandboxError::RuntimeUnavailable(
                "No container runtime found. Please install Docker or Podman.".to_string(),
            ))
        }
    }
}

/// Locate the podman API socket
///
/// Order: explicit override, `$XDG_RUNTIME_DIR/podman/podman.sock`,
/// `/run/user/<uid>/podman/podman.sock`, `/run/podman/podman.sock`. When none
/// exists the per-user path is returned and the connection error surfaces on
/// first use.
pub fn podman_socket(override_path: Option<&Path>) -> PathBuf {
    let xdg_runtime = std::env::var(constants::XDG_RUNTIME_DIR).ok();
    let uid = nix::unistd::getuid().as_raw();
    discover_podman_socket(override_path, xdg_runtime.as_deref(), uid, |p| p.exists())
}

fn discover_podman_socket(
    override_path: Option<&Path>,
    xdg_runtime: Option<&str>,
    uid: u32,
    exists: impl Fn(&Path) -> bool,
) -> PathBuf {
    if let Some(path) = override_path {
        return strip_unix_scheme(path);
    }

    if let Some(xdg) = xdg_runtime.filter(|x| !x.is_empty()) {
        let candidate = Path::new(xdg).join("podman").join("podman.sock");
        if exists(&candidate) {
            return candidate;
        }
    }

    let user_socket = PathBuf::from(format!("/run/user/{}/podman/podman.sock", uid));
    if exists(&user_socket) {
        return user_socket;
    }

    let system_socket = PathBuf::from("/run/podman/podman.sock");
    if exists(&system_socket) {
        return system_socket;
    }

    user_socket
}

/// Accept `unix:///path` overrides as well as bare paths
fn strip_unix_scheme(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    match raw.strip_prefix("unix://") {
        Some(rest) => PathBuf::from(rest),
        None => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auto_prefers_podman() {
        let runtime = resolve_with(RuntimeSelection::Auto, |_| true).unwrap();
        assert_eq!(runtime, ContainerRuntime::Podman);
    }

    #[test]
    fn test_auto_falls_back_to_docker() {
        let runtime = resolve_with(RuntimeSelection::Auto, |b| b == "docker").unwrap();
        assert_eq!(runtime, ContainerRuntime::Docker);
    }

    #[test]
    fn test_auto_without_runtime_fails() {
        let result = resolve_with(RuntimeSelection::Auto, |_| false);
        assert!(matches!(result, Err(SandboxError::RuntimeUnavailable(_))));
    }

    #[test]
    fn test_explicit_selection_skips_detection() {
        let runtime = resolve_with(RuntimeSelection::Docker, |_| false).unwrap();
        assert_eq!(runtime, ContainerRuntime::Docker);
    }

    #[test]
    fn test_socket_override_wins() {
        let path = discover_podman_socket(
            Some(Path::new("unix:///custom/podman.sock")),
            Some("/run/user/1000"),
            1000,
            |_| true,
        );
        assert_eq!(path, PathBuf::from("/custom/podman.sock"));
    }

    #[test]
    fn test_socket_prefers_xdg_runtime_dir() {
        let path = discover_podman_socket(None, Some("/xdg"), 1000, |_| true);
        assert_eq!(path, PathBuf::from("/xdg/podman/podman.sock"));
    }

    #[test]
    fn test_socket_falls_through_to_system() {
        let path = discover_podman_socket(None, Some("/xdg"), 1000, |p| {
            p == Path::new("/run/podman/podman.sock")
        });
        assert_eq!(path, PathBuf::from("/run/podman/podman.sock"));
    }

    #[test]
    fn test_socket_best_effort_fallback() {
        let path = discover_podman_socket(None, None, 1234, |_| false);
        assert_eq!(path, PathBuf::from("/run/user/1234/podman/podman.sock"));
    }
}
