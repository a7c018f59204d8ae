// ABOUTME: File operations inside sandboxes: text, binary, directory and host transfers
// ABOUTME: Text and metadata go through shell primitives, binary data through tar archives

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::archive::{decode_first_file, encode_single_file};
use crate::commands::{CommandRunner, RunOptions};
use crate::engine::ContainerEngine;
use crate::error::{Result, SandboxError};
use crate::types::{ExecResult, FileInfo, FileType, TransferSummary};

/// Longest quoted write command passed as a shell argument; longer writes go
/// through the archive path. Kept well under the kernel's 128 KiB per-argument cap.
pub const MAX_INLINE_COMMAND_BYTES: usize = 64 * 1024;

/// Columns before the file name in `ls -la --time-style=full-iso` output
const LS_FIXED_COLUMNS: usize = 8;

fn quote(value: &str) -> String {
    shell_words::quote(value).into_owned()
}

/// Parse `ls -la --time-style=full-iso` output for entries of `dir`
///
/// Skips the `total` line and the `.`/`..` entries. Symlink targets are
/// dropped from the name.
pub fn parse_ls_output(dir: &str, output: &str) -> Vec<FileInfo> {
    let base = dir.trim_end_matches('/');

    output
        .lines()
        .filter(|line| !line.starts_with("total "))
        .filter_map(|line| {
            let mut columns = Vec::with_capacity(LS_FIXED_COLUMNS);
            let mut rest = line.trim_start();
            while columns.len() < LS_FIXED_COLUMNS {
                let end = rest.find(char::is_whitespace)?;
                columns.push(&rest[..end]);
                rest = rest[end..].trim_start();
            }

            let permissions = columns[0];
            let mut name = rest.trim_end();
            if permissions.starts_with('l') {
                if let Some((link, _target)) = name.split_once(" -> ") {
                    name = link;
                }
            }

            if name.is_empty() || name == "." || name == ".." {
                return None;
            }

            Some(FileInfo {
                name: name.to_string(),
                path: format!("{}/{}", base, name),
                file_type: if permissions.starts_with('d') {
                    FileType::Dir
                } else {
                    FileType::File
                },
                size: columns[4].parse().unwrap_or(0),
                permissions: permissions.to_string(),
            })
        })
        .collect()
}

/// Parse one line of `stat -c '%n|%s|%F|%a'`
fn parse_stat_output(path: &str, output: &str) -> Option<FileInfo> {
    // Split from the right: the name itself may contain '|'
    let mut fields = output.trim_end_matches('\n').rsplitn(4, '|');
    let permissions = fields.next()?.trim();
    let kind = fields.next()?;
    let size = fields.next()?.parse().ok()?;
    let reported = fields.next()?;

    let name = Path::new(reported)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| reported.to_string());

    Some(FileInfo {
        name,
        path: path.to_string(),
        file_type: if kind == "directory" {
            FileType::Dir
        } else {
            FileType::File
        },
        size,
        permissions: permissions.to_string(),
    })
}

/// Split an absolute sandbox path into its parent directory and file name
fn split_remote_path(path: &str) -> Result<(String, String)> {
    if !path.starts_with('/') {
        return Err(SandboxError::Usage(format!(
            "Sandbox path must be absolute, got '{}'",
            path
        )));
    }

    let remote = Path::new(path);
    let name = remote
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| SandboxError::Usage(format!("Path '{}' does not name a file", path)))?;
    let parent = remote
        .parent()
        .map(|p| p.to_string_lossy().into_owned())
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| "/".to_string());

    Ok((parent, name))
}

/// File operations against sandboxes addressed by id
#[derive(Clone)]
pub struct FileTransfer {
    engine: Arc<dyn ContainerEngine>,
    commands: CommandRunner,
    /// User for shell primitives; `None` uses the image default
    user: Option<String>,
}

impl FileTransfer {
    pub fn new(engine: Arc<dyn ContainerEngine>, user: Option<String>) -> Self {
        let commands = CommandRunner::new(engine.clone());
        Self {
            engine,
            commands,
            user,
        }
    }

    async fn sh(&self, sandbox_id: &str, command: &str) -> Result<ExecResult> {
        let options = RunOptions {
            user: self.user.clone(),
            ..Default::default()
        };
        self.commands.run(sandbox_id, command, &options).await
    }

    /// List `path`; `depth` > 1 descends into subdirectories that many levels
    pub async fn list(&self, sandbox_id: &str, path: &str, depth: u32) -> Result<Vec<FileInfo>> {
        let mut entries = Vec::new();
        let mut pending = VecDeque::from([(path.to_string(), depth.max(1))]);

        while let Some((dir, remaining)) = pending.pop_front() {
            let result = self
                .sh(
                    sandbox_id,
                    &format!("ls -la --time-style=full-iso {}", quote(&dir)),
                )
                .await?;

            if !result.success() {
                // Subdirectories can vanish or be unreadable mid-walk
                if dir != path {
                    warn!(
                        "Skipping {} in sandbox {}: {}",
                        dir,
                        sandbox_id,
                        result.stderr.trim()
                    );
                    continue;
                }
                return Err(SandboxError::NotFound(format!("path {}", path)));
            }

            for entry in parse_ls_output(&dir, &result.stdout) {
                if remaining > 1 && entry.file_type == FileType::Dir {
                    pending.push_back((entry.path.clone(), remaining - 1));
                }
                entries.push(entry);
            }
        }

        Ok(entries)
    }

    pub async fn read_text(&self, sandbox_id: &str, path: &str) -> Result<String> {
        let result = self.sh(sandbox_id, &format!("cat {}", quote(path))).await?;

        if !result.success() {
            debug!("cat {} failed: {}", path, result.stderr.trim());
            return Err(SandboxError::NotFound(format!("file {}", path)));
        }

        Ok(result.stdout)
    }

    /// Write text to an absolute path, replacing any existing file
    pub async fn write_text(&self, sandbox_id: &str, path: &str, content: &str) -> Result<()> {
        split_remote_path(path)?;

        let command = format!("printf '%s' {} > {}", quote(content), quote(path));
        if command.len() > MAX_INLINE_COMMAND_BYTES {
            debug!(
                "Writing {} bytes to {} through an archive ({} byte command)",
                content.len(),
                path,
                command.len()
            );
            return self.write_bytes(sandbox_id, path, content.as_bytes()).await;
        }

        let result = self.sh(sandbox_id, &command).await?;

        if !result.success() {
            return Err(SandboxError::Transfer(format!(
                "Failed to write {}: {}",
                path,
                result.stderr.trim()
            )));
        }

        Ok(())
    }

    pub async fn read_bytes(&self, sandbox_id: &str, path: &str) -> Result<Vec<u8>> {
        let archive = self.engine.get_archive(sandbox_id, path).await?;
        decode_first_file(&archive)
    }

    /// Write `data` to an absolute path; the parent directory must exist
    pub async fn write_bytes(&self, sandbox_id: &str, path: &str, data: &[u8]) -> Result<()> {
        let (parent, name) = split_remote_path(path)?;
        let archive = encode_single_file(&name, data)?;

        self.engine.put_archive(sandbox_id, &parent, archive).await
    }

    pub async fn exists(&self, sandbox_id: &str, path: &str) -> Result<bool> {
        let result = self.sh(sandbox_id, &format!("test -e {}", quote(path))).await?;
        Ok(result.success())
    }

    pub async fn info(&self, sandbox_id: &str, path: &str) -> Result<FileInfo> {
        let result = self
            .sh(
                sandbox_id,
                &format!("stat -c '%n|%s|%F|%a' {}", quote(path)),
            )
            .await?;

        if !result.success() {
            return Err(SandboxError::NotFound(format!("path {}", path)));
        }

        parse_stat_output(path, &result.stdout).ok_or_else(|| {
            SandboxError::Transfer(format!(
                "Unexpected stat output for {}: {}",
                path,
                result.stdout.trim()
            ))
        })
    }

    /// Recursive remove; an absent path is not an error
    pub async fn remove(&self, sandbox_id: &str, path: &str) -> Result<()> {
        let result = self.sh(sandbox_id, &format!("rm -rf {}", quote(path))).await?;

        if !result.success() {
            return Err(SandboxError::Transfer(format!(
                "Failed to remove {}: {}",
                path,
                result.stderr.trim()
            )));
        }

        Ok(())
    }

    /// Create `path` with parents; false when it already exists
    pub async fn mkdir(&self, sandbox_id: &str, path: &str) -> Result<bool> {
        if self.exists(sandbox_id, path).await? {
            return Ok(false);
        }

        let result = self.sh(sandbox_id, &format!("mkdir -p {}", quote(path))).await?;

        if !result.success() {
            return Err(SandboxError::Transfer(format!(
                "Failed to create directory {}: {}",
                path,
                result.stderr.trim()
            )));
        }

        Ok(true)
    }

    pub async fn rename(&self, sandbox_id: &str, old_path: &str, new_path: &str) -> Result<FileInfo> {
        let result = self
            .sh(
                sandbox_id,
                &format!("mv {} {}", quote(old_path), quote(new_path)),
            )
            .await?;

        if !result.success() {
            if !self.exists(sandbox_id, old_path).await? {
                return Err(SandboxError::NotFound(format!("path {}", old_path)));
            }
            return Err(SandboxError::Transfer(format!(
                "Failed to rename {} to {}: {}",
                old_path,
                new_path,
                result.stderr.trim()
            )));
        }

        self.info(sandbox_id, new_path).await
    }

    /// Copy a host file into the sandbox
    pub async fn upload(
        &self,
        sandbox_id: &str,
        local_path: &Path,
        remote_path: &str,
    ) -> Result<TransferSummary> {
        let data = match tokio::fs::read(local_path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SandboxError::NotFound(format!(
                    "local file {}",
                    local_path.display()
                )));
            }
            Err(e) => return Err(e.into()),
        };

        self.write_bytes(sandbox_id, remote_path, &data).await?;
        info!(
            "Uploaded {} -> {}:{} ({} bytes)",
            local_path.display(),
            sandbox_id,
            remote_path,
            data.len()
        );

        Ok(TransferSummary {
            path: remote_path.to_string(),
            size: data.len() as u64,
        })
    }

    /// Copy a sandbox file to the host, creating missing local parents
    pub async fn download(
        &self,
        sandbox_id: &str,
        remote_path: &str,
        local_path: &Path,
    ) -> Result<TransferSummary> {
        let data = self.read_bytes(sandbox_id, remote_path).await?;

        if let Some(parent) = local_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(local_path, &data).await?;

        info!(
            "Downloaded {}:{} -> {} ({} bytes)",
            sandbox_id,
            remote_path,
            local_path.display(),
            data.len()
        );

        Ok(TransferSummary {
            path: local_path.display().to_string(),
            size: data.len() as u64,
        })
    }

    /// Package a sandbox directory as `<name>.tar.gz` under `output_dir`
    pub async fn export_archive(
        &self,
        sandbox_id: &str,
        path: &str,
        output_dir: &Path,
        name: Option<&str>,
    ) -> Result<PathBuf> {
        let name = match name {
            Some(name) => name.to_string(),
            None => default_export_name(sandbox_id),
        };
        let archive_name = format!("{}.tar.gz", name);
        let staging = format!("/tmp/{}", archive_name);

        let source = Path::new(path.trim_end_matches('/'));
        let parent = source
            .parent()
            .map(|p| p.to_string_lossy().into_owned())
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| "/".to_string());
        let base = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| ".".to_string());

        let command = format!(
            "tar -czf {} -C {} {}",
            quote(&staging),
            quote(&parent),
            quote(&base)
        );
        let result = self.sh(sandbox_id, &command).await?;
        if !result.success() {
            return Err(SandboxError::Transfer(format!(
                "Failed to archive {}: {}",
                path,
                result.stderr.trim()
            )));
        }

        let data = self.read_bytes(sandbox_id, &staging).await;

        if let Err(e) = self.remove(sandbox_id, &staging).await {
            warn!("Failed to remove staging archive {}: {}", staging, e);
        }

        let data = data?;
        tokio::fs::create_dir_all(output_dir).await?;
        let output = output_dir.join(&archive_name);
        tokio::fs::write(&output, &data).await?;

        info!(
            "Exported {}:{} to {} ({} bytes)",
            sandbox_id,
            path,
            output.display(),
            data.len()
        );

        Ok(output)
    }
}

fn default_export_name(sandbox_id: &str) -> String {
    let short: String = sandbox_id.chars().take(8).collect();
    format!("sandbox-{}-{}", short, Utc::now().format("%Y%m%d-%H%M%S"))
}
