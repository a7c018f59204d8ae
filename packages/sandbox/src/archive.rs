// ABOUTME: Single-entry tar encoding used to move bytes across the sandbox boundary
// ABOUTME: The engine's archive endpoints speak tar, so binary transfer is wrapped here

use std::io::Read;

use tar::{Archive, Builder, EntryType, Header};

use crate::error::{Result, SandboxError};

/// Build a tar archive holding one regular file named `name`
pub fn encode_single_file(name: &str, data: &[u8]) -> Result<Vec<u8>> {
    if name.is_empty() || name.contains('/') {
        return Err(SandboxError::Usage(format!(
            "Archive entry name must be a bare file name, got '{}'",
            name
        )));
    }

    let mut header = Header::new_gnu();
    header.set_entry_type(EntryType::Regular);
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(chrono::Utc::now().timestamp().max(0) as u64);

    let mut builder = Builder::new(Vec::new());
    builder
        .append_data(&mut header, name, data)
        .map_err(|e| SandboxError::Transfer(format!("Failed to build archive: {}", e)))?;

    builder
        .into_inner()
        .map_err(|e| SandboxError::Transfer(format!("Failed to finish archive: {}", e)))
}

/// Contents of the file an archive download describes
///
/// The engine puts the requested path first. Anything other than a regular
/// file there (a directory, a symlink) is a transfer failure, whatever follows.
pub fn decode_first_file(bytes: &[u8]) -> Result<Vec<u8>> {
    if bytes.is_empty() {
        return Err(SandboxError::Transfer("Archive is empty".to_string()));
    }

    let mut archive = Archive::new(bytes);
    let mut entries = archive
        .entries()
        .map_err(|e| SandboxError::Transfer(format!("Malformed archive: {}", e)))?;

    let mut entry = match entries.next() {
        Some(entry) => {
            entry.map_err(|e| SandboxError::Transfer(format!("Malformed archive: {}", e)))?
        }
        None => {
            return Err(SandboxError::Transfer(
                "Archive contains no entries".to_string(),
            ))
        }
    };

    let entry_type = entry.header().entry_type();
    if !entry_type.is_file() {
        let path = entry
            .path()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        return Err(SandboxError::Transfer(format!(
            "'{}' is not a regular file ({:?})",
            path, entry_type
        )));
    }

    let mut data = Vec::with_capacity(entry.size() as usize);
    entry
        .read_to_end(&mut data)
        .map_err(|e| SandboxError::Transfer(format!("Failed to read archive entry: {}", e)))?;
    Ok(data)
}

/// Directory entry followed by a file inside it, as a directory download looks
#[cfg(test)]
pub(crate) fn directory_archive(dir: &str, file: &str, data: &[u8]) -> Vec<u8> {
    let mut builder = Builder::new(Vec::new());

    let mut header = Header::new_gnu();
    header.set_entry_type(EntryType::Directory);
    header.set_size(0);
    header.set_mode(0o755);
    builder
        .append_data(&mut header, format!("{}/", dir), &[][..])
        .unwrap();

    let mut header = Header::new_gnu();
    header.set_entry_type(EntryType::Regular);
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    builder
        .append_data(&mut header, format!("{}/{}", dir, file), data)
        .unwrap();

    builder.into_inner().unwrap()
}
