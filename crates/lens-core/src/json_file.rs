//! Durable JSON file saves for chatlens settings.

use std::fs::{self, Permissions};
use std::io::Write;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Serialize;
use tempfile::NamedTempFile;

/// Serializes `value` as pretty JSON and replaces `path` with it in one rename.
///
/// The temp file is created next to the destination and fsync'd before the rename, so a crash
/// leaves either the old file or the new one. An existing destination keeps its permissions.
pub fn save_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if path.as_os_str().is_empty() {
        bail!("destination path cannot be empty");
    }
    if path.is_dir() {
        bail!("destination path '{}' is a directory", path.display());
    }
    let parent = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;

    let mut payload = serde_json::to_vec_pretty(value).context("serialize json")?;
    payload.push(b'\n');

    let mut staged = NamedTempFile::new_in(parent)
        .with_context(|| format!("create temp file in {}", parent.display()))?;
    staged
        .write_all(&payload)
        .with_context(|| format!("write {}", staged.path().display()))?;
    staged
        .as_file()
        .sync_all()
        .with_context(|| format!("sync {}", staged.path().display()))?;
    if let Some(permissions) = existing_permissions(path) {
        staged
            .as_file()
            .set_permissions(permissions)
            .with_context(|| format!("copy permissions of {}", path.display()))?;
    }
    staged
        .persist(path)
        .map_err(|error| error.error)
        .with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}

fn existing_permissions(path: &Path) -> Option<Permissions> {
    fs::metadata(path).ok().map(|metadata| metadata.permissions())
}
