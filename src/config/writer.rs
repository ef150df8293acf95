use super::LaunchState;
use anyhow::Context;
use chrono::Local;
use std::fs;
use std::path::{Path, PathBuf};

/// Writes the launch state as pretty-printed JSON, creating missing parent
/// directories.
///
/// # Errors
///
/// Returns an error if the directory or the file cannot be written.
pub fn write_launch_state<P: AsRef<Path>>(path: P, state: &LaunchState) -> anyhow::Result<()> {
    let path = path.as_ref();

    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)
            .with_context(|| format!("Cannot create directory {}", dir.display()))?;
    }

    let mut json = serde_json::to_string_pretty(state)?;
    json.push('\n');
    fs::write(path, json).with_context(|| format!("Cannot write {}", path.display()))
}

/// Copies `path` to `<name>.backup.<timestamp>` next to it.
///
/// Returns `None` when there is nothing to back up.
///
/// # Errors
///
/// Returns an error if the copy fails.
pub fn backup_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Option<PathBuf>> {
    let path = path.as_ref();
    let Some(name) = path.file_name().filter(|_| path.is_file()) else {
        return Ok(None);
    };

    let mut backup_name = name.to_os_string();
    backup_name.push(format!(".backup.{}", Local::now().format("%Y%m%d_%H%M%S")));
    let backup = path.with_file_name(backup_name);

    fs::copy(path, &backup)
        .with_context(|| format!("Cannot back up {} to {}", path.display(), backup.display()))?;
    Ok(Some(backup))
}
