use super::{CollectionsManifest, LaunchState};
use anyhow::Context;
use std::fs;
use std::path::Path;

/// Parses a collections manifest (`{"collections": [...]}`).
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not a valid manifest.
pub fn read_collections_manifest<P: AsRef<Path>>(path: P) -> anyhow::Result<CollectionsManifest> {
    let text = fs::read_to_string(path.as_ref()).context("Failed to read collections manifest")?;
    text.parse().context("Failed to parse collections manifest")
}

/// Reads the launch state. Nothing has been launched yet when the file does
/// not exist, so that case yields an empty state.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn read_launch_state<P: AsRef<Path>>(path: P) -> anyhow::Result<LaunchState> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(LaunchState::default());
    }

    let text = fs::read_to_string(path).context("Failed to read launch state")?;
    serde_json::from_str(&text).context("Failed to parse launch state")
}
