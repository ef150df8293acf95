#![allow(clippy::self_named_module_files)]

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::app_config::AppConfig;
use crate::model::{Collection, EntryKey};
use crate::registry::CollectionRegistry;
use crate::ConcordiaError;

pub mod reader;
pub mod writer;

/// A collection as listed in a collections manifest file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ManifestCollection {
    #[serde(flatten)]
    pub collection: Collection,
    /// Registered as a placeholder whose discovery has not finished yet
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub lazy: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CollectionsManifest {
    #[serde(default)]
    pub collections: Vec<ManifestCollection>,
}

impl CollectionsManifest {
    /// Registers every collection of the manifest.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateCollection` if the manifest lists an id twice.
    pub fn register_into(self, registry: &mut CollectionRegistry) -> Result<(), ConcordiaError> {
        for entry in self.collections {
            if entry.lazy {
                registry.register_lazy(entry.collection)?;
            } else {
                registry.register(entry.collection)?;
            }
        }
        Ok(())
    }
}

impl FromStr for CollectionsManifest {
    type Err = ConcordiaError;

    fn from_str(json: &str) -> Result<Self, Self::Err> {
        Ok(serde_json::from_str(json)?)
    }
}

/// One running launch as recorded in the launch state file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunningLaunch {
    pub collection: String,
    pub server: String,
    #[serde(default)]
    pub nonce: String,
}

/// Nonces of running launches. Collection and server ids are stored as
/// separate fields since either may contain `/`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LaunchState {
    #[serde(default)]
    pub running: Vec<RunningLaunch>,
}

impl LaunchState {
    /// Later records for the same entry replace earlier ones.
    #[must_use]
    pub fn to_running(&self) -> BTreeMap<EntryKey, String> {
        self.running
            .iter()
            .map(|r| (EntryKey::new(&r.collection, &r.server), r.nonce.clone()))
            .collect()
    }

    #[must_use]
    pub fn from_running(running: &BTreeMap<EntryKey, String>) -> Self {
        Self {
            running: running
                .iter()
                .map(|(key, nonce)| RunningLaunch {
                    collection: key.collection_id.clone(),
                    server: key.server_id.clone(),
                    nonce: nonce.clone(),
                })
                .collect(),
        }
    }
}

#[derive(Debug)]
pub struct Config {
    pub collections_path: PathBuf,
    pub state_path: PathBuf,
}

impl Config {
    /// Resolves file locations: explicit paths first, then the app config,
    /// then the configuration directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration directory cannot be determined.
    pub fn resolve(
        collections: Option<PathBuf>,
        state: Option<PathBuf>,
        app_config: Option<&AppConfig>,
    ) -> anyhow::Result<Self> {
        let config_dir = Self::get_config_dir()?;

        let collections_path = collections
            .or_else(|| app_config.and_then(|c| c.collections_file.clone()))
            .unwrap_or_else(|| config_dir.join("collections.json"));

        let state_path = state.unwrap_or_else(|| config_dir.join("launch-state.json"));

        Ok(Self { collections_path, state_path })
    }

    /// Gets the configuration directory path.
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory cannot be determined.
    pub fn get_config_dir() -> anyhow::Result<PathBuf> {
        let config_dir = if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
            PathBuf::from(xdg_config).join("concordia")
        } else {
            directories::BaseDirs::new()
                .ok_or_else(|| anyhow::anyhow!("Could not determine home directory"))?
                .home_dir()
                .join(".config")
                .join("concordia")
        };
        Ok(config_dir)
    }

    #[must_use]
    pub fn state_exists(&self) -> bool {
        Path::new(&self.state_path).exists()
    }
}
