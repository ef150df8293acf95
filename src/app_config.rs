//! User-level settings read from `config.toml`.

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::gate::MemoryConsentStore;
use crate::model::EntryKey;

const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AppConfig {
    /// Default log level when no `--debug`/`--trace` flag or `RUST_LOG` is given
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<LogLevel>,
    /// Collections manifest used when `--collections` is not passed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collections_file: Option<PathBuf>,
    /// Servers of `prompt` collections the user already agreed to start
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub consent: Vec<ConsentRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => Self::ERROR,
            LogLevel::Warn => Self::WARN,
            LogLevel::Info => Self::INFO,
            LogLevel::Debug => Self::DEBUG,
            LogLevel::Trace => Self::TRACE,
        }
    }
}

/// `[[consent]]` table: one entry per `collection/server` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentRecord {
    pub collection: String,
    pub server: String,
}

impl From<&ConsentRecord> for EntryKey {
    fn from(record: &ConsentRecord) -> Self {
        Self::new(&record.collection, &record.server)
    }
}

impl AppConfig {
    /// Reads `config.toml` from the configuration directory.
    ///
    /// A missing file is not an error and yields `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration directory cannot be determined,
    /// or the file exists but cannot be read or parsed.
    pub fn load() -> Result<Option<Self>> {
        Self::load_from(&Self::config_path()?)
    }

    /// # Errors
    ///
    /// Returns an error if `path` exists but cannot be read or is not valid TOML.
    pub fn load_from(path: &Path) -> Result<Option<Self>> {
        if !path.is_file() {
            return Ok(None);
        }

        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read {}", path.display()))?;
        let config = toml::from_str(&text)
            .with_context(|| format!("Invalid settings in {}", path.display()))?;

        Ok(Some(config))
    }

    /// `$XDG_CONFIG_HOME/concordia/config.toml`, falling back to the platform
    /// configuration directory.
    ///
    /// # Errors
    ///
    /// Returns an error if neither location can be determined.
    pub fn config_path() -> Result<PathBuf> {
        if let Some(config_home) = std::env::var_os("XDG_CONFIG_HOME") {
            return Ok(PathBuf::from(config_home).join("concordia").join(CONFIG_FILE));
        }

        ProjectDirs::from("", "", "concordia")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE))
            .context("No configuration directory available on this platform")
    }

    #[must_use]
    pub fn consent_store(&self) -> MemoryConsentStore {
        self.consent.iter().map(EntryKey::from).collect()
    }
}
