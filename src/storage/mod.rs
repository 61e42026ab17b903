use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[cfg(test)]
use mockall::automock;

pub(crate) mod json;

/// name of the file holding the session settings inside the data directory
pub const SETTINGS_FILE: &str = "settings.json";

/// Everything that survives between runs: just the tunnel config location.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub(crate) struct Settings {
    #[serde(default)]
    pub config_path: String,
}

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("io error on {0}: {2}")]
    Io(PathBuf, std::io::Error, String),
    #[error("malformed settings: {1}")]
    Json(serde_json::Error, String),
}

#[cfg_attr(test, automock)]
#[async_trait]
pub(crate) trait SettingsStore: Send + Sync {
    async fn load(&self) -> Result<Settings, SettingsError>;
    async fn save(&self, settings: &Settings) -> Result<(), SettingsError>;
}

impl From<serde_json::Error> for SettingsError {
    fn from(value: serde_json::Error) -> Self {
        let str_value = value.to_string();
        SettingsError::Json(value, str_value)
    }
}
