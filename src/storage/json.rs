use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::{SETTINGS_FILE, Settings, SettingsError, SettingsStore};

pub struct JsonSettingsStore {
    path: PathBuf,
}

impl JsonSettingsStore {
    pub fn new(data_dir: &Path) -> Self {
        JsonSettingsStore {
            path: data_dir.join(SETTINGS_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, err: std::io::Error) -> SettingsError {
        let str_value = err.to_string();
        SettingsError::Io(self.path.clone(), err, str_value)
    }
}

#[async_trait]
impl SettingsStore for JsonSettingsStore {
    async fn load(&self) -> Result<Settings, SettingsError> {
        if !tokio::fs::try_exists(&self.path)
            .await
            .map_err(|e| self.io_error(e))?
        {
            return Ok(Settings::default());
        }
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| self.io_error(e))?;
        Ok(serde_json::from_str(&raw)?)
    }

    async fn save(&self, settings: &Settings) -> Result<(), SettingsError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io_error(e))?;
        }
        let payload = serde_json::to_string_pretty(settings)?;
        tokio::fs::write(&self.path, payload)
            .await
            .map_err(|e| self.io_error(e))?;
        tracing::debug!("settings written to {}", self.path.display());
        Ok(())
    }
}
