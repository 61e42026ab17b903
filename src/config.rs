use std::path::{Path, PathBuf};

use directories::BaseDirs;
use serde::Deserialize;
use thiserror::Error;

/// tool settings file looked up inside the data directory when `--settings` is not given
pub const DEFAULT_FILE_NAME: &str = "tunswitch.toml";
/// subdirectory of the per-user data directory
pub const APP_DIR: &str = "tunswitch";

#[cfg(windows)]
const DEFAULT_SERVICE_NAME: &str = "Stunnel";
#[cfg(not(windows))]
const DEFAULT_SERVICE_NAME: &str = "stunnel";

#[cfg(windows)]
const DEFAULT_PROCESS_IMAGE: &str = "stunnel.exe";
#[cfg(not(windows))]
const DEFAULT_PROCESS_IMAGE: &str = "stunnel";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read settings file {0}: {2}")]
    Io(PathBuf, std::io::Error, String),
    #[error("invalid settings file {0}: {1}")]
    Parse(PathBuf, toml::de::Error),
}

#[derive(Deserialize, Debug, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub(crate) struct SwitchConfig {
    #[serde(default)]
    pub service: ServiceConfig,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub(crate) struct ServiceConfig {
    /// name of the OS service wrapping the tunnel
    #[serde(default = "default_service_name")]
    pub name: String,
    /// process image killed when the graceful stop does not work
    #[serde(default = "default_process_image")]
    pub image: String,
    #[serde(default)]
    pub backend: ServiceBackend,
}

#[derive(Deserialize, Debug, PartialEq, Clone, Copy)]
pub(crate) enum ServiceBackend {
    /// `net stop` / `taskkill` / `net start`
    #[serde(alias = "windows", alias = "WINDOWS")]
    Windows,
    /// `systemctl stop` / `pkill` / `systemctl start`
    #[serde(alias = "systemd", alias = "SYSTEMD")]
    Systemd,
}

impl Default for ServiceBackend {
    fn default() -> Self {
        if cfg!(windows) {
            ServiceBackend::Windows
        } else {
            ServiceBackend::Systemd
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        ServiceConfig {
            name: default_service_name(),
            image: default_process_image(),
            backend: ServiceBackend::default(),
        }
    }
}

fn default_service_name() -> String {
    DEFAULT_SERVICE_NAME.to_string()
}

fn default_process_image() -> String {
    DEFAULT_PROCESS_IMAGE.to_string()
}

/// Per-user directory for settings and logs (`%APPDATA%\tunswitch` on Windows).
pub fn data_dir(explicit: Option<&Path>) -> Option<PathBuf> {
    match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => BaseDirs::new().map(|dirs| dirs.data_dir().join(APP_DIR)),
    }
}

impl SwitchConfig {
    /// An explicitly requested file has to exist, the default one is optional.
    pub fn load(explicit: Option<&Path>, data_dir: &Path) -> Result<SwitchConfig, ConfigError> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let path = data_dir.join(DEFAULT_FILE_NAME);
                if !path.exists() {
                    tracing::debug!("no settings file at {}, using defaults", path.display());
                    return Ok(SwitchConfig::default());
                }
                path
            }
        };
        let raw = std::fs::read_to_string(&path).map_err(|e| {
            let msg = e.to_string();
            ConfigError::Io(path.clone(), e, msg)
        })?;
        let config = toml::from_str(&raw).map_err(|e| ConfigError::Parse(path.clone(), e))?;
        tracing::debug!("settings loaded from {}", path.display());
        Ok(config)
    }
}
