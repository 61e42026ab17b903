use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{error, info, warn};

use crate::{
    catalog,
    config::ServiceConfig,
    storage::{Settings, SettingsStore},
};

use super::{
    files::{ConfigFiles, backup_path},
    service::ServiceControl,
    session::{Phase, Session},
    tunnel_config::{Rewrite, TunnelConfig, connect_line},
};

#[derive(Error, Debug)]
pub enum TransactionError {
    #[error("no tunnel configuration file selected")]
    ConfigNotSet,
    #[error("tunnel configuration {0} does not exist")]
    ConfigMissing(PathBuf),
    #[error("could not stop the tunnel service: {0}")]
    ServiceStopFailed(String),
    #[error("could not back up the tunnel configuration: {1}")]
    BackupFailed(std::io::Error, String),
    #[error("could not rewrite the tunnel configuration: {1}")]
    RewriteFailed(std::io::Error, String),
    #[error("configuration rewritten but the tunnel service did not start: {0}")]
    ServiceStartFailed(String),
    #[error("could not remember the configuration path: {0}")]
    SettingsPersistFailed(String),
}

/// How a successful `change_server` ended.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum SwitchOutcome {
    AlreadySelected,
    Switched {
        previous: Option<String>,
        backup: PathBuf,
    },
}

/// Runs the stop, backup, rewrite, start sequence against injected collaborators.
pub(crate) struct Switcher {
    control: Box<dyn ServiceControl>,
    files: Box<dyn ConfigFiles>,
    settings: Box<dyn SettingsStore>,
    service: ServiceConfig,
}

impl Switcher {
    pub fn new(
        control: Box<dyn ServiceControl>,
        files: Box<dyn ConfigFiles>,
        settings: Box<dyn SettingsStore>,
        service: ServiceConfig,
    ) -> Self {
        Switcher {
            control,
            files,
            settings,
            service,
        }
    }

    pub fn service_name(&self) -> &str {
        &self.service.name
    }

    /// Restores the last remembered config path. A broken settings file counts as a first run.
    pub async fn open_session(&self) -> Session {
        match self.settings.load().await {
            Ok(settings) => {
                if settings.config_path.is_empty() {
                    info!("no configuration file remembered yet");
                } else {
                    info!("configuration file: {}", settings.config_path);
                }
                Session::new(settings.config_path)
            }
            Err(e) => {
                warn!(error = %e, "could not load settings, starting without a configuration file");
                Session::default()
            }
        }
    }

    pub async fn save_config_path(
        &self,
        session: &Session,
        path: &str,
    ) -> Result<(), TransactionError> {
        let settings = Settings {
            config_path: path.to_string(),
        };
        if let Err(e) = self.settings.save(&settings).await {
            error!(error = %e, "could not save configuration path {path}");
            return Err(TransactionError::SettingsPersistFailed(e.to_string()));
        }
        session.set_config_path(settings.config_path);
        info!("configuration path saved: {path}");
        Ok(())
    }

    /// The selected config file, checked to exist.
    pub fn config_file(&self, session: &Session) -> Result<PathBuf, TransactionError> {
        let raw = session.config_path();
        if raw.is_empty() {
            return Err(TransactionError::ConfigNotSet);
        }
        let path = PathBuf::from(raw);
        if !self.files.exists(&path) {
            return Err(TransactionError::ConfigMissing(path));
        }
        Ok(path)
    }

    /// Host of the first `connect=` line; `None` on any problem, which is logged.
    pub fn current_server(&self, session: &Session) -> Option<String> {
        match self.config_file(session) {
            Ok(path) => self.read_current(&path),
            Err(e) => {
                warn!("current server unknown: {e}");
                None
            }
        }
    }

    fn read_current(&self, path: &Path) -> Option<String> {
        match self.files.read(path) {
            Ok(raw) => {
                let current = TunnelConfig::parse(&raw).current_host();
                match &current {
                    Some(host) => info!("current server: {host}"),
                    None => info!("no connect= line in {}", path.display()),
                }
                current
            }
            Err(e) => {
                error!(error = %e, "could not read {}", path.display());
                None
            }
        }
    }

    pub async fn change_server(
        &self,
        session: &Session,
        new_ip: Ipv4Addr,
    ) -> Result<SwitchOutcome, TransactionError> {
        let path = self.config_file(session).inspect_err(|e| {
            error!(step = "check", outcome = "failed", "{e}");
        })?;
        let result = self.run(session, &path, new_ip).await;
        session.set_phase(Phase::Idle);
        result
    }

    async fn run(
        &self,
        session: &Session,
        path: &Path,
        new_ip: Ipv4Addr,
    ) -> Result<SwitchOutcome, TransactionError> {
        let target = new_ip.to_string();
        let previous = self.read_current(path);
        if previous.as_deref() == Some(target.as_str()) {
            info!(step = "check", outcome = "noop", "server {target} is already selected");
            return Ok(SwitchOutcome::AlreadySelected);
        }
        info!(
            step = "check",
            outcome = "ok",
            "switching server: {} -> {target} ({})",
            previous.as_deref().unwrap_or("undetermined"),
            catalog::label_for(&target)
        );

        enter(session, Phase::Stopping);
        self.stop().await?;

        enter(session, Phase::BackingUp);
        let backup = backup_path(path);
        if let Err(e) = self.files.copy(path, &backup) {
            error!(
                step = "backup",
                outcome = "failed",
                error = %e,
                "could not copy {} to {}, configuration untouched",
                path.display(),
                backup.display()
            );
            self.restart_after_failure().await;
            let msg = e.to_string();
            return Err(TransactionError::BackupFailed(e, msg));
        }
        info!(step = "backup", outcome = "ok", "backup written to {}", backup.display());

        enter(session, Phase::Rewriting);
        if let Err(e) = self.rewrite(path, new_ip) {
            error!(
                step = "rewrite",
                outcome = "failed",
                error = %e,
                "could not rewrite {}",
                path.display()
            );
            self.restore(path, &backup);
            self.restart_after_failure().await;
            let msg = e.to_string();
            return Err(TransactionError::RewriteFailed(e, msg));
        }

        enter(session, Phase::Starting);
        if let Err(e) = self.control.start_service(&self.service.name).await {
            error!(
                step = "start",
                outcome = "failed",
                error = %e,
                "service {} is down while {} already points at {target}; previous content is in {}",
                self.service.name,
                path.display(),
                backup.display()
            );
            return Err(TransactionError::ServiceStartFailed(e.to_string()));
        }
        info!(step = "start", outcome = "ok", "service {} started", self.service.name);
        info!(
            step = "done",
            outcome = "ok",
            "server switched to {target} ({}), backup: {}",
            catalog::label_for(&target),
            backup.display()
        );
        Ok(SwitchOutcome::Switched { previous, backup })
    }

    /// Graceful stop first, killing the process image if that does not work.
    async fn stop(&self) -> Result<(), TransactionError> {
        let name = &self.service.name;
        let stop_err = match self.control.stop_service(name).await {
            Ok(()) => {
                info!(step = "stop", outcome = "ok", "service {name} stopped");
                return Ok(());
            }
            Err(e) => e,
        };
        warn!(
            step = "stop",
            outcome = "retry",
            error = %stop_err,
            "graceful stop of {name} failed, killing {}",
            self.service.image
        );
        match self.control.kill_process(&self.service.image).await {
            Ok(()) => {
                info!(
                    step = "stop",
                    outcome = "killed",
                    "{} terminated forcefully",
                    self.service.image
                );
                Ok(())
            }
            Err(kill_err) => {
                error!(
                    step = "stop",
                    outcome = "failed",
                    error = %kill_err,
                    "service {name} could not be stopped, its state is unknown; configuration untouched"
                );
                Err(TransactionError::ServiceStopFailed(format!(
                    "{stop_err}; {kill_err}"
                )))
            }
        }
    }

    fn rewrite(&self, path: &Path, new_ip: Ipv4Addr) -> std::io::Result<()> {
        let raw = self.files.read(path)?;
        let mut config = TunnelConfig::parse(&raw);
        let rewrite = config.point_to(new_ip);
        self.files.write(path, &config.render())?;
        match rewrite {
            Rewrite::Replaced(count) => info!(
                step = "rewrite",
                outcome = "ok",
                "{count} connect line(s) set to {}",
                connect_line(new_ip)
            ),
            Rewrite::Appended => info!(
                step = "rewrite",
                outcome = "ok",
                "connect line added: {}",
                connect_line(new_ip)
            ),
        }
        Ok(())
    }

    fn restore(&self, path: &Path, backup: &Path) {
        match self.files.copy(backup, path) {
            Ok(()) => info!(
                step = "restore",
                outcome = "ok",
                "{} restored from backup",
                path.display()
            ),
            Err(e) => error!(
                step = "restore",
                outcome = "failed",
                error = %e,
                "could not restore {}, the original content is in {}",
                path.display(),
                backup.display()
            ),
        }
    }

    async fn restart_after_failure(&self) {
        let name = &self.service.name;
        match self.control.start_service(name).await {
            Ok(()) => info!(step = "restart", outcome = "ok", "service {name} started again"),
            Err(e) => error!(
                step = "restart",
                outcome = "failed",
                error = %e,
                "service {name} is stopped and could not be restarted, start it manually"
            ),
        }
    }
}

fn enter(session: &Session, phase: Phase) {
    tracing::debug!(phase = %phase, "entering phase");
    session.set_phase(phase);
}
