use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::time::Duration;

use dialoguer::Confirm;
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::{
    catalog,
    logging::Console,
    tunneling::{
        session::Session,
        switcher::{SwitchOutcome, Switcher, TransactionError},
    },
};

pub(crate) mod interactive;

#[derive(Error, Debug)]
pub enum ShellError {
    #[error("a server switch is already in progress")]
    Busy,
    #[error(transparent)]
    Transaction(#[from] TransactionError),
    #[error("prompt failed: {0}")]
    Prompt(#[from] dialoguer::Error),
    #[error("switch task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
    #[error("could not open {0}: {1}")]
    Open(PathBuf, std::io::Error),
}

type SwitchTask = JoinHandle<Result<SwitchOutcome, TransactionError>>;

/// Terminal front end: prints state, asks for confirmation, runs switches in the background.
pub(crate) struct Shell {
    switcher: Arc<Switcher>,
    session: Arc<Session>,
    log_file: PathBuf,
    console: Console,
}

fn describe(host: &str) -> String {
    format!("{host} ({})", catalog::label_for(host))
}

impl Shell {
    pub fn new(
        switcher: Arc<Switcher>,
        session: Arc<Session>,
        log_file: PathBuf,
        console: Console,
    ) -> Self {
        Shell {
            switcher,
            session,
            log_file,
            console,
        }
    }

    pub fn servers(&self) {
        let current = self.switcher.current_server(&self.session);
        for server in catalog::servers() {
            let address = server.address.to_string();
            let marker = if current.as_deref() == Some(address.as_str()) {
                '*'
            } else {
                ' '
            };
            println!("{marker} {address:<16} {}", server.label);
        }
        if let Some(host) = current.filter(|host| catalog::find(host).is_none()) {
            println!("* {host:<16} {} (not in the list)", catalog::UNKNOWN_LABEL);
        }
    }

    fn status_line(&self) -> String {
        match self.switcher.current_server(&self.session) {
            Some(host) => format!("Current server: {}", describe(&host)),
            None => String::from("Current server: not determined"),
        }
    }

    pub fn current(&self) {
        println!("{}", self.status_line());
    }

    pub async fn set_config(&self, path: &Path) -> Result<(), ShellError> {
        let path = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
        if !path.is_file() {
            println!("Warning: {} does not exist (yet).", path.display());
        }
        let raw = path.to_string_lossy().to_string();
        if let Err(e) = self.switcher.save_config_path(&self.session, &raw).await {
            println!("Could not save the configuration path: {e}");
            return Err(e.into());
        }
        println!("Configuration file saved: {raw}");
        self.current();
        Ok(())
    }

    pub fn log(&self) {
        println!("Log file:      {}", self.log_file.display());
        if let Some(dir) = self.log_file.parent() {
            println!("Log directory: {}", dir.display());
        }
    }

    /// Hands the run log, or the directory holding it, to the desktop's default viewer.
    pub fn open_log(&self, folder: bool) -> Result<(), ShellError> {
        let target = self.log_target(folder);
        tracing::info!("opening {}", target.display());
        opener(target)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map(|_| ())
            .map_err(|e| {
                println!("Could not open {}: {e}", target.display());
                ShellError::Open(target.to_path_buf(), e)
            })
    }

    fn log_target(&self, folder: bool) -> &Path {
        match self.log_file.parent() {
            Some(dir) if folder => dir,
            _ => self.log_file.as_path(),
        }
    }

    /// Starts a switch on its own task. Refused while another one is running.
    pub(crate) fn spawn_switch(&self, ip: Ipv4Addr) -> Result<SwitchTask, ShellError> {
        let guard = self.session.try_begin().ok_or(ShellError::Busy)?;
        let switcher = Arc::clone(&self.switcher);
        let session = Arc::clone(&self.session);
        Ok(tokio::spawn(async move {
            let _guard = guard;
            switcher.change_server(&session, ip).await
        }))
    }

    pub async fn switch(&self, ip: Ipv4Addr, assume_yes: bool) -> Result<(), ShellError> {
        if let Err(e) = self.switcher.config_file(&self.session) {
            println!("{e}. Select the stunnel configuration with `tunswitch set-config <PATH>`.");
            return Err(e.into());
        }
        let target = ip.to_string();
        if self.switcher.current_server(&self.session).as_deref() == Some(target.as_str()) {
            println!("Server {} is already selected.", describe(&target));
            return Ok(());
        }
        if !assume_yes && !self.confirm(&target)? {
            println!("Cancelled.");
            return Ok(());
        }

        let task = self.spawn_switch(ip).inspect_err(|e| println!("{e}, try again later."))?;
        match self.wait(task).await {
            Ok(SwitchOutcome::AlreadySelected) => {
                println!("Server {} is already selected.", describe(&target));
            }
            Ok(SwitchOutcome::Switched { previous, backup }) => {
                if let Some(previous) = previous {
                    println!("Previous server: {}", describe(&previous));
                }
                println!(
                    "Server switched to {}, the {} service was restarted.",
                    describe(&target),
                    self.switcher.service_name()
                );
                println!("Previous configuration saved as {}", backup.display());
                self.current();
            }
            Err(e) => {
                println!("Could not switch the server: {e}");
                println!("Check the log for details: {}", self.log_file.display());
                return Err(e);
            }
        }
        Ok(())
    }

    fn confirm(&self, target: &str) -> Result<bool, ShellError> {
        let prompt = format!(
            "Switch the tunnel to {}? The {} service will be restarted.",
            describe(target),
            self.switcher.service_name()
        );
        Ok(Confirm::new().with_prompt(prompt).default(false).interact()?)
    }

    /// Awaits the switch while a spinner shows which step it is in.
    async fn wait(&self, mut task: SwitchTask) -> Result<SwitchOutcome, ShellError> {
        let spinner = self.console.spinner();
        let mut ticker = tokio::time::interval(Duration::from_millis(150));
        let joined = loop {
            tokio::select! {
                joined = &mut task => break joined,
                _ = ticker.tick() => spinner.set_message(format!("{}...", self.session.phase())),
            }
        };
        drop(spinner);
        Ok(joined??)
    }
}

#[cfg(windows)]
fn opener(path: &Path) -> Command {
    let mut cmd = Command::new("explorer");
    cmd.arg(path);
    cmd
}

#[cfg(target_os = "macos")]
fn opener(path: &Path) -> Command {
    let mut cmd = Command::new("open");
    cmd.arg(path);
    cmd
}

#[cfg(all(unix, not(target_os = "macos")))]
fn opener(path: &Path) -> Command {
    let mut cmd = Command::new("xdg-open");
    cmd.arg(path);
    cmd
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use tokio::sync::Notify;

    use super::*;
    use crate::{
        config::ServiceConfig,
        storage::MockSettingsStore,
        tunneling::{
            files::memory::MemoryFiles,
            service::{MockServiceControl, ServiceControl, ServiceError},
            session::Phase,
        },
    };

    const CONFIG: &str = "/etc/stunnel/stunnel.conf";
    const PRODUCTION: Ipv4Addr = Ipv4Addr::new(195, 209, 130, 9);
    const TEST_BUILD: Ipv4Addr = Ipv4Addr::new(195, 209, 130, 45);
    const NEW_FEATURES: Ipv4Addr = Ipv4Addr::new(195, 209, 130, 19);

    /// Holds `stop_service` until the test releases it.
    #[derive(Default)]
    struct Gate {
        entered: Notify,
        release: Notify,
        stops: AtomicUsize,
        starts: AtomicUsize,
    }

    struct GatedService(Arc<Gate>);

    #[async_trait]
    impl ServiceControl for GatedService {
        async fn stop_service(&self, _name: &str) -> Result<(), ServiceError> {
            self.0.stops.fetch_add(1, Ordering::SeqCst);
            self.0.entered.notify_one();
            self.0.release.notified().await;
            Ok(())
        }

        async fn kill_process(&self, _image: &str) -> Result<(), ServiceError> {
            Ok(())
        }

        async fn start_service(&self, _name: &str) -> Result<(), ServiceError> {
            self.0.starts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn shell(control: Box<dyn ServiceControl>, files: Arc<MemoryFiles>, config_path: &str) -> Shell {
        let switcher = Switcher::new(
            control,
            Box::new(files),
            Box::new(MockSettingsStore::new()),
            ServiceConfig::default(),
        );
        Shell::new(
            Arc::new(switcher),
            Arc::new(Session::new(config_path.to_string())),
            PathBuf::from("/tmp/tunswitch_test.log"),
            Console::default(),
        )
    }

    fn production_files() -> Arc<MemoryFiles> {
        Arc::new(MemoryFiles::with_file(
            Path::new(CONFIG),
            "[giis]\nclient = yes\nconnect=195.209.130.9:443\n",
        ))
    }

    #[tokio::test]
    async fn second_switch_is_rejected_while_pending_test() {
        let gate = Arc::new(Gate::default());
        let files = production_files();
        let shell = shell(Box::new(GatedService(gate.clone())), files, CONFIG);

        let first = shell.spawn_switch(TEST_BUILD).unwrap();
        gate.entered.notified().await;
        assert_eq!(shell.session.phase(), Phase::Stopping);
        assert!(matches!(shell.spawn_switch(NEW_FEATURES), Err(ShellError::Busy)));

        gate.release.notify_one();
        first.await.unwrap().unwrap();
        assert_eq!(gate.stops.load(Ordering::SeqCst), 1);
        assert_eq!(gate.starts.load(Ordering::SeqCst), 1);
        assert!(!shell.session.is_busy());
        assert_eq!(
            shell.switcher.current_server(&shell.session).as_deref(),
            Some("195.209.130.45")
        );
    }

    #[tokio::test]
    async fn slot_is_free_again_after_switch_test() {
        let gate = Arc::new(Gate::default());
        let shell = shell(Box::new(GatedService(gate.clone())), production_files(), CONFIG);

        gate.release.notify_one();
        shell.spawn_switch(TEST_BUILD).unwrap().await.unwrap().unwrap();
        gate.release.notify_one();
        shell.spawn_switch(NEW_FEATURES).unwrap().await.unwrap().unwrap();
        assert_eq!(gate.stops.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn confirmed_switch_test() {
        let mut control = MockServiceControl::new();
        control.expect_stop_service().times(1).returning(|_| Ok(()));
        control.expect_start_service().times(1).returning(|_| Ok(()));
        let files = production_files();
        let shell = shell(Box::new(control), files.clone(), CONFIG);

        shell.switch(NEW_FEATURES, true).await.unwrap();
        assert_eq!(
            files.text(Path::new(CONFIG)).unwrap(),
            "[giis]\nclient = yes\nconnect=195.209.130.19:443\n"
        );
        assert!(!shell.session.is_busy());
    }

    #[tokio::test]
    async fn current_server_skips_service_test() {
        let mut control = MockServiceControl::new();
        control.expect_stop_service().never();
        control.expect_start_service().never();
        let shell = shell(Box::new(control), production_files(), CONFIG);

        // no prompt either, the selection is already active
        shell.switch(PRODUCTION, false).await.unwrap();
    }

    #[tokio::test]
    async fn switch_without_config_test() {
        let mut control = MockServiceControl::new();
        control.expect_stop_service().never();
        let shell = shell(Box::new(control), Arc::new(MemoryFiles::default()), "");

        let result = shell.switch(TEST_BUILD, true).await;
        assert!(matches!(
            result,
            Err(ShellError::Transaction(TransactionError::ConfigNotSet))
        ));
    }

    #[tokio::test]
    async fn failed_switch_is_reported_test() {
        let mut control = MockServiceControl::new();
        control.expect_stop_service().times(1).returning(|_| {
            Err(ServiceError::Spawn(
                String::from("systemctl"),
                String::from("not found"),
            ))
        });
        control.expect_kill_process().times(1).returning(|_| {
            Err(ServiceError::Spawn(String::from("pkill"), String::from("not found")))
        });
        let shell = shell(Box::new(control), production_files(), CONFIG);

        let result = shell.switch(TEST_BUILD, true).await;
        assert!(matches!(
            result,
            Err(ShellError::Transaction(TransactionError::ServiceStopFailed(_)))
        ));
        assert!(!shell.session.is_busy());
    }

    #[test]
    fn log_target_test() {
        let shell = shell(
            Box::new(MockServiceControl::new()),
            Arc::new(MemoryFiles::default()),
            CONFIG,
        );
        assert_eq!(shell.log_target(false), Path::new("/tmp/tunswitch_test.log"));
        assert_eq!(shell.log_target(true), Path::new("/tmp"));
    }

    #[cfg(all(unix, not(target_os = "macos")))]
    #[test]
    fn opener_uses_xdg_open_test() {
        let cmd = opener(Path::new("/tmp/tunswitch_test.log"));
        assert_eq!(cmd.get_program(), std::ffi::OsStr::new("xdg-open"));
        let args: Vec<_> = cmd.get_args().collect();
        assert_eq!(args, vec![std::ffi::OsStr::new("/tmp/tunswitch_test.log")]);
    }
}
