use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use cli::{Command, TunswitchCli};
use config::SwitchConfig;
use shell::Shell;
use storage::json::JsonSettingsStore;
use tracing::{error, info, warn};
use tunneling::{files::FsConfigFiles, service::SystemServiceControl, switcher::Switcher};

mod catalog;
mod cli;
mod config;
mod elevation;
mod logging;
mod shell;
mod storage;
mod tunneling;

#[tokio::main]
pub async fn main() -> ExitCode {
    let cli = TunswitchCli::parse();
    let command = cli.command.clone().unwrap_or(Command::Interactive);

    let Some(data_dir) = config::data_dir(cli.data_dir.as_deref()) else {
        eprintln!("cannot determine the data directory, pass --data-dir");
        return ExitCode::FAILURE;
    };

    if command.needs_elevation() && !elevation::is_elevated() {
        println!("Administrator rights are required, restarting elevated...");
        return match elevation::relaunch_elevated(&data_dir) {
            Ok(code) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
            Err(e) => {
                eprintln!("{e}");
                ExitCode::FAILURE
            }
        };
    }

    let run_log = match logging::init(&data_dir, cli.verbose) {
        Ok(run_log) => run_log,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };
    info!("log file created: {}", run_log.path().display());

    let switch_config = match SwitchConfig::load(cli.settings.as_deref(), &data_dir) {
        Ok(config) => config,
        Err(e) => {
            error!("{e}");
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };
    info!(
        "service {} ({:?}), process image {}",
        switch_config.service.name, switch_config.service.backend, switch_config.service.image
    );

    let settings = JsonSettingsStore::new(&data_dir);
    info!("settings file: {}", settings.path().display());
    let switcher = Switcher::new(
        Box::new(SystemServiceControl::new(switch_config.service.backend)),
        Box::new(FsConfigFiles),
        Box::new(settings),
        switch_config.service,
    );
    let session = Arc::new(switcher.open_session().await);
    let shell = Shell::new(
        Arc::new(switcher),
        session,
        run_log.path().to_path_buf(),
        run_log.console(),
    );

    let result = match command {
        Command::Servers => {
            shell.servers();
            Ok(())
        }
        Command::Current => {
            shell.current();
            Ok(())
        }
        Command::SetConfig { path } => shell.set_config(&path).await,
        Command::Switch { ip, yes } => shell.switch(ip, yes).await,
        Command::Log { open, open_folder } => {
            shell.log();
            if open || open_folder {
                shell.open_log(open_folder)
            } else {
                Ok(())
            }
        }
        Command::Interactive => shell.interactive().await,
    };

    if let Err(e) = elevation::hand_back(&data_dir) {
        warn!("could not return {} to the invoking user: {e}", data_dir.display());
    }

    match result {
        Ok(()) => {
            info!("exiting");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
