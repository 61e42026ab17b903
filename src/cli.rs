use std::net::Ipv4Addr;
use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

#[derive(Parser)]
#[command(version, about = "tunswitch points the local stunnel service at one of the known servers", long_about = None)]
pub(crate) struct TunswitchCli {
    /// tool settings file (service name, process image, backend)
    #[arg(short, long, global = true)]
    pub settings: Option<PathBuf>,
    /// directory holding settings.json and the run logs
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,
    /// print progress on stderr, repeat for more detail
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub(crate) enum Command {
    /// list the known servers
    Servers,
    /// show the server the tunnel currently points at
    Current,
    /// remember which stunnel configuration file to manage
    SetConfig { path: PathBuf },
    /// point the tunnel at another server and restart the service
    Switch {
        ip: Ipv4Addr,
        /// do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },
    /// show where this run is logging
    Log {
        /// open the log file in the default viewer
        #[arg(long)]
        open: bool,
        /// open the directory holding the logs
        #[arg(long, conflicts_with = "open")]
        open_folder: bool,
    },
    /// menu driven session (default)
    Interactive,
}

impl Command {
    /// Whether the command may end up stopping or starting the service.
    pub fn needs_elevation(&self) -> bool {
        matches!(self, Command::Switch { .. } | Command::Interactive)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn switch_parsing_test() {
        let cli = TunswitchCli::try_parse_from(["tunswitch", "switch", "195.209.130.45", "--yes"])
            .unwrap();
        assert_eq!(
            cli.command,
            Some(Command::Switch {
                ip: Ipv4Addr::new(195, 209, 130, 45),
                yes: true,
            })
        );
        assert!(cli.command.unwrap().needs_elevation());
    }

    #[test]
    fn invalid_address_is_rejected_test() {
        let cli = TunswitchCli::try_parse_from(["tunswitch", "switch", "195.209.130"]);
        assert!(cli.is_err());
    }

    #[test]
    fn global_flags_test() {
        let cli = TunswitchCli::try_parse_from([
            "tunswitch",
            "current",
            "-vv",
            "--data-dir",
            "/srv/tunswitch",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.data_dir, Some(PathBuf::from("/srv/tunswitch")));
        assert!(!cli.command.unwrap().needs_elevation());
    }

    #[test]
    fn log_open_flags_test() {
        let cli = TunswitchCli::try_parse_from(["tunswitch", "log", "--open-folder"]).unwrap();
        assert_eq!(
            cli.command,
            Some(Command::Log {
                open: false,
                open_folder: true,
            })
        );
        let cli = TunswitchCli::try_parse_from(["tunswitch", "log", "--open", "--open-folder"]);
        assert!(cli.is_err());
    }

    #[test]
    fn no_subcommand_test() {
        let cli = TunswitchCli::try_parse_from(["tunswitch"]).unwrap();
        assert!(cli.command.is_none());
    }
}
