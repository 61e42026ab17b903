use std::path::PathBuf;

use dialoguer::{Input, Select};

use super::{Shell, ShellError};
use crate::catalog;

#[derive(Debug, Clone, Copy, PartialEq)]
enum MenuItem {
    Switch,
    Refresh,
    SelectConfig,
    ShowLog,
    OpenLog,
    OpenLogFolder,
    Quit,
}

const MENU: &[(MenuItem, &str)] = &[
    (MenuItem::Switch, "Switch server"),
    (MenuItem::Refresh, "Refresh current server"),
    (MenuItem::SelectConfig, "Select configuration file"),
    (MenuItem::ShowLog, "Show log location"),
    (MenuItem::OpenLog, "Open log file"),
    (MenuItem::OpenLogFolder, "Open log folder"),
    (MenuItem::Quit, "Quit"),
];

impl Shell {
    /// Menu loop until the operator quits. Failed switches are reported and the loop goes on.
    pub async fn interactive(&self) -> Result<(), ShellError> {
        println!("Service: {}", self.switcher.service_name());
        self.print_config_path();
        self.current();
        loop {
            let labels: Vec<&str> = MENU.iter().map(|(_, label)| *label).collect();
            let picked = Select::new()
                .with_prompt("What do you want to do?")
                .items(&labels)
                .default(0)
                .interact_opt()?;
            let Some(index) = picked else {
                return Ok(());
            };
            match MENU[index].0 {
                MenuItem::Switch => self.pick_server().await?,
                MenuItem::Refresh => self.current(),
                MenuItem::SelectConfig => self.pick_config().await?,
                MenuItem::ShowLog => self.log(),
                // failures are printed, the menu stays up
                MenuItem::OpenLog => {
                    let _ = self.open_log(false);
                }
                MenuItem::OpenLogFolder => {
                    let _ = self.open_log(true);
                }
                MenuItem::Quit => return Ok(()),
            }
        }
    }

    fn print_config_path(&self) {
        let path = self.session.config_path();
        if path.is_empty() {
            println!("Configuration file: not selected");
        } else {
            println!("Configuration file: {path}");
        }
    }

    async fn pick_server(&self) -> Result<(), ShellError> {
        let current = self.switcher.current_server(&self.session);
        let servers = catalog::servers();
        let items: Vec<String> = servers
            .iter()
            .map(|server| format!("{:<16} {}", server.address, server.label))
            .collect();
        let default = servers
            .iter()
            .position(|server| current.as_deref() == Some(server.address.to_string().as_str()))
            .unwrap_or(0);
        let picked = Select::new()
            .with_prompt("Server")
            .items(&items)
            .default(default)
            .interact_opt()?;
        let Some(index) = picked else {
            return Ok(());
        };
        match self.switch(servers[index].address, false).await {
            // already reported on the console and in the log
            Err(ShellError::Transaction(_)) | Err(ShellError::Busy) => Ok(()),
            other => other,
        }
    }

    async fn pick_config(&self) -> Result<(), ShellError> {
        let raw = Input::<String>::new()
            .with_prompt("Path to the stunnel configuration file")
            .with_initial_text(self.session.config_path())
            .allow_empty(true)
            .interact_text()?;
        let raw = raw.trim();
        if raw.is_empty() {
            println!("Nothing changed.");
            return Ok(());
        }
        match self.set_config(&PathBuf::from(raw)).await {
            Err(ShellError::Transaction(_)) => Ok(()),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn menu_ends_with_quit_test() {
        assert_eq!(MENU.last().map(|(item, _)| *item), Some(MenuItem::Quit));
        assert_eq!(MENU.len(), 7);
    }
}
