use std::process::{Output, Stdio};

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;

#[cfg(test)]
use mockall::automock;

use crate::config::ServiceBackend;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("could not run {0}: {1}")]
    Spawn(String, String),
    #[error("{program} failed ({status}): {detail}")]
    Failed {
        program: String,
        status: String,
        detail: String,
    },
}

/// The OS primitives a switch needs. Each call blocks until the command has finished.
#[cfg_attr(test, automock)]
#[async_trait]
pub(crate) trait ServiceControl: Send + Sync {
    async fn stop_service(&self, name: &str) -> Result<(), ServiceError>;
    /// forceful termination of every process running `image`
    async fn kill_process(&self, image: &str) -> Result<(), ServiceError>;
    async fn start_service(&self, name: &str) -> Result<(), ServiceError>;
}

/// Captured result of one service-control command.
#[derive(Debug, Clone)]
struct CommandOutput {
    success: bool,
    exit_code: Option<i32>,
    stdout: String,
    stderr: String,
}

impl CommandOutput {
    fn from_output(output: Output) -> Self {
        // `net` answers in the console code page, lossy is the best we can do
        CommandOutput {
            success: output.status.success(),
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }
    }

    fn detail(&self) -> String {
        match (self.stderr.is_empty(), self.stdout.is_empty()) {
            (true, true) => String::from("no output"),
            (false, true) => self.stderr.clone(),
            (true, false) => self.stdout.clone(),
            (false, false) => format!("{} {}", self.stderr, self.stdout),
        }
    }

    fn status(&self) -> String {
        match self.exit_code {
            Some(code) => format!("exit code {code}"),
            None => String::from("terminated by signal"),
        }
    }
}

pub struct SystemServiceControl {
    backend: ServiceBackend,
}

impl SystemServiceControl {
    pub fn new(backend: ServiceBackend) -> Self {
        SystemServiceControl { backend }
    }

    fn stop_command(&self, name: &str) -> (&'static str, Vec<String>) {
        match self.backend {
            ServiceBackend::Windows => ("net", vec!["stop".into(), name.into()]),
            ServiceBackend::Systemd => ("systemctl", vec!["stop".into(), name.into()]),
        }
    }

    fn kill_command(&self, image: &str) -> (&'static str, Vec<String>) {
        match self.backend {
            ServiceBackend::Windows => (
                "taskkill",
                vec!["/f".into(), "/im".into(), image.into()],
            ),
            ServiceBackend::Systemd => ("pkill", vec!["-KILL".into(), "-x".into(), image.into()]),
        }
    }

    fn start_command(&self, name: &str) -> (&'static str, Vec<String>) {
        match self.backend {
            ServiceBackend::Windows => ("net", vec!["start".into(), name.into()]),
            ServiceBackend::Systemd => ("systemctl", vec!["start".into(), name.into()]),
        }
    }

    async fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput, ServiceError> {
        tracing::debug!(program = %program, args = ?args, "running service command");
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| ServiceError::Spawn(program.to_string(), e.to_string()))?;
        let output = CommandOutput::from_output(output);
        tracing::debug!(
            program = %program,
            success = output.success,
            exit_code = ?output.exit_code,
            "service command finished"
        );
        if output.success {
            Ok(output)
        } else {
            Err(ServiceError::Failed {
                program: program.to_string(),
                status: output.status(),
                detail: output.detail(),
            })
        }
    }
}

#[async_trait]
impl ServiceControl for SystemServiceControl {
    async fn stop_service(&self, name: &str) -> Result<(), ServiceError> {
        let (program, args) = self.stop_command(name);
        self.run(program, &args).await.map(|_| ())
    }

    async fn kill_process(&self, image: &str) -> Result<(), ServiceError> {
        let (program, args) = self.kill_command(image);
        self.run(program, &args).await.map(|_| ())
    }

    async fn start_service(&self, name: &str) -> Result<(), ServiceError> {
        let (program, args) = self.start_command(name);
        self.run(program, &args).await.map(|_| ())
    }
}
