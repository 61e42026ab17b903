use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Local;
use indicatif::ProgressBar;
use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter, Layer, fmt, fmt::MakeWriter, fmt::time::ChronoLocal, layer::SubscriberExt,
    util::SubscriberInitExt,
};

const LOG_PREFIX: &str = "tunswitch";
const LINE_TIME_FORMAT: &str = "[%Y-%m-%d %H:%M:%S]";

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("cannot create log directory {0}: {1}")]
    Directory(PathBuf, std::io::Error),
    #[error("cannot install log subscriber: {0}")]
    Subscriber(#[from] tracing_subscriber::util::TryInitError),
}

/// Keeps the file writer alive; dropping it flushes the run log.
pub(crate) struct RunLog {
    path: PathBuf,
    console: Console,
    _guard: WorkerGuard,
}

impl RunLog {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn console(&self) -> Console {
        self.console.clone()
    }
}

/// Stderr shared by the console log layer and the shell's spinner.
#[derive(Clone, Default)]
pub(crate) struct Console {
    spinner: Arc<Mutex<Option<ProgressBar>>>,
}

impl Console {
    /// Starts a spinner. Log lines emitted while it runs are printed above it.
    pub fn spinner(&self) -> Spinner {
        let bar = ProgressBar::new_spinner();
        bar.enable_steady_tick(Duration::from_millis(100));
        *self.slot() = Some(bar.clone());
        Spinner {
            bar,
            console: self.clone(),
        }
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<ProgressBar>> {
        self.spinner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn print(&self, line: &[u8]) {
        // the slot lock is released before drawing
        let active = self.slot().clone();
        let write = || {
            let _ = std::io::stderr().write_all(line);
        };
        match active {
            Some(bar) => bar.suspend(write),
            None => write(),
        }
    }
}

impl<'a> MakeWriter<'a> for Console {
    type Writer = ConsoleLine;

    fn make_writer(&'a self) -> Self::Writer {
        ConsoleLine {
            console: self.clone(),
            buf: Vec::new(),
        }
    }
}

/// One formatted event, printed in a single piece when dropped.
pub(crate) struct ConsoleLine {
    console: Console,
    buf: Vec<u8>,
}

impl Write for ConsoleLine {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Drop for ConsoleLine {
    fn drop(&mut self) {
        if !self.buf.is_empty() {
            self.console.print(&self.buf);
        }
    }
}

/// Running spinner; cleared from the terminal on drop.
pub(crate) struct Spinner {
    bar: ProgressBar,
    console: Console,
}

impl Spinner {
    pub fn set_message(&self, message: String) {
        self.bar.set_message(message);
    }
}

impl Drop for Spinner {
    fn drop(&mut self) {
        self.console.slot().take();
        self.bar.finish_and_clear();
    }
}

pub(crate) fn run_log_name(started: chrono::DateTime<Local>) -> String {
    format!("{LOG_PREFIX}_{}.log", started.format("%Y-%m-%d_%H-%M-%S"))
}

fn filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("tunswitch={level}")))
}

/// Console gets warnings (more with `-v`), the per-run file gets every step.
pub(crate) fn init(log_dir: &Path, verbosity: u8) -> Result<RunLog, LoggingError> {
    std::fs::create_dir_all(log_dir)
        .map_err(|e| LoggingError::Directory(log_dir.to_path_buf(), e))?;
    let file_name = run_log_name(Local::now());
    let path = log_dir.join(&file_name);

    let (console_level, file_level) = match verbosity {
        0 => ("warn", "info"),
        1 => ("info", "info"),
        2 => ("debug", "debug"),
        _ => ("trace", "trace"),
    };

    let appender = tracing_appender::rolling::never(log_dir, &file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let console = Console::default();

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(console.clone())
                .with_target(false)
                .without_time()
                .with_filter(filter(console_level)),
        )
        .with(
            fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(false)
                .with_level(false)
                .with_timer(ChronoLocal::new(LINE_TIME_FORMAT.to_string()))
                .with_filter(EnvFilter::new(format!("tunswitch={file_level}"))),
        )
        .try_init()?;

    Ok(RunLog {
        path,
        console,
        _guard: guard,
    })
}
