use std::ffi::OsString;
use std::path::Path;
use std::process::{Command, Stdio};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ElevationError {
    #[error("cannot locate the running executable: {0}")]
    CurrentExe(std::io::Error),
    #[error("could not relaunch with elevated privileges: {0}")]
    Relaunch(String),
}

/// Environment forwarded into the elevated copy on Unix, pkexec drops it otherwise.
#[cfg(unix)]
const FORWARDED_ENV: &[&str] = &[
    "DISPLAY",
    "XAUTHORITY",
    "WAYLAND_DISPLAY",
    "XDG_RUNTIME_DIR",
    "DBUS_SESSION_BUS_ADDRESS",
    "TERM",
    "LANG",
    "LC_ALL",
    "RUST_LOG",
];

#[cfg(unix)]
pub fn is_elevated() -> bool {
    unsafe { libc::geteuid() == 0 }
}

#[cfg(windows)]
pub fn is_elevated() -> bool {
    // `net session` is refused for non-administrators
    Command::new("net")
        .arg("session")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

/// Uid of the user who ran pkexec, when this process is the elevated copy.
#[cfg(unix)]
fn invoking_uid(raw: Option<String>) -> Option<u32> {
    raw?.trim().parse().ok()
}

/// Returns the data directory and the files directly in it to the user who ran pkexec.
/// No-op when not started through pkexec.
#[cfg(unix)]
pub fn hand_back(data_dir: &Path) -> std::io::Result<()> {
    match invoking_uid(std::env::var("PKEXEC_UID").ok()) {
        Some(uid) => chown_data_dir(data_dir, uid),
        None => Ok(()),
    }
}

#[cfg(windows)]
pub fn hand_back(_data_dir: &Path) -> std::io::Result<()> {
    Ok(())
}

#[cfg(unix)]
fn chown_data_dir(data_dir: &Path, uid: u32) -> std::io::Result<()> {
    use std::os::unix::fs::chown;

    chown(data_dir, Some(uid), None)?;
    for entry in std::fs::read_dir(data_dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            chown(entry.path(), Some(uid), None)?;
        }
    }
    tracing::debug!("{} handed back to uid {uid}", data_dir.display());
    Ok(())
}

/// Original arguments plus `--data-dir`, so the elevated copy keeps using this user's settings.
pub(crate) fn relaunch_args(
    original: impl IntoIterator<Item = OsString>,
    data_dir: &Path,
) -> Vec<OsString> {
    let mut args: Vec<OsString> = original.into_iter().skip(1).collect();
    let has_data_dir = args.iter().any(|arg| {
        let arg = arg.to_string_lossy();
        arg == "--data-dir" || arg.starts_with("--data-dir=")
    });
    if !has_data_dir {
        args.push(OsString::from("--data-dir"));
        args.push(data_dir.as_os_str().to_owned());
    }
    args
}

#[cfg(unix)]
fn elevated_command(exe: &Path, args: &[OsString]) -> Command {
    let mut cmd = Command::new("pkexec");
    cmd.arg("env");
    for key in FORWARDED_ENV {
        if let Ok(value) = std::env::var(key) {
            cmd.arg(format!("{key}={value}"));
        }
    }
    cmd.arg(exe).args(args);
    cmd
}

#[cfg(windows)]
fn elevated_command(exe: &Path, args: &[OsString]) -> Command {
    let quote = |raw: &str| format!("'{}'", raw.replace('\'', "''"));
    let mut script = format!(
        "Start-Process -FilePath {} -Verb RunAs",
        quote(&exe.to_string_lossy())
    );
    if !args.is_empty() {
        let list: Vec<String> = args
            .iter()
            .map(|arg| quote(&format!("\"{}\"", arg.to_string_lossy())))
            .collect();
        script.push_str(" -ArgumentList ");
        script.push_str(&list.join(","));
    }
    let mut cmd = Command::new("powershell");
    cmd.args(["-NoProfile", "-NonInteractive", "-Command", &script]);
    cmd
}

/// Starts an elevated copy of this process and waits for the launcher, returning its exit code.
pub fn relaunch_elevated(data_dir: &Path) -> Result<i32, ElevationError> {
    let exe = std::env::current_exe().map_err(ElevationError::CurrentExe)?;
    let args = relaunch_args(std::env::args_os(), data_dir);
    let status = elevated_command(&exe, &args)
        .stdin(Stdio::inherit())
        .status()
        .map_err(|e| ElevationError::Relaunch(e.to_string()))?;
    match status.code() {
        Some(code) => Ok(code),
        None => Err(ElevationError::Relaunch(String::from(
            "launcher terminated by signal",
        ))),
    }
}
