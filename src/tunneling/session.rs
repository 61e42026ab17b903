use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

/// Where a switch currently is. Anything but `Idle` means one is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum Phase {
    #[default]
    Idle,
    Stopping,
    BackingUp,
    Rewriting,
    Starting,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::Stopping => "stopping service",
            Phase::BackingUp => "backing up configuration",
            Phase::Rewriting => "rewriting configuration",
            Phase::Starting => "starting service",
        };
        f.write_str(name)
    }
}

/// State owned by the front end and handed to every switcher call.
#[derive(Debug, Default)]
pub(crate) struct Session {
    config_path: RwLock<String>,
    busy: AtomicBool,
    phase: Mutex<Phase>,
}

impl Session {
    pub fn new(config_path: String) -> Self {
        Session {
            config_path: RwLock::new(config_path),
            ..Session::default()
        }
    }

    pub fn config_path(&self) -> String {
        self.config_path
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn set_config_path(&self, path: String) {
        *self
            .config_path
            .write()
            .unwrap_or_else(PoisonError::into_inner) = path;
    }

    pub fn phase(&self) -> Phase {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn set_phase(&self, phase: Phase) {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner) = phase;
    }

    #[cfg(test)]
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// Claims the single switch slot; `None` when a switch is already running.
    pub fn try_begin(self: &Arc<Self>) -> Option<BusyGuard> {
        self.busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| BusyGuard {
                session: Arc::clone(self),
            })
    }
}

/// Releases the switch slot on drop.
#[derive(Debug)]
pub(crate) struct BusyGuard {
    session: Arc<Session>,
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.session.busy.store(false, Ordering::SeqCst);
    }
}
