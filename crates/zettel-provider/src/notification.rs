//! User-facing notifications
//!
//! The provider reports reloads, unreadable libraries, integrity problems
//! and malformed cite keys through a [`Notifier`]. Notifications raised
//! while the host is still starting are held back by a [`StartupGate`]
//! until the host signals it is up, or a deadline passes.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Notification {
    /// The library changed on disk and is being reloaded
    Reloading { path: PathBuf },

    /// The library is neither CSL-JSON nor BibTeX
    LibraryParseError { path: PathBuf, message: String },

    /// Items that failed the rendering probe and were removed
    IntegrityReport {
        count: usize,
        title: String,
        details: String,
    },

    /// Records whose id is not a valid cite key
    MalformedKeys { keys: Vec<String> },
}

impl Notification {
    /// One-line message for display
    pub fn message(&self) -> String {
        match self {
            Self::Reloading { path } => {
                format!("Reloading citation library {}", path.display())
            }
            Self::LibraryParseError { path, message } => {
                format!("Could not read citation library {}: {}", path.display(), message)
            }
            Self::IntegrityReport { count, title, .. } => format!("{} ({} items)", title, count),
            Self::MalformedKeys { keys } => format!(
                "{} entries have malformed cite keys and were skipped: {}",
                keys.len(),
                keys.join(", ")
            ),
        }
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Writes notifications to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: Notification) {
        match &notification {
            Notification::Reloading { .. } => tracing::info!("{}", notification.message()),
            Notification::IntegrityReport { details, .. } => {
                tracing::error!(details = %details, "{}", notification.message())
            }
            _ => tracing::error!("{}", notification.message()),
        }
    }
}

struct GateState {
    started: bool,
    pending: Vec<Notification>,
}

/// Buffers notifications until the host has started
#[derive(Clone)]
pub struct StartupGate {
    notifier: Arc<dyn Notifier>,
    state: Arc<Mutex<GateState>>,
}

impl StartupGate {
    /// A closed gate; notifications wait for [`Self::mark_started`]
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self {
            notifier,
            state: Arc::new(Mutex::new(GateState {
                started: false,
                pending: Vec::new(),
            })),
        }
    }

    /// A gate that delivers right away
    pub fn open(notifier: Arc<dyn Notifier>) -> Self {
        let gate = Self::new(notifier);
        gate.mark_started();
        gate
    }

    pub fn notify(&self, notification: Notification) {
        let mut state = lock(&self.state);
        if state.started {
            self.notifier.notify(notification);
        } else {
            tracing::debug!("Holding back notification until startup completes");
            state.pending.push(notification);
        }
    }

    /// Open the gate and flush held notifications in order. Idempotent.
    pub fn mark_started(&self) {
        let mut state = lock(&self.state);
        if state.started {
            return;
        }
        state.started = true;
        for notification in std::mem::take(&mut state.pending) {
            self.notifier.notify(notification);
        }
    }

    pub fn is_started(&self) -> bool {
        lock(&self.state).started
    }

    /// Open the gate after `delay` if the host has not done so
    pub fn spawn_deadline(&self, delay: Duration) -> JoinHandle<()> {
        let gate = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if !gate.is_started() {
                tracing::debug!("Startup signal not received, releasing notifications");
                gate.mark_started();
            }
        })
    }
}

impl std::fmt::Debug for StartupGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StartupGate")
            .field("started", &self.is_started())
            .finish()
    }
}

/// Lock a mutex, recovering the data if a holder panicked
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
