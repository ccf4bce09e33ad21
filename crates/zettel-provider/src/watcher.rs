//! Watching the library file for external changes
//!
//! The parent directory is watched (editors and reference managers often
//! replace the file rather than write it in place) and events are filtered
//! to the library's file name. Bursts of events are collapsed: a reload is
//! requested once no further event arrived for the settle delay, or once the
//! burst has lasted the maximum settle delay.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::Result;

/// Sent when the library settled after a change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReloadRequest {
    pub path: PathBuf,
}

/// Watches one library file. Dropping it stops the watch.
pub struct LibraryWatcher {
    path: PathBuf,
    _watcher: RecommendedWatcher,
    debounce_task: JoinHandle<()>,
}

impl LibraryWatcher {
    /// Start watching `path`. Must be called within a tokio runtime.
    ///
    /// No event is produced for the file already existing; only later
    /// changes lead to a [`ReloadRequest`] on `reload_tx`.
    pub fn new(
        path: &Path,
        settle_delay: Duration,
        max_settle_delay: Duration,
        reload_tx: mpsc::UnboundedSender<ReloadRequest>,
    ) -> Result<Self> {
        let path = path.to_path_buf();
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let file_name = path.file_name().map(OsStr::to_os_string);

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let mut watcher =
            notify::recommended_watcher(move |res: notify::Result<notify::Event>| match res {
                Ok(event) => {
                    if event.kind.is_access() {
                        return;
                    }
                    if event
                        .paths
                        .iter()
                        .any(|p| is_library_event(p, file_name.as_deref()))
                    {
                        debug!(kind = ?event.kind, "Library changed on disk");
                        let _ = event_tx.send(());
                    }
                }
                Err(e) => warn!(error = %e, "Library watch error"),
            })?;
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        let request_path = path.clone();
        let debounce_task = tokio::spawn(debounce(event_rx, settle_delay, max_settle_delay, move || {
            let _ = reload_tx.send(ReloadRequest {
                path: request_path.clone(),
            });
        }));

        info!(
            path = %path.display(),
            settle_ms = settle_delay.as_millis() as u64,
            max_settle_ms = max_settle_delay.as_millis() as u64,
            "Watching citation library"
        );

        Ok(Self {
            path,
            _watcher: watcher,
            debounce_task,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LibraryWatcher {
    fn drop(&mut self) {
        self.debounce_task.abort();
        debug!(path = %self.path.display(), "Stopped watching citation library");
    }
}

impl std::fmt::Debug for LibraryWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LibraryWatcher")
            .field("path", &self.path)
            .finish()
    }
}

/// Events for the library itself; dotfiles (editor swap files, lock
/// files) never count
fn is_library_event(path: &Path, library_name: Option<&OsStr>) -> bool {
    let Some(name) = path.file_name() else {
        return false;
    };
    if name.to_string_lossy().starts_with('.') {
        return false;
    }
    Some(name) == library_name
}

/// Call `fire` once per burst of events, after `settle` without events or
/// at the latest `max_wait` after the burst started
pub(crate) async fn debounce(
    mut events: mpsc::UnboundedReceiver<()>,
    settle: Duration,
    max_wait: Duration,
    mut fire: impl FnMut(),
) {
    while events.recv().await.is_some() {
        let deadline = Instant::now() + max_wait;
        loop {
            let quiet_until = (Instant::now() + settle).min(deadline);
            match tokio::time::timeout_at(quiet_until, events.recv()).await {
                Ok(Some(())) => continue,
                Ok(None) => return,
                Err(_) => break,
            }
        }
        fire();
    }
}
