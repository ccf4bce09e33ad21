//! The citation provider service
//!
//! [`CiteprocProvider`] owns the item table, the key index and the one
//! citation engine instance. Loading and reloading run asynchronously;
//! queries are synchronous and answer from whatever is in memory, reporting
//! the engine state instead of waiting when the engine is not ready.
//!
//! All engine access goes through one mutex. A generation counter is bumped
//! on every unload, so a load that was overtaken by an unload or a newer
//! load drops its results instead of overwriting fresher state.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use zettel_bibtex::AttachmentIndex;
use zettel_citeproc::{Bibliography, CitationItem, CslItem, EngineSystem, Processor, Style};

use crate::citation_syntax::parse_citation;
use crate::cite_key::is_valid_cite_key;
use crate::config::{ConfigStore, ProviderConfig};
use crate::error::{ProviderError, Result};
use crate::ipc::{IdsPayload, NullRenderer, RendererChannel, RendererMessage};
use crate::loader::{parse_library, KeyIndex};
use crate::notification::{lock, Notification, StartupGate};
use crate::sanitize::CitationInput;
use crate::state::EngineState;
use crate::verifier::{verify, IdHint};
use crate::watcher::{LibraryWatcher, ReloadRequest};

/// Answer of a query that needs a ready engine
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QueryOutcome<T> {
    Ready(T),
    /// The engine is not ready; carries the state it is in
    Unavailable(EngineState),
}

impl<T> QueryOutcome<T> {
    pub fn ready(self) -> Option<T> {
        match self {
            Self::Ready(value) => Some(value),
            Self::Unavailable(_) => None,
        }
    }
}

/// Item and locale lookups handed to the engine
struct LibrarySystem {
    items: Arc<HashMap<String, CslItem>>,
    locales_dir: Option<PathBuf>,
}

impl EngineSystem for LibrarySystem {
    fn retrieve_item(&self, id: &str) -> Option<CslItem> {
        self.items.get(id).cloned()
    }

    fn retrieve_locale(&self, lang: &str) -> Option<String> {
        let lang = if lang == "us" { "en-US" } else { lang };
        let path = self.locales_dir.as_ref()?.join(format!("locale-{}.xml", lang));
        match std::fs::read_to_string(&path) {
            Ok(xml) => Some(xml),
            Err(e) => {
                debug!(path = %path.display(), "Locale not available: {}", e);
                None
            }
        }
    }
}

#[derive(Default)]
struct Inner {
    state: EngineState,
    /// Every parsed record, including ones the verifier removed from the index
    items: Arc<HashMap<String, CslItem>>,
    index: KeyIndex,
    engine: Option<Processor>,
    attachments: Option<AttachmentIndex>,
    id_hints: Vec<IdHint>,
}

/// Result of one successful pass through parse, engine construction and
/// verification
struct Built {
    items: Arc<HashMap<String, CslItem>>,
    index: KeyIndex,
    engine: Processor,
    attachments: Option<AttachmentIndex>,
    id_hints: Vec<IdHint>,
}

struct Shared {
    config: ConfigStore,
    notifications: StartupGate,
    renderer: Arc<dyn RendererChannel>,
    generation: AtomicU64,
    parses: AtomicU64,
    inner: Mutex<Inner>,
    watcher: Mutex<Option<LibraryWatcher>>,
    reload_tx: mpsc::UnboundedSender<ReloadRequest>,
    reload_rx: Mutex<Option<mpsc::UnboundedReceiver<ReloadRequest>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// Handle to the citation provider. Clones share the same instance.
#[derive(Clone)]
pub struct CiteprocProvider {
    shared: Arc<Shared>,
}

impl CiteprocProvider {
    pub fn new(
        config: ConfigStore,
        notifications: StartupGate,
        renderer: Arc<dyn RendererChannel>,
    ) -> Self {
        let (reload_tx, reload_rx) = mpsc::unbounded_channel();
        Self {
            shared: Arc::new(Shared {
                config,
                notifications,
                renderer,
                generation: AtomicU64::new(0),
                parses: AtomicU64::new(0),
                inner: Mutex::new(Inner::default()),
                watcher: Mutex::new(None),
                reload_tx,
                reload_rx: Mutex::new(Some(reload_rx)),
                tasks: Mutex::new(Vec::new()),
            }),
        }
    }

    /// A provider without a renderer attached
    pub fn with_config(config: ConfigStore, notifications: StartupGate) -> Self {
        Self::new(config, notifications, Arc::new(NullRenderer))
    }

    pub fn config(&self) -> &ConfigStore {
        &self.shared.config
    }

    pub fn renderer(&self) -> &Arc<dyn RendererChannel> {
        &self.shared.renderer
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Start the hot-reload controller and the startup-notification
    /// deadline. Calling it again has no effect.
    pub fn start(&self) {
        let Some(mut reload_rx) = lock(&self.shared.reload_rx).take() else {
            debug!("Reload controller already running");
            return;
        };

        let mut config_rx = self.shared.config.subscribe();
        let mut library = config_rx.borrow_and_update().library_path();
        let delay = self.shared.config.snapshot().startup_notification_delay();

        let provider = self.clone();
        let controller = tokio::spawn(async move {
            loop {
                tokio::select! {
                    request = reload_rx.recv() => {
                        let Some(request) = request else { break };
                        provider.notify(Notification::Reloading { path: request.path });
                        provider.reload().await;
                    }
                    changed = config_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let current = config_rx.borrow_and_update().library_path();
                        if current != library {
                            info!("Citation library setting changed");
                            library = current;
                            provider.reload().await;
                        }
                    }
                }
            }
        });

        let deadline = self.shared.notifications.spawn_deadline(delay);
        lock(&self.shared.tasks).extend([controller, deadline]);
    }

    /// The host finished starting; deliver held notifications
    pub fn mark_started(&self) {
        self.shared.notifications.mark_started();
    }

    /// Stop background tasks and unload
    pub fn shutdown(&self) {
        for task in lock(&self.shared.tasks).drain(..) {
            task.abort();
        }
        self.unload();
    }

    /// Read, parse and verify the configured library
    pub async fn load(&self) {
        let generation = self.shared.generation.load(Ordering::SeqCst);
        let config = self.shared.config.snapshot();

        let Some(path) = config.library_path() else {
            info!("No citation library configured");
            self.set_state(generation, EngineState::NoDb);
            return;
        };

        self.set_state(generation, EngineState::Booting);
        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) => {
                warn!(path = %path.display(), "Cannot read citation library: {}", e);
                self.set_state(generation, EngineState::NoDb);
                return;
            }
        };

        if !self.is_current(generation) {
            debug!(path = %path.display(), "Discarding superseded library read");
            return;
        }
        self.watch(generation, &path, &config);

        self.shared.parses.fetch_add(1, Ordering::SeqCst);
        let built = tokio::task::spawn_blocking({
            let provider = self.clone();
            let path = path.clone();
            move || provider.build(&contents, &path, &config)
        })
        .await
        .map_err(ProviderError::from)
        .and_then(|built| built);
        match built {
            Ok(built) => self.commit(generation, built),
            Err(e) => {
                error!(path = %path.display(), "Citation engine not available: {}", e);
                if matches!(e, ProviderError::UnrecognizedFormat { .. }) {
                    self.notify(Notification::LibraryParseError {
                        path: path.clone(),
                        message: e.to_string(),
                    });
                }
                self.set_state(generation, EngineState::Error);
            }
        }
    }

    /// Drop the engine, the items and the watcher. Always legal.
    pub fn unload(&self) {
        {
            let mut inner = lock(&self.shared.inner);
            self.shared.generation.fetch_add(1, Ordering::SeqCst);
            *inner = Inner::default();
        }
        if lock(&self.shared.watcher).take().is_some() {
            info!("Citation library unloaded");
        }
    }

    pub async fn reload(&self) {
        self.unload();
        self.load().await;
    }

    fn is_current(&self, generation: u64) -> bool {
        self.shared.generation.load(Ordering::SeqCst) == generation
    }

    fn set_state(&self, generation: u64, state: EngineState) {
        let mut inner = lock(&self.shared.inner);
        if self.is_current(generation) {
            debug!(state = %state, "Citation engine state");
            inner.state = state;
        }
    }

    fn notify(&self, notification: Notification) {
        self.shared.notifications.notify(notification);
    }

    /// Make sure the watcher points at `path`
    fn watch(&self, generation: u64, path: &Path, config: &ProviderConfig) {
        let mut watcher = lock(&self.shared.watcher);
        if !self.is_current(generation) {
            return;
        }
        if watcher.as_ref().is_some_and(|w| w.path() == path) {
            return;
        }
        match LibraryWatcher::new(
            path,
            config.settle_delay(),
            config.max_settle_delay(),
            self.shared.reload_tx.clone(),
        ) {
            Ok(w) => *watcher = Some(w),
            Err(e) => warn!(path = %path.display(), "Cannot watch citation library: {}", e),
        }
    }

    fn build(&self, contents: &str, path: &Path, config: &ProviderConfig) -> Result<Built> {
        let mut library = parse_library(contents, path)?;
        if !library.malformed_keys.is_empty() {
            self.notify(Notification::MalformedKeys {
                keys: std::mem::take(&mut library.malformed_keys),
            });
        }

        let items = Arc::new(std::mem::take(&mut library.items));
        let system = LibrarySystem {
            items: items.clone(),
            locales_dir: config.locales_dir.clone(),
        };
        let mut engine = Processor::new(system, Style::preview_xml(), &config.app_lang)?;
        engine.enable_link_wrapping();

        let (report, id_hints) = verify(&engine, &items, &mut library.index);
        if !report.is_clean() {
            self.notify(report.to_notification());
        }

        Ok(Built {
            items,
            index: library.index,
            engine,
            attachments: library.attachments,
            id_hints,
        })
    }

    fn commit(&self, generation: u64, built: Built) {
        let payload = {
            let mut inner = lock(&self.shared.inner);
            if !self.is_current(generation) {
                debug!("Discarding superseded citation engine");
                return;
            }
            info!(
                items = built.items.len(),
                citable = built.index.len(),
                "Citation engine ready"
            );
            *inner = Inner {
                state: EngineState::Ready,
                items: built.items,
                index: built.index,
                engine: Some(built.engine),
                attachments: built.attachments,
                id_hints: built.id_hints,
            };
            IdsPayload {
                ids: inner.id_hints.clone(),
                status: inner.state,
            }
        };
        self.shared.renderer.send(RendererMessage::CiteprocIds(payload));
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn state(&self) -> EngineState {
        lock(&self.shared.inner).state
    }

    pub fn is_ready(&self) -> bool {
        self.state() == EngineState::Ready
    }

    pub fn has_error(&self) -> bool {
        self.state() == EngineState::Error
    }

    pub fn has_no_db(&self) -> bool {
        self.state() == EngineState::NoDb
    }

    /// Render a citation written in the editor micro-syntax
    pub fn get_citation(&self, raw: &str) -> Option<String> {
        let inner = lock(&self.shared.inner);
        if inner.state != EngineState::Ready {
            return None;
        }
        let engine = inner.engine.as_ref()?;

        let parsed = match parse_citation(raw) {
            Ok(parsed) => parsed,
            Err(e) => {
                debug!(citation = raw, "Cannot parse citation: {}", e);
                return None;
            }
        };

        let input = CitationInput::Items(parsed.items).sanitize(|key| inner.index.contains(key));
        if input.is_empty() {
            return None;
        }
        let items = input.into_items();

        let rendered = if parsed.in_text {
            render_in_text(engine, &items)
        } else {
            engine.make_citation_cluster(&items)
        };
        match rendered {
            Ok(html) => Some(html),
            Err(e) => {
                warn!(citation = raw, "Cannot render citation: {}", e);
                None
            }
        }
    }

    /// Replace the engine registry with the known keys among `keys`
    pub fn update_items(&self, keys: &[String]) -> QueryOutcome<bool> {
        let mut guard = lock(&self.shared.inner);
        let inner = &mut *guard;
        if inner.state != EngineState::Ready {
            return QueryOutcome::Unavailable(inner.state);
        }

        let valid = keys
            .iter()
            .filter(|key| is_valid_cite_key(key))
            .cloned()
            .collect();
        let index = &inner.index;
        let ids = CitationInput::Ids(valid).sanitize(|key| index.contains(key)).ids();

        let Some(engine) = inner.engine.as_mut() else {
            return QueryOutcome::Ready(false);
        };
        match engine.update_items(&ids) {
            Ok(()) => QueryOutcome::Ready(true),
            Err(e) => {
                warn!("Cannot update citation registry: {}", e);
                QueryOutcome::Ready(false)
            }
        }
    }

    /// Bibliography of the registry. `Ready(None)` when there is nothing to
    /// render or the engine failed to format it.
    pub fn make_bibliography(&self) -> QueryOutcome<Option<Bibliography>> {
        let inner = lock(&self.shared.inner);
        if inner.state != EngineState::Ready {
            return QueryOutcome::Unavailable(inner.state);
        }
        let Some(engine) = inner.engine.as_ref() else {
            return QueryOutcome::Ready(None);
        };
        match engine.make_bibliography() {
            Ok(bibliography) => QueryOutcome::Ready(bibliography),
            Err(e) => {
                warn!("Cannot render bibliography: {}", e);
                QueryOutcome::Ready(None)
            }
        }
    }

    /// Autocomplete hints for every citable key
    pub fn get_ids(&self) -> IdsPayload {
        let inner = lock(&self.shared.inner);
        IdsPayload {
            ids: inner.id_hints.clone(),
            status: inner.state,
        }
    }

    pub fn has_attachments(&self) -> bool {
        lock(&self.shared.inner)
            .attachments
            .as_ref()
            .is_some_and(|a| !a.is_empty())
    }

    pub fn get_attachments(&self, key: &str) -> Option<Vec<String>> {
        let inner = lock(&self.shared.inner);
        inner.attachments.as_ref()?.get(key).map(<[String]>::to_vec)
    }

    /// A parsed record, whether or not it is citable
    pub fn raw_item(&self, key: &str) -> Option<CslItem> {
        lock(&self.shared.inner).items.get(key).cloned()
    }

    /// Whether `key` is reachable by queries
    pub fn is_indexed(&self, key: &str) -> bool {
        lock(&self.shared.inner).index.contains(key)
    }

    /// Number of parsed records
    pub fn item_count(&self) -> usize {
        lock(&self.shared.inner).items.len()
    }

    /// How many times a library was handed to the parser
    pub fn parse_count(&self) -> u64 {
        self.shared.parses.load(Ordering::SeqCst)
    }

    pub fn watched_path(&self) -> Option<PathBuf> {
        lock(&self.shared.watcher)
            .as_ref()
            .map(|w| w.path().to_path_buf())
    }
}

impl std::fmt::Debug for CiteprocProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CiteprocProvider")
            .field("state", &self.state())
            .field("items", &self.item_count())
            .finish()
    }
}

/// `Author (year)` for a citation written in running text
fn render_in_text(engine: &Processor, items: &[CitationItem]) -> zettel_citeproc::Result<String> {
    let authors: Vec<CitationItem> = items
        .iter()
        .map(|item| CitationItem {
            author_only: true,
            locator: None,
            label: None,
            prefix: None,
            suffix: None,
            ..item.clone()
        })
        .collect();
    let rest: Vec<CitationItem> = items
        .iter()
        .map(|item| CitationItem {
            suppress_author: true,
            ..item.clone()
        })
        .collect();
    Ok(format!(
        "{} {}",
        engine.make_citation_cluster(&authors)?,
        engine.make_citation_cluster(&rest)?
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::LogNotifier;

    fn provider(config: ProviderConfig) -> CiteprocProvider {
        CiteprocProvider::with_config(
            ConfigStore::new(config),
            StartupGate::open(Arc::new(LogNotifier)),
        )
    }

    #[tokio::test]
    async fn test_queries_report_state_before_ready() {
        let provider = provider(ProviderConfig::default());
        assert_eq!(provider.state(), EngineState::NotLoaded);
        assert_eq!(provider.get_citation("[@smith2020]"), None);
        assert_eq!(
            provider.update_items(&["smith2020".into()]),
            QueryOutcome::Unavailable(EngineState::NotLoaded)
        );
        assert_eq!(
            provider.make_bibliography(),
            QueryOutcome::Unavailable(EngineState::NotLoaded)
        );
    }

    #[test]
    fn test_superseded_completion_is_ignored() {
        let provider = provider(ProviderConfig::default());
        let generation = provider.shared.generation.load(Ordering::SeqCst);
        provider.set_state(generation, EngineState::Booting);
        assert_eq!(provider.state(), EngineState::Booting);

        provider.unload();
        provider.set_state(generation, EngineState::Error);
        assert_eq!(provider.state(), EngineState::NotLoaded);
        assert!(!provider.is_current(generation));
    }

    #[test]
    fn test_locale_lookup_maps_us() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("locale-en-US.xml"), "<locale/>").unwrap();
        let system = LibrarySystem {
            items: Arc::default(),
            locales_dir: Some(dir.path().to_path_buf()),
        };
        assert_eq!(system.retrieve_locale("us").as_deref(), Some("<locale/>"));
        assert_eq!(system.retrieve_locale("fr-FR"), None);
    }
}
