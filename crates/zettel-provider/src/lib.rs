//! # zettel-provider
//!
//! The citation provider behind the editor: it loads a CSL-JSON or BibTeX
//! library, drops entries the engine cannot render, keeps a citation engine
//! ready for queries and reloads everything when the library file changes.
//!
//! ## Architecture
//!
//! - [`loader`]: library parsing, format detection and the key index
//! - [`verifier`]: per-item rendering probe and autocomplete hints
//! - [`service`]: [`CiteprocProvider`], lifecycle and queries
//! - [`watcher`]: debounced file watching
//! - [`ipc`]: request routing and renderer pushes
//! - [`notification`]: user-facing notices and the startup gate
//!
//! ## Example
//!
//! ```ignore
//! let config = ConfigStore::new(ProviderConfig::new().with_library("refs.bib"));
//! let provider = CiteprocProvider::with_config(config, StartupGate::open(Arc::new(LogNotifier)));
//! provider.load().await;
//! let html = provider.get_citation("[@smith2020, p. 12]");
//! ```

pub mod citation_syntax;
pub mod cite_key;
pub mod config;
pub mod error;
pub mod ipc;
pub mod loader;
pub mod notification;
pub mod sanitize;
pub mod service;
pub mod state;
pub mod verifier;
pub mod watcher;

pub use citation_syntax::{parse_citation, ParsedCitation};
pub use cite_key::is_valid_cite_key;
pub use config::{ConfigError, ConfigStore, ProviderConfig, APP_LANG_KEY, CSL_LIBRARY_KEY};
pub use error::{CitationSyntaxError, ProviderError, Result};
pub use ipc::{
    handle_line, handle_request, BibliographyContent, IdsPayload, JsonLinesRenderer, NullRenderer,
    RendererChannel, RendererMessage, Request, Response,
};
pub use loader::{parse_library, KeyIndex, LibraryFormat, LoadedLibrary};
pub use notification::{LogNotifier, Notification, Notifier, StartupGate};
pub use sanitize::CitationInput;
pub use service::{CiteprocProvider, QueryOutcome};
pub use state::EngineState;
pub use verifier::{verify, IdHint, IntegrityReport, RemovedItem};
pub use watcher::{LibraryWatcher, ReloadRequest};
