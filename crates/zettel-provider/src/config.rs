//! Configuration for the citation provider
//!
//! The provider reads two host settings, the library path
//! (`export.cslLibrary`) and the UI language (`appLang`), plus the timing
//! constants for file watching and startup notifications.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;

/// Host setting holding the library path
pub const CSL_LIBRARY_KEY: &str = "export.cslLibrary";
/// Host setting holding the UI language
pub const APP_LANG_KEY: &str = "appLang";

const DEFAULT_SETTLE_DELAY_MS: u64 = 2000;
const DEFAULT_MAX_SETTLE_DELAY_MS: u64 = 10_000;
const DEFAULT_STARTUP_NOTIFICATION_DELAY_MS: u64 = 5000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// CSL-JSON or BibTeX library; unset or empty means no database
    pub csl_library: Option<PathBuf>,
    /// BCP-47 tag used to pick the citation locale
    pub app_lang: String,
    /// Directory with `locale-<bcp47>.xml` files
    pub locales_dir: Option<PathBuf>,
    /// Quiet period after a library change before reloading
    pub settle_delay_ms: u64,
    /// Longest a reload waits while the library keeps changing
    pub max_settle_delay_ms: u64,
    /// Upper bound on holding back notifications while the host starts
    pub startup_notification_delay_ms: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            csl_library: None,
            app_lang: "en-US".to_string(),
            locales_dir: None,
            settle_delay_ms: DEFAULT_SETTLE_DELAY_MS,
            max_settle_delay_ms: DEFAULT_MAX_SETTLE_DELAY_MS,
            startup_notification_delay_ms: DEFAULT_STARTUP_NOTIFICATION_DELAY_MS,
        }
    }
}

impl ProviderConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_library(mut self, path: impl Into<PathBuf>) -> Self {
        self.csl_library = Some(path.into());
        self
    }

    /// `~/.config/zettel/citeproc.toml` (or the platform equivalent)
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("zettel").join("citeproc.toml"))
    }

    /// Load configuration from a TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml_str).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load configuration from a JSON string
    pub fn from_json(json_str: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json_str).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Read a `.json` or `.toml` file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            Self::from_json(&contents)
        } else {
            Self::from_toml(&contents)
        }
    }

    /// The file at [`Self::default_path`], or defaults when there is none
    pub fn load_default() -> Result<Self, ConfigError> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::from_file(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.settle_delay_ms == 0 {
            return Err(ConfigError::OutOfRange(
                "settle_delay_ms must be positive".to_string(),
            ));
        }
        if self.max_settle_delay_ms < self.settle_delay_ms {
            return Err(ConfigError::OutOfRange(
                "max_settle_delay_ms must not be below settle_delay_ms".to_string(),
            ));
        }
        if self.app_lang.trim().is_empty() {
            return Err(ConfigError::MissingField("app_lang".to_string()));
        }
        Ok(())
    }

    /// The configured library, `None` when unset or blank
    pub fn library_path(&self) -> Option<PathBuf> {
        self.csl_library
            .as_ref()
            .filter(|p| !p.as_os_str().is_empty())
            .cloned()
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn max_settle_delay(&self) -> Duration {
        Duration::from_millis(self.max_settle_delay_ms)
    }

    pub fn startup_notification_delay(&self) -> Duration {
        Duration::from_millis(self.startup_notification_delay_ms)
    }
}

/// Configuration loading and validation error
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Cannot read {}: {message}", path.display())]
    Read { path: PathBuf, message: String },

    #[error("Invalid configuration: {0}")]
    Parse(String),

    /// Value is out of valid range
    #[error("Value out of range: {0}")]
    OutOfRange(String),

    /// Required field is missing
    #[error("Missing field: {0}")]
    MissingField(String),
}

/// Live configuration shared with the provider.
///
/// Subscribers are told about every change; the provider uses this to
/// notice a new library path.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    tx: Arc<watch::Sender<ProviderConfig>>,
}

impl ConfigStore {
    pub fn new(config: ProviderConfig) -> Self {
        let (tx, _rx) = watch::channel(config);
        Self { tx: Arc::new(tx) }
    }

    /// A host setting by its dotted name, as a string
    pub fn get(&self, key: &str) -> Option<String> {
        let config = self.tx.borrow();
        match key {
            CSL_LIBRARY_KEY => Some(
                config
                    .csl_library
                    .as_ref()
                    .map(|p| p.to_string_lossy().into_owned())
                    .unwrap_or_default(),
            ),
            APP_LANG_KEY => Some(config.app_lang.clone()),
            _ => None,
        }
    }

    pub fn snapshot(&self) -> ProviderConfig {
        self.tx.borrow().clone()
    }

    /// Apply `change`; subscribers are woken only if something changed
    pub fn update(&self, change: impl FnOnce(&mut ProviderConfig)) {
        self.tx.send_if_modified(|config| {
            let before = config.clone();
            change(config);
            *config != before
        });
    }

    pub fn set_library(&self, path: Option<PathBuf>) {
        self.update(|config| config.csl_library = path);
    }

    pub fn subscribe(&self) -> watch::Receiver<ProviderConfig> {
        self.tx.subscribe()
    }
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new(ProviderConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ProviderConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.settle_delay(), Duration::from_secs(2));
        assert_eq!(config.max_settle_delay(), Duration::from_secs(10));
        assert_eq!(config.startup_notification_delay(), Duration::from_secs(5));
        assert_eq!(config.library_path(), None);
    }

    #[test]
    fn test_toml_partial_override() {
        let config = ProviderConfig::from_toml(
            r#"
            csl_library = "/home/me/library.bib"
            app_lang = "de-DE"
            settle_delay_ms = 500
            "#,
        )
        .unwrap();
        assert_eq!(config.library_path(), Some(PathBuf::from("/home/me/library.bib")));
        assert_eq!(config.app_lang, "de-DE");
        assert_eq!(config.settle_delay_ms, 500);
        assert_eq!(config.startup_notification_delay_ms, 5000);
    }

    #[test]
    fn test_json_serialization() {
        let config = ProviderConfig::default().with_library("lib.json");
        let json = config.to_json().unwrap();
        assert_eq!(ProviderConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn test_from_file_picks_format_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let json_path = dir.path().join("citeproc.json");
        std::fs::write(&json_path, r#"{ "app_lang": "fr-FR" }"#).unwrap();
        assert_eq!(ProviderConfig::from_file(&json_path).unwrap().app_lang, "fr-FR");

        let toml_path = dir.path().join("citeproc.toml");
        std::fs::write(&toml_path, "app_lang = \"it-IT\"").unwrap();
        assert_eq!(ProviderConfig::from_file(&toml_path).unwrap().app_lang, "it-IT");

        assert!(matches!(
            ProviderConfig::from_file(&dir.path().join("missing.toml")),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn test_validation() {
        let mut config = ProviderConfig::default();
        config.settle_delay_ms = 0;
        assert!(matches!(config.validate(), Err(ConfigError::OutOfRange(_))));

        let mut config = ProviderConfig::default();
        config.max_settle_delay_ms = config.settle_delay_ms - 1;
        assert!(matches!(config.validate(), Err(ConfigError::OutOfRange(_))));

        let mut config = ProviderConfig::default();
        config.app_lang = " ".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::MissingField(_))));
    }

    #[test]
    fn test_empty_library_path_is_unset() {
        let config = ProviderConfig::default().with_library("");
        assert_eq!(config.library_path(), None);
    }

    #[tokio::test]
    async fn test_store_notifies_only_on_change() {
        let store = ConfigStore::default();
        let mut rx = store.subscribe();
        assert_eq!(store.get(CSL_LIBRARY_KEY).as_deref(), Some(""));
        assert_eq!(store.get(APP_LANG_KEY).as_deref(), Some("en-US"));
        assert_eq!(store.get("unknown"), None);

        store.set_library(None);
        assert!(!rx.has_changed().unwrap());

        store.set_library(Some(PathBuf::from("/tmp/lib.bib")));
        assert!(rx.has_changed().unwrap());
        rx.borrow_and_update();
        assert_eq!(store.get(CSL_LIBRARY_KEY).as_deref(), Some("/tmp/lib.bib"));
    }
}
