//! Error types for the citation provider

use thiserror::Error;
use zettel_citeproc::EngineError;

use crate::config::ConfigError;

/// Result type alias for provider operations
pub type Result<T> = std::result::Result<T, ProviderError>;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Neither CSL-JSON nor BibTeX could be read from the library
    #[error("Library is neither CSL-JSON ({json}) nor BibTeX ({bibtex})")]
    UnrecognizedFormat { json: String, bibtex: String },

    #[error("Citation engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("File watcher error: {0}")]
    Watch(#[from] notify::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Library build task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Errors from the editor-facing citation micro-syntax
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CitationSyntaxError {
    #[error("Empty citation")]
    Empty,

    #[error("Not a citation: {0:?}")]
    NotACitation(String),

    #[error("Citation part has no @key: {0:?}")]
    MissingKey(String),

    #[error("Unexpected text after citation: {0:?}")]
    TrailingText(String),
}
