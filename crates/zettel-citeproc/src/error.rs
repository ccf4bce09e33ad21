//! Error types for the citation processor

use thiserror::Error;

/// Result type alias for processor operations
pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// The item callback had nothing for this id
    #[error("Item not found: {0}")]
    ItemNotFound(String),

    /// A record that is not a CSL-JSON object with an id
    #[error("Invalid item: {0}")]
    InvalidItem(String),

    /// A variable whose shape the processor cannot render
    #[error("Invalid `{field}` in item {id}: {reason}")]
    InvalidField {
        id: String,
        field: String,
        reason: String,
    },

    #[error("Style error: {0}")]
    Style(String),

    #[error("Locale error: {0}")]
    Locale(String),

    #[error("Citation cluster has no items")]
    EmptyCluster,
}

impl EngineError {
    pub(crate) fn invalid_field(
        id: impl Into<String>,
        field: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidField {
            id: id.into(),
            field: field.into(),
            reason: reason.into(),
        }
    }
}
