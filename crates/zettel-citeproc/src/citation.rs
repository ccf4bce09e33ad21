//! Citation items and clusters in citeproc's JSON shape

use serde::{Deserialize, Serialize};

/// One cited work inside a cluster
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CitationItem {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suffix: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub suppress_author: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub author_only: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl CitationItem {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn with_locator(mut self, label: impl Into<String>, locator: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self.locator = Some(locator.into());
        self
    }
}

/// A pre-built citation cluster
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Citation {
    pub citation_items: Vec<CitationItem>,
    #[serde(default)]
    pub properties: CitationProperties,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CitationProperties {
    #[serde(default)]
    pub note_index: u32,
}

impl Citation {
    pub fn new(citation_items: Vec<CitationItem>) -> Self {
        Self {
            citation_items,
            properties: CitationProperties::default(),
        }
    }
}
