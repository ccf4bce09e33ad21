//! Reading a citation library into an item table
//!
//! Libraries are tried as CSL-JSON first and as BibTeX second. BibTeX
//! libraries are converted to CSL-JSON and also yield an attachment index.
//! Records whose id is not a valid cite key are left out and reported.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde_json::Value;
use zettel_bibtex::{entries_to_csl, extract_attachments, AttachmentIndex};
use zettel_citeproc::CslItem;

use crate::cite_key::is_valid_cite_key;
use crate::error::{ProviderError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LibraryFormat {
    CslJson,
    BibTeX,
}

/// Ordered set of the keys that queries may reach
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyIndex {
    order: Vec<String>,
    present: HashSet<String>,
}

impl KeyIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the key was already indexed
    pub fn insert(&mut self, key: impl Into<String>) -> bool {
        let key = key.into();
        if self.present.contains(&key) {
            return false;
        }
        self.present.insert(key.clone());
        self.order.push(key);
        true
    }

    pub fn remove(&mut self, key: &str) -> bool {
        if self.present.remove(key) {
            self.order.retain(|k| k != key);
            true
        } else {
            false
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.present.contains(key)
    }

    /// Keys in library order
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.present.clear();
    }
}

/// A parsed library before verification
#[derive(Debug, Clone)]
pub struct LoadedLibrary {
    pub format: LibraryFormat,
    /// Every record with a valid key
    pub items: HashMap<String, CslItem>,
    pub index: KeyIndex,
    /// Present for BibTeX libraries only
    pub attachments: Option<AttachmentIndex>,
    /// Ids rejected by the cite key grammar, in file order
    pub malformed_keys: Vec<String>,
}

/// Parse library contents read from `path`
pub fn parse_library(contents: &str, path: &Path) -> Result<LoadedLibrary> {
    let (format, records, attachments) = match parse_csl_json(contents) {
        Ok(records) => (LibraryFormat::CslJson, records, None),
        Err(json_error) => {
            tracing::debug!(path = %path.display(), "Not CSL-JSON ({}), trying BibTeX", json_error);
            let result = zettel_bibtex::parse(contents).map_err(|bibtex_error| {
                ProviderError::UnrecognizedFormat {
                    json: json_error,
                    bibtex: bibtex_error.to_string(),
                }
            })?;
            for error in &result.errors {
                tracing::warn!(
                    path = %path.display(),
                    line = error.line,
                    "Skipped BibTeX entry: {}",
                    error.message
                );
            }
            let attachments = extract_attachments(&result.entries, path.parent());
            (
                LibraryFormat::BibTeX,
                entries_to_csl(&result.entries),
                Some(attachments),
            )
        }
    };

    let mut items = HashMap::with_capacity(records.len());
    let mut index = KeyIndex::new();
    let mut malformed_keys = Vec::new();

    for record in records {
        let item = match CslItem::from_value(record) {
            Ok(item) => item,
            Err(e) => {
                tracing::warn!(path = %path.display(), "Skipping library record: {}", e);
                continue;
            }
        };

        if !is_valid_cite_key(&item.id) {
            tracing::warn!(path = %path.display(), key = %item.id, "Malformed cite key");
            malformed_keys.push(item.id);
            continue;
        }

        if !index.insert(item.id.clone()) {
            tracing::warn!(key = %item.id, "Duplicate cite key, the later record wins");
        }
        items.insert(item.id.clone(), item);
    }

    tracing::info!(
        path = %path.display(),
        format = ?format,
        items = items.len(),
        "Parsed citation library"
    );

    Ok(LoadedLibrary {
        format,
        items,
        index,
        attachments,
        malformed_keys,
    })
}

/// A CSL-JSON library is a top-level array of records
fn parse_csl_json(contents: &str) -> std::result::Result<Vec<Value>, String> {
    match serde_json::from_str::<Value>(contents) {
        Ok(Value::Array(records)) => Ok(records),
        Ok(other) => Err(format!("expected an array of items, got {}", json_kind(&other))),
        Err(e) => Err(e.to_string()),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(contents: &str) -> Result<LoadedLibrary> {
        parse_library(contents, Path::new("/nonexistent/library"))
    }

    #[test]
    fn test_csl_json_library() {
        let library = parse(
            r#"[
                {"id": "smith2020", "title": "A Title"},
                {"id": "bad key", "title": "Spaces"},
                {"title": "No id"},
                {"id": "smith2020", "title": "Replacement"}
            ]"#,
        )
        .unwrap();

        assert_eq!(library.format, LibraryFormat::CslJson);
        assert_eq!(library.index.iter().collect::<Vec<_>>(), vec!["smith2020"]);
        assert_eq!(library.items["smith2020"].title(), Some("Replacement"));
        assert_eq!(library.malformed_keys, vec!["bad key".to_string()]);
        assert!(library.attachments.is_none());
    }

    #[test]
    fn test_bibtex_fallback() {
        let library = parse(
            "@article{lee2021, title = {Ownership}, file = {:lee.pdf:PDF}}\n\
             @book{kim2019, title = {Borrowing}}",
        )
        .unwrap();

        assert_eq!(library.format, LibraryFormat::BibTeX);
        assert_eq!(library.index.len(), 2);
        assert_eq!(library.items["kim2019"].item_type(), "book");
        let attachments = library.attachments.unwrap();
        assert_eq!(attachments.get("lee2021").unwrap(), &["lee.pdf"]);
        assert_eq!(attachments.get("kim2019"), None);
    }

    #[test]
    fn test_unrecognized_libraries() {
        for contents in ["", "{\"id\": \"x\"}", "just some notes"] {
            assert!(matches!(
                parse(contents),
                Err(ProviderError::UnrecognizedFormat { .. })
            ));
        }
    }

    #[test]
    fn test_uncitable_ids_are_malformed() {
        let library = parse(
            r#"[
                {"id": "smith2020-", "title": "Trailing dash"},
                {"id": "٣abc", "title": "Arabic-Indic digit"},
                {"id": "smith2020", "title": "Fine"}
            ]"#,
        )
        .unwrap();

        assert_eq!(library.index.iter().collect::<Vec<_>>(), vec!["smith2020"]);
        assert_eq!(
            library.malformed_keys,
            vec!["smith2020-".to_string(), "\u{663}abc".to_string()]
        );
    }

    #[test]
    fn test_key_index() {
        let mut index = KeyIndex::new();
        assert!(index.insert("a"));
        assert!(index.insert("b"));
        assert!(!index.insert("a"));
        assert!(index.remove("a"));
        assert!(!index.remove("a"));
        assert!(!index.contains("a"));
        assert_eq!(index.iter().collect::<Vec<_>>(), vec!["b"]);
    }
}
