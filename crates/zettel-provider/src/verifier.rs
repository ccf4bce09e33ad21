//! Integrity check of a freshly built engine
//!
//! Every indexed key is rendered on its own. Keys that fail are removed
//! from the index, while their records stay in the item table. The
//! successful renderings double as the previews shown in autocomplete.

use std::collections::HashMap;

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use zettel_citeproc::{CitationItem, CslItem, Processor};

use crate::loader::KeyIndex;
use crate::notification::Notification;

lazy_static! {
    static ref TAG: Regex = Regex::new(r"<[^>]*>").unwrap();
}

/// Autocomplete entry for one citable key
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IdHint {
    pub id: String,
    pub display_text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovedItem {
    pub key: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntegrityReport {
    pub removed: Vec<RemovedItem>,
}

impl IntegrityReport {
    pub fn is_clean(&self) -> bool {
        self.removed.is_empty()
    }

    pub fn count(&self) -> usize {
        self.removed.len()
    }

    pub fn title(&self) -> String {
        format!(
            "{} citation library entries could not be rendered and were removed",
            self.count()
        )
    }

    /// One `key: error` line per removed item
    pub fn details(&self) -> String {
        self.removed
            .iter()
            .map(|r| format!("{}: {}", r.key, r.error))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn to_notification(&self) -> Notification {
        Notification::IntegrityReport {
            count: self.count(),
            title: self.title(),
            details: self.details(),
        }
    }
}

/// Probe every indexed key, dropping the ones the engine cannot render
pub fn verify(
    engine: &Processor,
    items: &HashMap<String, CslItem>,
    index: &mut KeyIndex,
) -> (IntegrityReport, Vec<IdHint>) {
    let keys: Vec<String> = index.iter().map(str::to_string).collect();
    let mut report = IntegrityReport::default();
    let mut hints = Vec::with_capacity(keys.len());

    for key in keys {
        match engine.make_citation_cluster(&[CitationItem::new(key.as_str())]) {
            Ok(html) => {
                let preview = plain_text(&html);
                let display_text = match items.get(&key).and_then(CslItem::title) {
                    Some(title) => format!("{} {}", preview, title),
                    None => preview,
                };
                hints.push(IdHint {
                    id: key,
                    display_text,
                });
            }
            Err(e) => {
                tracing::warn!(key = %key, "Removing item that cannot be rendered: {}", e);
                index.remove(&key);
                report.removed.push(RemovedItem {
                    key,
                    error: e.to_string(),
                });
            }
        }
    }

    if !report.is_clean() {
        tracing::warn!(removed = report.count(), "Integrity check removed items");
    }
    (report, hints)
}

/// Strip markup and entities from rendered HTML
fn plain_text(html: &str) -> String {
    TAG.replace_all(html, "")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}
