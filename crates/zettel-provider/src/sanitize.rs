//! Filtering citation input down to known items
//!
//! Callers hand over citations in one of three shapes: bare ids, citation
//! items, or a whole cluster. Sanitizing keeps the shape and drops every
//! entry whose id is not in the item index.

use serde::Deserialize;
use zettel_citeproc::{Citation, CitationItem};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum CitationInput {
    Ids(Vec<String>),
    Items(Vec<CitationItem>),
    Cluster(Citation),
}

impl CitationInput {
    /// Drop entries for which `is_known` is false
    pub fn sanitize(self, is_known: impl Fn(&str) -> bool) -> Self {
        match self {
            Self::Ids(ids) => Self::Ids(ids.into_iter().filter(|id| is_known(id.as_str())).collect()),
            Self::Items(items) => {
                Self::Items(items.into_iter().filter(|i| is_known(i.id.as_str())).collect())
            }
            Self::Cluster(mut citation) => {
                citation.citation_items.retain(|i| is_known(i.id.as_str()));
                Self::Cluster(citation)
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Ids(ids) => ids.is_empty(),
            Self::Items(items) => items.is_empty(),
            Self::Cluster(citation) => citation.citation_items.is_empty(),
        }
    }

    pub fn ids(&self) -> Vec<String> {
        match self {
            Self::Ids(ids) => ids.clone(),
            Self::Items(items) => items.iter().map(|i| i.id.clone()).collect(),
            Self::Cluster(citation) => citation.citation_items.iter().map(|i| i.id.clone()).collect(),
        }
    }

    pub fn into_items(self) -> Vec<CitationItem> {
        match self {
            Self::Ids(ids) => ids.into_iter().map(CitationItem::new).collect(),
            Self::Items(items) => items,
            Self::Cluster(citation) => citation.citation_items,
        }
    }
}
