//! Request routing between the editor front-end and the provider
//!
//! Requests arrive as `{"command": ..., "content": ...}` JSON objects and
//! are answered synchronously from the provider's in-memory state. The
//! bibliography and the id list are pushed to the renderer instead of being
//! returned.

use std::io::Write;
use std::sync::Mutex;

use serde::{Deserialize, Serialize, Serializer};
use zettel_citeproc::Bibliography;

use crate::notification::lock;
use crate::service::{CiteprocProvider, QueryOutcome};
use crate::state::EngineState;
use crate::verifier::IdHint;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "command", content = "content", rename_all = "kebab-case")]
pub enum Request {
    /// Render one citation in the editor micro-syntax
    GetCitation(String),
    /// Replace the registry with these keys
    UpdateItems(Vec<String>),
    /// Push the bibliography of the registry to the renderer
    MakeBibliography,
    GetIds,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdsPayload {
    pub ids: Vec<IdHint>,
    pub status: EngineState,
}

/// Bibliography as the renderer receives it: the structured bibliography,
/// `false` when there is none, or the state of an engine that is not ready
#[derive(Debug, Clone, PartialEq)]
pub enum BibliographyContent {
    Ready(Bibliography),
    Failed,
    Unavailable(EngineState),
}

impl From<QueryOutcome<Option<Bibliography>>> for BibliographyContent {
    fn from(outcome: QueryOutcome<Option<Bibliography>>) -> Self {
        match outcome {
            QueryOutcome::Ready(Some(bibliography)) => Self::Ready(bibliography),
            QueryOutcome::Ready(None) => Self::Failed,
            QueryOutcome::Unavailable(state) => Self::Unavailable(state),
        }
    }
}

impl Serialize for BibliographyContent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Ready(bibliography) => bibliography.serialize(serializer),
            Self::Failed => serializer.serialize_bool(false),
            Self::Unavailable(state) => state.serialize(serializer),
        }
    }
}

/// Messages pushed to the renderer without a request to answer
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "command", content = "content", rename_all = "kebab-case")]
pub enum RendererMessage {
    CiteprocIds(IdsPayload),
    CiteprocBibliography(BibliographyContent),
}

pub trait RendererChannel: Send + Sync {
    fn send(&self, message: RendererMessage);
}

/// Discards every message
#[derive(Debug, Default, Clone, Copy)]
pub struct NullRenderer;

impl RendererChannel for NullRenderer {
    fn send(&self, _message: RendererMessage) {}
}

/// Writes each message as one line of JSON
pub struct JsonLinesRenderer<W: Write + Send> {
    out: Mutex<W>,
}

impl<W: Write + Send> JsonLinesRenderer<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        self.out
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<W: Write + Send> RendererChannel for JsonLinesRenderer<W> {
    fn send(&self, message: RendererMessage) {
        let line = match serde_json::to_string(&message) {
            Ok(line) => line,
            Err(e) => {
                tracing::error!("Cannot serialize renderer message: {}", e);
                return;
            }
        };
        let mut out = lock(&self.out);
        if let Err(e) = writeln!(out, "{}", line).and_then(|_| out.flush()) {
            tracing::warn!("Cannot write renderer message: {}", e);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Response {
    Citation {
        citation: Option<String>,
        status: EngineState,
    },
    Ids(IdsPayload),
    Updated(QueryOutcome<bool>),
    /// The answer went to the renderer
    Pushed,
    Error {
        error: String,
    },
}

pub fn handle_request(provider: &CiteprocProvider, request: Request) -> Response {
    match request {
        Request::GetCitation(text) => Response::Citation {
            citation: provider.get_citation(&text),
            status: provider.state(),
        },
        Request::UpdateItems(keys) => Response::Updated(provider.update_items(&keys)),
        Request::MakeBibliography => {
            let content = BibliographyContent::from(provider.make_bibliography());
            provider
                .renderer()
                .send(RendererMessage::CiteprocBibliography(content));
            Response::Pushed
        }
        Request::GetIds => Response::Ids(provider.get_ids()),
    }
}

/// Answer one line of JSON with one line of JSON
pub fn handle_line(provider: &CiteprocProvider, line: &str) -> String {
    let response = match serde_json::from_str::<Request>(line) {
        Ok(request) => handle_request(provider, request),
        Err(e) => {
            tracing::debug!(line, "Rejected request: {}", e);
            Response::Error {
                error: format!("Invalid request: {}", e),
            }
        }
    };
    serde_json::to_string(&response).unwrap_or_else(|e| {
        tracing::error!("Cannot serialize response: {}", e);
        "null".to_string()
    })
}
