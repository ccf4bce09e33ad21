//! Lifecycle state of the citation engine

use std::fmt;

use serde::{Deserialize, Serialize};

/// `NOT_LOADED -> BOOTING -> {READY | ERROR | NO_DB}`
///
/// Queries only succeed in `Ready`; every other state is reported back to
/// the caller as is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EngineState {
    #[default]
    NotLoaded,
    Booting,
    Ready,
    Error,
    NoDb,
}

impl EngineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotLoaded => "NOT_LOADED",
            Self::Booting => "BOOTING",
            Self::Ready => "READY",
            Self::Error => "ERROR",
            Self::NoDb => "NO_DB",
        }
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
