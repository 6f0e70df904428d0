//! Build events and the end-of-run summary

use serde::{Deserialize, Serialize};

/// One item of a build's progress stream
///
/// Serialized with a `type` tag, one JSON object per line on the wire:
/// `{"type":"file","path":"task_1/README.md","content":"..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BuildEvent {
    /// Human-readable progress
    Log { message: String },
    /// A file written into the Repo
    File { path: String, content: String },
    /// A unit-scoped failure; the build carries on
    Error { unit_id: String, message: String },
}

impl BuildEvent {
    pub fn log(message: impl Into<String>) -> Self {
        BuildEvent::Log {
            message: message.into(),
        }
    }

    pub fn file(path: impl Into<String>, content: impl Into<String>) -> Self {
        BuildEvent::File {
            path: path.into(),
            content: content.into(),
        }
    }

    pub fn error(unit_id: impl Into<String>, message: impl Into<String>) -> Self {
        BuildEvent::Error {
            unit_id: unit_id.into(),
            message: message.into(),
        }
    }
}

/// Per-unit tallies for a finished build
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildSummary {
    pub units: usize,
    pub complete: usize,
    pub degraded: usize,
    pub failed: usize,
    /// Units abandoned or never started because the build was cancelled
    pub cancelled: usize,
    /// Files written into the Repo
    pub files: usize,
}

impl BuildSummary {
    pub fn was_cancelled(&self) -> bool {
        self.cancelled > 0
    }
}
