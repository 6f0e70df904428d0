//! Session lifecycle stages

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a session is in the pipeline
///
/// Stages only move forward, except `plan` (which may be re-run from
/// `Planned` or `Built`) and a cancelled build (which returns to `Planned`).
/// A failed operation leaves the stage where it was.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Documents supplied, nothing derived yet
    Init,
    /// Profile extracted
    Parsed,
    /// Plan ready to build
    Planned,
    /// A build run is in progress
    Building,
    /// Build finished; Repo available
    Built,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Init => "init",
            Stage::Parsed => "parsed",
            Stage::Planned => "planned",
            Stage::Building => "building",
            Stage::Built => "built",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_matches_serde() {
        for stage in [Stage::Init, Stage::Parsed, Stage::Planned, Stage::Building, Stage::Built] {
            let json = serde_json::to_value(stage).unwrap();
            assert_eq!(json, stage.to_string());
        }
    }
}
