//! Embedded prompts
//!
//! Compiled into the binary from `.pmt` files at build time.

use tracing::debug;

/// Shared system prompt for every pipeline call
pub const SYSTEM: &str = include_str!("../../prompts/system.pmt");

/// Profile extraction from raw documents
pub const EXTRACT: &str = include_str!("../../prompts/extract.pmt");

/// Kata plan with a fixed number of units
pub const PLAN: &str = include_str!("../../prompts/plan.pmt");

/// Candidate-facing narrative for one unit
pub const NARRATIVE: &str = include_str!("../../prompts/narrative.pmt");

/// Implementation files for one unit, derived from its narrative
pub const ARTIFACTS: &str = include_str!("../../prompts/artifacts.pmt");

/// Get the embedded prompt by name
pub fn get_embedded(name: &str) -> Option<&'static str> {
    debug!(%name, "get_embedded: called");
    match name {
        "system" => Some(SYSTEM),
        "extract" => Some(EXTRACT),
        "plan" => Some(PLAN),
        "narrative" => Some(NARRATIVE),
        "artifacts" => Some(ARTIFACTS),
        _ => {
            debug!("get_embedded: no match found");
            None
        }
    }
}
