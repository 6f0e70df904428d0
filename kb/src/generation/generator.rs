//! UnitGenerator - narrative then artifacts for a single unit

use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{UnitError, UnitOutcome};
use crate::domain::{GeneratedUnit, NARRATIVE_FILE, Profile, Unit};
use crate::llm::{Reasoner, ReasonerError, ResponseSchema};
use crate::prompts::PromptLoader;

/// Tool name the model calls to return a unit's files
const SUBMIT_TASK_FILES: &str = "submit_task_files";

#[derive(Debug, Deserialize)]
struct ArtifactOutput {
    files: Vec<ArtifactFile>,
}

#[derive(Debug, Deserialize)]
struct ArtifactFile {
    filename: String,
    #[serde(default)]
    content: String,
}

/// Generates one unit at a time; shared across workers behind an `Arc`
pub struct UnitGenerator {
    reasoner: Arc<Reasoner>,
    prompts: Arc<PromptLoader>,
    call_timeout: Duration,
}

impl UnitGenerator {
    pub fn new(reasoner: Arc<Reasoner>, prompts: Arc<PromptLoader>, call_timeout: Duration) -> Self {
        Self {
            reasoner,
            prompts,
            call_timeout,
        }
    }

    /// Candidate-facing narrative for `unit`
    pub async fn generate_narrative(
        &self,
        unit: &Unit,
        profile: &Profile,
        cancel: &CancellationToken,
    ) -> Result<String, UnitError> {
        debug!(unit_id = %unit.id, "generate_narrative: called");
        let system = self
            .prompts
            .system()
            .map_err(|e| UnitError::NarrativeFailed(e.to_string()))?;
        let prompt = self
            .prompts
            .render(
                "narrative",
                &json!({
                    "unit": unit,
                    "profile": profile.to_prompt_json(),
                    "candidate": profile.candidate,
                }),
            )
            .map_err(|e| UnitError::NarrativeFailed(e.to_string()))?;

        self.bounded(
            cancel,
            "Narrative",
            UnitError::NarrativeFailed,
            self.reasoner.generate_text(&system, &prompt),
        )
        .await
    }

    /// Implementation files for `unit`, derived from its narrative
    ///
    /// Filenames are sanitized to stay inside the unit directory; a response
    /// with no usable file is an error.
    pub async fn generate_artifacts(
        &self,
        unit: &Unit,
        narrative: &str,
        cancel: &CancellationToken,
    ) -> Result<BTreeMap<String, String>, UnitError> {
        debug!(unit_id = %unit.id, "generate_artifacts: called");
        let system = self
            .prompts
            .system()
            .map_err(|e| UnitError::ArtifactFailed(e.to_string()))?;
        let prompt = self
            .prompts
            .render(
                "artifacts",
                &json!({
                    "narrative": narrative,
                    "target_files": unit.target_files,
                    "tool": SUBMIT_TASK_FILES,
                }),
            )
            .map_err(|e| UnitError::ArtifactFailed(e.to_string()))?;

        let schema = ResponseSchema::new(
            SUBMIT_TASK_FILES,
            "Submit the files implementing the task",
            json!({
                "type": "object",
                "properties": {
                    "files": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "filename": { "type": "string", "description": "Path relative to the task directory" },
                                "content": { "type": "string" }
                            },
                            "required": ["filename", "content"]
                        }
                    }
                },
                "required": ["files"]
            }),
        );

        let output: ArtifactOutput = self
            .bounded(
                cancel,
                "Artifact",
                UnitError::ArtifactFailed,
                self.reasoner.generate_structured(&system, &prompt, &schema),
            )
            .await?;

        let mut files = BTreeMap::new();
        for file in output.files {
            let Some(filename) = sanitize_filename(&unit.id, &file.filename) else {
                warn!(unit_id = %unit.id, filename = %file.filename, "Dropping artifact with unusable filename");
                continue;
            };
            if files.contains_key(&filename) {
                warn!(unit_id = %unit.id, %filename, "Dropping duplicate artifact");
                continue;
            }
            files.insert(filename, file.content);
        }

        if files.is_empty() {
            return Err(UnitError::ArtifactFailed("response contained no usable files".to_string()));
        }
        Ok(files)
    }

    /// Generate a unit end to end
    ///
    /// A failed narrative fails the unit; a failed artifact step degrades it
    /// but keeps the narrative.
    pub async fn generate(&self, unit: &Unit, profile: &Profile, cancel: &CancellationToken) -> UnitOutcome {
        debug!(unit_id = %unit.id, "generate: called");
        let narrative = match self.generate_narrative(unit, profile, cancel).await {
            Ok(narrative) => narrative,
            Err(error) => {
                warn!(unit_id = %unit.id, %error, "Unit failed");
                return UnitOutcome::Failed {
                    unit_id: unit.id.clone(),
                    error,
                };
            }
        };

        let mut generated = GeneratedUnit {
            unit_id: unit.id.clone(),
            narrative,
            files: BTreeMap::new(),
        };

        match self.generate_artifacts(unit, &generated.narrative, cancel).await {
            Ok(files) => {
                info!(unit_id = %unit.id, files = files.len(), "Unit complete");
                generated.files = files;
                UnitOutcome::Complete(generated)
            }
            Err(error) => {
                warn!(unit_id = %unit.id, %error, "Unit degraded");
                UnitOutcome::Degraded { unit: generated, error }
            }
        }
    }

    /// Run one reasoner call under the per-call timeout, abandoning it on cancel
    async fn bounded<T, F>(
        &self,
        cancel: &CancellationToken,
        step: &'static str,
        fail: fn(String) -> UnitError,
        call: F,
    ) -> Result<T, UnitError>
    where
        F: Future<Output = Result<T, ReasonerError>>,
    {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(UnitError::Cancelled),
            result = tokio::time::timeout(self.call_timeout, call) => match result {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(e)) => Err(fail(e.to_string())),
                Err(_) => Err(UnitError::Timeout { step, after: self.call_timeout }),
            },
        }
    }
}

/// Normalize a model-provided filename to a path inside the unit directory
///
/// Rejects empty, absolute and parent-escaping paths, and the narrative file
/// itself. A leading `{unit_id}/` is stripped.
fn sanitize_filename(unit_id: &str, raw: &str) -> Option<String> {
    let raw = raw.trim().replace('\\', "/");
    if raw.starts_with('/') || raw.contains(':') {
        return None;
    }

    let mut parts: Vec<&str> = raw.split('/').filter(|p| !p.is_empty() && *p != ".").collect();
    if parts.iter().any(|p| *p == "..") {
        return None;
    }
    if parts.len() > 1 && parts[0] == unit_id {
        parts.remove(0);
    }

    let path = parts.join("/");
    if path.is_empty() || path.eq_ignore_ascii_case(NARRATIVE_FILE) {
        return None;
    }
    Some(path)
}
