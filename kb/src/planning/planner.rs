//! Planner - produces a Plan of exactly N units from a Profile
//!
//! The model is asked for exactly `task_count` tasks through a schema whose
//! `tasks` array is pinned to that length. Whatever comes back is checked
//! again here: a wrong count is an error, never truncated or padded.

use serde::Deserialize;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::domain::{Plan, Profile, Unit, unit_id_from};
use crate::llm::{Reasoner, ReasonerError, ResponseSchema};
use crate::prompts::{PromptError, PromptLoader};

/// Tool name the model calls to return the plan
const SUBMIT_KATA_PLAN: &str = "submit_kata_plan";

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("Plan generation failed: expected {expected} units, got {actual}")]
    CountMismatch { expected: usize, actual: usize },

    #[error("Plan generation failed: {0}")]
    Reasoner(#[from] ReasonerError),

    #[error("Plan generation failed: {0}")]
    Prompt(#[from] PromptError),

    #[error("Plan generation failed: {0}")]
    Invalid(String),
}

/// Raw plan as the model returns it
#[derive(Debug, Deserialize)]
struct PlanOutput {
    title: String,
    #[serde(default)]
    description: String,
    tasks: Vec<TaskOutput>,
}

#[derive(Debug, Deserialize)]
struct TaskOutput {
    #[serde(default)]
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    files: Vec<String>,
}

/// Plans a kata of a fixed number of units
pub struct Planner {
    reasoner: Arc<Reasoner>,
    prompts: Arc<PromptLoader>,
    task_count: usize,
}

impl Planner {
    pub fn new(reasoner: Arc<Reasoner>, prompts: Arc<PromptLoader>, task_count: usize) -> Self {
        Self {
            reasoner,
            prompts,
            task_count,
        }
    }

    pub fn task_count(&self) -> usize {
        self.task_count
    }

    /// Same model and prompts, different unit count
    pub fn with_task_count(&self, task_count: usize) -> Self {
        Self {
            reasoner: self.reasoner.clone(),
            prompts: self.prompts.clone(),
            task_count,
        }
    }

    fn schema(&self) -> ResponseSchema {
        let n = self.task_count;
        ResponseSchema::new(
            SUBMIT_KATA_PLAN,
            format!("Submit a kata plan with exactly {} tasks", n),
            json!({
                "type": "object",
                "properties": {
                    "title": { "type": "string", "description": "Title of the kata repository" },
                    "description": { "type": "string", "description": "What the kata teaches and assesses" },
                    "tasks": {
                        "type": "array",
                        "minItems": n,
                        "maxItems": n,
                        "description": format!("Exactly {} tasks, in the order the candidate tackles them", n),
                        "items": {
                            "type": "object",
                            "properties": {
                                "id": { "type": "string", "description": "snake_case identifier, e.g. task_1" },
                                "name": { "type": "string" },
                                "description": { "type": "string" },
                                "files": { "type": "array", "items": { "type": "string" } }
                            },
                            "required": ["id", "name", "description", "files"]
                        }
                    }
                },
                "required": ["title", "description", "tasks"]
            }),
        )
    }

    /// Produce a plan for `profile`, optionally steered by feedback on a previous plan
    pub async fn plan(&self, profile: &Profile, feedback: Option<&str>) -> Result<Plan, PlanError> {
        debug!(task_count = self.task_count, has_feedback = feedback.is_some(), "Planner::plan: called");
        let feedback = feedback.map(str::trim).filter(|f| !f.is_empty());

        let system = self.prompts.system()?;
        let prompt = self.prompts.render(
            "plan",
            &json!({
                "task_count": self.task_count,
                "profile": profile.to_prompt_json(),
                "candidate": profile.candidate,
                "stack": profile.stack,
                "feedback": feedback,
                "tool": SUBMIT_KATA_PLAN,
            }),
        )?;

        let output: PlanOutput = self.reasoner.generate_structured(&system, &prompt, &self.schema()).await?;

        if output.tasks.len() != self.task_count {
            warn!(
                expected = self.task_count,
                actual = output.tasks.len(),
                "Model returned the wrong number of tasks"
            );
            return Err(PlanError::CountMismatch {
                expected: self.task_count,
                actual: output.tasks.len(),
            });
        }

        let plan = Plan {
            title: output.title.trim().to_string(),
            description: output.description.trim().to_string(),
            units: normalize_units(output.tasks),
        };
        if plan.title.is_empty() {
            return Err(PlanError::Invalid("plan has no title".to_string()));
        }
        plan.check(self.task_count).map_err(PlanError::Invalid)?;

        info!(title = %plan.title, units = plan.len(), "Generated plan");
        Ok(plan)
    }
}

/// Turn raw tasks into units with valid, distinct ids
///
/// The id is derived from the model's id, falling back to the name and then
/// to `task_{position}`; collisions get a numeric suffix.
fn normalize_units(tasks: Vec<TaskOutput>) -> Vec<Unit> {
    let mut taken = HashSet::new();
    tasks
        .into_iter()
        .enumerate()
        .map(|(i, task)| {
            let mut base = unit_id_from(&task.id);
            if base.is_empty() {
                base = unit_id_from(&task.name);
            }
            if base.is_empty() {
                base = format!("task_{}", i + 1);
            }

            let mut id = base.clone();
            let mut suffix = 2;
            while taken.contains(&id) {
                // Leave room for the suffix within the id length limit
                let stem: String = base.chars().take(40).collect();
                id = format!("{}_{}", stem.trim_end_matches('_'), suffix);
                suffix += 1;
            }
            if id != task.id {
                debug!(raw = %task.id, %id, "normalize_units: rewrote unit id");
            }
            taken.insert(id.clone());

            let name = if task.name.trim().is_empty() {
                id.clone()
            } else {
                task.name.trim().to_string()
            };

            Unit {
                id,
                name,
                description: task.description.trim().to_string(),
                target_files: task.files,
            }
        })
        .collect()
}
