//! Shared doubles for the integration tests

#![allow(dead_code)]

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use katabuilder::builder::{BuildOptions, Pipeline};
use katabuilder::extract::LlmExtractor;
use katabuilder::generation::UnitGenerator;
use katabuilder::llm::{CompletionRequest, CompletionResponse, LlmClient, LlmError, Reasoner};
use katabuilder::planning::Planner;
use katabuilder::prompts::PromptLoader;
use katabuilder::session::{SessionManager, SessionStore};

/// Model double that answers each step from the forced tool and the prompt
///
/// Narratives are `# Narrative for {name}`; artifact calls for a unit whose
/// name is in `fail_artifacts` fail, as do narrative calls for names in
/// `fail_narratives`.
pub struct ScriptedClient {
    pub tasks: usize,
    pub fail_narratives: HashSet<String>,
    pub fail_artifacts: HashSet<String>,
    pub calls: AtomicUsize,
    plans: AtomicUsize,
}

impl ScriptedClient {
    pub fn new(tasks: usize) -> Self {
        Self {
            tasks,
            fail_narratives: HashSet::new(),
            fail_artifacts: HashSet::new(),
            calls: AtomicUsize::new(0),
            plans: AtomicUsize::new(0),
        }
    }

    pub fn failing_artifacts(mut self, unit_name: &str) -> Self {
        self.fail_artifacts.insert(unit_name.to_string());
        self
    }

    pub fn failing_narrative(mut self, unit_name: &str) -> Self {
        self.fail_narratives.insert(unit_name.to_string());
        self
    }

    /// Unit name from the narrative prompt's `- Name:` line
    fn unit_name(prompt: &str) -> Option<String> {
        prompt
            .lines()
            .find_map(|l| l.trim().strip_prefix("- Name:"))
            .map(|n| n.trim().to_string())
    }
}

#[async_trait]
impl LlmClient for ScriptedClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let prompt = request.user_text();
        let failure = |what: &str| LlmError::ApiError {
            status: 500,
            message: format!("{} unavailable", what),
        };

        match request.tool_choice.as_deref() {
            Some("submit_profile") => Ok(CompletionResponse::tool_call(
                "submit_profile",
                json!({
                    "title": "Backend Engineer",
                    "industry": "Logistics",
                    "stack": ["Python"],
                    "candidate": {"name": "Ada", "level": "senior", "experience_yrs": 9}
                }),
            )),
            Some("submit_kata_plan") => {
                let version = self.plans.fetch_add(1, Ordering::SeqCst) + 1;
                let tasks: Vec<_> = (1..=self.tasks)
                    .map(|i| {
                        json!({
                            "id": format!("task_{}", i),
                            "name": format!("Task {}", i),
                            "description": format!("Step {} of the kata", i),
                            "files": ["solution.py", "test_solution.py"]
                        })
                    })
                    .collect();
                Ok(CompletionResponse::tool_call(
                    "submit_kata_plan",
                    json!({"title": format!("Routing Kata v{}", version), "description": "Shortest paths", "tasks": tasks}),
                ))
            }
            Some(tool) => {
                if self.fail_artifacts.iter().any(|name| prompt.contains(&format!("Narrative for {}", name))) {
                    return Err(failure("artifacts"));
                }
                Ok(CompletionResponse::tool_call(
                    tool,
                    json!({"files": [
                        {"filename": "solution.py", "content": "def solve():\n    pass\n"},
                        {"filename": "test_solution.py", "content": "def test_solve():\n    pass\n"}
                    ]}),
                ))
            }
            None => {
                let name = Self::unit_name(&prompt).unwrap_or_default();
                if self.fail_narratives.contains(&name) {
                    return Err(failure("narrative"));
                }
                Ok(CompletionResponse::text(format!(
                    "# Narrative for {}\n\nImplement the step.",
                    name
                )))
            }
        }
    }
}

pub fn pipeline(client: Arc<ScriptedClient>) -> Pipeline {
    let tasks = client.tasks;
    let reasoner = Arc::new(Reasoner::new(client, 4096));
    let prompts = Arc::new(PromptLoader::embedded_only());
    Pipeline {
        extractor: Arc::new(LlmExtractor::new(reasoner.clone(), prompts.clone())),
        planner: Arc::new(Planner::new(reasoner.clone(), prompts.clone(), tasks)),
        generator: Arc::new(UnitGenerator::new(reasoner, prompts, Duration::from_secs(10))),
        options: BuildOptions {
            max_concurrent: 2,
            build_timeout: None,
        },
    }
}

pub fn manager(store: Arc<dyn SessionStore>, output_root: &Path) -> SessionManager {
    SessionManager::new(store, output_root)
}
