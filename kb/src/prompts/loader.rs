//! Prompt Loader
//!
//! Loads prompt templates from an override directory or falls back to the
//! embedded defaults.

use std::path::PathBuf;

use handlebars::Handlebars;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use super::embedded;

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("Prompt template not found: {0}")]
    NotFound(String),

    #[error("Failed to read prompt {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to render template {name}: {message}")]
    Render { name: String, message: String },
}

/// Loads and renders prompt templates
pub struct PromptLoader {
    hbs: Handlebars<'static>,
    /// Directory whose `{name}.pmt` files take precedence over embedded ones
    override_dir: Option<PathBuf>,
}

impl PromptLoader {
    pub fn new(override_dir: Option<PathBuf>) -> Self {
        let override_dir = match override_dir {
            Some(dir) if dir.is_dir() => Some(dir),
            Some(dir) => {
                warn!(dir = %dir.display(), "Prompt override directory does not exist, using embedded prompts");
                None
            }
            None => None,
        };

        let mut hbs = Handlebars::new();
        // Prompts are plain text; HTML escaping would mangle code and JSON
        hbs.register_escape_fn(handlebars::no_escape);

        Self { hbs, override_dir }
    }

    /// Loader that only uses embedded prompts
    pub fn embedded_only() -> Self {
        Self::new(None)
    }

    /// Load a template by name
    ///
    /// Checks `{override_dir}/{name}.pmt` first, then the embedded fallback.
    fn load_template(&self, name: &str) -> Result<String, PromptError> {
        if let Some(dir) = &self.override_dir {
            let path = dir.join(format!("{}.pmt", name));
            if path.exists() {
                debug!(?path, "load_template: using override");
                return std::fs::read_to_string(&path).map_err(|source| PromptError::Read { path, source });
            }
        }

        embedded::get_embedded(name)
            .map(str::to_string)
            .ok_or_else(|| PromptError::NotFound(name.to_string()))
    }

    /// Render a template with the given context
    pub fn render<C: Serialize>(&self, name: &str, context: &C) -> Result<String, PromptError> {
        debug!(%name, "render: called");
        let template = self.load_template(name)?;
        self.hbs
            .render_template(&template, context)
            .map_err(|e| PromptError::Render {
                name: name.to_string(),
                message: e.to_string(),
            })
    }

    /// The shared system prompt
    pub fn system(&self) -> Result<String, PromptError> {
        self.load_template("system")
    }
}

impl Default for PromptLoader {
    fn default() -> Self {
        Self::embedded_only()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_system_prompt_embedded() {
        let loader = PromptLoader::embedded_only();
        let system = loader.system().unwrap();
        assert!(system.contains("kata designer"));
    }

    #[test]
    fn test_unknown_template() {
        let loader = PromptLoader::embedded_only();
        let err = loader.render("nonexistent-template", &json!({})).unwrap_err();
        assert!(matches!(err, PromptError::NotFound(_)));
    }

    #[test]
    fn test_render_plan_with_feedback() {
        let loader = PromptLoader::embedded_only();
        let rendered = loader
            .render(
                "plan",
                &json!({
                    "task_count": 3,
                    "profile": "{\"title\": \"Backend Engineer\"}",
                    "stack": ["Rust", "Postgres"],
                    "feedback": "More focus on testing",
                    "tool": "submit_kata_plan",
                }),
            )
            .unwrap();

        assert!(rendered.contains("EXACTLY 3 tasks"));
        assert!(rendered.contains("Rust, Postgres"));
        assert!(rendered.contains("More focus on testing"));
        assert!(rendered.contains("submit_kata_plan"));
        // No HTML escaping of quotes
        assert!(rendered.contains("\"title\""));
    }

    #[test]
    fn test_render_plan_without_feedback() {
        let loader = PromptLoader::embedded_only();
        let rendered = loader
            .render("plan", &json!({"task_count": 2, "profile": "{}", "tool": "t"}))
            .unwrap();
        assert!(!rendered.contains("Feedback on the previous version"));
    }

    #[test]
    fn test_override_dir_takes_precedence() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("narrative.pmt"), "Custom narrative for {{unit.name}}").unwrap();

        let loader = PromptLoader::new(Some(dir.path().to_path_buf()));
        let rendered = loader.render("narrative", &json!({"unit": {"name": "Ingest"}})).unwrap();
        assert_eq!(rendered, "Custom narrative for Ingest");

        // Templates missing from the override dir still come from the embedded set
        let artifacts = loader
            .render("artifacts", &json!({"narrative": "# Task", "tool": "t"}))
            .unwrap();
        assert!(artifacts.contains("# Task"));
    }

    #[test]
    fn test_missing_override_dir_falls_back() {
        let loader = PromptLoader::new(Some(PathBuf::from("/nonexistent/prompts")));
        assert!(loader.system().is_ok());
    }
}
