//! Profile - the extracted role and candidate context

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Seniority of the candidate the kata is tailored for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Junior,
    Mid,
    Senior,
}

/// Attributes of the person the kata is written for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub name: String,
    pub level: Level,
    #[serde(default)]
    pub experience_yrs: u32,
    #[serde(default)]
    pub learning_style: String,
}

/// Structured context driving generation
///
/// Produced once by extraction and never mutated afterwards; the builder only
/// hands out shared references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    /// Job title of the role
    pub title: String,

    /// Industry the role sits in, e.g. "Biotechnology"
    #[serde(default)]
    pub industry: String,

    /// Technologies in use (languages, frameworks, infrastructure)
    #[serde(default)]
    pub stack: Vec<String>,

    /// How the team builds software
    #[serde(default)]
    pub dev_philosophy: String,

    /// Anything else the documents asked for
    #[serde(default)]
    pub extra_preferences: String,

    /// The candidate, when the documents describe one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidate: Option<Candidate>,
}

impl Profile {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            industry: String::new(),
            stack: Vec::new(),
            dev_philosophy: String::new(),
            extra_preferences: String::new(),
            candidate: None,
        }
    }

    pub fn with_stack<I, S>(mut self, stack: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.stack = stack.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_candidate(mut self, candidate: Candidate) -> Self {
        self.candidate = Some(candidate);
        self
    }

    /// Pretty JSON used when embedding the profile into prompts
    pub fn to_prompt_json(&self) -> String {
        debug!(title = %self.title, "Profile::to_prompt_json: called");
        serde_json::to_string_pretty(self).unwrap_or_else(|_| self.title.clone())
    }

    /// JSON schema handed to the reasoner when extracting a profile
    pub fn schema() -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "title": { "type": "string", "description": "Title of the role" },
                "industry": { "type": "string", "description": "Industry the role is in, e.g. 'Biotechnology'" },
                "stack": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Technologies used: languages, package managers, frameworks, cloud, databases, LLMs"
                },
                "dev_philosophy": { "type": "string", "description": "Development philosophy, practices and values" },
                "extra_preferences": { "type": "string", "description": "Additional development preferences" },
                "candidate": {
                    "type": "object",
                    "properties": {
                        "name": { "type": "string" },
                        "level": { "type": "string", "enum": ["junior", "mid", "senior"] },
                        "experience_yrs": { "type": "integer", "minimum": 0 },
                        "learning_style": { "type": "string" }
                    },
                    "required": ["name", "level"]
                }
            },
            "required": ["title", "stack"]
        })
    }
}
