//! Reasoner - free-text and schema-constrained generation over an LlmClient

use serde::de::DeserializeOwned;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use super::{CompletionRequest, CompletionResponse, LlmClient, LlmError, ToolDefinition};

/// Errors from a single reasoner call
#[derive(Debug, Error)]
pub enum ReasonerError {
    #[error("Generation failed: {0}")]
    GenerationFailed(#[from] LlmError),

    #[error("Unparsable response: {0}")]
    UnparsableResponse(String),
}

/// Shape a structured response must conform to
///
/// Sent to the model as the input schema of a single forced tool, so the
/// provider constrains the output rather than the prompt alone.
#[derive(Debug, Clone)]
pub struct ResponseSchema {
    pub name: String,
    pub description: String,
    pub schema: serde_json::Value,
}

impl ResponseSchema {
    pub fn new(name: impl Into<String>, description: impl Into<String>, schema: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            schema,
        }
    }

    fn as_tool(&self) -> ToolDefinition {
        ToolDefinition::new(self.name.clone(), self.description.clone(), self.schema.clone())
    }
}

/// Generation capability shared by every pipeline stage
pub struct Reasoner {
    llm: Arc<dyn LlmClient>,
    max_tokens: u32,
}

impl Reasoner {
    pub fn new(llm: Arc<dyn LlmClient>, max_tokens: u32) -> Self {
        Self { llm, max_tokens }
    }

    /// Generate free text
    ///
    /// An empty or whitespace-only answer is treated as unparsable.
    pub async fn generate_text(&self, system: &str, prompt: &str) -> Result<String, ReasonerError> {
        debug!(prompt_len = prompt.len(), "generate_text: called");
        let request = CompletionRequest::text(system, prompt, self.max_tokens);
        let response = self.llm.complete(request).await?;

        match response.content {
            Some(text) if !text.trim().is_empty() => Ok(text),
            _ => {
                debug!("generate_text: empty response");
                Err(ReasonerError::UnparsableResponse("model returned no text".to_string()))
            }
        }
    }

    /// Generate a value conforming to `schema`
    ///
    /// Prefers the forced tool call's input; falls back to JSON in the text
    /// content (optionally fenced) for models that answer in prose.
    pub async fn generate_structured<T>(
        &self,
        system: &str,
        prompt: &str,
        schema: &ResponseSchema,
    ) -> Result<T, ReasonerError>
    where
        T: DeserializeOwned,
    {
        debug!(schema = %schema.name, prompt_len = prompt.len(), "generate_structured: called");
        let request = CompletionRequest::text(system, prompt, self.max_tokens).forcing_tool(schema.as_tool());
        let response = self.llm.complete(request).await?;
        parse_structured(&response, &schema.name)
    }
}

fn parse_structured<T: DeserializeOwned>(response: &CompletionResponse, tool_name: &str) -> Result<T, ReasonerError> {
    if let Some(call) = response.tool_calls.iter().find(|c| c.name == tool_name) {
        debug!(tool = %call.name, "parse_structured: using tool call input");
        return serde_json::from_value(call.input.clone())
            .map_err(|e| ReasonerError::UnparsableResponse(format!("{} input does not match schema: {}", tool_name, e)));
    }

    if let Some(content) = &response.content {
        warn!(tool = %tool_name, "Model answered without the structured tool, parsing text content");
        let json = strip_code_fence(content);
        return serde_json::from_str(json)
            .map_err(|e| ReasonerError::UnparsableResponse(format!("text content is not valid {}: {}", tool_name, e)));
    }

    Err(ReasonerError::UnparsableResponse(format!(
        "model did not call {} and returned no content",
        tool_name
    )))
}

/// Strip a surrounding markdown code fence, if any
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Skip an optional language tag on the opening line
    let body = match rest.find('\n') {
        Some(i) => &rest[i + 1..],
        None => rest,
    };
    body.strip_suffix("```").unwrap_or(body).trim()
}
