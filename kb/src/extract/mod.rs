//! Extraction - turning raw documents into a [`Profile`]

mod documents;

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

pub use documents::{DOCUMENT_SEPARATOR, combine_documents, read_documents_from_directory};

use crate::domain::Profile;
use crate::llm::{Reasoner, ReasonerError, ResponseSchema};
use crate::prompts::{PromptError, PromptLoader};

/// Tool name the model calls to return the extracted profile
const SUBMIT_PROFILE: &str = "submit_profile";

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("No usable documents to extract from")]
    NoDocuments,

    #[error("Extraction failed: {0}")]
    Reasoner(#[from] ReasonerError),

    #[error("Extraction failed: {0}")]
    Prompt(#[from] PromptError),

    #[error("Extraction failed: {0}")]
    Incomplete(String),
}

/// Produces a [`Profile`] from raw document text
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, documents: &[String]) -> Result<Profile, ExtractError>;
}

/// Extractor backed by a single structured reasoner call
pub struct LlmExtractor {
    reasoner: Arc<Reasoner>,
    prompts: Arc<PromptLoader>,
}

impl LlmExtractor {
    pub fn new(reasoner: Arc<Reasoner>, prompts: Arc<PromptLoader>) -> Self {
        Self { reasoner, prompts }
    }

    fn schema() -> ResponseSchema {
        ResponseSchema::new(
            SUBMIT_PROFILE,
            "Submit the role profile extracted from the documents",
            Profile::schema(),
        )
    }
}

#[async_trait]
impl Extractor for LlmExtractor {
    async fn extract(&self, documents: &[String]) -> Result<Profile, ExtractError> {
        debug!(count = documents.len(), "LlmExtractor::extract: called");
        let usable: Vec<String> = documents.iter().filter(|d| !d.trim().is_empty()).cloned().collect();
        if usable.is_empty() {
            return Err(ExtractError::NoDocuments);
        }

        let system = self.prompts.system()?;
        let prompt = self.prompts.render(
            "extract",
            &json!({
                "documents": combine_documents(&usable),
                "tool": SUBMIT_PROFILE,
            }),
        )?;

        let profile: Profile = self.reasoner.generate_structured(&system, &prompt, &Self::schema()).await?;
        if profile.title.trim().is_empty() {
            return Err(ExtractError::Incomplete("profile has no role title".to_string()));
        }

        info!(title = %profile.title, stack = profile.stack.len(), "Extracted profile");
        Ok(profile)
    }
}
