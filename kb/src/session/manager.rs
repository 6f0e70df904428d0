//! SessionManager - creates, resumes and locates sessions

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use super::{SessionRecord, SessionStore};
use crate::builder::{Builder, BuilderError, Pipeline};
use crate::package::ARCHIVE_NAME;

/// Entry point for every session operation
///
/// Owns the session store and the root under which each session gets its
/// own output directory. Lookups work without a [`Pipeline`]; creating or
/// resuming a [`Builder`] needs one.
#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    output_root: PathBuf,
}

impl SessionManager {
    pub fn new(store: Arc<dyn SessionStore>, output_root: impl Into<PathBuf>) -> Self {
        Self {
            store,
            output_root: output_root.into(),
        }
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    /// Start a session over `documents`, saved immediately at `Init`
    pub fn create(&self, documents: Vec<String>, pipeline: Pipeline) -> Result<Builder, BuilderError> {
        let id = Uuid::now_v7().to_string();
        let output_dir = self.output_root.join(&id);
        debug!(%id, documents = documents.len(), "SessionManager::create: called");

        let mut record = SessionRecord::new(&output_dir);
        record.task_count = Some(pipeline.planner.task_count());
        self.store.save(&id, record)?;
        info!(%id, output_dir = %output_dir.display(), "Session created");
        Ok(Builder::new(id, documents, output_dir, pipeline, self.store.clone()))
    }

    /// Resume a stored session
    pub fn load(&self, id: &str, pipeline: Pipeline) -> Result<Builder, BuilderError> {
        debug!(%id, "SessionManager::load: called");
        let record = self.record(id)?;
        Ok(Builder::restore(id.to_string(), record, pipeline, self.store.clone()))
    }

    /// The stored record of a session
    pub fn record(&self, id: &str) -> Result<SessionRecord, BuilderError> {
        self.store
            .get(id)?
            .ok_or_else(|| BuilderError::SessionNotFound(id.to_string()))
    }

    pub fn ids(&self) -> Result<Vec<String>, BuilderError> {
        Ok(self.store.ids()?)
    }

    /// Path of the session's packaged archive, if it has been written
    pub fn artifact_path(&self, id: &str) -> Result<PathBuf, BuilderError> {
        let path = self.record(id)?.output_dir.join(ARCHIVE_NAME);
        if !path.is_file() {
            return Err(BuilderError::ArtifactNotFound(id.to_string()));
        }
        Ok(path)
    }
}
