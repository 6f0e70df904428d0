//! Builder - the per-session pipeline state machine
//!
//! ```text
//! Init --parse--> Parsed --plan--> Planned --build--> Building --finish--> Built
//!                              ^       |  \__plan__/                  |
//!                              |       |                              |
//!                              +-------+------------plan--------------+
//! ```
//!
//! Each successful transition is persisted through the [`SessionStore`]
//! before it is applied in memory, so a failed save leaves the builder
//! exactly as it was.

mod error;
mod events;
mod run;
mod stage;

pub use error::BuilderError;
pub use events::{BuildEvent, BuildSummary};
pub use run::BuildRun;
pub use stage::Stage;

use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::{Plan, Profile, Repo};
use crate::extract::Extractor;
use crate::generation::{UnitGenerator, generate_units};
use crate::package::Packager;
use crate::planning::Planner;
use crate::session::{SessionRecord, SessionStore};

/// Limits applied to every build run
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Maximum units generated concurrently
    pub max_concurrent: usize,
    /// Wall-clock limit for a whole run; expiry cancels it
    pub build_timeout: Option<Duration>,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            max_concurrent: 5,
            build_timeout: None,
        }
    }
}

/// Model-backed collaborators shared by every session
#[derive(Clone)]
pub struct Pipeline {
    pub extractor: Arc<dyn Extractor>,
    pub planner: Arc<Planner>,
    pub generator: Arc<UnitGenerator>,
    pub options: BuildOptions,
}

/// One session moving through parse, plan and build
pub struct Builder {
    id: String,
    stage: Stage,
    documents: Vec<String>,
    profile: Option<Arc<Profile>>,
    plan: Option<Plan>,
    /// Set once a build of the current plan has started
    plan_consumed: bool,
    repo: Option<Repo>,
    summary: Option<BuildSummary>,
    output_dir: PathBuf,
    output_location: Option<PathBuf>,
    build_seq: u64,
    /// Dead once the current run is dropped
    active_run: Weak<()>,
    pipeline: Pipeline,
    store: Arc<dyn SessionStore>,
}

impl Builder {
    pub(crate) fn new(
        id: String,
        documents: Vec<String>,
        output_dir: PathBuf,
        pipeline: Pipeline,
        store: Arc<dyn SessionStore>,
    ) -> Self {
        Self {
            id,
            stage: Stage::Init,
            documents,
            profile: None,
            plan: None,
            plan_consumed: false,
            repo: None,
            summary: None,
            output_dir,
            output_location: None,
            build_seq: 0,
            active_run: Weak::new(),
            pipeline,
            store,
        }
    }

    /// Rebuild a session from its persisted record; stage is inferred
    pub(crate) fn restore(
        id: String,
        record: SessionRecord,
        mut pipeline: Pipeline,
        store: Arc<dyn SessionStore>,
    ) -> Self {
        let stage = record.stage();
        debug!(%id, %stage, "Builder::restore: called");
        if stage == Stage::Init && record.plan.is_some() {
            warn!(%id, "Discarding stored plan without a profile");
        }
        let (profile, plan) = match stage {
            Stage::Init => (None, None),
            _ => (record.profile.map(Arc::new), record.plan),
        };

        // Keep replans at the size the session was created with
        match record.task_count {
            Some(0) => warn!(%id, "Ignoring stored task count of zero"),
            Some(n) if n != pipeline.planner.task_count() => {
                debug!(%id, stored = n, configured = pipeline.planner.task_count(), "Using stored task count");
                pipeline.planner = Arc::new(pipeline.planner.with_task_count(n));
            }
            _ => {}
        }

        let mut builder = Self::new(id, Vec::new(), record.output_dir, pipeline, store);
        builder.stage = stage;
        builder.profile = profile;
        builder.plan = plan;
        builder
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Current stage; a build whose run was dropped unfinished reads as `Planned`
    pub fn stage(&self) -> Stage {
        if self.run_abandoned() {
            Stage::Planned
        } else {
            self.stage
        }
    }

    fn run_abandoned(&self) -> bool {
        self.stage == Stage::Building && self.active_run.upgrade().is_none()
    }

    /// Return a session whose run was dropped without `finish` to `Planned`
    fn reclaim_abandoned_run(&mut self) {
        if self.run_abandoned() {
            warn!(id = %self.id, run = self.build_seq, "Build run dropped before finish, session back to planned");
            self.plan_consumed = false;
            self.stage = Stage::Planned;
        }
    }

    pub fn documents(&self) -> &[String] {
        &self.documents
    }

    pub fn profile(&self) -> Option<&Profile> {
        self.profile.as_deref()
    }

    /// The Plan that `build` will run, if any
    pub fn current_plan(&self) -> Option<&Plan> {
        self.plan.as_ref()
    }

    /// Repo from the last finished build, if any
    pub fn repo(&self) -> Option<&Repo> {
        self.repo.as_ref()
    }

    pub fn summary(&self) -> Option<&BuildSummary> {
        self.summary.as_ref()
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Where the packaged artifact was written, once packaged
    pub fn output(&self) -> Option<&Path> {
        self.output_location.as_deref()
    }

    /// Extract the Profile from the session's documents
    pub async fn parse(&mut self) -> Result<Arc<Profile>, BuilderError> {
        debug!(id = %self.id, stage = %self.stage, "Builder::parse: called");
        if self.stage != Stage::Init {
            return Err(BuilderError::invalid_stage("parse", self.stage));
        }

        let profile = Arc::new(self.pipeline.extractor.extract(&self.documents).await?);
        self.persist(Some(&profile), None)?;

        self.profile = Some(profile.clone());
        self.stage = Stage::Parsed;
        info!(id = %self.id, title = %profile.title, "Session parsed");
        Ok(profile)
    }

    /// Produce or replace the Plan, optionally steered by feedback
    ///
    /// On failure the previous Plan and stage are kept.
    pub async fn plan(&mut self, feedback: Option<&str>) -> Result<&Plan, BuilderError> {
        debug!(id = %self.id, stage = %self.stage, has_feedback = feedback.is_some(), "Builder::plan: called");
        self.reclaim_abandoned_run();
        if !matches!(self.stage, Stage::Parsed | Stage::Planned | Stage::Built) {
            return Err(BuilderError::invalid_stage("plan", self.stage));
        }
        let Some(profile) = self.profile.clone() else {
            return Err(BuilderError::invalid_stage("plan", self.stage));
        };

        let plan = self.pipeline.planner.plan(&profile, feedback).await?;
        self.persist(Some(&profile), Some(&plan))?;

        self.plan_consumed = false;
        self.stage = Stage::Planned;
        info!(id = %self.id, title = %plan.title, units = plan.len(), "Session planned");
        Ok(&*self.plan.insert(plan))
    }

    /// Start generating every unit of the current Plan
    ///
    /// Allowed once per Plan. The returned run yields events as units
    /// complete; pass it to [`finish`](Self::finish) afterwards. Must be
    /// called from within a tokio runtime.
    pub fn build(&mut self) -> Result<BuildRun, BuilderError> {
        debug!(id = %self.id, stage = %self.stage, "Builder::build: called");
        self.reclaim_abandoned_run();
        if self.stage != Stage::Planned || self.plan_consumed {
            return Err(BuilderError::invalid_stage("build", self.stage));
        }
        let (Some(plan), Some(profile)) = (&self.plan, &self.profile) else {
            return Err(BuilderError::invalid_stage("build", self.stage));
        };

        let cancel = CancellationToken::new();
        if let Some(limit) = self.pipeline.options.build_timeout {
            let deadline = cancel.clone();
            let id = self.id.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = deadline.cancelled() => {}
                    _ = tokio::time::sleep(limit) => {
                        warn!(%id, ?limit, "Build deadline reached, cancelling");
                        deadline.cancel();
                    }
                }
            });
        }

        let rx = generate_units(
            self.pipeline.generator.clone(),
            plan.units.clone(),
            profile.clone(),
            self.pipeline.options.max_concurrent,
            cancel.clone(),
        );
        let run = BuildRun::new(self.build_seq + 1, plan, rx, cancel);

        self.build_seq += 1;
        self.active_run = run.liveness();
        self.plan_consumed = true;
        self.stage = Stage::Building;
        info!(id = %self.id, units = plan.len(), run = self.build_seq, "Build started");
        Ok(run)
    }

    /// Complete a build run, keeping its Repo
    ///
    /// Events not yet consumed are drained first. A run that was cancelled
    /// returns the session to `Planned` so the Plan can be built again;
    /// otherwise the session is `Built`.
    pub async fn finish(&mut self, mut run: BuildRun) -> Result<&BuildSummary, BuilderError> {
        debug!(id = %self.id, run = run.seq(), "Builder::finish: called");
        if self.stage != Stage::Building || run.seq() != self.build_seq {
            return Err(BuilderError::ForeignRun { run: run.seq() });
        }

        run.drain().await;
        let (repo, summary) = run.into_parts();

        let cancelled = summary.was_cancelled();
        if cancelled {
            self.plan_consumed = false;
            self.stage = Stage::Planned;
            info!(id = %self.id, ?summary, "Build cancelled, session back to planned");
        } else {
            self.stage = Stage::Built;
            info!(id = %self.id, ?summary, "Session built");
        }

        // Only Profile and Plan are durable; refresh the timestamp
        if let Err(e) = self.persist(self.profile.as_deref(), self.plan.as_ref()) {
            warn!(id = %self.id, error = %e, "Failed to record build completion");
        }

        self.repo = Some(repo);
        Ok(&*self.summary.insert(summary))
    }

    /// Package the built Repo into the session's output directory
    pub fn package(&mut self, packager: &dyn Packager) -> Result<&Path, BuilderError> {
        debug!(id = %self.id, stage = %self.stage, "Builder::package: called");
        let Some(repo) = self.repo.as_ref().filter(|_| self.stage == Stage::Built) else {
            return Err(BuilderError::invalid_stage("package", self.stage));
        };

        let location = packager.package(repo, &self.output_dir)?;
        info!(id = %self.id, path = %location.display(), "Session packaged");
        Ok(self.output_location.insert(location).as_path())
    }

    /// Save the prospective state; nothing in memory changes on failure
    fn persist(&self, profile: Option<&Profile>, plan: Option<&Plan>) -> Result<(), BuilderError> {
        let record = SessionRecord {
            output_dir: self.output_dir.clone(),
            task_count: Some(self.pipeline.planner.task_count()),
            profile: profile.cloned(),
            plan: plan.cloned(),
            updated_at: Some(Utc::now()),
        };
        self.store.save(&self.id, record)?;
        Ok(())
    }
}
