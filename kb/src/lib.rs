//! KataBuilder - staged LLM pipeline that turns role documents into a coding kata
//!
//! A session moves documents through four steps, each driven by a model call:
//!
//! - **Extract** a [`Profile`] (role, stack, candidate) from the documents
//! - **Plan** exactly N units of work, optionally steered by feedback
//! - **Build** every unit concurrently: a narrative, then its code files
//! - **Package** the resulting [`Repo`] into a zip archive
//!
//! Profile and Plan are persisted after every transition so a session can be
//! resumed after a restart; the Repo is always regenerated from the Plan.
//!
//! # Modules
//!
//! - [`builder`] - per-session state machine and the build event stream
//! - [`generation`] - bounded concurrent unit generation
//! - [`llm`] - LLM client trait, Anthropic implementation, structured reasoner
//! - [`session`] - session records, stores and the session manager
//! - [`config`] - configuration types and loading
//! - [`cli`] - command-line interface

pub mod builder;
pub mod cli;
pub mod config;
pub mod domain;
pub mod extract;
pub mod generation;
pub mod llm;
pub mod package;
pub mod planning;
pub mod prompts;
pub mod session;

// Re-export commonly used types
pub use builder::{BuildEvent, BuildOptions, BuildRun, BuildSummary, Builder, BuilderError, Pipeline, Stage};
pub use config::Config;
pub use domain::{Plan, Profile, Repo, Unit};
pub use extract::{ExtractError, Extractor, LlmExtractor};
pub use generation::{UnitError, UnitGenerator};
pub use llm::{LlmClient, LlmError, Reasoner};
pub use package::{Packager, ZipPackager};
pub use planning::{PlanError, Planner};
pub use prompts::PromptLoader;
pub use session::{FileSessionStore, MemorySessionStore, SessionManager, SessionRecord, SessionStore};
