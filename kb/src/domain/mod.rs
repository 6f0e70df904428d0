//! Domain types shared across the pipeline
//!
//! - [`Profile`] - structured role/candidate context produced by extraction
//! - [`Plan`] / [`Unit`] - the ordered work list produced by the planner
//! - [`GeneratedUnit`] - one unit's narrative plus implementation files
//! - [`Repo`] - the ordered path -> content mapping assembled by a build

mod plan;
mod profile;
mod repo;

pub use plan::{Plan, Unit, unit_id_from};
pub use profile::{Candidate, Level, Profile};
pub use repo::{DuplicatePath, GeneratedUnit, NARRATIVE_FILE, OVERVIEW_FILE, Repo, unit_path};
