//! Generation - narrative and artifacts per unit, fanned out across a plan

mod fanout;
mod generator;
mod outcome;

pub use fanout::generate_units;
pub use generator::UnitGenerator;
pub use outcome::{UnitError, UnitMessage, UnitOutcome};
