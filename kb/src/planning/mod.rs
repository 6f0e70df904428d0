//! Planning - turning a Profile into a Plan of independently generatable units

mod planner;

pub use planner::{PlanError, Planner};
