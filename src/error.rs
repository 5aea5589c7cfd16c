use std::time::Duration;
use thiserror::Error;

use crate::data::InfeasibleGroup;

/// Failures that abort a solve.
///
/// A single unschedulable group is not an error; it is reported as an
/// [`InfeasibleGroup`] diagnostic alongside the schedule.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed or inconsistent reference data.
    #[error("data error: {0}")]
    Data(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    /// The exact solver proved that no timetable satisfies every hard constraint.
    /// Relax the input (rooms, slots, availability) before retrying.
    #[error("no timetable satisfies every hard constraint ({} groups already excluded)", diagnostics.len())]
    InfeasibleSchedule { diagnostics: Vec<InfeasibleGroup> },

    /// The time budget ran out before a valid timetable or a proof of infeasibility.
    #[error("solver gave up after {budget:?} without a conclusion")]
    SolverTimeout { budget: Duration },

    #[error("solver error: {0}")]
    Solver(String),
}

impl EngineError {
    /// Stable machine-readable tag, used in HTTP error bodies and job records.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Data(_) => "data",
            EngineError::Config(_) => "config",
            EngineError::InfeasibleSchedule { .. } => "infeasible",
            EngineError::SolverTimeout { .. } => "timeout",
            EngineError::Solver(_) => "solver",
        }
    }
}
