//! Engine entry point.
//!
//! `solve` snapshots the reference data, builds the model, runs the selected
//! solver and returns the schedule with its diagnostics and metadata. Nothing
//! is kept between calls.

use log::info;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::config::{EngineConfig, SolverConfig};
use crate::constraints::{ConstraintSet, Evaluation, Fitness};
use crate::data::{InfeasibleGroup, ReferenceData, Schedule, Snapshot};
use crate::error::EngineError;
use crate::exact;
use crate::genetic::GeneticSolver;
use crate::model::{Model, Placement};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SolverKind {
    Heuristic,
    Exact,
}

/// How much the caller can trust the returned schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    /// Proven minimum.
    Optimal,
    /// Satisfies every hard constraint, optimality unproven.
    Feasible,
    /// No schedule satisfies the hard constraints.
    Infeasible,
    /// Budget spent without a valid schedule or a proof.
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub solver: SolverKind,
    pub outcome: Outcome,
    /// Number of assignments for the exact solver, total penalty for the heuristic.
    pub objective: f64,
    pub hard_violations: u64,
    pub generations: Option<usize>,
    pub elapsed_ms: u64,
    /// Best fitness of each generation (heuristic only).
    pub fitness_history: Vec<Fitness>,
    pub evaluation: Evaluation,
}

/// The result of one solve call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Solution {
    pub schedule: Schedule,
    pub diagnostics: Vec<InfeasibleGroup>,
    pub metadata: Metadata,
}

impl Solution {
    pub fn is_valid(&self) -> bool {
        self.metadata.hard_violations == 0
    }
}

pub fn solve<D: ReferenceData + ?Sized>(
    data: &D,
    config: &EngineConfig,
) -> Result<Solution, EngineError> {
    config.validate()?;
    let start = Instant::now();
    let snapshot = Snapshot::capture(data);
    let model = Model::build(&snapshot, &config.unenrolled, allows_substitution(config))?;
    let constraints = ConstraintSet::from_config(&config.objective);

    let mut solution = match &config.solver {
        SolverConfig::Heuristic(ga) => {
            let run = GeneticSolver::new(&model, &constraints, ga).run();
            let evaluation = constraints.evaluate(&model, &run.best.genes);
            let outcome = if evaluation.is_valid() {
                Outcome::Feasible
            } else {
                Outcome::Unknown
            };
            finish(
                &model,
                &run.best.genes,
                Metadata {
                    solver: SolverKind::Heuristic,
                    outcome,
                    objective: evaluation.total,
                    hard_violations: evaluation.hard_violations,
                    generations: Some(run.generations),
                    elapsed_ms: 0,
                    fitness_history: run.history,
                    evaluation,
                },
            )
        }
        SolverConfig::Exact(exact_config) => {
            let run = exact::solve(&model, &constraints, exact_config)?;
            let evaluation = constraints.evaluate(&model, &run.placements);
            // The per-group equalities pin the objective, so any valid result is minimal.
            finish(
                &model,
                &run.placements,
                Metadata {
                    solver: SolverKind::Exact,
                    outcome: Outcome::Optimal,
                    objective: run.placements.len() as f64,
                    hard_violations: evaluation.hard_violations,
                    generations: None,
                    elapsed_ms: 0,
                    fitness_history: Vec::new(),
                    evaluation,
                },
            )
        }
    };

    solution.metadata.elapsed_ms = start.elapsed().as_millis() as u64;
    info!(
        "Solve finished: {:?} with {} assignments, {} diagnostics, objective {}",
        solution.metadata.outcome,
        solution.schedule.len(),
        solution.diagnostics.len(),
        solution.metadata.objective
    );
    Ok(solution)
}

fn allows_substitution(config: &EngineConfig) -> bool {
    matches!(&config.solver, SolverConfig::Heuristic(ga) if ga.allow_faculty_substitution)
}

fn finish(model: &Model, placements: &[Placement], metadata: Metadata) -> Solution {
    Solution {
        schedule: model.to_schedule(placements),
        diagnostics: model.diagnostics.clone(),
        metadata,
    }
}

/// Scores an existing schedule against the reference data, e.g. a stored
/// timetable the caller is considering reusing.
pub fn evaluate<D: ReferenceData + ?Sized>(
    data: &D,
    schedule: &Schedule,
    config: &EngineConfig,
) -> Result<Evaluation, EngineError> {
    config.validate()?;
    let snapshot = Snapshot::capture(data);
    let model = Model::build(&snapshot, &config.unenrolled, allows_substitution(config))?;
    let placements = schedule
        .assignments
        .iter()
        .map(|a| model.to_placement(a))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ConstraintSet::from_config(&config.objective).evaluate(&model, &placements))
}
