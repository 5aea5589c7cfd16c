use good_lp::variable;
use good_lp::{
    Expression, ProblemVariables, ResolutionError, Solution, SolverModel, Variable, constraint,
    default_solver,
};
use log::{debug, info, trace, warn};
use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant};

use crate::config::ExactConfig;
use crate::constraints::{ConstraintSet, HardConstraint};
use crate::error::EngineError;
use crate::model::{Model, Placement};

/// What the ILP produced for a model.
#[derive(Debug, Clone)]
pub struct ExactRun {
    pub placements: Vec<Placement>,
    pub elapsed: Duration,
}

/// Solves the timetable exactly using the HiGHS ILP solver.
///
/// One binary decision per static candidate, hard constraints as linear
/// (in)equalities, objective = number of chosen candidates. Proven
/// infeasibility and an exhausted time budget are reported as distinct errors.
pub fn solve(
    model: &Model,
    constraints: &ConstraintSet,
    config: &ExactConfig,
) -> Result<ExactRun, EngineError> {
    let start_time = Instant::now();

    // x_gsr =  1 if group g meets in slot s and room r
    //          0 otherwise
    let decisions: Vec<Placement> = model
        .groups
        .iter()
        .enumerate()
        .flat_map(|(g, entry)| {
            entry.options[0].pairs.iter().map(move |&(slot, room)| Placement {
                group: g,
                faculty: entry.faculty,
                slot,
                room,
            })
        })
        .collect();
    info!(
        "Setting up ILP model with {} groups, {} rooms, {} timeslots and {} decisions...",
        model.groups.len(),
        model.rooms.len(),
        model.slots.len(),
        decisions.len()
    );
    if decisions.is_empty() {
        // HiGHS rejects empty models; nothing left to schedule is trivially optimal.
        return Ok(ExactRun {
            placements: Vec::new(),
            elapsed: start_time.elapsed(),
        });
    }

    let mut problem = ProblemVariables::new();
    let vars: Vec<Variable> = problem.add_vector(variable().binary(), decisions.len());

    let objective: Expression = vars.iter().copied().sum();
    let mut ilp = problem
        .minimise(objective)
        .using(default_solver)
        .set_option("time_limit", config.time_limit_secs)
        .set_option("threads", config.threads.min(i32::MAX as u32) as i32)
        .set_option("random_seed", (config.seed % i32::MAX as u64) as i32) // seed for reproducibility
        .set_option(
            "log_to_console",
            if config.log_to_console { "true" } else { "false" },
        );

    let mut rows = 0usize;
    for hard in constraints.hard() {
        let families = decision_families(hard, model, &decisions);
        match hard {
            HardConstraint::SessionCount => {
                info!("Adding 'required sessions per group' constraints...");
                for (g, members) in families {
                    let required = model.groups[g].group.required_sessions as f64;
                    let scheduled: Expression = members.iter().map(|&i| vars[i]).sum();
                    ilp.add_constraint(constraint!(scheduled == required));
                    rows += 1;
                }
            }
            HardConstraint::FacultyExclusive
            | HardConstraint::RoomExclusive
            | HardConstraint::StudentExclusive => {
                info!("Adding '{hard:?}' constraints...");
                for (_, members) in families {
                    let occupied: Expression = members.iter().map(|&i| vars[i]).sum();
                    ilp.add_constraint(constraint!(occupied <= 1));
                    rows += 1;
                }
            }
            HardConstraint::Availability => {
                trace!("Availability holds for every candidate by construction");
            }
        }
    }
    debug!("ILP has {} variables and {} constraint rows", vars.len(), rows);

    //solve
    info!("Starting ILP solver...");
    let budget = config.time_limit();
    let solution = ilp
        .solve()
        .map_err(|e| resolution_failure(e, start_time.elapsed(), budget, model))?;
    let duration = start_time.elapsed();
    info!("Solution found in {:.2?}", duration);

    // get placements from solution
    let placements: Vec<Placement> = decisions
        .iter()
        .zip(&vars)
        .filter(|(_, var)| solution.value(**var) > 0.9)
        .map(|(p, _)| *p)
        .collect();

    Ok(ExactRun {
        placements: confirm(model, placements, budget)?,
        elapsed: duration,
    })
}

/// Sorts out why HiGHS returned no solution.
fn resolution_failure(
    e: ResolutionError,
    elapsed: Duration,
    budget: Duration,
    model: &Model,
) -> EngineError {
    match e {
        ResolutionError::Infeasible => {
            warn!("ILP proved infeasible after {:.2?}", elapsed);
            EngineError::InfeasibleSchedule {
                diagnostics: model.diagnostics.clone(),
            }
        }
        e if elapsed >= budget => {
            warn!("ILP stopped at the time budget without a result: {e}");
            EngineError::SolverTimeout { budget }
        }
        e => EngineError::Solver(e.to_string()),
    }
}

/// Re-checks the extracted assignment against the hard rules.
///
/// A run cut short by the time limit may report values that violate the rows;
/// such a result is undetermined, not a schedule.
fn confirm(
    model: &Model,
    mut placements: Vec<Placement>,
    budget: Duration,
) -> Result<Vec<Placement>, EngineError> {
    placements.sort();
    let check = ConstraintSet::hard_only(1.0).evaluate(model, &placements);
    if !check.is_valid() {
        warn!(
            "ILP returned an assignment with {} hard violations; treating as undetermined",
            check.hard_violations
        );
        return Err(EngineError::SolverTimeout { budget });
    }
    Ok(placements)
}

/// Decision indices grouped by the key a hard constraint sums over.
///
/// Families with a single member are dropped for the `<= 1` rules. Student
/// families are deduplicated since most students share the same group set.
fn decision_families(
    hard: HardConstraint,
    model: &Model,
    decisions: &[Placement],
) -> Vec<(usize, Vec<usize>)> {
    let mut keyed: BTreeMap<(usize, usize), Vec<usize>> = BTreeMap::new();
    match hard {
        HardConstraint::SessionCount => {
            for (i, p) in decisions.iter().enumerate() {
                keyed.entry((p.group, 0)).or_default().push(i);
            }
            return keyed.into_iter().map(|((g, _), m)| (g, m)).collect();
        }
        HardConstraint::FacultyExclusive => {
            for (i, p) in decisions.iter().enumerate() {
                keyed.entry((p.faculty, p.slot)).or_default().push(i);
            }
        }
        HardConstraint::RoomExclusive => {
            for (i, p) in decisions.iter().enumerate() {
                keyed.entry((p.room, p.slot)).or_default().push(i);
            }
        }
        HardConstraint::StudentExclusive => {
            for (i, p) in decisions.iter().enumerate() {
                for s in &model.groups[p.group].students {
                    keyed.entry((*s, p.slot)).or_default().push(i);
                }
            }
            let mut seen = BTreeSet::new();
            return keyed
                .into_iter()
                .filter(|(_, m)| m.len() > 1 && seen.insert(m.clone()))
                .map(|((s, _), m)| (s, m))
                .collect();
        }
        HardConstraint::Availability => return Vec::new(),
    }
    keyed
        .into_iter()
        .filter(|(_, m)| m.len() > 1)
        .map(|((k, _), m)| (k, m))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ObjectiveConfig, UnenrolledPolicy};
    use crate::model::tests::campus;

    fn model() -> Model {
        Model::build(&campus(), &UnenrolledPolicy::default(), false).unwrap()
    }

    fn decisions(model: &Model) -> Vec<Placement> {
        model
            .groups
            .iter()
            .enumerate()
            .flat_map(|(g, e)| {
                e.options[0].pairs.iter().map(move |&(slot, room)| Placement {
                    group: g,
                    faculty: e.faculty,
                    slot,
                    room,
                })
            })
            .collect()
    }

    #[test]
    fn session_families_cover_every_group() {
        let m = model();
        let d = decisions(&m);
        let families = decision_families(HardConstraint::SessionCount, &m, &d);
        assert_eq!(families.len(), 2);
        let total: usize = families.iter().map(|(_, f)| f.len()).sum();
        assert_eq!(total, d.len());
    }

    #[test]
    fn student_families_are_deduplicated() {
        let m = model();
        let d = decisions(&m);
        let families = decision_families(HardConstraint::StudentExclusive, &m, &d);
        let distinct: BTreeSet<&Vec<usize>> = families.iter().map(|(_, f)| f).collect();
        assert_eq!(distinct.len(), families.len());
        assert!(families.iter().all(|(_, f)| f.len() > 1));
    }

    #[test]
    fn clashing_extraction_is_undetermined() {
        let m = model();
        let budget = Duration::from_secs(10);
        // Both CSE101 sessions in slot 0: a faculty, room and student clash.
        let clash = vec![
            Placement {
                group: 0,
                faculty: 0,
                slot: 0,
                room: 0,
            };
            2
        ];
        assert!(matches!(
            confirm(&m, clash, budget),
            Err(EngineError::SolverTimeout { budget: b }) if b == budget
        ));

        let at = |group, faculty, slot, room| Placement {
            group,
            faculty,
            slot,
            room,
        };
        let valid = vec![at(1, 1, 3, 1), at(0, 0, 2, 0), at(0, 0, 0, 0)];
        let confirmed = confirm(&m, valid, budget).unwrap();
        assert_eq!(confirmed, vec![at(0, 0, 0, 0), at(0, 0, 2, 0), at(1, 1, 3, 1)]);
    }

    #[test]
    fn solver_failures_are_classified() {
        let m = model();
        let budget = Duration::from_secs(1);
        assert!(matches!(
            resolution_failure(ResolutionError::Infeasible, Duration::ZERO, budget, &m),
            EngineError::InfeasibleSchedule { .. }
        ));
        assert!(matches!(
            resolution_failure(
                ResolutionError::Other("no incumbent"),
                Duration::from_secs(2),
                budget,
                &m
            ),
            EngineError::SolverTimeout { .. }
        ));
        assert!(matches!(
            resolution_failure(
                ResolutionError::Other("backend crashed"),
                Duration::from_millis(5),
                budget,
                &m
            ),
            EngineError::Solver(_)
        ));
    }

    #[test]
    fn solves_the_campus() {
        let m = model();
        let set = ConstraintSet::from_config(&ObjectiveConfig::default());
        let run = solve(&m, &set, &ExactConfig::default()).unwrap();
        assert_eq!(run.placements.len(), 3);
        assert!(ConstraintSet::hard_only(1.0).evaluate(&m, &run.placements).is_valid());
    }
}
