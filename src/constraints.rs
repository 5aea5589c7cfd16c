//! The single registry of hard and soft constraints.
//!
//! The genetic solver scores schedules with [`ConstraintSet::evaluate`]; the
//! exact solver walks [`ConstraintSet::hard`] and emits one family of linear
//! constraints per variant. Adding a constraint means adding a variant here
//! and handling it in both places.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

use crate::candidates::room_type_fits;
use crate::config::{ObjectiveConfig, WeeklyTarget};
use crate::model::{Model, Placement};

/// Rules every accepted schedule must satisfy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HardConstraint {
    /// Each group gets exactly its required number of sessions.
    SessionCount,
    /// A faculty member teaches at most one session per slot.
    FacultyExclusive,
    /// A room hosts at most one session per slot.
    RoomExclusive,
    /// A student attends at most one session per slot.
    StudentExclusive,
    /// Slot is open for faculty and room, room has the right type and capacity.
    Availability,
}

impl HardConstraint {
    pub const ALL: [HardConstraint; 5] = [
        HardConstraint::SessionCount,
        HardConstraint::FacultyExclusive,
        HardConstraint::RoomExclusive,
        HardConstraint::StudentExclusive,
        HardConstraint::Availability,
    ];
}

/// Quality rules. Violations cost penalty but never invalidate a schedule.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SoftConstraint {
    /// A student meets the same course twice on one day.
    SameDayRepeat,
    /// Faculty teaching hours on one day above the cap.
    DailyOverload { cap_hours: f64 },
    /// Distance between a faculty member's weekly hours and the target.
    WeeklyImbalance { target: WeeklyTarget },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "class", content = "rule", rename_all = "camelCase")]
pub enum Constraint {
    Hard(HardConstraint),
    Soft(SoftConstraint),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightedConstraint {
    pub constraint: Constraint,
    pub weight: f64,
}

/// Score of one constraint on one schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TermScore {
    pub constraint: Constraint,
    /// Colliding pairs, extra occurrences or excess hours, depending on the rule.
    pub amount: f64,
    pub penalty: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Evaluation {
    pub total: f64,
    pub hard_violations: u64,
    pub terms: Vec<TermScore>,
}

impl Evaluation {
    pub fn is_valid(&self) -> bool {
        self.hard_violations == 0
    }

    pub fn is_perfect(&self) -> bool {
        is_zero(self.total)
    }

    pub fn fitness(&self) -> Fitness {
        self.terms.iter().fold(Fitness::default(), |mut f, t| {
            f.add(t.constraint, t.penalty);
            f
        })
    }
}

/// Penalty split into its hard and soft parts.
///
/// Schedules are ranked on the hard part first; the soft part only breaks
/// ties, so a double-booking is never traded for a better soft score however
/// large the groups involved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fitness {
    pub hard: f64,
    pub soft: f64,
}

impl Fitness {
    /// Ranks below every scored value.
    pub const UNSCORED: Fitness = Fitness {
        hard: f64::INFINITY,
        soft: f64::INFINITY,
    };

    fn add(&mut self, constraint: Constraint, penalty: f64) {
        match constraint {
            Constraint::Hard(_) => self.hard += penalty,
            Constraint::Soft(_) => self.soft += penalty,
        }
    }

    pub fn total(&self) -> f64 {
        self.hard + self.soft
    }

    pub fn is_zero(&self) -> bool {
        is_zero(self.hard) && is_zero(self.soft)
    }

    pub fn total_cmp(&self, other: &Fitness) -> Ordering {
        self.hard
            .total_cmp(&other.hard)
            .then_with(|| self.soft.total_cmp(&other.soft))
    }
}

pub fn is_zero(value: f64) -> bool {
    value.abs() < 1e-9
}

#[derive(Debug, Clone)]
pub struct ConstraintSet {
    terms: Vec<WeightedConstraint>,
}

impl ConstraintSet {
    /// All hard constraints plus the soft constraints enabled in `config`.
    pub fn from_config(config: &ObjectiveConfig) -> Self {
        let w = &config.weights;
        let mut set = Self::hard_only(w.hard);
        set.push(Constraint::Soft(SoftConstraint::SameDayRepeat), w.same_day);
        if let Some(cap_hours) = config.daily_hour_cap {
            set.push(
                Constraint::Soft(SoftConstraint::DailyOverload { cap_hours }),
                w.daily_overload,
            );
        }
        if config.weekly_target != WeeklyTarget::Off {
            set.push(
                Constraint::Soft(SoftConstraint::WeeklyImbalance {
                    target: config.weekly_target,
                }),
                w.weekly_imbalance,
            );
        }
        set
    }

    pub fn hard_only(weight: f64) -> Self {
        Self {
            terms: HardConstraint::ALL
                .iter()
                .map(|h| WeightedConstraint {
                    constraint: Constraint::Hard(*h),
                    weight,
                })
                .collect(),
        }
    }

    pub fn push(&mut self, constraint: Constraint, weight: f64) {
        self.terms.push(WeightedConstraint { constraint, weight });
    }

    pub fn terms(&self) -> &[WeightedConstraint] {
        &self.terms
    }

    pub fn hard(&self) -> impl Iterator<Item = HardConstraint> + '_ {
        self.terms.iter().filter_map(|t| match t.constraint {
            Constraint::Hard(h) => Some(h),
            Constraint::Soft(_) => None,
        })
    }

    pub fn evaluate(&self, model: &Model, placements: &[Placement]) -> Evaluation {
        let mut total = 0.0;
        let mut hard_violations = 0;
        let terms = self
            .terms
            .iter()
            .map(|t| {
                let amount = measure(t.constraint, model, placements);
                let penalty = amount * t.weight;
                total += penalty;
                if let Constraint::Hard(_) = t.constraint {
                    hard_violations += amount.round() as u64;
                }
                TermScore {
                    constraint: t.constraint,
                    amount,
                    penalty,
                }
            })
            .collect();
        Evaluation {
            total,
            hard_violations,
            terms,
        }
    }

    /// Hard and soft penalty without the per-term breakdown; what the
    /// population search minimises.
    pub fn fitness(&self, model: &Model, placements: &[Placement]) -> Fitness {
        self.terms.iter().fold(Fitness::default(), |mut f, t| {
            f.add(t.constraint, measure(t.constraint, model, placements) * t.weight);
            f
        })
    }
}

fn measure(constraint: Constraint, model: &Model, placements: &[Placement]) -> f64 {
    match constraint {
        Constraint::Hard(HardConstraint::SessionCount) => {
            let mut counts = vec![0i64; model.groups.len()];
            for p in placements {
                counts[p.group] += 1;
            }
            model
                .groups
                .iter()
                .zip(counts)
                .map(|(g, n)| (n - g.group.required_sessions as i64).unsigned_abs() as f64)
                .sum()
        }
        Constraint::Hard(HardConstraint::FacultyExclusive) => {
            colliding_pairs(placements.iter().map(|p| (p.faculty, p.slot)))
        }
        Constraint::Hard(HardConstraint::RoomExclusive) => {
            colliding_pairs(placements.iter().map(|p| (p.room, p.slot)))
        }
        Constraint::Hard(HardConstraint::StudentExclusive) => colliding_pairs(
            placements.iter().flat_map(|p| {
                model.groups[p.group]
                    .students
                    .iter()
                    .map(move |s| (*s, p.slot))
            }),
        ),
        Constraint::Hard(HardConstraint::Availability) => placements
            .iter()
            .filter(|p| !is_available(model, p))
            .count() as f64,
        Constraint::Soft(SoftConstraint::SameDayRepeat) => {
            let mut counts: HashMap<(usize, usize, _), u32> = HashMap::new();
            for p in placements {
                let entry = &model.groups[p.group];
                let day = model.slots[p.slot].day;
                for s in &entry.students {
                    *counts.entry((*s, entry.course, day)).or_insert(0) += 1;
                }
            }
            counts.values().map(|n| n.saturating_sub(1) as f64).sum()
        }
        Constraint::Soft(SoftConstraint::DailyOverload { cap_hours }) => {
            let mut hours: BTreeMap<(usize, _), f64> = BTreeMap::new();
            for p in placements {
                *hours.entry((p.faculty, model.slots[p.slot].day)).or_insert(0.0) +=
                    model.slot_hours(p.slot);
            }
            hours.values().map(|h| (h - cap_hours).max(0.0)).sum()
        }
        Constraint::Soft(SoftConstraint::WeeklyImbalance { target }) => {
            weekly_imbalance(model, placements, target)
        }
    }
}

fn colliding_pairs<K: Hash + Eq>(keys: impl Iterator<Item = K>) -> f64 {
    let mut counts: HashMap<K, u64> = HashMap::new();
    for key in keys {
        *counts.entry(key).or_insert(0) += 1;
    }
    counts.values().map(|n| (n * n.saturating_sub(1) / 2) as f64).sum()
}

fn is_available(model: &Model, p: &Placement) -> bool {
    let slot = model.slots[p.slot].id;
    let room = &model.rooms[p.room];
    let group = &model.groups[p.group].group;
    model.faculty[p.faculty].available_slots.contains(&slot)
        && room.available_slots.contains(&slot)
        && room.capacity >= group.size()
        && room_type_fits(group.needs_lab, room.kind)
}

fn weekly_imbalance(model: &Model, placements: &[Placement], target: WeeklyTarget) -> f64 {
    if model.active_faculty.is_empty() {
        return 0.0;
    }
    let mut hours: BTreeMap<usize, f64> =
        model.active_faculty.iter().map(|f| (*f, 0.0)).collect();
    for p in placements {
        *hours.entry(p.faculty).or_insert(0.0) += model.slot_hours(p.slot);
    }
    let target = match target {
        WeeklyTarget::Off => return 0.0,
        WeeklyTarget::Fixed(h) => h,
        WeeklyTarget::Mean => hours.values().sum::<f64>() / hours.len() as f64,
    };
    hours.values().map(|h| (h - target).abs()).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PenaltyWeights, UnenrolledPolicy};
    use crate::model::tests::campus;

    fn model() -> Model {
        Model::build(&campus(), &UnenrolledPolicy::default(), false).unwrap()
    }

    fn at(group: usize, faculty: usize, slot: usize, room: usize) -> Placement {
        Placement {
            group,
            faculty,
            slot,
            room,
        }
    }

    fn amount(eval: &Evaluation, constraint: Constraint) -> f64 {
        eval.terms
            .iter()
            .find(|t| t.constraint == constraint)
            .map(|t| t.amount)
            .unwrap()
    }

    #[test]
    fn clean_schedule_scores_zero() {
        let set = ConstraintSet::from_config(&ObjectiveConfig {
            weekly_target: WeeklyTarget::Off,
            ..ObjectiveConfig::default()
        });
        // CSE101 on Monday and Tuesday, PHY102 in the lab on Tuesday 10:00.
        let schedule = [at(0, 0, 0, 0), at(0, 0, 2, 0), at(1, 1, 3, 1)];
        let eval = set.evaluate(&model(), &schedule);
        assert!(eval.is_valid());
        assert!(eval.is_perfect(), "{eval:?}");
    }

    #[test]
    fn counts_faculty_and_room_collisions() {
        let set = ConstraintSet::hard_only(1000.0);
        let schedule = [at(0, 0, 0, 0), at(0, 0, 0, 0)];
        let eval = set.evaluate(&model(), &schedule);
        assert_eq!(
            amount(&eval, Constraint::Hard(HardConstraint::FacultyExclusive)),
            1.0
        );
        assert_eq!(amount(&eval, Constraint::Hard(HardConstraint::RoomExclusive)), 1.0);
        // 20 students meet themselves in the same slot; PHY102 is missing a session.
        assert_eq!(
            amount(&eval, Constraint::Hard(HardConstraint::StudentExclusive)),
            20.0
        );
        assert_eq!(amount(&eval, Constraint::Hard(HardConstraint::SessionCount)), 1.0);
        assert_eq!(eval.hard_violations, 23);
        assert_eq!(eval.total, 23_000.0);
    }

    #[test]
    fn shared_students_collide_across_groups() {
        let set = ConstraintSet::hard_only(1.0);
        // S15..S20 are in both groups.
        let schedule = [at(0, 0, 0, 0), at(0, 0, 2, 0), at(1, 1, 0, 1)];
        let eval = set.evaluate(&model(), &schedule);
        assert_eq!(
            amount(&eval, Constraint::Hard(HardConstraint::StudentExclusive)),
            6.0
        );
    }

    #[test]
    fn unavailable_slot_is_a_hard_violation() {
        let set = ConstraintSet::hard_only(1.0);
        // P2 is away in slot 1 and R101 is not a lab: one placement, one violation.
        let schedule = [at(0, 0, 0, 0), at(0, 0, 2, 0), at(1, 1, 1, 0)];
        let eval = set.evaluate(&model(), &schedule);
        assert_eq!(amount(&eval, Constraint::Hard(HardConstraint::Availability)), 1.0);
    }

    #[test]
    fn same_day_repeat_and_daily_cap() {
        let set = ConstraintSet::from_config(&ObjectiveConfig {
            daily_hour_cap: Some(1.0),
            weekly_target: WeeklyTarget::Off,
            ..ObjectiveConfig::default()
        });
        let schedule = [at(0, 0, 0, 0), at(0, 0, 1, 0), at(1, 1, 3, 1)];
        let eval = set.evaluate(&model(), &schedule);
        assert!(eval.is_valid());
        assert_eq!(
            amount(&eval, Constraint::Soft(SoftConstraint::SameDayRepeat)),
            20.0
        );
        assert_eq!(
            amount(
                &eval,
                Constraint::Soft(SoftConstraint::DailyOverload { cap_hours: 1.0 })
            ),
            1.0
        );
        assert_eq!(eval.total, 20.0 * 10.0 + 5.0);
    }

    #[test]
    fn weekly_imbalance_against_mean_and_fixed_target() {
        let schedule = [at(0, 0, 0, 0), at(0, 0, 2, 0), at(1, 1, 3, 1)];
        let m = model();
        // P1 teaches 2h, P2 1h, mean 1.5h.
        assert_eq!(weekly_imbalance(&m, &schedule, WeeklyTarget::Mean), 1.0);
        assert_eq!(weekly_imbalance(&m, &schedule, WeeklyTarget::Fixed(20.0)), 37.0);
        assert_eq!(weekly_imbalance(&m, &schedule, WeeklyTarget::Off), 0.0);
    }

    #[test]
    fn hard_penalty_outranks_any_soft_penalty() {
        let set = ConstraintSet::from_config(&ObjectiveConfig {
            weights: PenaltyWeights {
                same_day: 999.0,
                ..PenaltyWeights::default()
            },
            weekly_target: WeeklyTarget::Off,
            ..ObjectiveConfig::default()
        });
        let m = model();
        // Valid, but all 20 CSE101 students meet twice on Monday.
        let repeat = set.fitness(&m, &[at(0, 0, 0, 0), at(0, 0, 1, 0), at(1, 1, 3, 1)]);
        // S15..S20 are double-booked in slot 0.
        let clash = set.fitness(&m, &[at(0, 0, 0, 0), at(0, 0, 2, 0), at(1, 1, 0, 1)]);
        assert_eq!(repeat.hard, 0.0);
        assert_eq!(clash.hard, 6000.0);
        assert!(repeat.total() > clash.total());
        assert_eq!(repeat.total_cmp(&clash), Ordering::Less);
        assert_eq!(clash.total_cmp(&Fitness::UNSCORED), Ordering::Less);
    }

    #[test]
    fn fitness_matches_the_evaluation() {
        let set = ConstraintSet::from_config(&ObjectiveConfig::default());
        let m = model();
        let schedule = [at(0, 0, 0, 0), at(0, 0, 0, 0), at(1, 1, 3, 1)];
        let eval = set.evaluate(&m, &schedule);
        assert_eq!(set.fitness(&m, &schedule), eval.fitness());
        assert_eq!(eval.fitness().hard, eval.hard_violations as f64 * 1000.0);
    }

    #[test]
    fn hard_iterator_lists_every_hard_rule() {
        let set = ConstraintSet::from_config(&ObjectiveConfig::default());
        assert_eq!(set.hard().count(), 5);
        assert_eq!(set.terms().len(), 8);
    }
}
