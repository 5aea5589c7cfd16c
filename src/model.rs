//! Index-based view of one solve's input.
//!
//! Both solvers and the constraint evaluator work on [`Placement`]s, which
//! refer to groups, faculty, slots and rooms by position in the [`Model`]
//! tables. Conversion to and from id-based [`Assignment`]s happens only at the
//! edges.

use log::{debug, warn};
use std::collections::{BTreeSet, HashMap};

use crate::candidates::{self, Candidate};
use crate::config::UnenrolledPolicy;
use crate::data::{
    Assignment, Faculty, GroupKey, InfeasibleGroup, Room, Schedule, Snapshot, StudentId,
    TimeSlot,
};
use crate::error::EngineError;
use crate::groups::{self, SessionGroup};

/// One scheduled session in index form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Placement {
    pub group: usize,
    pub faculty: usize,
    pub slot: usize,
    pub room: usize,
}

/// A faculty member who may teach a group, with the (slot, room) pairs open to them.
#[derive(Debug, Clone)]
pub struct TeachingOption {
    pub faculty: usize,
    pub pairs: Vec<(usize, usize)>,
}

#[derive(Debug, Clone)]
pub struct GroupEntry {
    pub group: SessionGroup,
    pub course: usize,
    /// Faculty named in the group key.
    pub faculty: usize,
    pub students: Vec<usize>,
    /// Static candidates for the group's own faculty.
    pub candidates: Vec<Candidate>,
    /// First option is always the group's own faculty.
    pub options: Vec<TeachingOption>,
}

#[derive(Debug, Clone)]
pub struct Model {
    pub slots: Vec<TimeSlot>,
    pub rooms: Vec<Room>,
    pub faculty: Vec<Faculty>,
    pub students: Vec<StudentId>,
    pub courses: Vec<String>,
    pub groups: Vec<GroupEntry>,
    /// Faculty that teach at least one group in this model, sorted.
    pub active_faculty: Vec<usize>,
    pub diagnostics: Vec<InfeasibleGroup>,
    slot_index: HashMap<u32, usize>,
    room_index: HashMap<String, usize>,
    faculty_index: HashMap<String, usize>,
    group_index: HashMap<GroupKey, usize>,
}

impl Model {
    /// Groups the enrollments and computes every group's candidates.
    ///
    /// Groups without candidates are moved to `diagnostics`; the rest of the
    /// model is still usable.
    pub fn build(
        data: &Snapshot,
        policy: &UnenrolledPolicy,
        allow_substitution: bool,
    ) -> Result<Self, EngineError> {
        data.validate()?;
        let plan = groups::build_groups(&data.enrollments, &data.courses, &data.faculty, policy)?;

        let mut slots = data.time_slots.clone();
        slots.sort_by_key(|t| t.id);
        let slot_index: HashMap<u32, usize> =
            slots.iter().enumerate().map(|(i, t)| (t.id, i)).collect();
        let room_index: HashMap<String, usize> = data
            .rooms
            .iter()
            .enumerate()
            .map(|(i, r)| (r.id.clone(), i))
            .collect();
        let faculty_index: HashMap<String, usize> = data
            .faculty
            .iter()
            .enumerate()
            .map(|(i, f)| (f.id.clone(), i))
            .collect();

        let mut diagnostics = plan.skipped;
        let mut students: Vec<StudentId> = Vec::new();
        let mut student_index: HashMap<StudentId, usize> = HashMap::new();
        let mut courses: Vec<String> = Vec::new();
        let mut course_index: HashMap<String, usize> = HashMap::new();
        let mut entries = Vec::new();
        let mut active = BTreeSet::new();

        for group in plan.groups {
            let Some(&faculty) = faculty_index.get(&group.key.faculty_id) else {
                return Err(EngineError::Data(format!(
                    "group {} names unknown faculty",
                    group.key
                )));
            };
            let candidates =
                match candidates::generate(&group, &slots, &data.rooms, &data.faculty[faculty]) {
                    Ok(c) => c,
                    Err(diagnostic) => {
                        warn!("{diagnostic}");
                        diagnostics.push(diagnostic);
                        continue;
                    }
                };

            let pairs = candidates
                .iter()
                .map(|c| (slot_index[&c.slot], room_index[&c.room]))
                .collect();
            let mut options = vec![TeachingOption { faculty, pairs }];
            if allow_substitution {
                for (idx, other) in data.faculty.iter().enumerate() {
                    if idx == faculty || !other.courses.contains(&group.key.course_id) {
                        continue;
                    }
                    if let Ok(found) = candidates::generate(&group, &slots, &data.rooms, other) {
                        let pairs = found
                            .iter()
                            .map(|c| (slot_index[&c.slot], room_index[&c.room]))
                            .collect();
                        options.push(TeachingOption { faculty: idx, pairs });
                    }
                }
            }
            active.extend(options.iter().map(|o| o.faculty));

            let course = *course_index
                .entry(group.key.course_id.clone())
                .or_insert_with(|| {
                    courses.push(group.key.course_id.clone());
                    courses.len() - 1
                });
            let roster = group
                .students
                .iter()
                .map(|s| {
                    *student_index.entry(s.clone()).or_insert_with(|| {
                        students.push(s.clone());
                        students.len() - 1
                    })
                })
                .collect();

            entries.push(GroupEntry {
                group,
                course,
                faculty,
                students: roster,
                candidates,
                options,
            });
        }

        let group_index = entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.group.key.clone(), i))
            .collect();
        debug!(
            "Model has {} schedulable groups, {} sessions, {} diagnostics",
            entries.len(),
            entries
                .iter()
                .map(|e| e.group.required_sessions as usize)
                .sum::<usize>(),
            diagnostics.len()
        );

        Ok(Self {
            slots,
            rooms: data.rooms.clone(),
            faculty: data.faculty.clone(),
            students,
            courses,
            groups: entries,
            active_faculty: active.into_iter().collect(),
            diagnostics,
            slot_index,
            room_index,
            faculty_index,
            group_index,
        })
    }

    /// Total number of sessions that must be placed.
    pub fn session_count(&self) -> usize {
        self.groups
            .iter()
            .map(|g| g.group.required_sessions as usize)
            .sum()
    }

    pub fn to_assignment(&self, p: &Placement) -> Assignment {
        Assignment {
            group: self.groups[p.group].group.key.clone(),
            slot: self.slots[p.slot].id,
            room_id: self.rooms[p.room].id.clone(),
            faculty_id: self.faculty[p.faculty].id.clone(),
        }
    }

    pub fn to_schedule(&self, placements: &[Placement]) -> Schedule {
        Schedule::new(placements.iter().map(|p| self.to_assignment(p)).collect())
    }

    pub fn to_placement(&self, a: &Assignment) -> Result<Placement, EngineError> {
        let unknown = |what: &str| {
            EngineError::Data(format!(
                "assignment {} at slot {} in {} references unknown {what}",
                a.group, a.slot, a.room_id
            ))
        };
        Ok(Placement {
            group: *self.group_index.get(&a.group).ok_or_else(|| unknown("group"))?,
            faculty: *self
                .faculty_index
                .get(&a.faculty_id)
                .ok_or_else(|| unknown("faculty"))?,
            slot: *self.slot_index.get(&a.slot).ok_or_else(|| unknown("slot"))?,
            room: *self.room_index.get(&a.room_id).ok_or_else(|| unknown("room"))?,
        })
    }

    pub fn slot_hours(&self, slot: usize) -> f64 {
        self.slots[slot].hours()
    }
}
