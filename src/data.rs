use chrono::NaiveTime;
use itertools::Itertools;
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fmt;

use crate::error::EngineError;

// Type aliases for clarity
pub type CourseId = String;
pub type FacultyId = String;
pub type RoomId = String;
pub type StudentId = String;
pub type SlotId = u32;

/// Weekly session count used when a course does not state its hours.
pub const DEFAULT_WEEKLY_SESSIONS: u32 = 3;

/// Day of the week. Ordering follows the teaching week, Monday first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
pub enum Day {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl fmt::Display for Day {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A recurring weekly teaching period.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TimeSlot {
    pub id: SlotId,
    pub day: Day,
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeSlot {
    /// Display label such as `09:00-10:00`.
    pub fn label(&self) -> String {
        format!("{}-{}", self.start.format("%H:%M"), self.end.format("%H:%M"))
    }

    /// Length of the slot in hours.
    pub fn hours(&self) -> f64 {
        (self.end - self.start).num_minutes() as f64 / 60.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomKind {
    #[default]
    #[serde(alias = "class")]
    General,
    Lab,
}

/// Represents a physical room with a given capacity.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: RoomId,
    #[serde(default, rename = "type")]
    pub kind: RoomKind,
    pub capacity: u32,
    pub available_slots: BTreeSet<SlotId>,
}

/// Represents a course to be scheduled.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub id: CourseId,
    #[serde(default)]
    pub weekly_hours: Option<u32>,
    #[serde(default)]
    pub needs_lab: bool,
}

impl Course {
    pub fn required_sessions(&self) -> u32 {
        self.weekly_hours.unwrap_or(DEFAULT_WEEKLY_SESSIONS)
    }
}

/// A faculty member, the periods they can teach in and the courses they may teach.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Faculty {
    pub id: FacultyId,
    #[serde(default)]
    pub name: Option<String>,
    pub available_slots: BTreeSet<SlotId>,
    #[serde(default)]
    pub courses: BTreeSet<CourseId>,
}

/// A student's registration for a course under a specific faculty member.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Enrollment {
    pub student_id: StudentId,
    pub course_id: CourseId,
    pub faculty_id: FacultyId,
}

/// Data-access seam for the caller's persistence layer.
pub trait ReferenceData {
    fn list_courses(&self) -> Vec<Course>;
    fn list_faculty(&self) -> Vec<Faculty>;
    fn list_rooms(&self) -> Vec<Room>;
    fn list_time_slots(&self) -> Vec<TimeSlot>;
    fn list_enrollments(&self) -> Vec<Enrollment>;
}

/// Immutable copy of the reference data taken once per solve.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(default)]
    pub courses: Vec<Course>,
    #[serde(default)]
    pub faculty: Vec<Faculty>,
    #[serde(default)]
    pub rooms: Vec<Room>,
    #[serde(default)]
    pub time_slots: Vec<TimeSlot>,
    #[serde(default)]
    pub enrollments: Vec<Enrollment>,
}

impl ReferenceData for Snapshot {
    fn list_courses(&self) -> Vec<Course> {
        self.courses.clone()
    }

    fn list_faculty(&self) -> Vec<Faculty> {
        self.faculty.clone()
    }

    fn list_rooms(&self) -> Vec<Room> {
        self.rooms.clone()
    }

    fn list_time_slots(&self) -> Vec<TimeSlot> {
        self.time_slots.clone()
    }

    fn list_enrollments(&self) -> Vec<Enrollment> {
        self.enrollments.clone()
    }
}

impl Snapshot {
    pub fn capture<D: ReferenceData + ?Sized>(source: &D) -> Self {
        Self {
            courses: source.list_courses(),
            faculty: source.list_faculty(),
            rooms: source.list_rooms(),
            time_slots: source.list_time_slots(),
            enrollments: source.list_enrollments(),
        }
    }

    /// Checks identifiers and cross references. Any failure is fatal to the solve.
    pub fn validate(&self) -> Result<(), EngineError> {
        ensure_unique("course", self.courses.iter().map(|c| c.id.as_str()))?;
        ensure_unique("faculty", self.faculty.iter().map(|f| f.id.as_str()))?;
        ensure_unique("room", self.rooms.iter().map(|r| r.id.as_str()))?;
        ensure_unique(
            "time slot",
            self.time_slots.iter().map(|t| t.id.to_string()),
        )?;

        for slot in &self.time_slots {
            if slot.end <= slot.start {
                return Err(EngineError::Data(format!(
                    "time slot {} ends at {} which is not after its start {}",
                    slot.id, slot.end, slot.start
                )));
            }
        }

        let courses: HashSet<&str> = self.courses.iter().map(|c| c.id.as_str()).collect();
        for enrollment in &self.enrollments {
            if !courses.contains(enrollment.course_id.as_str()) {
                return Err(EngineError::Data(format!(
                    "student {} is enrolled in unknown course {}",
                    enrollment.student_id, enrollment.course_id
                )));
            }
            let Some(faculty) = self.faculty(&enrollment.faculty_id) else {
                return Err(EngineError::Data(format!(
                    "student {} is enrolled in {} under unknown faculty {}",
                    enrollment.student_id, enrollment.course_id, enrollment.faculty_id
                )));
            };
            if !faculty.courses.is_empty() && !faculty.courses.contains(&enrollment.course_id) {
                warn!(
                    "Faculty {} teaches {} but does not list it among their courses",
                    faculty.id,
                    enrollment.course_id
                );
            }
        }
        Ok(())
    }

    pub fn course(&self, id: &str) -> Option<&Course> {
        self.courses.iter().find(|c| c.id == id)
    }

    pub fn faculty(&self, id: &str) -> Option<&Faculty> {
        self.faculty.iter().find(|f| f.id == id)
    }

    pub fn room(&self, id: &str) -> Option<&Room> {
        self.rooms.iter().find(|r| r.id == id)
    }

    pub fn time_slot(&self, id: SlotId) -> Option<&TimeSlot> {
        self.time_slots.iter().find(|t| t.id == id)
    }
}

fn ensure_unique<I, S>(entity: &str, ids: I) -> Result<(), EngineError>
where
    I: Iterator<Item = S>,
    S: AsRef<str> + Clone + Eq + std::hash::Hash,
{
    let duplicates: Vec<S> = ids.duplicates().collect();
    if let Some(first) = duplicates.first() {
        return Err(EngineError::Data(format!(
            "duplicate {entity} id {}",
            first.as_ref()
        )));
    }
    Ok(())
}

/// A (course, faculty) teaching group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupKey {
    pub course_id: CourseId,
    pub faculty_id: FacultyId,
}

impl GroupKey {
    pub fn new(course_id: impl Into<CourseId>, faculty_id: impl Into<FacultyId>) -> Self {
        Self {
            course_id: course_id.into(),
            faculty_id: faculty_id.into(),
        }
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.course_id, self.faculty_id)
    }
}

/// Represents a single scheduled session of a group.
///
/// `faculty_id` is who teaches this session; it equals the group's faculty
/// unless the heuristic solver was allowed to substitute a qualified colleague.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub group: GroupKey,
    pub slot: SlotId,
    pub room_id: RoomId,
    pub faculty_id: FacultyId,
}

/// Every assignment produced by one solve call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Schedule {
    pub assignments: Vec<Assignment>,
}

impl Schedule {
    pub fn new(mut assignments: Vec<Assignment>) -> Self {
        assignments.sort();
        Self { assignments }
    }

    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    pub fn for_group<'a>(&'a self, key: &'a GroupKey) -> impl Iterator<Item = &'a Assignment> + 'a {
        self.assignments.iter().filter(move |a| &a.group == key)
    }
}

/// Why a session group could not be scheduled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum InfeasibilityReason {
    /// Course has no students and no designated faculty.
    NoEnrollment,
    /// Nothing survived candidate filtering. Counts are what remained after each stage.
    #[serde(rename_all = "camelCase")]
    NoCandidates {
        faculty_slots: usize,
        rooms_by_type: usize,
        rooms_by_capacity: usize,
        pairs_by_room_availability: usize,
    },
    /// Fewer distinct candidate slots than required sessions.
    InsufficientSlots { required: u32, available: usize },
}

/// Describes a course or group that was left out of the solve.
///
/// `faculty_id` is absent when no faculty could be attached to the course,
/// e.g. a course nobody enrolled in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InfeasibleGroup {
    pub course_id: CourseId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub faculty_id: Option<FacultyId>,
    pub reason: InfeasibilityReason,
}

impl InfeasibleGroup {
    pub fn for_group(key: &GroupKey, reason: InfeasibilityReason) -> Self {
        Self {
            course_id: key.course_id.clone(),
            faculty_id: Some(key.faculty_id.clone()),
            reason,
        }
    }

    pub fn for_course(course_id: impl Into<CourseId>, reason: InfeasibilityReason) -> Self {
        Self {
            course_id: course_id.into(),
            faculty_id: None,
            reason,
        }
    }

    /// The session group this diagnostic is about, if it got that far.
    pub fn group(&self) -> Option<GroupKey> {
        self.faculty_id
            .as_ref()
            .map(|f| GroupKey::new(self.course_id.clone(), f.clone()))
    }

    fn label(&self) -> String {
        match &self.faculty_id {
            Some(f) => format!("{}/{}", self.course_id, f),
            None => self.course_id.clone(),
        }
    }
}

impl fmt::Display for InfeasibleGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = self.label();
        match &self.reason {
            InfeasibilityReason::NoEnrollment => {
                write!(f, "[{label}] no enrolled students and no designated faculty")
            }
            InfeasibilityReason::NoCandidates {
                faculty_slots,
                rooms_by_type,
                rooms_by_capacity,
                pairs_by_room_availability,
            } => write!(
                f,
                "[{label}] no candidate slot/room: {} faculty slots, {} rooms of the right type, {} large enough, {} pairs with room availability",
                faculty_slots, rooms_by_type, rooms_by_capacity, pairs_by_room_availability
            ),
            InfeasibilityReason::InsufficientSlots {
                required,
                available,
            } => write!(
                f,
                "[{label}] needs {} sessions but only {} candidate slots exist",
                required, available
            ),
        }
    }
}
