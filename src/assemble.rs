//! Turns a flat schedule into the day → time → course → sections view the
//! timetable screens consume, and narrows it to one student or faculty member.

use chrono::NaiveTime;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::data::{
    Assignment, CourseId, Day, FacultyId, GroupKey, ReferenceData, RoomId, Schedule, SlotId,
    Snapshot, StudentId,
};
use crate::error::EngineError;

/// One room/faculty pairing of a course in a period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    pub room_id: RoomId,
    pub faculty_id: FacultyId,
    pub faculty_name: Option<String>,
    pub group: GroupKey,
    pub slot: SlotId,
    /// Roster of the session group, sorted.
    pub students: Vec<StudentId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseEntry {
    pub course_id: CourseId,
    pub sections: Vec<Section>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Period {
    pub label: String,
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub courses: Vec<CourseEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DayEntry {
    pub day: Day,
    pub periods: Vec<Period>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimetableView {
    pub days: Vec<DayEntry>,
    /// Always equal to the number of assignments that went in.
    pub total_sessions: usize,
}

impl TimetableView {
    /// Back to the flat assignment list, in schedule order.
    pub fn flatten(&self) -> Vec<Assignment> {
        let mut assignments: Vec<Assignment> = self
            .days
            .iter()
            .flat_map(|d| &d.periods)
            .flat_map(|p| &p.courses)
            .flat_map(|c| &c.sections)
            .map(|s| Assignment {
                group: s.group.clone(),
                slot: s.slot,
                room_id: s.room_id.clone(),
                faculty_id: s.faculty_id.clone(),
            })
            .collect();
        assignments.sort();
        assignments
    }
}

/// Whose timetable to show.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", content = "id", rename_all = "camelCase")]
pub enum Viewer {
    Student(StudentId),
    Faculty(FacultyId),
}

impl Viewer {
    fn attends(&self, section: &Section) -> bool {
        match self {
            Viewer::Student(id) => section.students.binary_search(id).is_ok(),
            Viewer::Faculty(id) => &section.faculty_id == id,
        }
    }
}

impl TimetableView {
    /// The sessions `viewer` takes part in. Empty courses, periods and days are dropped.
    pub fn for_viewer(&self, viewer: &Viewer) -> TimetableView {
        let days: Vec<DayEntry> = self
            .days
            .iter()
            .filter_map(|day| {
                let periods: Vec<Period> = day
                    .periods
                    .iter()
                    .filter_map(|period| {
                        let courses: Vec<CourseEntry> = period
                            .courses
                            .iter()
                            .filter_map(|course| {
                                let sections: Vec<Section> = course
                                    .sections
                                    .iter()
                                    .filter(|s| viewer.attends(s))
                                    .cloned()
                                    .collect();
                                (!sections.is_empty()).then(|| CourseEntry {
                                    course_id: course.course_id.clone(),
                                    sections,
                                })
                            })
                            .collect();
                        (!courses.is_empty()).then(|| Period {
                            label: period.label.clone(),
                            start: period.start,
                            end: period.end,
                            courses,
                        })
                    })
                    .collect();
                (!periods.is_empty()).then_some(DayEntry {
                    day: day.day,
                    periods,
                })
            })
            .collect();
        let total_sessions = days
            .iter()
            .flat_map(|d| &d.periods)
            .flat_map(|p| &p.courses)
            .map(|c| c.sections.len())
            .sum();
        TimetableView {
            days,
            total_sessions,
        }
    }
}

type PeriodKey = (NaiveTime, NaiveTime);

pub fn assemble<D: ReferenceData + ?Sized>(
    schedule: &Schedule,
    data: &D,
) -> Result<TimetableView, EngineError> {
    let data = Snapshot::capture(data);
    let rosters: HashMap<GroupKey, BTreeSet<&StudentId>> = data
        .enrollments
        .iter()
        .fold(HashMap::new(), |mut acc, e| {
            acc.entry(GroupKey::new(e.course_id.clone(), e.faculty_id.clone()))
                .or_insert_with(BTreeSet::new)
                .insert(&e.student_id);
            acc
        });

    let mut tree: BTreeMap<Day, BTreeMap<PeriodKey, BTreeMap<CourseId, Vec<Section>>>> =
        BTreeMap::new();
    for a in &schedule.assignments {
        let slot = data.time_slot(a.slot).ok_or_else(|| {
            EngineError::Data(format!("assignment of {} uses unknown slot {}", a.group, a.slot))
        })?;
        if data.room(&a.room_id).is_none() {
            return Err(EngineError::Data(format!(
                "assignment of {} uses unknown room {}",
                a.group, a.room_id
            )));
        }
        if data.course(&a.group.course_id).is_none() {
            return Err(EngineError::Data(format!(
                "assignment references unknown course {}",
                a.group.course_id
            )));
        }
        let faculty = data.faculty(&a.faculty_id).ok_or_else(|| {
            EngineError::Data(format!(
                "assignment of {} uses unknown faculty {}",
                a.group, a.faculty_id
            ))
        })?;

        tree.entry(slot.day)
            .or_default()
            .entry((slot.start, slot.end))
            .or_default()
            .entry(a.group.course_id.clone())
            .or_default()
            .push(Section {
                room_id: a.room_id.clone(),
                faculty_id: a.faculty_id.clone(),
                faculty_name: faculty.name.clone(),
                group: a.group.clone(),
                slot: a.slot,
                students: rosters
                    .get(&a.group)
                    .map(|r| r.iter().map(|s| s.to_string()).collect())
                    .unwrap_or_default(),
            });
    }

    let days = tree
        .into_iter()
        .map(|(day, periods)| DayEntry {
            day,
            periods: periods
                .into_iter()
                .map(|((start, end), courses)| Period {
                    label: format!("{}-{}", start.format("%H:%M"), end.format("%H:%M")),
                    start,
                    end,
                    courses: courses
                        .into_iter()
                        .map(|(course_id, mut sections)| {
                            sections.sort_by(|a, b| {
                                (&a.room_id, &a.faculty_id, a.slot)
                                    .cmp(&(&b.room_id, &b.faculty_id, b.slot))
                            });
                            CourseEntry {
                                course_id,
                                sections,
                            }
                        })
                        .collect(),
                })
                .collect(),
        })
        .collect();

    debug!("Assembled timetable view of {} sessions", schedule.len());
    Ok(TimetableView {
        days,
        total_sessions: schedule.len(),
    })
}
