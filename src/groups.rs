//! Derives teaching groups from enrollment data.
//!
//! Every enrollment maps to exactly one `(course, faculty)` group. Courses
//! without enrollments are only scheduled when the caller designates a faculty
//! member for them; otherwise they are reported as unschedulable.

use itertools::Itertools;
use log::{debug, info};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use crate::config::UnenrolledPolicy;
use crate::data::{
    Course, CourseId, Enrollment, Faculty, GroupKey, InfeasibilityReason, InfeasibleGroup,
    StudentId,
};
use crate::error::EngineError;

/// The atomic unit the solvers schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionGroup {
    pub key: GroupKey,
    /// Distinct student ids, sorted.
    pub students: Vec<StudentId>,
    pub required_sessions: u32,
    pub needs_lab: bool,
}

impl SessionGroup {
    pub fn size(&self) -> u32 {
        self.students.len() as u32
    }
}

/// Output of the builder: groups in key order plus the courses that were skipped.
#[derive(Debug, Clone, Default)]
pub struct GroupPlan {
    pub groups: Vec<SessionGroup>,
    pub skipped: Vec<InfeasibleGroup>,
}

pub fn build_groups(
    enrollments: &[Enrollment],
    courses: &[Course],
    faculty: &[Faculty],
    policy: &UnenrolledPolicy,
) -> Result<GroupPlan, EngineError> {
    let course_map: HashMap<&str, &Course> = courses.iter().map(|c| (c.id.as_str(), c)).collect();
    let known_faculty: HashSet<&str> = faculty.iter().map(|f| f.id.as_str()).collect();

    let rosters: BTreeMap<GroupKey, BTreeSet<StudentId>> = enrollments
        .iter()
        .map(|e| {
            (
                GroupKey::new(e.course_id.clone(), e.faculty_id.clone()),
                e.student_id.clone(),
            )
        })
        .into_group_map()
        .into_iter()
        .map(|(key, students)| (key, students.into_iter().collect()))
        .collect();

    let mut groups = Vec::with_capacity(rosters.len() + policy.default_faculty.len());
    for (key, students) in rosters {
        let course = course_map.get(key.course_id.as_str()).ok_or_else(|| {
            EngineError::Data(format!(
                "enrollment references unknown course {}",
                key.course_id
            ))
        })?;
        debug!("Group {} has {} students", key, students.len());
        groups.push(SessionGroup {
            key,
            students: students.into_iter().collect(),
            required_sessions: course.required_sessions(),
            needs_lab: course.needs_lab,
        });
    }

    let enrolled: HashSet<&CourseId> = enrollments.iter().map(|e| &e.course_id).collect();
    let mut skipped = Vec::new();
    for course in courses.iter().filter(|c| !enrolled.contains(&c.id)) {
        match policy.default_faculty.get(&course.id) {
            Some(faculty_id) => {
                if !known_faculty.contains(faculty_id.as_str()) {
                    return Err(EngineError::Data(format!(
                        "default faculty {} designated for {} does not exist",
                        faculty_id, course.id
                    )));
                }
                groups.push(SessionGroup {
                    key: GroupKey::new(course.id.clone(), faculty_id.clone()),
                    students: Vec::new(),
                    required_sessions: course.required_sessions(),
                    needs_lab: course.needs_lab,
                });
            }
            None => skipped.push(InfeasibleGroup::for_course(
                course.id.clone(),
                InfeasibilityReason::NoEnrollment,
            )),
        }
    }
    groups.sort_by(|a, b| a.key.cmp(&b.key));

    info!(
        "Built {} session groups from {} enrollments ({} courses skipped)",
        groups.len(),
        enrollments.len(),
        skipped.len()
    );
    Ok(GroupPlan { groups, skipped })
}
