use chrono::NaiveTime;
use std::collections::{BTreeSet, HashMap};

use timetable_solver::config::{EngineConfig, ExactConfig, GeneticConfig};
use timetable_solver::constraints::{Constraint, HardConstraint};
use timetable_solver::data::{
    Assignment, Course, Day, Enrollment, Faculty, GroupKey, InfeasibilityReason, Room, RoomKind,
    SlotId, TimeSlot,
};
use timetable_solver::{EngineError, Outcome, Snapshot, assemble, solve};

const DAYS: [Day; 5] = [
    Day::Monday,
    Day::Tuesday,
    Day::Wednesday,
    Day::Thursday,
    Day::Friday,
];

fn slot(id: SlotId, day: Day, hour: u32) -> TimeSlot {
    TimeSlot {
        id,
        day,
        start: NaiveTime::from_hms_opt(hour, 0, 0).unwrap(),
        end: NaiveTime::from_hms_opt(hour + 1, 0, 0).unwrap(),
    }
}

fn course(id: &str, hours: u32, needs_lab: bool) -> Course {
    Course {
        id: id.into(),
        weekly_hours: Some(hours),
        needs_lab,
    }
}

fn faculty(id: &str, slots: &[SlotId]) -> Faculty {
    Faculty {
        id: id.into(),
        name: None,
        available_slots: slots.iter().copied().collect(),
        courses: BTreeSet::new(),
    }
}

fn room(id: &str, kind: RoomKind, capacity: u32, slots: &[SlotId]) -> Room {
    Room {
        id: id.into(),
        kind,
        capacity,
        available_slots: slots.iter().copied().collect(),
    }
}

fn enroll(student: String, course: &str, faculty: &str) -> Enrollment {
    Enrollment {
        student_id: student,
        course_id: course.into(),
        faculty_id: faculty.into(),
    }
}

fn small_exact() -> EngineConfig {
    EngineConfig::exact(ExactConfig::default())
}

fn small_heuristic(seed: u64) -> EngineConfig {
    EngineConfig::heuristic(GeneticConfig {
        population_size: 30,
        generations: 150,
        seed,
        ..GeneticConfig::default()
    })
}

/// Twenty slots over five days, eight courses, six faculty, sixty students.
fn department() -> Snapshot {
    let all: Vec<SlotId> = (0..20).collect();
    let time_slots = (0..20)
        .map(|id| slot(id, DAYS[(id / 4) as usize], 9 + id % 4))
        .collect();
    let courses: Vec<Course> = (0..8)
        .map(|c| course(&format!("C{c}"), 2 + c % 2, c == 7))
        .collect();
    let faculty = (0..6)
        .map(|f| {
            // everyone keeps one morning free
            let slots: Vec<SlotId> = all.iter().copied().filter(|s| *s != f * 3).collect();
            let mut member = self::faculty(&format!("F{f}"), &slots);
            member.courses = (0..8)
                .filter(|c| c % 6 == f)
                .map(|c| format!("C{c}"))
                .collect();
            member
        })
        .collect();
    let rooms = vec![
        room("R1", RoomKind::General, 40, &all),
        room("R2", RoomKind::General, 40, &all),
        room("R3", RoomKind::General, 40, &all[..12]),
        room("L1", RoomKind::Lab, 40, &all),
    ];
    let mut enrollments = Vec::new();
    for s in 0..60u32 {
        for offset in [0, 3, 5] {
            let c = (s + offset) % 8;
            enrollments.push(enroll(
                format!("S{s}"),
                &format!("C{c}"),
                &format!("F{}", c % 6),
            ));
        }
    }
    Snapshot {
        courses,
        faculty,
        rooms,
        time_slots,
        enrollments,
    }
}

/// Checks the hard rules directly on the assignments.
fn assert_no_double_booking(data: &Snapshot, assignments: &[Assignment]) {
    let mut faculty = BTreeSet::new();
    let mut rooms = BTreeSet::new();
    for a in assignments {
        assert!(
            faculty.insert((a.faculty_id.clone(), a.slot)),
            "faculty {} double-booked in slot {}",
            a.faculty_id,
            a.slot
        );
        assert!(
            rooms.insert((a.room_id.clone(), a.slot)),
            "room {} double-booked in slot {}",
            a.room_id,
            a.slot
        );
    }

    let mut rosters: HashMap<GroupKey, Vec<&str>> = HashMap::new();
    for e in &data.enrollments {
        rosters
            .entry(GroupKey::new(e.course_id.clone(), e.faculty_id.clone()))
            .or_default()
            .push(&e.student_id);
    }
    let mut students = BTreeSet::new();
    for a in assignments {
        for s in rosters.get(&a.group).into_iter().flatten() {
            assert!(
                students.insert((s.to_string(), a.slot)),
                "student {s} double-booked in slot {}",
                a.slot
            );
        }
    }
}

#[test]
fn two_sessions_one_room_one_faculty() {
    let data = Snapshot {
        courses: vec![course("CSE101", 2, false)],
        faculty: vec![faculty("P1", &[0, 1])],
        rooms: vec![room("R101", RoomKind::General, 30, &[0, 1])],
        time_slots: vec![slot(0, Day::Monday, 9), slot(1, Day::Tuesday, 9)],
        enrollments: (0..10)
            .map(|i| enroll(format!("S{i}"), "CSE101", "P1"))
            .collect(),
    };

    for config in [small_exact(), small_heuristic(1)] {
        let solution = solve(&data, &config).unwrap();
        let slots: Vec<SlotId> = solution.schedule.assignments.iter().map(|a| a.slot).collect();
        assert_eq!(slots, vec![0, 1]);
        assert_eq!(solution.metadata.hard_violations, 0);
        assert_eq!(solution.metadata.evaluation.total, 0.0);
        assert!(solution.diagnostics.is_empty());
    }
}

fn overcommitted_faculty() -> Snapshot {
    Snapshot {
        courses: vec![course("A", 1, false), course("B", 1, false)],
        faculty: vec![faculty("P1", &[0])],
        rooms: vec![
            room("R1", RoomKind::General, 30, &[0, 1]),
            room("R2", RoomKind::General, 30, &[0, 1]),
        ],
        time_slots: vec![slot(0, Day::Monday, 9), slot(1, Day::Monday, 10)],
        enrollments: vec![
            enroll("S1".into(), "A", "P1"),
            enroll("S2".into(), "B", "P1"),
        ],
    }
}

#[test]
fn exact_solver_proves_infeasibility() {
    let result = solve(&overcommitted_faculty(), &small_exact());
    assert!(
        matches!(result, Err(EngineError::InfeasibleSchedule { .. })),
        "{result:?}"
    );
}

#[test]
fn heuristic_reports_the_unavoidable_overlap() {
    let solution = solve(&overcommitted_faculty(), &small_heuristic(5)).unwrap();
    assert_eq!(solution.metadata.outcome, Outcome::Unknown);
    assert!(solution.metadata.objective > 0.0);
    assert_eq!(solution.schedule.len(), 2);
    let overlap = solution
        .metadata
        .evaluation
        .terms
        .iter()
        .find(|t| t.constraint == Constraint::Hard(HardConstraint::FacultyExclusive))
        .unwrap();
    assert_eq!(overlap.amount, 1.0);
}

/// A large group whose only clash-free week repeats it on Monday.
fn crowded_monday() -> Snapshot {
    let mut enrollments: Vec<Enrollment> = (0..150)
        .map(|i| enroll(format!("S{i}"), "A", "P1"))
        .collect();
    enrollments.push(enroll("T1".into(), "B", "P1"));
    Snapshot {
        courses: vec![course("A", 2, false), course("B", 1, true)],
        faculty: vec![faculty("P1", &[0, 1, 2])],
        rooms: vec![
            room("R1", RoomKind::General, 200, &[0, 1, 2]),
            room("L1", RoomKind::Lab, 10, &[2]),
        ],
        time_slots: vec![
            slot(0, Day::Monday, 9),
            slot(1, Day::Monday, 10),
            slot(2, Day::Tuesday, 9),
        ],
        enrollments,
    }
}

#[test]
fn heuristic_never_buys_soft_score_with_a_clash() {
    let data = crowded_monday();
    let config = EngineConfig::heuristic(GeneticConfig {
        population_size: 40,
        generations: 300,
        seed: 1,
        ..GeneticConfig::default()
    });
    let solution = solve(&data, &config).unwrap();
    assert_eq!(solution.metadata.outcome, Outcome::Feasible);
    assert_eq!(solution.metadata.hard_violations, 0);
    let placed: Vec<(&str, SlotId)> = solution
        .schedule
        .assignments
        .iter()
        .map(|a| (a.group.course_id.as_str(), a.slot))
        .collect();
    assert_eq!(placed, vec![("A", 0), ("A", 1), ("B", 2)]);
    // 150 students meet A twice on Monday.
    assert_eq!(solution.metadata.objective, 1500.0);
}

#[test]
fn oversized_group_is_diagnosed_not_fatal() {
    let mut enrollments: Vec<Enrollment> = (0..25)
        .map(|i| enroll(format!("S{i}"), "BIG", "P1"))
        .collect();
    enrollments.push(enroll("S99".into(), "SMALL", "P1"));
    let data = Snapshot {
        courses: vec![course("BIG", 1, false), course("SMALL", 1, false)],
        faculty: vec![faculty("P1", &[0, 1])],
        rooms: vec![room("R1", RoomKind::General, 20, &[0, 1])],
        time_slots: vec![slot(0, Day::Monday, 9), slot(1, Day::Monday, 10)],
        enrollments,
    };

    let solution = solve(&data, &small_exact()).unwrap();
    assert_eq!(solution.diagnostics.len(), 1);
    assert_eq!(solution.diagnostics[0].group(), Some(GroupKey::new("BIG", "P1")));
    assert!(matches!(
        solution.diagnostics[0].reason,
        InfeasibilityReason::NoCandidates {
            rooms_by_capacity: 0,
            ..
        }
    ));
    assert_eq!(solution.schedule.len(), 1);
    assert_eq!(solution.schedule.assignments[0].group, GroupKey::new("SMALL", "P1"));
}

#[test]
fn exact_schedule_respects_every_hard_rule() {
    let data = department();
    let solution = solve(&data, &small_exact()).unwrap();
    assert_eq!(solution.metadata.outcome, Outcome::Optimal);
    assert!(solution.diagnostics.is_empty());
    assert_no_double_booking(&data, &solution.schedule.assignments);

    for c in &data.courses {
        let key = GroupKey::new(c.id.clone(), format!("F{}", c.id[1..].parse::<u32>().unwrap() % 6));
        assert_eq!(
            solution.schedule.for_group(&key).count() as u32,
            c.required_sessions(),
            "{key}"
        );
    }
    let lab_sessions: Vec<&Assignment> = solution
        .schedule
        .assignments
        .iter()
        .filter(|a| a.group.course_id == "C7")
        .collect();
    assert!(lab_sessions.iter().all(|a| a.room_id == "L1"));
}

#[test]
fn exact_objective_is_stable_across_runs() {
    let data = department();
    let first = solve(&data, &small_exact()).unwrap();
    let second = solve(&data, &small_exact()).unwrap();
    assert_eq!(first.metadata.objective, second.metadata.objective);
    assert_eq!(
        first.metadata.objective,
        data.courses.iter().map(|c| c.required_sessions()).sum::<u32>() as f64
    );
}

#[test]
fn heuristic_is_reproducible_for_a_seed() {
    let data = department();
    let config = EngineConfig::heuristic(GeneticConfig {
        population_size: 16,
        generations: 40,
        seed: 2024,
        ..GeneticConfig::default()
    });
    let first = solve(&data, &config).unwrap();
    let second = solve(&data, &config).unwrap();
    assert_eq!(first.metadata.fitness_history, second.metadata.fitness_history);
    assert_eq!(first.schedule, second.schedule);
    assert_eq!(first.schedule.len(), 20);
}

#[test]
fn heuristic_keeps_its_best_schedule() {
    let data = department();
    let solution = solve(&data, &small_heuristic(11)).unwrap();
    let best = solution
        .metadata
        .fitness_history
        .iter()
        .copied()
        .min_by(|a, b| a.total_cmp(b))
        .unwrap();
    assert_eq!(solution.metadata.evaluation.fitness(), best);
    assert!((solution.metadata.objective - best.total()).abs() < 1e-6);
    if solution.metadata.outcome == Outcome::Feasible {
        assert_no_double_booking(&data, &solution.schedule.assignments);
    }
}

#[test]
fn assembled_view_flattens_back() {
    let data = department();
    let solution = solve(&data, &small_exact()).unwrap();
    let view = assemble(&solution.schedule, &data).unwrap();
    assert_eq!(view.total_sessions, solution.schedule.len());
    assert_eq!(view.flatten(), solution.schedule.assignments);

    let days: Vec<Day> = view.days.iter().map(|d| d.day).collect();
    let mut sorted = days.clone();
    sorted.sort();
    assert_eq!(days, sorted);
    for day in &view.days {
        let starts: Vec<NaiveTime> = day.periods.iter().map(|p| p.start).collect();
        assert!(starts.windows(2).all(|w| w[0] < w[1]));
    }
}
