//! Weekly timetable assignment engine.
//!
//! Takes courses, faculty, rooms, time slots and enrollments, derives the
//! (course, faculty) session groups and places every required session in a
//! (slot, room) so that no faculty member, room or student is double-booked.
//! Two interchangeable solvers are provided: a seeded population search
//! ([`genetic`]) and an exact ILP formulation ([`exact`]) solved with HiGHS.

pub mod assemble;
pub mod candidates;
pub mod config;
pub mod constraints;
pub mod data;
pub mod error;
pub mod exact;
pub mod genetic;
pub mod groups;
pub mod jobs;
pub mod model;
pub mod server;
pub mod solver;

pub use assemble::{TimetableView, Viewer, assemble};
pub use config::EngineConfig;
pub use data::{ReferenceData, Schedule, Snapshot};
pub use error::EngineError;
pub use solver::{Outcome, Solution, solve};
