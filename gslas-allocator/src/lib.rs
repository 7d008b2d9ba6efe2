//! Lab group allocation engine
//!
//! This crate holds the pure allocation logic for the lab allocation portal:
//! parsing of timetable values (session times, teaching weeks, half-day slots),
//! the hard constraints a student's timetable must satisfy, the weighted penalty
//! used to compare allocations, and the randomised greedy search that produces
//! them. It performs no I/O; `gslas-orchestrator` loads a snapshot from the
//! database, calls [`allocate`], and persists the result.

pub mod constraints;
pub mod error;
pub mod model;
pub mod pairs;
pub mod penalty;
pub mod schedule;
pub mod search;

pub use constraints::{check_group, violates_constraints, Rejection};
pub use error::{AllocationError, Result, ScheduleError};
pub use model::{
    AllocationInput, AllocationOutcome, Availability, Candidate, CourseLoad, CourseLock, GroupKey,
    LabGroup, NewAssignment, Preference, Session, Weights,
};
pub use penalty::{score, Holding, PenaltyBreakdown};
pub use schedule::{
    parse_teaching_weeks, parse_time, parse_week_list, ClockTime, HalfDay, Slot, TimeRange,
    Weekday, WeekParity,
};
pub use search::allocate;
