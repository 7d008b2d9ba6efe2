use thiserror::Error;

pub type Result<T> = std::result::Result<T, AllocationError>;

/// Malformed timetable values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("Time must be in the format hhmm-hhmm (e.g. 1430-1620), got '{0}'")]
    InvalidTime(String),

    #[error("Invalid day '{0}' (expected MON, TUE, WED, THU or FRI)")]
    InvalidDay(String),

    #[error("Invalid teaching weeks '{0}'")]
    InvalidWeeks(String),

    #[error("Invalid time slot '{0}' (expected e.g. Mon-AM or Fri-PM)")]
    InvalidSlot(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AllocationError {
    #[error("No eligible students for allocation (all have gs_duty disabled)")]
    NoEligibleStudents,

    #[error("No students with remaining lab load capacity")]
    NoCapacity,
}
