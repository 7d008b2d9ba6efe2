use crate::schedule::{Slot, TimeRange, WeekParity, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// Identifies a lab group: every session of `course` sharing the `group` code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupKey {
    pub course: String,
    pub group: String,
}

impl GroupKey {
    pub fn new(course: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            course: course.into(),
            group: group.into(),
        }
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.course, self.group)
    }
}

/// One weekly lab session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub lab_id: i64,
    pub day: Weekday,
    pub time: TimeRange,
    pub teaching_weeks: Vec<u8>,
}

impl Session {
    pub fn clashes_with(&self, other: &Session) -> bool {
        self.day == other.day
            && self.time.overlaps(&other.time)
            && self
                .teaching_weeks
                .iter()
                .any(|week| other.teaching_weeks.contains(week))
    }

    pub fn slot(&self) -> Slot {
        Slot::new(self.day, self.time.half_day())
    }

    pub fn parity(&self) -> WeekParity {
        WeekParity::of(&self.teaching_weeks)
    }
}

/// All sessions of one lab group; assigned to a single student as a unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabGroup {
    pub key: GroupKey,
    pub sessions: Vec<Session>,
}

impl LabGroup {
    pub fn first_session(&self) -> Option<&Session> {
        self.sessions.first()
    }

    pub fn days(&self) -> BTreeSet<Weekday> {
        self.sessions.iter().map(|s| s.day).collect()
    }

    /// Parity of the group, judged by its first session.
    pub fn parity(&self) -> WeekParity {
        self.first_session()
            .map(Session::parity)
            .unwrap_or(WeekParity::Mixed)
    }
}

/// Per-session teaching cost of a course.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CourseLoad {
    pub hours: u32,
    pub weeks: u32,
}

impl CourseLoad {
    pub fn workload(&self) -> u64 {
        u64::from(self.hours) * u64::from(self.weeks)
    }
}

/// Approved availability limits from a special request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Availability {
    pub max_teaching_days: u8,
    pub unavailable: Vec<Slot>,
}

/// Approved agreement to teach a number of groups of one course.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourseLock {
    pub course: String,
    pub groups: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preference {
    pub course: String,
    pub rank: u8,
}

/// A student eligible for allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub id: String,
    pub lab_load: u32,
    /// Groups already assigned before this run.
    pub held: Vec<LabGroup>,
    pub preferences: Vec<Preference>,
    pub past_courses: BTreeSet<String>,
    pub availability: Option<Availability>,
    pub course_lock: Option<CourseLock>,
}

impl Candidate {
    pub fn new(id: impl Into<String>, lab_load: u32) -> Self {
        Self {
            id: id.into(),
            lab_load,
            held: Vec::new(),
            preferences: Vec::new(),
            past_courses: BTreeSet::new(),
            availability: None,
            course_lock: None,
        }
    }

    pub fn rank_of(&self, course: &str) -> Option<u8> {
        self.preferences
            .iter()
            .filter(|p| p.course == course)
            .map(|p| p.rank)
            .min()
    }
}

/// Tunable weights of the penalty score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Weights {
    pub odd_even_pair: i64,
    pub course_variety: i64,
    pub past_assignments: i64,
    pub preference: i64,
    pub workload_distribution: i64,
    pub permutation_count: u32,
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            odd_even_pair: 40,
            course_variety: 30,
            past_assignments: 15,
            preference: 25,
            workload_distribution: 20,
            permutation_count: 30,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AllocationInput {
    pub courses: HashMap<String, CourseLoad>,
    /// Groups nobody holds yet, in timetable order.
    pub available: Vec<LabGroup>,
    /// Students with gs_duty, including those already at full load.
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAssignment {
    pub student: String,
    pub group: GroupKey,
}

#[derive(Debug, Clone, Serialize)]
pub struct AllocationOutcome {
    pub assignments: Vec<NewAssignment>,
    pub penalty: crate::penalty::PenaltyBreakdown,
    pub iterations: u32,
}
