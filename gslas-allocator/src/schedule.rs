//! Timetable value parsing: weekdays, session times, teaching weeks and half-day slots.

use crate::error::ScheduleError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of teaching weeks in a semester.
pub const SEMESTER_WEEKS: u8 = 13;

static TIME_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{2})(\d{2})-(\d{2})(\d{2})$").expect("valid time regex"));

/// Matches remarks such as `Teaching Wk2-13`, `wk1,3,5` or `w2-13`.
static WEEKS_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:teaching\s*)?wk?([\d,-]+)").expect("valid weeks regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Weekday {
    Mon,
    Tue,
    Wed,
    Thu,
    Fri,
}

impl Weekday {
    pub const ALL: [Weekday; 5] = [
        Weekday::Mon,
        Weekday::Tue,
        Weekday::Wed,
        Weekday::Thu,
        Weekday::Fri,
    ];

    /// Upper-case code used in timetables and storage (`MON`).
    pub fn code(&self) -> &'static str {
        match self {
            Weekday::Mon => "MON",
            Weekday::Tue => "TUE",
            Weekday::Wed => "WED",
            Weekday::Thu => "THU",
            Weekday::Fri => "FRI",
        }
    }

    /// Title-case label used in availability slots (`Mon`).
    pub fn label(&self) -> &'static str {
        match self {
            Weekday::Mon => "Mon",
            Weekday::Tue => "Tue",
            Weekday::Wed => "Wed",
            Weekday::Thu => "Thu",
            Weekday::Fri => "Fri",
        }
    }
}

impl fmt::Display for Weekday {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Weekday {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Weekday::ALL
            .into_iter()
            .find(|day| day.code().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| ScheduleError::InvalidDay(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClockTime {
    pub hour: u8,
    pub minute: u8,
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}{:02}", self.hour, self.minute)
    }
}

/// A session's start and end within one day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeRange {
    pub start: ClockTime,
    pub end: ClockTime,
}

impl TimeRange {
    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start < other.end && self.end > other.start
    }

    pub fn half_day(&self) -> HalfDay {
        if self.start.hour < 12 {
            HalfDay::Am
        } else {
            HalfDay::Pm
        }
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

impl FromStr for TimeRange {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_time(s)
    }
}

/// Parse a session time in `hhmm-hhmm` form.
pub fn parse_time(input: &str) -> Result<TimeRange, ScheduleError> {
    let invalid = || ScheduleError::InvalidTime(input.to_string());
    let caps = TIME_REGEX.captures(input.trim()).ok_or_else(invalid)?;

    let field = |idx: usize| -> Result<u8, ScheduleError> {
        caps[idx].parse::<u8>().map_err(|_| invalid())
    };
    let start = ClockTime {
        hour: field(1)?,
        minute: field(2)?,
    };
    let end = ClockTime {
        hour: field(3)?,
        minute: field(4)?,
    };

    if start.hour > 23 || end.hour > 23 || start.minute > 59 || end.minute > 59 {
        return Err(invalid());
    }

    Ok(TimeRange { start, end })
}

fn full_semester() -> Vec<u8> {
    (1..=SEMESTER_WEEKS).collect()
}

/// Parse the teaching weeks out of a free-text timetable remark.
///
/// Blank remarks and remarks without a week pattern mean every week of the semester.
pub fn parse_teaching_weeks(remark: &str) -> Result<Vec<u8>, ScheduleError> {
    let remark = remark.trim().to_lowercase();
    if remark.is_empty() {
        return Ok(full_semester());
    }

    let Some(caps) = WEEKS_REGEX.captures(&remark) else {
        return Ok(full_semester());
    };

    let list = &caps[1];
    let invalid = || ScheduleError::InvalidWeeks(list.to_string());
    let mut weeks = Vec::new();

    for part in list.split(',').map(str::trim) {
        match part.split_once('-') {
            Some((start, end)) => {
                let start: u8 = start.trim().parse().map_err(|_| invalid())?;
                let end: u8 = end.trim().parse().map_err(|_| invalid())?;
                weeks.extend(start..=end);
            }
            None => weeks.push(part.parse().map_err(|_| invalid())?),
        }
    }

    normalize_weeks(weeks).ok_or_else(invalid)
}

/// Parse an explicit comma-separated week list such as `1, 3, 5`; blank means every week.
pub fn parse_week_list(input: &str) -> Result<Vec<u8>, ScheduleError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Ok(full_semester());
    }

    let weeks = trimmed
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| part.parse::<u8>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| ScheduleError::InvalidWeeks(input.to_string()))?;

    normalize_weeks(weeks).ok_or_else(|| ScheduleError::InvalidWeeks(input.to_string()))
}

fn normalize_weeks(mut weeks: Vec<u8>) -> Option<Vec<u8>> {
    if weeks.is_empty() || weeks.iter().any(|w| *w == 0 || *w > SEMESTER_WEEKS) {
        return None;
    }
    weeks.sort_unstable();
    weeks.dedup();
    Some(weeks)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeekParity {
    AllOdd,
    AllEven,
    Mixed,
}

impl WeekParity {
    pub fn of(weeks: &[u8]) -> Self {
        // An empty list is vacuously both; treat it like the timetable does, as odd.
        if weeks.iter().all(|w| w % 2 == 1) {
            WeekParity::AllOdd
        } else if weeks.iter().all(|w| w % 2 == 0) {
            WeekParity::AllEven
        } else {
            WeekParity::Mixed
        }
    }

    /// True for one all-odd and one all-even schedule.
    pub fn complements(&self, other: &WeekParity) -> bool {
        matches!(
            (self, other),
            (WeekParity::AllOdd, WeekParity::AllEven) | (WeekParity::AllEven, WeekParity::AllOdd)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HalfDay {
    #[serde(rename = "AM")]
    Am,
    #[serde(rename = "PM")]
    Pm,
}

impl fmt::Display for HalfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HalfDay::Am => f.write_str("AM"),
            HalfDay::Pm => f.write_str("PM"),
        }
    }
}

/// A half-day a student can declare unavailable, written `Mon-AM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Slot {
    pub day: Weekday,
    pub half: HalfDay,
}

impl Slot {
    pub fn new(day: Weekday, half: HalfDay) -> Self {
        Self { day, half }
    }

    /// Every slot a student can pick, mornings first.
    pub fn all() -> Vec<Slot> {
        [HalfDay::Am, HalfDay::Pm]
            .into_iter()
            .flat_map(|half| Weekday::ALL.into_iter().map(move |day| Slot { day, half }))
            .collect()
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.day.label(), self.half)
    }
}

impl FromStr for Slot {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ScheduleError::InvalidSlot(s.to_string());
        let (day, half) = s.trim().split_once('-').ok_or_else(invalid)?;
        let day: Weekday = day.parse().map_err(|_| invalid())?;
        let half = match half.to_ascii_uppercase().as_str() {
            "AM" => HalfDay::Am,
            "PM" => HalfDay::Pm,
            _ => return Err(invalid()),
        };
        Ok(Slot { day, half })
    }
}
