//! Hard constraints on a student's timetable.

use crate::model::{Availability, LabGroup};
use std::collections::BTreeSet;
use thiserror::Error;

/// Why a lab group cannot be given to a student.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    #[error("Student is already at maximum lab load")]
    LoadExceeded,

    #[error("Time clash with existing assignment on {day} {time} (Teaching Wk: {weeks})")]
    TimeClash {
        day: String,
        time: String,
        weeks: String,
    },

    #[error("Exceeds maximum teaching days ({0})")]
    TooManyDays(u8),

    #[error("Assigned during unavailable time slot ({0})")]
    UnavailableSlot(String),
}

/// Check whether `group` may be added to a student holding `held`.
///
/// `availability` must only be given when the student's availability request was approved.
pub fn check_group(
    lab_load: u32,
    availability: Option<&Availability>,
    held: &[LabGroup],
    group: &LabGroup,
) -> Result<(), Rejection> {
    if held.len() as u32 >= lab_load {
        return Err(Rejection::LoadExceeded);
    }

    for session in &group.sessions {
        for existing in held.iter().flat_map(|g| g.sessions.iter()) {
            if session.clashes_with(existing) {
                let weeks = existing
                    .teaching_weeks
                    .iter()
                    .map(u8::to_string)
                    .collect::<Vec<_>>()
                    .join(", ");
                return Err(Rejection::TimeClash {
                    day: existing.day.to_string(),
                    time: existing.time.to_string(),
                    weeks,
                });
            }
        }
    }

    let Some(availability) = availability else {
        return Ok(());
    };

    let current_days: BTreeSet<_> = held.iter().flat_map(|g| g.days()).collect();
    let new_days = group
        .days()
        .into_iter()
        .filter(|day| !current_days.contains(day))
        .count();
    if new_days > 0 && current_days.len() + new_days > availability.max_teaching_days as usize {
        return Err(Rejection::TooManyDays(availability.max_teaching_days));
    }

    if let Some(slot) = group
        .sessions
        .iter()
        .map(|s| s.slot())
        .find(|slot| availability.unavailable.contains(slot))
    {
        return Err(Rejection::UnavailableSlot(slot.to_string()));
    }

    Ok(())
}

pub fn violates_constraints(
    lab_load: u32,
    availability: Option<&Availability>,
    held: &[LabGroup],
    group: &LabGroup,
) -> bool {
    check_group(lab_load, availability, held, group).is_err()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{GroupKey, Session};
    use crate::schedule::{parse_time, HalfDay, Slot, Weekday};

    fn group(name: &str, sessions: &[(Weekday, &str, &[u8])]) -> LabGroup {
        LabGroup {
            key: GroupKey::new("SC1003", name),
            sessions: sessions
                .iter()
                .enumerate()
                .map(|(i, (day, time, weeks))| Session {
                    lab_id: i as i64,
                    day: *day,
                    time: parse_time(time).unwrap(),
                    teaching_weeks: weeks.to_vec(),
                })
                .collect(),
        }
    }

    const ODD: &[u8] = &[1, 3, 5, 7, 9, 11, 13];
    const EVEN: &[u8] = &[2, 4, 6, 8, 10, 12];
    const EARLY: &[u8] = &[1, 2, 3];
    const LATE: &[u8] = &[3, 4];

    #[test]
    fn test_load_limit() {
        let held = vec![group("A", &[(Weekday::Mon, "0830-1020", ODD)])];
        let next = group("B", &[(Weekday::Tue, "0830-1020", ODD)]);

        assert_eq!(check_group(1, None, &held, &next), Err(Rejection::LoadExceeded));
        assert!(check_group(2, None, &held, &next).is_ok());
        assert!(violates_constraints(0, None, &[], &next));
    }

    #[test]
    fn test_time_clash_message() {
        let held = vec![group("A", &[(Weekday::Mon, "0830-1020", EARLY)])];
        let next = group("B", &[(Weekday::Mon, "0930-1120", LATE)]);

        let err = check_group(4, None, &held, &next).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Time clash with existing assignment on MON 0830-1020 (Teaching Wk: 1, 2, 3)"
        );
    }

    #[test]
    fn test_alternating_weeks_do_not_clash() {
        let held = vec![group("A", &[(Weekday::Mon, "0830-1020", ODD)])];
        let next = group("B", &[(Weekday::Mon, "0830-1020", EVEN)]);
        assert!(check_group(4, None, &held, &next).is_ok());
    }

    #[test]
    fn test_max_teaching_days_only_with_availability() {
        let held = vec![
            group("A", &[(Weekday::Mon, "0830-1020", ODD)]),
            group("B", &[(Weekday::Tue, "0830-1020", ODD)]),
        ];
        let same_day = group("C", &[(Weekday::Tue, "1430-1620", ODD)]);
        let new_day = group("D", &[(Weekday::Wed, "0830-1020", ODD)]);
        let availability = Availability {
            max_teaching_days: 2,
            unavailable: vec![],
        };

        assert!(check_group(4, Some(&availability), &held, &same_day).is_ok());
        assert_eq!(
            check_group(4, Some(&availability), &held, &new_day),
            Err(Rejection::TooManyDays(2))
        );
        assert!(check_group(4, None, &held, &new_day).is_ok());
    }

    #[test]
    fn test_unavailable_slot() {
        let availability = Availability {
            max_teaching_days: 5,
            unavailable: vec![Slot::new(Weekday::Thu, HalfDay::Pm)],
        };
        let morning = group("A", &[(Weekday::Thu, "0830-1020", ODD)]);
        let afternoon = group("B", &[(Weekday::Thu, "1230-1420", ODD)]);

        assert!(check_group(4, Some(&availability), &[], &morning).is_ok());
        assert_eq!(
            check_group(4, Some(&availability), &[], &afternoon)
                .unwrap_err()
                .to_string(),
            "Assigned during unavailable time slot (Thu-PM)"
        );
    }
}
