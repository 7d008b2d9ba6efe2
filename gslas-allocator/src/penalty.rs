//! Weighted penalty score used to compare candidate allocations. Lower is better.

use crate::model::{Candidate, CourseLoad, GroupKey, LabGroup, Weights};
use crate::schedule::{TimeRange, WeekParity, Weekday};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};

/// Preference penalty for teaching a course the student did not rank.
pub const UNRANKED_PENALTY: u32 = 16;

/// The groups one student holds in an allocation.
#[derive(Debug, Clone, Copy)]
pub struct Holding<'a> {
    pub candidate: &'a Candidate,
    pub groups: &'a [LabGroup],
}

impl Holding<'_> {
    fn courses(&self) -> BTreeSet<&str> {
        self.groups.iter().map(|g| g.key.course.as_str()).collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PenaltyBreakdown {
    /// Odd/even session pairs split between two students, counted from both sides.
    pub odd_even_splits: u32,
    /// Courses beyond the first, summed over students.
    pub course_variety: u32,
    pub preference: u32,
    /// Sample standard deviation of workload per unit of lab load.
    pub workload_stdev: f64,
    /// Courses a student is given that they have taught before.
    pub past_matches: u32,
    pub total: f64,
}

pub fn score(
    courses: &HashMap<String, CourseLoad>,
    weights: &Weights,
    holdings: &[Holding<'_>],
) -> PenaltyBreakdown {
    let odd_even_splits = odd_even_splits(holdings);
    let course_variety = course_variety(holdings);
    let preference = preference(holdings);
    let workload_stdev = workload_stdev(courses, holdings);
    let past_matches = past_matches(holdings);

    let total = f64::from(odd_even_splits) * weights.odd_even_pair as f64
        + f64::from(course_variety) * weights.course_variety as f64
        + f64::from(preference) * weights.preference as f64
        + workload_stdev * weights.workload_distribution as f64
        - f64::from(past_matches) * weights.past_assignments as f64;

    PenaltyBreakdown {
        odd_even_splits,
        course_variety,
        preference,
        workload_stdev,
        past_matches,
        total,
    }
}

fn odd_even_splits(holdings: &[Holding<'_>]) -> u32 {
    let mut by_slot: HashMap<(Weekday, TimeRange), Vec<(&GroupKey, &str, WeekParity)>> =
        HashMap::new();

    for holding in holdings {
        for group in holding.groups {
            for session in &group.sessions {
                by_slot.entry((session.day, session.time)).or_default().push((
                    &group.key,
                    holding.candidate.id.as_str(),
                    session.parity(),
                ));
            }
        }
    }

    let mut splits = 0;
    for sessions in by_slot.values() {
        for (i, (key_a, student_a, parity_a)) in sessions.iter().enumerate() {
            for (key_b, student_b, parity_b) in &sessions[i + 1..] {
                if key_a != key_b && student_a != student_b && parity_a.complements(parity_b) {
                    // Ordered pairs: each split is seen once from either group.
                    splits += 2;
                }
            }
        }
    }
    splits
}

fn course_variety(holdings: &[Holding<'_>]) -> u32 {
    holdings
        .iter()
        .map(|h| h.courses().len().saturating_sub(1) as u32)
        .sum()
}

fn preference(holdings: &[Holding<'_>]) -> u32 {
    holdings
        .iter()
        .flat_map(|h| {
            h.courses().into_iter().map(move |course| {
                h.candidate
                    .rank_of(course)
                    .map(|rank| u32::from(rank.saturating_sub(1)))
                    .unwrap_or(UNRANKED_PENALTY)
            })
        })
        .sum()
}

fn workload_stdev(courses: &HashMap<String, CourseLoad>, holdings: &[Holding<'_>]) -> f64 {
    let ratios: Vec<f64> = holdings
        .iter()
        .filter(|h| h.candidate.lab_load > 0)
        .map(|h| {
            let total: u64 = h
                .groups
                .iter()
                .map(|g| {
                    let per_session = courses
                        .get(&g.key.course)
                        .map(CourseLoad::workload)
                        .unwrap_or(0);
                    per_session.saturating_mul(g.sessions.len() as u64)
                })
                .fold(0u64, u64::saturating_add);
            total as f64 / f64::from(h.candidate.lab_load)
        })
        .collect();

    if ratios.len() < 2 {
        return 0.0;
    }

    let n = ratios.len() as f64;
    let mean = ratios.iter().sum::<f64>() / n;
    let variance = ratios.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);
    variance.sqrt()
}

fn past_matches(holdings: &[Holding<'_>]) -> u32 {
    holdings
        .iter()
        .map(|h| {
            h.courses()
                .into_iter()
                .filter(|course| h.candidate.past_courses.contains(*course))
                .count() as u32
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Preference, Session};
    use crate::schedule::parse_time;

    fn group(course: &str, name: &str, day: Weekday, time: &str, weeks: &[u8]) -> LabGroup {
        LabGroup {
            key: GroupKey::new(course, name),
            sessions: vec![Session {
                lab_id: 0,
                day,
                time: parse_time(time).unwrap(),
                teaching_weeks: weeks.to_vec(),
            }],
        }
    }

    fn unit_weights() -> Weights {
        Weights {
            odd_even_pair: 1,
            course_variety: 1,
            past_assignments: 1,
            preference: 1,
            workload_distribution: 1,
            permutation_count: 1,
        }
    }

    #[test]
    fn test_split_pair_is_penalised_from_both_sides() {
        let alice = Candidate::new("alice", 2);
        let bob = Candidate::new("bob", 2);
        let odd = [group("SC1003", "A1", Weekday::Mon, "0830-1020", &[1, 3, 5])];
        let even = [group("SC1003", "A2", Weekday::Mon, "0830-1020", &[2, 4, 6])];

        let split = [
            Holding {
                candidate: &alice,
                groups: &odd,
            },
            Holding {
                candidate: &bob,
                groups: &even,
            },
        ];
        let breakdown = score(&HashMap::new(), &Weights::default(), &split);
        assert_eq!(breakdown.odd_even_splits, 2);
        // 80 for the split, 2 * 16 for two unranked courses
        assert_eq!(breakdown.total, 80.0 + 2.0 * 16.0 * 25.0);

        let both = [odd[0].clone(), even[0].clone()];
        let together = [Holding {
            candidate: &alice,
            groups: &both,
        }];
        assert_eq!(
            score(&HashMap::new(), &unit_weights(), &together).odd_even_splits,
            0
        );
    }

    #[test]
    fn test_preference_and_variety() {
        let mut alice = Candidate::new("alice", 2);
        alice.preferences = vec![Preference {
            course: "SC1003".into(),
            rank: 3,
        }];
        let groups = [
            group("SC1003", "A1", Weekday::Mon, "0830-1020", &[1, 2]),
            group("SC2002", "B1", Weekday::Tue, "0830-1020", &[1, 2]),
        ];
        let holdings = [Holding {
            candidate: &alice,
            groups: &groups,
        }];

        let breakdown = score(&HashMap::new(), &unit_weights(), &holdings);
        assert_eq!(breakdown.course_variety, 1);
        assert_eq!(breakdown.preference, 2 + UNRANKED_PENALTY);
    }

    #[test]
    fn test_past_assignments_reduce_penalty() {
        let mut alice = Candidate::new("alice", 1);
        alice.preferences = vec![Preference {
            course: "SC1003".into(),
            rank: 1,
        }];
        alice.past_courses.insert("SC1003".into());
        let groups = [group("SC1003", "A1", Weekday::Mon, "0830-1020", &[1, 2])];
        let holdings = [Holding {
            candidate: &alice,
            groups: &groups,
        }];

        let breakdown = score(&HashMap::new(), &Weights::default(), &holdings);
        assert_eq!(breakdown.past_matches, 1);
        assert_eq!(breakdown.total, -15.0);
    }

    #[test]
    fn test_workload_stdev() {
        let courses = HashMap::from([(
            "SC1003".to_string(),
            CourseLoad { hours: 2, weeks: 13 },
        )]);
        let alice = Candidate::new("alice", 1);
        let bob = Candidate::new("bob", 1);
        let groups = [group("SC1003", "A1", Weekday::Mon, "0830-1020", &[1, 2])];

        let holdings = [
            Holding {
                candidate: &alice,
                groups: &groups,
            },
            Holding {
                candidate: &bob,
                groups: &[],
            },
        ];

        // ratios 26 and 0: sample stdev = sqrt(2 * 13^2 / 1)
        let breakdown = score(&courses, &unit_weights(), &holdings);
        assert!((breakdown.workload_stdev - (338.0f64).sqrt()).abs() < 1e-9);

        let single = [holdings[0]];
        assert_eq!(score(&courses, &unit_weights(), &single).workload_stdev, 0.0);
    }

    #[test]
    fn test_workload_of_long_sessions_does_not_overflow() {
        let load = CourseLoad {
            hours: 400_000_000,
            weeks: 13,
        };
        assert_eq!(load.workload(), 5_200_000_000);

        let courses = HashMap::from([("SC1003".to_string(), load)]);
        let alice = Candidate::new("alice", 1);
        let bob = Candidate::new("bob", 1);
        let groups = [group("SC1003", "A1", Weekday::Mon, "0830-1020", &[1, 2])];
        let holdings = [
            Holding {
                candidate: &alice,
                groups: &groups,
            },
            Holding {
                candidate: &bob,
                groups: &[],
            },
        ];

        // ratios 5.2e9 and 0: sample stdev = 5.2e9 / sqrt(2)
        let stdev = score(&courses, &unit_weights(), &holdings).workload_stdev;
        assert!((stdev - 5_200_000_000.0 / 2f64.sqrt()).abs() < 1.0);
    }
}
