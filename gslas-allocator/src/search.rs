//! Randomised greedy search over lab group orderings.

use crate::constraints::violates_constraints;
use crate::error::{AllocationError, Result};
use crate::model::{
    AllocationInput, AllocationOutcome, Candidate, GroupKey, LabGroup, NewAssignment, Weights,
};
use crate::pairs::find_odd_even_pairs;
use crate::penalty::{score, Holding, PenaltyBreakdown};
use rand::seq::SliceRandom;
use rand::Rng;
use std::cmp::Reverse;
use std::collections::BTreeSet;
use tracing::{debug, info};

/// Highest preference rank a student can give.
pub const MAX_RANK: u8 = 8;

/// Run the allocation search.
///
/// Each iteration seeds every candidate with the groups they already hold, applies
/// approved course locks, then fills remaining capacity greedily. The group order is
/// shuffled between iterations and the lowest-penalty iteration wins.
pub fn allocate<R>(input: &AllocationInput, weights: &Weights, rng: &mut R) -> Result<AllocationOutcome>
where
    R: Rng + ?Sized,
{
    if input.candidates.is_empty() {
        return Err(AllocationError::NoEligibleStudents);
    }

    let mut order: Vec<usize> = input
        .candidates
        .iter()
        .enumerate()
        .filter(|(_, c)| (c.held.len() as u32) < c.lab_load)
        .map(|(idx, _)| idx)
        .collect();

    if order.is_empty() {
        return Err(AllocationError::NoCapacity);
    }

    order.sort_by_key(|&idx| {
        let candidate = &input.candidates[idx];
        (
            Reverse(candidate.availability.is_some()),
            Reverse(candidate.lab_load - candidate.held.len() as u32),
        )
    });

    let iterations = weights.permutation_count.max(1);
    let mut groups = input.available.clone();
    let mut best: Option<(PenaltyBreakdown, Vec<NewAssignment>)> = None;

    for iteration in 0..iterations {
        if iteration > 0 {
            groups.shuffle(rng);
        }

        let mut round = Round::new(input, &order, groups.clone());
        round.apply_course_locks();
        round.fill_greedily();

        let penalty = round.penalty(weights);
        debug!(
            iteration,
            penalty = penalty.total,
            assigned = round.added.len(),
            "allocation iteration scored"
        );

        let improved = best
            .as_ref()
            .map_or(true, |(best_penalty, _)| penalty.total < best_penalty.total);
        if improved {
            best = Some((penalty, round.into_assignments()));
        }
    }

    let (penalty, assignments) = best.unwrap_or_default();
    info!(
        iterations,
        penalty = penalty.total,
        new_assignments = assignments.len(),
        "allocation search finished"
    );

    Ok(AllocationOutcome {
        assignments,
        penalty,
        iterations,
    })
}

/// State of a single iteration.
struct Round<'a> {
    input: &'a AllocationInput,
    order: &'a [usize],
    available: Vec<LabGroup>,
    /// Groups held per candidate, indexed like `input.candidates`.
    holdings: Vec<Vec<LabGroup>>,
    added: Vec<(usize, GroupKey)>,
}

impl<'a> Round<'a> {
    fn new(input: &'a AllocationInput, order: &'a [usize], available: Vec<LabGroup>) -> Self {
        Self {
            input,
            order,
            available,
            holdings: input.candidates.iter().map(|c| c.held.clone()).collect(),
            added: Vec::new(),
        }
    }

    fn candidate(&self, idx: usize) -> &'a Candidate {
        &self.input.candidates[idx]
    }

    fn remaining(&self, idx: usize) -> u32 {
        self.candidate(idx)
            .lab_load
            .saturating_sub(self.holdings[idx].len() as u32)
    }

    fn is_full(&self, idx: usize) -> bool {
        self.remaining(idx) == 0
    }

    fn course_keys(&self, course: &str) -> Vec<GroupKey> {
        self.available
            .iter()
            .filter(|g| g.key.course == course)
            .map(|g| g.key.clone())
            .collect()
    }

    fn course_pairs(&self, course: &str) -> Vec<(GroupKey, GroupKey)> {
        find_odd_even_pairs(self.available.iter().filter(|g| g.key.course == course))
    }

    /// Give `key` to candidate `idx` if it is still available and allowed.
    fn try_assign(&mut self, idx: usize, key: &GroupKey) -> bool {
        let Some(pos) = self.available.iter().position(|g| &g.key == key) else {
            return false;
        };

        let candidate = self.candidate(idx);
        if violates_constraints(
            candidate.lab_load,
            candidate.availability.as_ref(),
            &self.holdings[idx],
            &self.available[pos],
        ) {
            return false;
        }

        let group = self.available.remove(pos);
        self.added.push((idx, group.key.clone()));
        self.holdings[idx].push(group);
        true
    }

    /// Assign both halves of an odd/even pair, or neither.
    fn try_assign_pair(&mut self, idx: usize, pair: &(GroupKey, GroupKey)) -> bool {
        let Some(first_pos) = self.available.iter().position(|g| g.key == pair.0) else {
            return false;
        };
        if !self.try_assign(idx, &pair.0) {
            return false;
        }
        if self.try_assign(idx, &pair.1) {
            return true;
        }

        self.added.pop();
        if let Some(group) = self.holdings[idx].pop() {
            self.available.insert(first_pos, group);
        }
        false
    }

    /// Assign groups of one course: pairs while at least two units remain, then singles.
    /// `limit` caps the number of groups taken. Returns the number assigned.
    fn assign_course(&mut self, idx: usize, course: &str, limit: Option<u32>) -> u32 {
        let mut taken = 0;
        let left = |round: &Self, taken: u32| {
            let capacity = round.remaining(idx);
            match limit {
                Some(limit) => capacity.min(limit.saturating_sub(taken)),
                None => capacity,
            }
        };

        for pair in self.course_pairs(course) {
            if left(&*self, taken) <= 1 {
                break;
            }
            if self.try_assign_pair(idx, &pair) {
                taken += 2;
            }
        }

        for key in self.course_keys(course) {
            if left(&*self, taken) == 0 {
                break;
            }
            if self.try_assign(idx, &key) {
                taken += 1;
            }
        }

        taken
    }

    fn apply_course_locks(&mut self) {
        for &idx in self.order {
            let Some(lock) = self.candidate(idx).course_lock.as_ref() else {
                continue;
            };
            let taken = self.assign_course(idx, &lock.course, Some(lock.groups));
            debug!(
                student = %self.candidate(idx).id,
                course = %lock.course,
                requested = lock.groups,
                taken,
                "applied course lock"
            );
        }
    }

    fn fill_greedily(&mut self) {
        for &idx in self.order {
            if self.is_full(idx) {
                continue;
            }
            let candidate = self.candidate(idx);

            // Courses the student already teaches come first.
            let held_courses: BTreeSet<String> = self.holdings[idx]
                .iter()
                .map(|g| g.key.course.clone())
                .collect();
            for course in &held_courses {
                if self.is_full(idx) {
                    break;
                }
                self.assign_course(idx, course, None);
            }

            for rank in 1..=MAX_RANK {
                if self.is_full(idx) {
                    break;
                }
                let mut ranked: Vec<&str> = candidate
                    .preferences
                    .iter()
                    .filter(|p| p.rank == rank)
                    .map(|p| p.course.as_str())
                    .collect();
                ranked.sort_by_key(|course| Reverse(candidate.past_courses.contains(*course)));

                for course in ranked {
                    if self.is_full(idx) {
                        break;
                    }
                    self.assign_course(idx, course, None);
                }
            }

            if !self.is_full(idx) {
                let keys: Vec<GroupKey> = self.available.iter().map(|g| g.key.clone()).collect();
                for key in keys {
                    if self.is_full(idx) {
                        break;
                    }
                    self.try_assign(idx, &key);
                }
            }
        }
    }

    fn penalty(&self, weights: &Weights) -> PenaltyBreakdown {
        let holdings: Vec<Holding<'_>> = self
            .order
            .iter()
            .map(|&idx| Holding {
                candidate: self.candidate(idx),
                groups: &self.holdings[idx],
            })
            .collect();
        score(&self.input.courses, weights, &holdings)
    }

    fn into_assignments(self) -> Vec<NewAssignment> {
        self.added
            .into_iter()
            .map(|(idx, group)| NewAssignment {
                student: self.input.candidates[idx].id.clone(),
                group,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Availability, CourseLoad, CourseLock, Preference, Session};
    use crate::schedule::{parse_time, HalfDay, Slot, Weekday};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashMap;

    const ODD: &[u8] = &[1, 3, 5, 7, 9, 11, 13];
    const EVEN: &[u8] = &[2, 4, 6, 8, 10, 12];
    const WEEKLY: &[u8] = &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13];

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

    fn prefer(candidate: &mut Candidate, course: &str, rank: u8) {
        candidate.preferences.push(Preference {
            course: course.to_string(),
            rank,
        });
    }

    fn input(available: Vec<LabGroup>, candidates: Vec<Candidate>) -> AllocationInput {
        AllocationInput {
            courses: HashMap::from([
                ("SC1003".to_string(), CourseLoad { hours: 2, weeks: 13 }),
                ("SC2002".to_string(), CourseLoad { hours: 2, weeks: 13 }),
            ]),
            available,
            candidates,
        }
    }

    fn weights(permutations: u32) -> Weights {
        Weights {
            permutation_count: permutations,
            ..Weights::default()
        }
    }

    fn held_by<'a>(outcome: &'a AllocationOutcome, student: &str) -> Vec<&'a GroupKey> {
        outcome
            .assignments
            .iter()
            .filter(|a| a.student == student)
            .map(|a| &a.group)
            .collect()
    }

    #[test]
    fn test_errors_without_candidates_or_capacity() {
        let mut rng = StdRng::seed_from_u64(1);
        let empty = input(vec![], vec![]);
        assert_eq!(
            allocate(&empty, &weights(1), &mut rng).unwrap_err(),
            AllocationError::NoEligibleStudents
        );

        let mut full = Candidate::new("alice", 1);
        full.held = vec![group("SC1003", "A1", Weekday::Mon, "0830-1020", WEEKLY)];
        let saturated = input(vec![], vec![full, Candidate::new("bob", 0)]);
        assert_eq!(
            allocate(&saturated, &weights(1), &mut rng).unwrap_err(),
            AllocationError::NoCapacity
        );
    }

    #[test]
    fn test_preferences_drive_assignment() {
        let mut alice = Candidate::new("alice", 1);
        prefer(&mut alice, "SC2002", 1);
        let mut bob = Candidate::new("bob", 1);
        prefer(&mut bob, "SC1003", 1);

        let available = vec![
            group("SC1003", "A1", Weekday::Mon, "0830-1020", WEEKLY),
            group("SC2002", "B1", Weekday::Tue, "0830-1020", WEEKLY),
        ];
        let mut rng = StdRng::seed_from_u64(7);
        let outcome = allocate(&input(available, vec![alice, bob]), &weights(5), &mut rng).unwrap();

        assert_eq!(held_by(&outcome, "alice"), vec![&GroupKey::new("SC2002", "B1")]);
        assert_eq!(held_by(&outcome, "bob"), vec![&GroupKey::new("SC1003", "A1")]);
    }

    #[test]
    fn test_load_and_clashes_are_respected() {
        let mut alice = Candidate::new("alice", 2);
        prefer(&mut alice, "SC1003", 1);

        let available = vec![
            group("SC1003", "A1", Weekday::Mon, "0830-1020", WEEKLY),
            group("SC1003", "A2", Weekday::Mon, "0930-1120", WEEKLY),
            group("SC1003", "A3", Weekday::Tue, "0830-1020", WEEKLY),
            group("SC1003", "A4", Weekday::Wed, "0830-1020", WEEKLY),
        ];
        let mut rng = StdRng::seed_from_u64(3);
        let outcome = allocate(&input(available, vec![alice]), &weights(10), &mut rng).unwrap();

        let held = held_by(&outcome, "alice");
        assert_eq!(held.len(), 2);
        let a1 = GroupKey::new("SC1003", "A1");
        let a2 = GroupKey::new("SC1003", "A2");
        assert!(!(held.contains(&&a1) && held.contains(&&a2)));
    }

    #[test]
    fn test_odd_even_pair_goes_to_one_student() {
        let mut alice = Candidate::new("alice", 2);
        prefer(&mut alice, "SC1003", 1);

        let available = vec![
            group("SC1003", "A1", Weekday::Mon, "0830-1020", ODD),
            group("SC1003", "X", Weekday::Thu, "0830-1020", WEEKLY),
            group("SC1003", "A2", Weekday::Mon, "0830-1020", EVEN),
        ];
        let mut rng = StdRng::seed_from_u64(11);
        let outcome = allocate(&input(available, vec![alice]), &weights(1), &mut rng).unwrap();

        assert_eq!(
            held_by(&outcome, "alice"),
            vec![&GroupKey::new("SC1003", "A1"), &GroupKey::new("SC1003", "A2")]
        );
    }

    #[test]
    fn test_course_lock_takes_locked_course_first() {
        let mut alice = Candidate::new("alice", 1);
        prefer(&mut alice, "SC2002", 1);
        alice.course_lock = Some(CourseLock {
            course: "SC1003".to_string(),
            groups: 1,
        });
        let mut bob = Candidate::new("bob", 1);
        prefer(&mut bob, "SC2002", 1);

        let available = vec![
            group("SC2002", "B1", Weekday::Tue, "0830-1020", WEEKLY),
            group("SC1003", "A1", Weekday::Mon, "0830-1020", WEEKLY),
        ];
        let mut rng = StdRng::seed_from_u64(5);
        let outcome = allocate(&input(available, vec![alice, bob]), &weights(1), &mut rng).unwrap();

        assert_eq!(held_by(&outcome, "alice"), vec![&GroupKey::new("SC1003", "A1")]);
        assert_eq!(held_by(&outcome, "bob"), vec![&GroupKey::new("SC2002", "B1")]);
    }

    #[test]
    fn test_existing_assignments_are_kept_and_extended() {
        let mut alice = Candidate::new("alice", 2);
        alice.held = vec![group("SC2002", "B1", Weekday::Tue, "0830-1020", WEEKLY)];

        let available = vec![
            group("SC1003", "A1", Weekday::Mon, "0830-1020", WEEKLY),
            group("SC2002", "B2", Weekday::Wed, "0830-1020", WEEKLY),
        ];
        let mut rng = StdRng::seed_from_u64(9);
        let outcome = allocate(&input(available, vec![alice]), &weights(1), &mut rng).unwrap();

        // Only new assignments are reported, and the held course is extended first.
        assert_eq!(held_by(&outcome, "alice"), vec![&GroupKey::new("SC2002", "B2")]);
    }

    #[test]
    fn test_availability_limits_apply() {
        let mut alice = Candidate::new("alice", 3);
        prefer(&mut alice, "SC1003", 1);
        alice.availability = Some(Availability {
            max_teaching_days: 1,
            unavailable: vec![Slot::new(Weekday::Mon, HalfDay::Am)],
        });

        let available = vec![
            group("SC1003", "A1", Weekday::Mon, "0830-1020", WEEKLY),
            group("SC1003", "A2", Weekday::Tue, "0830-1020", WEEKLY),
            group("SC1003", "A3", Weekday::Wed, "0830-1020", WEEKLY),
            group("SC1003", "A4", Weekday::Tue, "1430-1620", WEEKLY),
        ];
        let mut rng = StdRng::seed_from_u64(2);
        let outcome = allocate(&input(available, vec![alice]), &weights(1), &mut rng).unwrap();

        assert_eq!(
            held_by(&outcome, "alice"),
            vec![&GroupKey::new("SC1003", "A2"), &GroupKey::new("SC1003", "A4")]
        );
    }

    #[test]
    fn test_same_seed_is_deterministic() {
        let build = || {
            let mut alice = Candidate::new("alice", 2);
            prefer(&mut alice, "SC1003", 1);
            let mut bob = Candidate::new("bob", 2);
            prefer(&mut bob, "SC1003", 2);
            let available = (0..6)
                .map(|i| {
                    let day = Weekday::ALL[i % 5];
                    group("SC1003", &format!("G{i}"), day, "0830-1020", WEEKLY)
                })
                .collect();
            input(available, vec![alice, bob])
        };

        let first = allocate(&build(), &weights(8), &mut StdRng::seed_from_u64(42)).unwrap();
        let second = allocate(&build(), &weights(8), &mut StdRng::seed_from_u64(42)).unwrap();
        assert_eq!(first.assignments, second.assignments);
        assert_eq!(first.penalty, second.penalty);
        assert_eq!(first.iterations, 8);
    }

    #[test]
    fn test_course_lock_takes_odd_even_pair() {
        let mut alice = Candidate::new("alice", 2);
        alice.course_lock = Some(CourseLock {
            course: "SC1003".to_string(),
            groups: 2,
        });
        let bob = Candidate::new("bob", 1);

        // The weekly decoy comes first, so taking singles in order would split the pair.
        let available = vec![
            group("SC1003", "X", Weekday::Thu, "0830-1020", WEEKLY),
            group("SC1003", "A1", Weekday::Mon, "0830-1020", ODD),
            group("SC1003", "A2", Weekday::Mon, "0830-1020", EVEN),
        ];
        let mut rng = StdRng::seed_from_u64(13);
        let outcome = allocate(&input(available, vec![alice, bob]), &weights(1), &mut rng).unwrap();

        assert_eq!(
            held_by(&outcome, "alice"),
            vec![&GroupKey::new("SC1003", "A1"), &GroupKey::new("SC1003", "A2")]
        );
        assert_eq!(held_by(&outcome, "bob"), vec![&GroupKey::new("SC1003", "X")]);
        assert_eq!(outcome.penalty.odd_even_splits, 0);
    }

    #[test]
    fn test_best_iteration_is_kept() {
        // With one unit each, input order hands A1 and A2 to different students.
        let build = || {
            input(
                vec![
                    group("SC1003", "A1", Weekday::Mon, "0830-1020", ODD),
                    group("SC1003", "A2", Weekday::Mon, "0830-1020", EVEN),
                    group("SC1003", "X", Weekday::Thu, "0830-1020", WEEKLY),
                ],
                vec![Candidate::new("alice", 1), Candidate::new("bob", 1)],
            )
        };

        let first_only = allocate(&build(), &weights(1), &mut StdRng::seed_from_u64(21)).unwrap();
        assert_eq!(first_only.penalty.odd_even_splits, 2);
        assert_eq!(first_only.penalty.total, 80.0 + 2.0 * 16.0 * 25.0);

        let searched = allocate(&build(), &weights(40), &mut StdRng::seed_from_u64(21)).unwrap();
        assert_eq!(searched.penalty.odd_even_splits, 0);
        assert_eq!(searched.penalty.total, 2.0 * 16.0 * 25.0);
        assert_eq!(searched.assignments.len(), 2);
        assert!(searched
            .assignments
            .iter()
            .any(|a| a.group == GroupKey::new("SC1003", "X")));
    }

    #[test]
    fn test_long_sessions_do_not_overflow_workload() {
        let mut long = input(
            vec![
                group("SC1003", "A1", Weekday::Mon, "0830-1020", WEEKLY),
                group("SC1003", "A2", Weekday::Tue, "0830-1020", WEEKLY),
            ],
            vec![Candidate::new("alice", 1), Candidate::new("bob", 1)],
        );
        long.courses.insert(
            "SC1003".to_string(),
            CourseLoad {
                hours: 400_000_000,
                weeks: 13,
            },
        );

        let outcome = allocate(&long, &weights(3), &mut StdRng::seed_from_u64(4)).unwrap();
        assert_eq!(outcome.assignments.len(), 2);
        assert!(outcome.penalty.total.is_finite());
    }
}
