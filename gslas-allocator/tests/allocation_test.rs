//! End-to-end allocation over a small semester timetable.

use gslas_allocator::pairs::find_odd_even_pairs;
use gslas_allocator::{
    allocate, check_group, parse_teaching_weeks, parse_time, AllocationInput, AllocationOutcome,
    Availability, Candidate, CourseLoad, GroupKey, HalfDay, LabGroup, Preference, Session, Slot,
    Weekday, Weights,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::{HashMap, HashSet};

fn group(course: &str, name: &str, day: Weekday, time: &str, remark: &str) -> LabGroup {
    LabGroup {
        key: GroupKey::new(course, name),
        sessions: vec![Session {
            lab_id: 0,
            day,
            time: parse_time(time).unwrap(),
            teaching_weeks: parse_teaching_weeks(remark).unwrap(),
        }],
    }
}

fn timetable() -> Vec<LabGroup> {
    vec![
        group("SC1003", "A1", Weekday::Mon, "0830-1020", "Teaching Wk1,3,5,7,9,11,13"),
        group("SC1003", "A2", Weekday::Mon, "0830-1020", "Teaching Wk2,4,6,8,10,12"),
        group("SC1003", "A3", Weekday::Tue, "1330-1520", ""),
        group("SC2002", "B1", Weekday::Wed, "0930-1120", "Teaching Wk2-13"),
        group("SC2002", "B2", Weekday::Wed, "0930-1120", "Teaching Wk2-13"),
        group("SC2002", "B3", Weekday::Thu, "1430-1620", "Teaching Wk2-13"),
        group("SC3020", "C1", Weekday::Fri, "1030-1220", ""),
        group("SC3020", "C2", Weekday::Mon, "1430-1620", ""),
    ]
}

fn candidate(id: &str, lab_load: u32, ranks: &[(&str, u8)]) -> Candidate {
    let mut candidate = Candidate::new(id, lab_load);
    candidate.preferences = ranks
        .iter()
        .map(|(course, rank)| Preference {
            course: course.to_string(),
            rank: *rank,
        })
        .collect();
    candidate
}

fn semester() -> AllocationInput {
    let mut carol = candidate("carol", 2, &[("SC3020", 1), ("SC2002", 2)]);
    carol.availability = Some(Availability {
        max_teaching_days: 1,
        unavailable: vec![Slot::new(Weekday::Mon, HalfDay::Pm)],
    });

    AllocationInput {
        courses: HashMap::from([
            ("SC1003".to_string(), CourseLoad { hours: 2, weeks: 6 }),
            ("SC2002".to_string(), CourseLoad { hours: 2, weeks: 12 }),
            ("SC3020".to_string(), CourseLoad { hours: 2, weeks: 13 }),
        ]),
        available: timetable(),
        candidates: vec![
            candidate("alice", 2, &[("SC1003", 1), ("SC2002", 3)]),
            candidate("bob", 3, &[("SC2002", 1), ("SC1003", 2)]),
            carol,
        ],
    }
}

fn run(seed: u64) -> AllocationOutcome {
    let weights = Weights {
        permutation_count: 20,
        ..Weights::default()
    };
    allocate(&semester(), &weights, &mut StdRng::seed_from_u64(seed)).unwrap()
}

#[test]
fn test_allocation_respects_every_constraint() {
    let input = semester();
    let outcome = run(11);
    let groups: HashMap<&GroupKey, &LabGroup> =
        input.available.iter().map(|g| (&g.key, g)).collect();

    let mut taken = HashSet::new();
    for assignment in &outcome.assignments {
        assert!(
            taken.insert(&assignment.group),
            "{} assigned twice",
            assignment.group
        );
    }

    for candidate in &input.candidates {
        let held: Vec<LabGroup> = outcome
            .assignments
            .iter()
            .filter(|a| a.student == candidate.id)
            .map(|a| groups[&a.group].clone())
            .collect();
        assert!(held.len() as u32 <= candidate.lab_load);

        // Re-adding each group on top of the others must be accepted.
        for (idx, group) in held.iter().enumerate() {
            let others: Vec<LabGroup> = held
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != idx)
                .map(|(_, g)| g.clone())
                .collect();
            assert_eq!(
                check_group(candidate.lab_load, candidate.availability.as_ref(), &others, group),
                Ok(()),
                "{} should not hold {}",
                candidate.id,
                group.key
            );
        }
    }

    // carol's one-day limit leaves her a single group.
    let capacity: u32 = input.candidates.iter().map(|c| c.lab_load).sum();
    assert_eq!(capacity, 7);
    assert!(outcome.assignments.len() >= 6);
}

#[test]
fn test_allocation_is_deterministic_for_a_seed() {
    let first = run(2024);
    let second = run(2024);

    assert_eq!(first.assignments, second.assignments);
    assert_eq!(first.penalty, second.penalty);
    assert_eq!(first.iterations, 20);
}

#[test]
fn test_odd_even_groups_pair_up() {
    let groups = timetable();
    let pairs = find_odd_even_pairs(groups.iter().filter(|g| g.key.course == "SC1003"));

    assert_eq!(
        pairs,
        vec![(GroupKey::new("SC1003", "A1"), GroupKey::new("SC1003", "A2"))]
    );
}

#[test]
fn test_outcome_serializes() {
    let outcome = run(5);
    let json = serde_json::to_value(&outcome).unwrap();

    assert_eq!(
        json["assignments"].as_array().unwrap().len(),
        outcome.assignments.len()
    );
    assert!(json["penalty"]["total"].is_number());
}
