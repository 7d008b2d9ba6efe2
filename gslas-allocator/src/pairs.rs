//! Odd/even week pairing.
//!
//! A group taught only in odd weeks and a group taught only in even weeks at the
//! same day and time form a pair: one student can take both without a clash, and
//! the timetable reads better when they do.

use crate::model::{GroupKey, LabGroup};
use crate::schedule::WeekParity;

/// Pair up the given groups of one course. Each group appears in at most one pair.
pub fn find_odd_even_pairs<'a, I>(groups: I) -> Vec<(GroupKey, GroupKey)>
where
    I: IntoIterator<Item = &'a LabGroup>,
{
    let mut odd = Vec::new();
    let mut even = Vec::new();

    for group in groups {
        let Some(first) = group.first_session() else {
            continue;
        };
        match group.parity() {
            WeekParity::AllOdd => odd.push((group, first)),
            WeekParity::AllEven => even.push((group, first)),
            WeekParity::Mixed => {}
        }
    }

    let mut used = vec![false; even.len()];
    let mut pairs = Vec::new();

    for (odd_group, odd_first) in odd {
        let partner = even.iter().enumerate().find(|(idx, (_, even_first))| {
            !used[*idx] && even_first.day == odd_first.day && even_first.time == odd_first.time
        });
        if let Some((idx, (even_group, _))) = partner {
            used[idx] = true;
            pairs.push((odd_group.key.clone(), even_group.key.clone()));
        }
    }

    pairs
}
