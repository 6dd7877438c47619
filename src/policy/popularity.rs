//! Least-popular victim selection.
//!
//! When an insertion pushes the cache one past its capacity, the cache scans
//! its members and evicts the one with the lowest popularity. Ties go to the
//! member encountered first in traversal order, which the cache defines as
//! insertion order (oldest first), so the choice is deterministic for a fixed
//! membership.
//!
//! ```text
//!   traversal:   id 4 (pop 2)   id 1 (pop 0)   id 9 (pop 5)   id 7 (pop 0)
//!   sequence:        0              1              2              3
//!                                   ▲
//!                                   └── victim: lowest popularity, oldest of the ties
//! ```
//!
//! The scan is O(n) in the number of members; the cache calls it with its
//! exclusive section held, exactly once per over-capacity insertion.

use crate::ds::slot_table::SlotId;

/// What the policy needs to know about one member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    pub slot: SlotId,
    pub popularity: u64,
    /// Insertion order; lower is older and comes first in traversal.
    pub sequence: u64,
}

/// Victim-selection seam used by the cache during eviction.
pub trait VictimSelector {
    /// Picks the member to evict, or `None` if there are no candidates.
    fn select<I>(&self, candidates: I) -> Option<Candidate>
    where
        I: IntoIterator<Item = Candidate>;
}

/// Evicts the least popular member, oldest first on ties.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LeastPopular;

impl VictimSelector for LeastPopular {
    fn select<I>(&self, candidates: I) -> Option<Candidate>
    where
        I: IntoIterator<Item = Candidate>,
    {
        candidates
            .into_iter()
            .min_by_key(|candidate| (candidate.popularity, candidate.sequence))
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn candidate(slot: usize, popularity: u64, sequence: u64) -> Candidate {
        Candidate {
            slot: SlotId(slot),
            popularity,
            sequence,
        }
    }

    #[test]
    fn picks_lowest_popularity() {
        let victim = LeastPopular.select([
            candidate(0, 3, 0),
            candidate(1, 1, 1),
            candidate(2, 2, 2),
        ]);
        assert_eq!(victim.map(|c| c.slot), Some(SlotId(1)));
    }

    #[test]
    fn ties_go_to_the_oldest_member_regardless_of_slot() {
        // Slot order differs from insertion order after slot reuse.
        let victim = LeastPopular.select([
            candidate(0, 0, 7),
            candidate(1, 4, 1),
            candidate(2, 0, 3),
        ]);
        assert_eq!(victim.map(|c| c.slot), Some(SlotId(2)));
    }

    #[test]
    fn empty_membership_has_no_victim() {
        assert_eq!(LeastPopular.select(Vec::new()), None);
    }

    proptest! {
        /// Property: the victim's popularity is the minimum, and no other
        /// member with that popularity is older.
        #[cfg_attr(miri, ignore)]
        #[test]
        fn prop_victim_is_minimal(
            popularities in prop::collection::vec(0u64..5, 1..40)
        ) {
            let candidates: Vec<_> = popularities
                .iter()
                .enumerate()
                .map(|(idx, &pop)| candidate(idx, pop, idx as u64))
                .collect();
            let victim = LeastPopular.select(candidates.iter().copied()).unwrap();

            let min = *popularities.iter().min().unwrap();
            prop_assert_eq!(victim.popularity, min);
            let first = popularities.iter().position(|&pop| pop == min).unwrap();
            prop_assert_eq!(victim.slot, SlotId(first));
        }
    }
}
