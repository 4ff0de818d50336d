//! Oblivious intersection engine
//!
//! Compares every slot of one contact set against every slot of the other,
//! 32 × 32 = 1024 evaluations, whatever the sets contain. Accumulation uses
//! constant-time selects only, so neither the instruction stream nor the
//! memory access pattern depends on the fingerprints, the counts, or where
//! matches occur.
//!
//! ```text
//! is_match(i, j) = A[i] != 0  &  B[j] != 0  &  A[i] == B[j]  &  can_proceed
//!
//! first[i]  = select(first[i],  A[i],      is_match)
//! second[j] = select(second[j], B[j],      is_match)
//! count     = select(count,     count + 1, is_match)
//! ```

use crate::fingerprint::{ContactSet, Fingerprint, MAX_CONTACTS};
use subtle::{Choice, ConditionallySelectable, ConstantTimeEq};

/// Number of pairwise evaluations per intersection.
pub const COMPARISONS: u32 = (MAX_CONTACTS * MAX_CONTACTS) as u32;

/// Result of one engine run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntersectionOutcome {
    /// Matches at their positions in the first set.
    pub first_matches: [Fingerprint; MAX_CONTACTS],
    /// Matches at their positions in the second set.
    pub second_matches: [Fingerprint; MAX_CONTACTS],
    pub match_count: u32,
    /// Pairwise evaluations performed. Always [`COMPARISONS`].
    pub comparisons: u32,
}

/// Run the 32×32 comparison.
///
/// When `can_proceed` is false every `is_match` is false, so the outcome is
/// all zeros, but the same 1024 evaluations still run.
pub fn intersect(first: &ContactSet, second: &ContactSet, can_proceed: Choice) -> IntersectionOutcome {
    let a = first.slots();
    let b = second.slots();

    let mut first_matches = [Fingerprint::EMPTY; MAX_CONTACTS];
    let mut second_matches = [Fingerprint::EMPTY; MAX_CONTACTS];
    let mut match_count = 0u32;
    let mut comparisons = 0u32;

    for i in 0..MAX_CONTACTS {
        let a_live = !a[i].ct_eq(&Fingerprint::EMPTY);
        for j in 0..MAX_CONTACTS {
            let b_live = !b[j].ct_eq(&Fingerprint::EMPTY);
            let is_match = a_live & b_live & a[i].ct_eq(&b[j]) & can_proceed;

            first_matches[i].conditional_assign(&a[i], is_match);
            second_matches[j].conditional_assign(&b[j], is_match);
            match_count = u32::conditional_select(&match_count, &match_count.wrapping_add(1), is_match);
            comparisons += 1;
        }
    }

    IntersectionOutcome {
        first_matches,
        second_matches,
        match_count,
        comparisons,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::build_contact_set;

    fn set(items: &[&str]) -> ContactSet {
        build_contact_set(items).unwrap()
    }

    fn emails(prefix: &str, n: usize) -> Vec<String> {
        (0..n).map(|i| format!("{}{}@example.com", prefix, i)).collect()
    }

    #[test]
    fn test_disjoint_sets() {
        let outcome = intersect(
            &set(&["a@example.com", "b@example.com"]),
            &set(&["c@example.com", "d@example.com"]),
            Choice::from(1),
        );
        assert_eq!(outcome.match_count, 0);
        assert!(outcome.first_matches.iter().all(Fingerprint::is_empty));
        assert!(outcome.second_matches.iter().all(Fingerprint::is_empty));
    }

    #[test]
    fn test_full_overlap() {
        let items = emails("user", 7);
        let a = build_contact_set(&items).unwrap();
        let mut reversed = items.clone();
        reversed.reverse();
        let b = build_contact_set(&reversed).unwrap();

        let outcome = intersect(&a, &b, Choice::from(1));
        assert_eq!(outcome.match_count, 7);
        assert_eq!(&outcome.first_matches[..7], a.fingerprints());
        assert_eq!(&outcome.second_matches[..7], b.fingerprints());
    }

    #[test]
    fn test_partial_overlap_positions() {
        let a = set(&["x@example.com", "shared@example.com", "y@example.com"]);
        let b = set(&["shared@example.com", "z@example.com"]);
        let outcome = intersect(&a, &b, Choice::from(1));

        let shared = Fingerprint::of_normalized("shared@example.com");
        assert_eq!(outcome.match_count, 1);
        assert_eq!(outcome.first_matches[1], shared);
        assert_eq!(outcome.second_matches[0], shared);
        assert!(outcome.first_matches[0].is_empty());
        assert!(outcome.first_matches[2].is_empty());
    }

    #[test]
    fn test_empty_slots_never_match() {
        let outcome = intersect(&ContactSet::empty(), &ContactSet::empty(), Choice::from(1));
        assert_eq!(outcome.match_count, 0);
    }

    #[test]
    fn test_gate_closed_yields_nothing() {
        let a = set(&["shared@example.com"]);
        let outcome = intersect(&a, &a, Choice::from(0));
        assert_eq!(outcome.match_count, 0);
        assert!(outcome.first_matches.iter().all(Fingerprint::is_empty));
        assert_eq!(outcome.comparisons, COMPARISONS);
    }

    #[test]
    fn test_fixed_cost_small_and_full() {
        let small = set(&["one@example.com"]);
        let full = build_contact_set(&emails("full", 32)).unwrap();

        assert_eq!(intersect(&small, &small, Choice::from(1)).comparisons, 1024);
        assert_eq!(intersect(&full, &full, Choice::from(1)).comparisons, 1024);
        assert_eq!(intersect(&small, &full, Choice::from(1)).comparisons, 1024);
    }

    #[test]
    fn test_full_capacity_overlap() {
        let full = build_contact_set(&emails("full", 32)).unwrap();
        let outcome = intersect(&full, &full, Choice::from(1));
        assert_eq!(outcome.match_count, 32);
        assert!(outcome.first_matches.iter().all(|f| !f.is_empty()));
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;
        use std::collections::HashSet;

        proptest! {
            /// Property: the engine agrees with a plain set intersection.
            #[test]
            fn matches_plain_intersection(
                left in prop::collection::vec(0u8..48, 0..=32),
                right in prop::collection::vec(0u8..48, 0..=32),
            ) {
                let l: Vec<String> = left.iter().map(|n| format!("c{}@x.io", n)).collect();
                let r: Vec<String> = right.iter().map(|n| format!("c{}@x.io", n)).collect();
                let a = build_contact_set(&l).unwrap();
                let b = build_contact_set(&r).unwrap();

                let expected: HashSet<_> = a
                    .fingerprints()
                    .iter()
                    .filter(|f| b.contains(f))
                    .copied()
                    .collect();

                let outcome = intersect(&a, &b, Choice::from(1));
                prop_assert_eq!(outcome.match_count as usize, expected.len());
                let got: HashSet<_> = outcome
                    .first_matches
                    .iter()
                    .filter(|f| !f.is_empty())
                    .copied()
                    .collect();
                prop_assert_eq!(got, expected);
                prop_assert_eq!(outcome.comparisons, COMPARISONS);
            }
        }
    }
}
