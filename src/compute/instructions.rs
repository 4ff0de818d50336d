//! Protocol entry points executed inside the compute boundary.
//!
//! Every guard is evaluated as a `Choice` and applied through selects, so a
//! rejected call costs the same and touches the same memory as an accepted
//! one. The ledger status machine rejects out-of-order calls before they get
//! here; these guards are the in-boundary mirror of it.

use super::engine::intersect;
use super::state::{MatchResult, SessionState, SubmitConfirmation};
use crate::fingerprint::{ContactSet, Fingerprint, MAX_CONTACTS};
use crate::ledger::Role;
use subtle::{Choice, ConditionallySelectable, ConstantTimeEq};

fn flag(value: u8) -> Choice {
    value.ct_eq(&1)
}

/// Fresh all-zero state.
pub fn init_session() -> SessionState {
    SessionState::empty()
}

/// Store the first party's set. Accepted only once.
pub fn submit_first_party(
    state: &SessionState,
    set: &ContactSet,
) -> (SessionState, SubmitConfirmation) {
    let can_accept = !flag(state.first_submitted);

    let mut next = state.clone();
    next.first_party = ContactSet::conditional_select(&state.first_party, set, can_accept);
    next.first_submitted = u8::conditional_select(&state.first_submitted, &1, can_accept);

    let confirmation = SubmitConfirmation {
        accepted: bool::from(can_accept),
        party: Role::First,
    };
    (next, confirmation)
}

/// Store the second party's set and run the intersection, once.
///
/// Returns the second party's view of the result. When the first party has
/// not submitted, or the session already matched, the state is returned
/// unchanged and the result is empty.
pub fn submit_second_party_and_match(
    state: &SessionState,
    set: &ContactSet,
) -> (SessionState, MatchResult) {
    let can_proceed = flag(state.first_submitted) & !flag(state.matched);

    let mut next = state.clone();
    next.second_party = ContactSet::conditional_select(&state.second_party, set, can_proceed);
    next.second_submitted = u8::conditional_select(&state.second_submitted, &1, can_proceed);

    let outcome = intersect(&next.first_party, &next.second_party, can_proceed);

    for i in 0..MAX_CONTACTS {
        next.first_result[i] =
            Fingerprint::conditional_select(&state.first_result[i], &outcome.first_matches[i], can_proceed);
        next.second_result[i] =
            Fingerprint::conditional_select(&state.second_result[i], &outcome.second_matches[i], can_proceed);
    }
    next.result_count = u32::conditional_select(&state.result_count, &outcome.match_count, can_proceed);
    next.matched = u8::conditional_select(&state.matched, &1, can_proceed);

    // The caller only learns a result from this call if it ran.
    let mut result = next.result_for(Role::Second);
    let empty = MatchResult::empty();
    for i in 0..MAX_CONTACTS {
        result.matches[i].conditional_assign(&empty.matches[i], !can_proceed);
    }
    result.match_count.conditional_assign(&0, !can_proceed);

    (next, result)
}

/// One party's match result. Zero until the intersection has run.
pub fn reveal_matches(state: &SessionState, role: Role) -> MatchResult {
    let matched = flag(state.matched);
    let stored = state.result_for(role);

    let mut result = MatchResult::empty();
    for i in 0..MAX_CONTACTS {
        result.matches[i].conditional_assign(&stored.matches[i], matched);
    }
    result.match_count.conditional_assign(&stored.match_count, matched);
    result
}

/// First-party reveal.
pub fn reveal_first_party_matches(state: &SessionState) -> MatchResult {
    reveal_matches(state, Role::First)
}
