//! Result resolution: map matched fingerprints back to the party's own
//! identifiers. Runs locally on the party's device.

use crate::compute::MatchResult;
use crate::fingerprint::Normalizer;
use std::collections::HashSet;

/// Originals whose fingerprint appears in `result`, in original order.
///
/// Originals that normalize to the same value are reported once, as their
/// first occurrence.
pub fn resolve_matches<S: AsRef<str>>(
    originals: &[S],
    result: &MatchResult,
    normalizer: &Normalizer,
) -> Vec<String> {
    let mut seen = HashSet::new();
    originals
        .iter()
        .map(AsRef::as_ref)
        .filter(|raw| !raw.trim().is_empty())
        .filter(|raw| {
            let fingerprint = normalizer.fingerprint(raw);
            result.contains(&fingerprint) && seen.insert(fingerprint)
        })
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::Fingerprint;

    fn result_with(values: &[&str]) -> MatchResult {
        let mut result = MatchResult::empty();
        for (slot, value) in values.iter().enumerate() {
            result.matches[slot * 2] = Fingerprint::of_normalized(value);
        }
        result.match_count = values.len() as u32;
        result
    }

    #[test]
    fn test_resolves_in_original_order() {
        let originals = ["carol@example.com", "+1 555 123 4567", "bob@example.com"];
        let result = result_with(&["bob@example.com", "+15551234567"]);
        assert_eq!(
            resolve_matches(&originals, &result, &Normalizer::default()),
            vec!["+1 555 123 4567".to_string(), "bob@example.com".to_string()]
        );
    }

    #[test]
    fn test_duplicates_reported_once() {
        let originals = ["Bob@Example.com", "bob@example.com "];
        let result = result_with(&["bob@example.com"]);
        assert_eq!(
            resolve_matches(&originals, &result, &Normalizer::default()),
            vec!["Bob@Example.com".to_string()]
        );
    }

    #[test]
    fn test_empty_result_resolves_nothing() {
        let originals = ["a@example.com", "b@example.com"];
        assert!(resolve_matches(&originals, &MatchResult::empty(), &Normalizer::default()).is_empty());
    }

    #[test]
    fn test_blank_originals_ignored() {
        let originals = ["", "  "];
        assert!(resolve_matches(&originals, &result_with(&["a"]), &Normalizer::default()).is_empty());
    }
}
