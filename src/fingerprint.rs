//! Contact fingerprinting
//!
//! Turns raw contact identifiers (emails, phone numbers, handles) into fixed
//! width 128-bit fingerprints and packs them into a [`ContactSet`], the only
//! shape the compute cluster ever sees.
//!
//! # Pipeline
//!
//! ```text
//! raw identifiers (<= 32)
//!      │
//!      ▼ normalize (trim, lowercase, phone canonicalization)
//!      ▼ deduplicate (first-seen order)
//!      ▼ SHA-256, upper 128 bits
//! ContactSet { slots: [Fingerprint; 32], count }
//! ```
//!
//! # Zero Sentinel
//!
//! A zero fingerprint marks an empty slot. If a digest truncates to zero the
//! identifier is re-hashed with a counter suffix until a non-zero value comes
//! out. The re-hash is deterministic, so result resolution recomputes the same
//! value from the original list.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fmt;
use subtle::{Choice, ConditionallySelectable, ConstantTimeEq};
use thiserror::Error;

/// Maximum contacts per party. Fixed by the 32x32 comparison grid.
pub const MAX_CONTACTS: usize = 32;

/// Country code prepended to phone numbers written without a leading `+`.
pub const DEFAULT_COUNTRY_CODE: &str = "1";

/// Punctuation tolerated inside phone numbers.
const PHONE_PUNCTUATION: &[char] = &[' ', '-', '.', '(', ')', '+'];

/// Fingerprint pipeline errors. All of these are user input problems.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FingerprintError {
    #[error("Too many contacts: {supplied} supplied, at most {max} allowed")]
    CapacityExceeded { supplied: usize, max: usize },

    #[error("Contact at position {index} is blank")]
    EmptyIdentifier { index: usize },

    #[error("Invalid country code '{0}': expected 1 to 3 digits")]
    InvalidCountryCode(String),
}

/// A 128-bit contact fingerprint. Zero is the empty-slot sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Fingerprint(u128);

impl Fingerprint {
    /// The empty-slot sentinel.
    pub const EMPTY: Fingerprint = Fingerprint(0);

    pub const fn from_u128(value: u128) -> Self {
        Self(value)
    }

    pub const fn as_u128(&self) -> u128 {
        self.0
    }

    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(u128::from_be_bytes(bytes))
    }

    pub fn to_bytes(&self) -> [u8; 16] {
        self.0.to_be_bytes()
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Fingerprint of an already-normalized identifier.
    pub fn of_normalized(normalized: &str) -> Self {
        Self(first_nonzero(|counter| digest_prefix(normalized, counter)))
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.to_bytes()))
    }
}

// Serialized as 16 big-endian bytes so every encoder handles it, not as a
// native u128.
impl Serialize for Fingerprint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_bytes().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Fingerprint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        <[u8; 16]>::deserialize(deserializer).map(Fingerprint::from_bytes)
    }
}

impl ConstantTimeEq for Fingerprint {
    fn ct_eq(&self, other: &Self) -> Choice {
        self.0.ct_eq(&other.0)
    }
}

impl ConditionallySelectable for Fingerprint {
    fn conditional_select(a: &Self, b: &Self, choice: Choice) -> Self {
        Self(u128::conditional_select(&a.0, &b.0, choice))
    }
}

/// Upper 128 bits of SHA-256(normalized), or of
/// SHA-256(normalized || 0x00 || counter) for a re-hash.
fn digest_prefix(normalized: &str, counter: Option<u32>) -> u128 {
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    if let Some(counter) = counter {
        hasher.update([0u8]);
        hasher.update(counter.to_be_bytes());
    }
    let digest = hasher.finalize();
    let mut prefix = [0u8; 16];
    prefix.copy_from_slice(&digest[..16]);
    u128::from_be_bytes(prefix)
}

fn first_nonzero(mut candidate: impl FnMut(Option<u32>) -> u128) -> u128 {
    let mut value = candidate(None);
    let mut counter = 0u32;
    while value == 0 {
        counter += 1;
        value = candidate(Some(counter));
    }
    value
}

/// Identifier normalizer carrying the default country code for phone numbers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalizer {
    country_code: String,
}

impl Normalizer {
    /// Create a normalizer. Accepts the code with or without a leading `+`.
    pub fn new(country_code: &str) -> Result<Self, FingerprintError> {
        let digits = country_code.trim().trim_start_matches('+');
        if digits.is_empty() || digits.len() > 3 || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(FingerprintError::InvalidCountryCode(country_code.to_string()));
        }
        Ok(Self {
            country_code: digits.to_string(),
        })
    }

    pub fn country_code(&self) -> &str {
        &self.country_code
    }

    /// Normalize a raw identifier.
    ///
    /// Phone-shaped values (digits plus phone punctuation) become `+<digits>`,
    /// with the default country code prepended when no `+` was written.
    /// Everything else is trimmed and lowercased. Idempotent.
    pub fn normalize(&self, raw: &str) -> String {
        let trimmed = raw.trim();
        if looks_like_phone(trimmed) {
            let digits: String = trimmed.chars().filter(|c| c.is_ascii_digit()).collect();
            if trimmed.starts_with('+') {
                format!("+{}", digits)
            } else {
                format!("+{}{}", self.country_code, digits)
            }
        } else {
            trimmed.to_lowercase()
        }
    }

    /// Normalize and hash one raw identifier.
    pub fn fingerprint(&self, raw: &str) -> Fingerprint {
        Fingerprint::of_normalized(&self.normalize(raw))
    }

    /// Build a [`ContactSet`] from raw identifiers.
    ///
    /// Capacity is checked on the raw count before normalization. Duplicates
    /// (after normalization) keep their first occurrence.
    pub fn contact_set<S: AsRef<str>>(&self, raw: &[S]) -> Result<ContactSet, FingerprintError> {
        if raw.len() > MAX_CONTACTS {
            return Err(FingerprintError::CapacityExceeded {
                supplied: raw.len(),
                max: MAX_CONTACTS,
            });
        }

        let mut slots = [Fingerprint::EMPTY; MAX_CONTACTS];
        let mut seen = HashSet::with_capacity(raw.len());
        let mut count = 0usize;

        for (index, identifier) in raw.iter().enumerate() {
            let normalized = self.normalize(identifier.as_ref());
            if normalized.is_empty() {
                return Err(FingerprintError::EmptyIdentifier { index });
            }

            let fingerprint = Fingerprint::of_normalized(&normalized);
            if seen.insert(fingerprint) {
                slots[count] = fingerprint;
                count += 1;
            }
        }

        Ok(ContactSet {
            slots,
            count: count as u32,
        })
    }
}

impl Default for Normalizer {
    fn default() -> Self {
        Self {
            country_code: DEFAULT_COUNTRY_CODE.to_string(),
        }
    }
}

fn looks_like_phone(value: &str) -> bool {
    value.chars().any(|c| c.is_ascii_digit())
        && value
            .chars()
            .all(|c| c.is_ascii_digit() || PHONE_PUNCTUATION.contains(&c))
}

/// Normalize with the default country code.
pub fn normalize(raw: &str) -> String {
    Normalizer::default().normalize(raw)
}

/// Build a contact set with the default country code.
pub fn build_contact_set<S: AsRef<str>>(raw: &[S]) -> Result<ContactSet, FingerprintError> {
    Normalizer::default().contact_set(raw)
}

/// Fixed-capacity fingerprint set.
///
/// Slots `[0, count)` are non-zero and distinct, slots `[count, 32)` are zero.
/// Sets built by [`Normalizer::contact_set`] always hold this invariant. Sets
/// decrypted inside the compute cluster are taken as-is, since checking them
/// would branch on secret data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactSet {
    slots: [Fingerprint; MAX_CONTACTS],
    count: u32,
}

impl ContactSet {
    pub const fn empty() -> Self {
        Self {
            slots: [Fingerprint::EMPTY; MAX_CONTACTS],
            count: 0,
        }
    }

    pub(crate) fn from_parts(slots: [Fingerprint; MAX_CONTACTS], count: u32) -> Self {
        Self { slots, count }
    }

    pub fn slots(&self) -> &[Fingerprint; MAX_CONTACTS] {
        &self.slots
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// The populated slots.
    pub fn fingerprints(&self) -> &[Fingerprint] {
        let end = (self.count as usize).min(MAX_CONTACTS);
        &self.slots[..end]
    }

    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        !fingerprint.is_empty() && self.fingerprints().contains(fingerprint)
    }
}

impl Default for ContactSet {
    fn default() -> Self {
        Self::empty()
    }
}

impl ConditionallySelectable for ContactSet {
    fn conditional_select(a: &Self, b: &Self, choice: Choice) -> Self {
        let mut slots = [Fingerprint::EMPTY; MAX_CONTACTS];
        for (i, slot) in slots.iter_mut().enumerate() {
            *slot = Fingerprint::conditional_select(&a.slots[i], &b.slots[i], choice);
        }
        Self {
            slots,
            count: u32::conditional_select(&a.count, &b.count, choice),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_contacts(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("contact{}@example.com", i)).collect()
    }

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize("  Alice@Example.COM "), "alice@example.com");
    }

    #[test]
    fn test_normalize_phone_with_plus() {
        assert_eq!(normalize("+1 (555) 123-4567"), "+15551234567");
        assert_eq!(normalize("+44 20.7946.0958"), "+442079460958");
    }

    #[test]
    fn test_normalize_phone_without_plus_gets_country_code() {
        assert_eq!(normalize("555-123-4567"), "+15551234567");
        assert_eq!(normalize("(555) 123 4567"), "+15551234567");
    }

    #[test]
    fn test_normalize_custom_country_code() {
        let normalizer = Normalizer::new("+44").unwrap();
        assert_eq!(normalizer.country_code(), "44");
        assert_eq!(normalizer.normalize("2079460958"), "+442079460958");
    }

    #[test]
    fn test_invalid_country_code() {
        assert!(matches!(
            Normalizer::new("abc"),
            Err(FingerprintError::InvalidCountryCode(_))
        ));
        assert!(Normalizer::new("").is_err());
        assert!(Normalizer::new("1234").is_err());
    }

    #[test]
    fn test_normalize_punctuation_only_is_not_phone() {
        assert_eq!(normalize("---"), "---");
        assert_eq!(normalize("+"), "+");
    }

    #[test]
    fn test_normalize_idempotent_examples() {
        for raw in [
            "Alice@Example.com",
            "555 123 4567",
            "+1-555-123-4567",
            "  @Handle ",
            "1+2",
            "",
        ] {
            let once = normalize(raw);
            assert_eq!(normalize(&once), once, "not idempotent for {:?}", raw);
        }
    }

    #[test]
    fn test_fingerprint_deterministic() {
        let a = Fingerprint::of_normalized("alice@example.com");
        let b = Fingerprint::of_normalized("alice@example.com");
        assert_eq!(a, b);
        assert!(!a.is_empty());
    }

    #[test]
    fn test_fingerprint_is_sha256_upper_bits() {
        let digest = Sha256::digest(b"alice@example.com");
        let mut expected = [0u8; 16];
        expected.copy_from_slice(&digest[..16]);
        assert_eq!(
            Fingerprint::of_normalized("alice@example.com").to_bytes(),
            expected
        );
    }

    #[test]
    fn test_zero_digest_is_rehashed() {
        let mut calls = Vec::new();
        let value = first_nonzero(|counter| {
            calls.push(counter);
            match counter {
                None | Some(1) => 0,
                Some(_) => 7,
            }
        });
        assert_eq!(value, 7);
        assert_eq!(calls, vec![None, Some(1), Some(2)]);
    }

    #[test]
    fn test_rehash_differs_from_plain_digest() {
        assert_ne!(
            digest_prefix("alice@example.com", None),
            digest_prefix("alice@example.com", Some(1))
        );
    }

    #[test]
    fn test_fingerprints_distinct_over_corpus() {
        let corpus: Vec<String> = (0..2000)
            .map(|i| format!("user{}@example.org", i))
            .chain((0..2000).map(|i| format!("+1555{:07}", i)))
            .collect();
        let fingerprints: HashSet<_> = corpus
            .iter()
            .map(|s| Fingerprint::of_normalized(s))
            .collect();
        assert_eq!(fingerprints.len(), corpus.len());
    }

    #[test]
    fn test_contact_set_exactly_capacity() {
        let set = build_contact_set(&sample_contacts(32)).unwrap();
        assert_eq!(set.count(), 32);
        assert!(set.slots().iter().all(|s| !s.is_empty()));
    }

    #[test]
    fn test_contact_set_over_capacity() {
        let result = build_contact_set(&sample_contacts(33));
        assert_eq!(
            result,
            Err(FingerprintError::CapacityExceeded {
                supplied: 33,
                max: 32
            })
        );
    }

    #[test]
    fn test_capacity_checked_before_dedup() {
        let raw = vec!["same@example.com"; 33];
        assert!(matches!(
            build_contact_set(&raw),
            Err(FingerprintError::CapacityExceeded { .. })
        ));
    }

    #[test]
    fn test_contact_set_dedup_preserves_order() {
        let raw = [
            "bob@example.com",
            "Alice@example.com",
            "BOB@example.com ",
            "alice@example.com",
            "carol@example.com",
        ];
        let set = build_contact_set(&raw).unwrap();
        assert_eq!(set.count(), 3);
        assert_eq!(
            set.fingerprints(),
            &[
                Fingerprint::of_normalized("bob@example.com"),
                Fingerprint::of_normalized("alice@example.com"),
                Fingerprint::of_normalized("carol@example.com"),
            ]
        );
    }

    #[test]
    fn test_contact_set_zero_padding() {
        let set = build_contact_set(&["a@example.com", "b@example.com"]).unwrap();
        assert_eq!(set.count(), 2);
        assert!(set.slots()[2..].iter().all(Fingerprint::is_empty));
    }

    #[test]
    fn test_contact_set_blank_identifier_rejected() {
        let result = build_contact_set(&["a@example.com", "   "]);
        assert_eq!(result, Err(FingerprintError::EmptyIdentifier { index: 1 }));
    }

    #[test]
    fn test_contact_set_empty_input() {
        let set = build_contact_set::<&str>(&[]).unwrap();
        assert!(set.is_empty());
        assert_eq!(set, ContactSet::empty());
    }

    #[test]
    fn test_contains_ignores_sentinel() {
        let set = build_contact_set(&["a@example.com"]).unwrap();
        assert!(set.contains(&Fingerprint::of_normalized("a@example.com")));
        assert!(!set.contains(&Fingerprint::EMPTY));
    }

    #[test]
    fn test_conditional_select_contact_set() {
        let a = build_contact_set(&["a@example.com"]).unwrap();
        let b = build_contact_set(&["b@example.com", "c@example.com"]).unwrap();
        assert_eq!(ContactSet::conditional_select(&a, &b, Choice::from(0)), a);
        assert_eq!(ContactSet::conditional_select(&a, &b, Choice::from(1)), b);
    }

    #[test]
    fn test_fingerprint_display_is_hex() {
        let fp = Fingerprint::from_u128(0xAB);
        let display = fp.to_string();
        assert_eq!(display.len(), 32);
        assert!(display.ends_with("ab"));
    }

    #[test]
    fn test_fingerprint_cbor_roundtrip() {
        let fp = Fingerprint::of_normalized("alice@example.com");
        let bytes = crate::serialization::to_cbor(&fp).unwrap();
        let back: Fingerprint = crate::serialization::from_cbor(&bytes).unwrap();
        assert_eq!(fp, back);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Property: normalization is idempotent.
            #[test]
            fn normalize_is_idempotent(raw in "[ -~]{0,40}") {
                let once = normalize(&raw);
                prop_assert_eq!(normalize(&once), once);
            }

            /// Property: phone-shaped input normalizes to '+' followed by digits.
            #[test]
            fn phone_normalizes_to_digits(raw in "\\+?[0-9 ().-]{0,20}[0-9]") {
                let normalized = normalize(&raw);
                prop_assert!(normalized.starts_with('+'));
                prop_assert!(normalized[1..].chars().all(|c| c.is_ascii_digit()));
            }

            /// Property: built sets always hold the slot invariant.
            #[test]
            fn contact_set_invariant_holds(
                raw in prop::collection::vec("[a-e]{1,3}(@x\\.io)?", 0..=32),
            ) {
                let set = build_contact_set(&raw).unwrap();
                let count = set.count() as usize;
                let live: HashSet<_> = set.fingerprints().iter().collect();
                prop_assert_eq!(live.len(), count);
                prop_assert!(set.fingerprints().iter().all(|f| !f.is_empty()));
                prop_assert!(set.slots()[count..].iter().all(Fingerprint::is_empty));
            }
        }
    }
}
