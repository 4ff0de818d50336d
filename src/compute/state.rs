//! Session state inside the compute boundary
//!
//! `SessionState` never leaves the cluster in plaintext. Between computations
//! it travels as a sealed blob (AES-256-GCM under a key derived from the
//! cluster storage secret), which the ledger stores opaquely.
//!
//! ```text
//! SessionState ──CBOR──► plaintext ──AES-256-GCM──► nonce(12) || ciphertext || tag(16)
//! ```

use crate::fingerprint::{ContactSet, Fingerprint, MAX_CONTACTS};
use crate::ledger::Role;
use crate::serialization::{from_cbor, to_cbor, SerializationError};
use hkdf::Hkdf;
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;
use zeroize::Zeroizing;

/// Errors sealing or unsealing session state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SealError {
    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("Sealing failed: {0}")]
    Seal(String),

    #[error("Unsealing failed: {0}")]
    Unseal(String),

    #[error("State serialization failed: {0}")]
    Serialization(#[from] SerializationError),
}

/// Full session state, only ever in plaintext inside the cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    pub first_party: ContactSet,
    pub second_party: ContactSet,
    pub first_submitted: u8,
    pub second_submitted: u8,
    pub matched: u8,
    pub first_result: [Fingerprint; MAX_CONTACTS],
    pub second_result: [Fingerprint; MAX_CONTACTS],
    pub result_count: u32,
}

impl SessionState {
    /// All-zero state produced by `init_session`.
    pub fn empty() -> Self {
        Self {
            first_party: ContactSet::empty(),
            second_party: ContactSet::empty(),
            first_submitted: 0,
            second_submitted: 0,
            matched: 0,
            first_result: [Fingerprint::EMPTY; MAX_CONTACTS],
            second_result: [Fingerprint::EMPTY; MAX_CONTACTS],
            result_count: 0,
        }
    }

    /// One party's view of the intersection.
    pub fn result_for(&self, role: Role) -> MatchResult {
        let matches = match role {
            Role::First => self.first_result,
            Role::Second => self.second_result,
        };
        MatchResult {
            matches,
            match_count: self.result_count,
        }
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::empty()
    }
}

/// Which of one party's fingerprints are in the intersection.
///
/// A match stays in the slot it occupied in that party's own set; all other
/// slots are zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchResult {
    pub matches: [Fingerprint; MAX_CONTACTS],
    pub match_count: u32,
}

impl MatchResult {
    pub fn empty() -> Self {
        Self {
            matches: [Fingerprint::EMPTY; MAX_CONTACTS],
            match_count: 0,
        }
    }

    /// The non-zero slots, in slot order.
    pub fn matched(&self) -> Vec<Fingerprint> {
        self.matches
            .iter()
            .copied()
            .filter(|fp| !fp.is_empty())
            .collect()
    }

    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        !fingerprint.is_empty() && self.matches.contains(fingerprint)
    }
}

impl Default for MatchResult {
    fn default() -> Self {
        Self::empty()
    }
}

/// Acknowledgement returned to the first party after submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitConfirmation {
    pub accepted: bool,
    pub party: Role,
}

fn storage_key(secret: &[u8; 32]) -> Result<LessSafeKey, SealError> {
    let hkdf = Hkdf::<Sha256>::new(Some(b"mutuals-state-sealing-v1"), secret);
    let mut key = Zeroizing::new([0u8; 32]);
    hkdf.expand(b"aes-256-gcm-key", &mut key[..])
        .map_err(|e| SealError::KeyDerivation(format!("HKDF expand failed: {}", e)))?;
    let unbound = UnboundKey::new(&AES_256_GCM, &key[..])
        .map_err(|e| SealError::KeyDerivation(format!("Key creation failed: {}", e)))?;
    Ok(LessSafeKey::new(unbound))
}

/// Seal a state under the cluster storage secret.
pub fn seal_state(state: &SessionState, secret: &[u8; 32]) -> Result<Vec<u8>, SealError> {
    let key = storage_key(secret)?;

    let mut nonce_bytes = [0u8; NONCE_LEN];
    SystemRandom::new()
        .fill(&mut nonce_bytes)
        .map_err(|_| SealError::Seal("RNG failure".to_string()))?;

    let mut buffer = to_cbor(state)?;
    key.seal_in_place_append_tag(
        Nonce::assume_unique_for_key(nonce_bytes),
        Aad::empty(),
        &mut buffer,
    )
    .map_err(|e| SealError::Seal(format!("Encryption failed: {}", e)))?;

    let mut sealed = Vec::with_capacity(NONCE_LEN + buffer.len());
    sealed.extend_from_slice(&nonce_bytes);
    sealed.extend_from_slice(&buffer);
    Ok(sealed)
}

/// Open a sealed state. Fails on a wrong secret or any tampering.
pub fn unseal_state(sealed: &[u8], secret: &[u8; 32]) -> Result<SessionState, SealError> {
    let tag_len = AES_256_GCM.tag_len();
    if sealed.len() < NONCE_LEN + tag_len {
        return Err(SealError::Unseal("Sealed state too short".to_string()));
    }

    let key = storage_key(secret)?;
    let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LEN);
    let nonce = Nonce::try_assume_unique_for_key(nonce_bytes)
        .map_err(|_| SealError::Unseal("Invalid nonce".to_string()))?;

    let mut buffer = ciphertext.to_vec();
    let plaintext = key
        .open_in_place(nonce, Aad::empty(), &mut buffer)
        .map_err(|e| SealError::Unseal(format!("Decryption failed: {}", e)))?;

    Ok(from_cbor(plaintext)?)
}
