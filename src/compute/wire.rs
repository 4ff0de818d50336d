//! Encrypted outputs addressed to one party.
//!
//! Sealed under the party's shared key with a fresh output nonce, using the
//! same slot cipher as submissions.

use super::state::{MatchResult, SubmitConfirmation};
use crate::crypto::cipher::{CipherError, SealedValue, SharedCipher, SubmissionNonce};
use crate::fingerprint::{Fingerprint, MAX_CONTACTS};
use crate::ledger::Role;
use serde::{Deserialize, Serialize};

/// A match result only the addressed party can open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedMatchResult {
    pub nonce: SubmissionNonce,
    pub matches: [SealedValue; MAX_CONTACTS],
    pub match_count: SealedValue,
}

impl EncryptedMatchResult {
    pub fn seal(
        cipher: &SharedCipher,
        result: &MatchResult,
        nonce: SubmissionNonce,
    ) -> Result<Self, CipherError> {
        let mut values: Vec<u128> = result.matches.iter().map(Fingerprint::as_u128).collect();
        values.push(u128::from(result.match_count));
        let sealed = cipher.seal_values(&nonce, &values)?;

        let mut matches = [[0u8; 32]; MAX_CONTACTS];
        matches.copy_from_slice(&sealed[..MAX_CONTACTS]);
        Ok(Self {
            nonce,
            matches,
            match_count: sealed[MAX_CONTACTS],
        })
    }

    pub fn open(&self, cipher: &SharedCipher) -> Result<MatchResult, CipherError> {
        let mut sealed = self.matches.to_vec();
        sealed.push(self.match_count);
        let values = cipher.open_values(&self.nonce, &sealed)?;

        let mut result = MatchResult::empty();
        for (slot, value) in result.matches.iter_mut().zip(&values) {
            *slot = Fingerprint::from_u128(*value);
        }
        result.match_count = values[MAX_CONTACTS] as u32;
        Ok(result)
    }
}

/// A submission acknowledgement only the submitter can open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedConfirmation {
    pub nonce: SubmissionNonce,
    pub accepted: SealedValue,
    pub party: SealedValue,
}

fn role_code(role: Role) -> u128 {
    match role {
        Role::First => 0,
        Role::Second => 1,
    }
}

impl EncryptedConfirmation {
    pub fn seal(
        cipher: &SharedCipher,
        confirmation: &SubmitConfirmation,
        nonce: SubmissionNonce,
    ) -> Result<Self, CipherError> {
        let values = [
            u128::from(confirmation.accepted),
            role_code(confirmation.party),
        ];
        let sealed = cipher.seal_values(&nonce, &values)?;
        Ok(Self {
            nonce,
            accepted: sealed[0],
            party: sealed[1],
        })
    }

    pub fn open(&self, cipher: &SharedCipher) -> Result<SubmitConfirmation, CipherError> {
        let values = cipher.open_values(&self.nonce, &[self.accepted, self.party])?;
        let party = if values[1] == 0 { Role::First } else { Role::Second };
        Ok(SubmitConfirmation {
            accepted: values[0] == 1,
            party,
        })
    }
}
