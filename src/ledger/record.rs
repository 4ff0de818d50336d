//! Session ledger record
//!
//! The only session data visible outside the compute cluster. Fixed 106-byte
//! layout:
//!
//! ```text
//! [0..8)     discriminator  SHA-256("account:DiscoverySession")[..8]
//! [8..40)    session id
//! [40..72)   first party
//! [72..104)  second party (zeros until joined)
//! [104]      status code
//! [105]      address bump
//! ```

use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Encoded record size in bytes.
pub const RECORD_SIZE: usize = 106;

const DISCRIMINATOR_SEED: &[u8] = b"account:DiscoverySession";

/// Record encoding/decoding errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("Invalid record length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("Record discriminator mismatch")]
    InvalidDiscriminator,

    #[error("Unknown status code {0}")]
    UnknownStatus(u8),

    #[error("Invalid hex identifier: {0}")]
    InvalidHex(String),

    #[error("Status transition {from} -> {to} not allowed")]
    InvalidTransition {
        from: SessionStatus,
        to: SessionStatus,
    },
}

/// 8-byte account discriminator.
pub fn discriminator() -> [u8; 8] {
    let digest = Sha256::digest(DISCRIMINATOR_SEED);
    let mut out = [0u8; 8];
    out.copy_from_slice(&digest[..8]);
    out
}

fn parse_hex32(s: &str) -> Result<[u8; 32], RecordError> {
    let bytes = hex::decode(s.trim()).map_err(|e| RecordError::InvalidHex(e.to_string()))?;
    bytes
        .try_into()
        .map_err(|_| RecordError::InvalidHex("expected 32 bytes".to_string()))
}

/// Random 32-byte session identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId([u8; 32]);

impl SessionId {
    pub fn random() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl FromStr for SessionId {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_hex32(s).map(Self)
    }
}

/// 32-byte party identity (an account key on the ledger).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartyId([u8; 32]);

impl PartyId {
    /// Placeholder for a second party that has not joined yet.
    pub const UNSET: PartyId = PartyId([0u8; 32]);

    pub fn random() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_unset(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl fmt::Display for PartyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl FromStr for PartyId {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_hex32(s).map(Self)
    }
}

/// Which side of a session a party is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    First,
    Second,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::First => write!(f, "first party"),
            Role::Second => write!(f, "second party"),
        }
    }
}

/// Ledger-visible session status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum SessionStatus {
    /// Created; first party's contacts not stored yet.
    AwaitingFirstParty = 0,
    /// First party's contacts stored; waiting for a joiner.
    AwaitingSecondParty = 1,
    /// Second party joined; intersection queued.
    Computing = 2,
    /// Intersection computed and verified.
    Matched = 3,
    /// Abandoned by the first party.
    Cancelled = 4,
}

impl SessionStatus {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Result<Self, RecordError> {
        match code {
            0 => Ok(Self::AwaitingFirstParty),
            1 => Ok(Self::AwaitingSecondParty),
            2 => Ok(Self::Computing),
            3 => Ok(Self::Matched),
            4 => Ok(Self::Cancelled),
            other => Err(RecordError::UnknownStatus(other)),
        }
    }

    /// Terminal statuses accept no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Matched | Self::Cancelled)
    }

    /// Whether `self -> next` is a legal one-step transition.
    pub fn can_advance_to(self, next: SessionStatus) -> bool {
        use SessionStatus::*;
        matches!(
            (self, next),
            (AwaitingFirstParty, AwaitingSecondParty)
                | (AwaitingSecondParty, Computing)
                | (Computing, Matched)
                | (AwaitingFirstParty, Cancelled)
                | (AwaitingSecondParty, Cancelled)
                | (Computing, Cancelled)
        )
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::AwaitingFirstParty => "awaiting-first-party",
            Self::AwaitingSecondParty => "awaiting-second-party",
            Self::Computing => "computing",
            Self::Matched => "matched",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{}", name)
    }
}

/// Decoded ledger record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: SessionId,
    pub first_party: PartyId,
    pub second_party: PartyId,
    pub status: SessionStatus,
    pub bump: u8,
}

impl SessionRecord {
    /// Fresh record owned by `first_party`.
    pub fn new(session_id: SessionId, first_party: PartyId, bump: u8) -> Self {
        Self {
            session_id,
            first_party,
            second_party: PartyId::UNSET,
            status: SessionStatus::AwaitingFirstParty,
            bump,
        }
    }

    pub fn party(&self, role: Role) -> PartyId {
        match role {
            Role::First => self.first_party,
            Role::Second => self.second_party,
        }
    }

    /// Copy with the status advanced. Fails if the step is not monotonic.
    pub fn with_status(&self, next: SessionStatus) -> Result<Self, RecordError> {
        if !self.status.can_advance_to(next) {
            return Err(RecordError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        Ok(Self {
            status: next,
            ..*self
        })
    }

    pub fn with_second_party(&self, second_party: PartyId) -> Self {
        Self {
            second_party,
            ..*self
        }
    }

    /// Undo a join whose intersection never ran: back to
    /// `AwaitingSecondParty` with the second party cleared. Only valid while
    /// computing.
    pub fn release_second_party(&self) -> Result<Self, RecordError> {
        if self.status != SessionStatus::Computing {
            return Err(RecordError::InvalidTransition {
                from: self.status,
                to: SessionStatus::AwaitingSecondParty,
            });
        }
        Ok(Self {
            second_party: PartyId::UNSET,
            status: SessionStatus::AwaitingSecondParty,
            ..*self
        })
    }

    pub fn encode(&self) -> [u8; RECORD_SIZE] {
        let mut out = [0u8; RECORD_SIZE];
        out[0..8].copy_from_slice(&discriminator());
        out[8..40].copy_from_slice(self.session_id.as_bytes());
        out[40..72].copy_from_slice(self.first_party.as_bytes());
        out[72..104].copy_from_slice(self.second_party.as_bytes());
        out[104] = self.status.code();
        out[105] = self.bump;
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, RecordError> {
        if bytes.len() != RECORD_SIZE {
            return Err(RecordError::InvalidLength {
                expected: RECORD_SIZE,
                actual: bytes.len(),
            });
        }
        if bytes[0..8] != discriminator() {
            return Err(RecordError::InvalidDiscriminator);
        }

        let mut id = [0u8; 32];
        let mut first = [0u8; 32];
        let mut second = [0u8; 32];
        id.copy_from_slice(&bytes[8..40]);
        first.copy_from_slice(&bytes[40..72]);
        second.copy_from_slice(&bytes[72..104]);

        Ok(Self {
            session_id: SessionId(id),
            first_party: PartyId(first),
            second_party: PartyId(second),
            status: SessionStatus::from_code(bytes[104])?,
            bump: bytes[105],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> SessionRecord {
        SessionRecord::new(
            SessionId::from_bytes([1u8; 32]),
            PartyId::from_bytes([2u8; 32]),
            254,
        )
    }

    #[test]
    fn test_encode_layout() {
        let bytes = record().encode();
        assert_eq!(bytes.len(), RECORD_SIZE);
        assert_eq!(&bytes[0..8], &discriminator());
        assert_eq!(&bytes[8..40], &[1u8; 32]);
        assert_eq!(&bytes[40..72], &[2u8; 32]);
        assert_eq!(&bytes[72..104], &[0u8; 32]);
        assert_eq!(bytes[104], 0);
        assert_eq!(bytes[105], 254);
    }

    #[test]
    fn test_decode_roundtrip_with_second_party() {
        let rec = record()
            .with_status(SessionStatus::AwaitingSecondParty)
            .unwrap()
            .with_second_party(PartyId::from_bytes([3u8; 32]));
        assert_eq!(SessionRecord::decode(&rec.encode()).unwrap(), rec);
    }

    #[test]
    fn test_decode_rejects_wrong_length() {
        let bytes = record().encode();
        assert_eq!(
            SessionRecord::decode(&bytes[..105]),
            Err(RecordError::InvalidLength {
                expected: 106,
                actual: 105
            })
        );
    }

    #[test]
    fn test_decode_rejects_discriminator() {
        let mut bytes = record().encode();
        bytes[0] ^= 0xff;
        assert_eq!(
            SessionRecord::decode(&bytes),
            Err(RecordError::InvalidDiscriminator)
        );
    }

    #[test]
    fn test_decode_rejects_unknown_status() {
        let mut bytes = record().encode();
        bytes[104] = 9;
        assert_eq!(
            SessionRecord::decode(&bytes),
            Err(RecordError::UnknownStatus(9))
        );
    }

    #[test]
    fn test_status_codes() {
        for code in 0..=4u8 {
            assert_eq!(SessionStatus::from_code(code).unwrap().code(), code);
        }
        assert!(SessionStatus::from_code(5).is_err());
    }

    #[test]
    fn test_transitions_are_monotonic() {
        use SessionStatus::*;
        let all = [
            AwaitingFirstParty,
            AwaitingSecondParty,
            Computing,
            Matched,
            Cancelled,
        ];
        for from in all {
            for to in all {
                if from.can_advance_to(to) {
                    assert!(to > from, "{} -> {} regresses", from, to);
                }
            }
        }
        assert!(!Matched.can_advance_to(Cancelled));
        assert!(!AwaitingFirstParty.can_advance_to(Computing));
    }

    #[test]
    fn test_with_status_rejects_skip() {
        let result = record().with_status(SessionStatus::Matched);
        assert!(matches!(result, Err(RecordError::InvalidTransition { .. })));
    }

    #[test]
    fn test_release_second_party() {
        let joined = record()
            .with_status(SessionStatus::AwaitingSecondParty)
            .unwrap()
            .with_second_party(PartyId::from_bytes([3u8; 32]))
            .with_status(SessionStatus::Computing)
            .unwrap();

        let released = joined.release_second_party().unwrap();
        assert_eq!(released.status, SessionStatus::AwaitingSecondParty);
        assert!(released.second_party.is_unset());
        assert_eq!(released.first_party, joined.first_party);

        assert!(matches!(
            released.release_second_party(),
            Err(RecordError::InvalidTransition { .. })
        ));
        let matched = joined.with_status(SessionStatus::Matched).unwrap();
        assert!(matched.release_second_party().is_err());
    }

    #[test]
    fn test_party_lookup() {
        let rec = record().with_second_party(PartyId::from_bytes([3u8; 32]));
        assert_eq!(rec.party(Role::First), PartyId::from_bytes([2u8; 32]));
        assert_eq!(rec.party(Role::Second), PartyId::from_bytes([3u8; 32]));
    }

    #[test]
    fn test_session_id_hex_roundtrip() {
        let id = SessionId::random();
        let parsed: SessionId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert!("abcd".parse::<SessionId>().is_err());
        assert!("zz".parse::<SessionId>().is_err());
    }

    #[test]
    fn test_party_unset() {
        assert!(PartyId::UNSET.is_unset());
        assert!(!PartyId::random().is_unset());
    }
}
