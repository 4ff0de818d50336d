//! Program-derived session addresses
//!
//! Any client holding a session id can recompute where its record lives:
//!
//! ```text
//! for bump in 255..=0:
//!     candidate = SHA-256("session" || session_id || [bump] || program_id || "ProgramDerivedAddress")
//!     if candidate is not a valid compressed Edwards25519 point: return (candidate, bump)
//! ```
//!
//! Off-curve addresses have no private key, so only the session program can
//! write to them.

use super::record::SessionId;
use curve25519_dalek::edwards::CompressedEdwardsY;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;

const SESSION_SEED: &[u8] = b"session";
const PDA_MARKER: &[u8] = b"ProgramDerivedAddress";
const DEFAULT_PROGRAM_SEED: &[u8] = b"mutuals-session-program";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("No off-curve address exists for this session id")]
    NoViableBump,

    #[error("Derived address lies on the curve")]
    OnCurve,
}

/// Identifier of the session program that owns session records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProgramId([u8; 32]);

impl ProgramId {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl Default for ProgramId {
    fn default() -> Self {
        Self(Sha256::digest(DEFAULT_PROGRAM_SEED).into())
    }
}

impl fmt::Display for ProgramId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Ledger address of one session record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionAddress([u8; 32]);

impl SessionAddress {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for SessionAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

fn candidate(session_id: &SessionId, bump: u8, program_id: &ProgramId) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(SESSION_SEED);
    hasher.update(session_id.as_bytes());
    hasher.update([bump]);
    hasher.update(program_id.as_bytes());
    hasher.update(PDA_MARKER);
    hasher.finalize().into()
}

fn is_on_curve(bytes: &[u8; 32]) -> bool {
    CompressedEdwardsY(*bytes).decompress().is_some()
}

/// Find the canonical address and bump for a session.
pub fn find_session_address(
    session_id: &SessionId,
    program_id: &ProgramId,
) -> Result<(SessionAddress, u8), AddressError> {
    for bump in (0..=u8::MAX).rev() {
        let bytes = candidate(session_id, bump, program_id);
        if !is_on_curve(&bytes) {
            return Ok((SessionAddress(bytes), bump));
        }
    }
    Err(AddressError::NoViableBump)
}

/// Recreate an address from a known bump, as stored in the record.
pub fn create_session_address(
    session_id: &SessionId,
    bump: u8,
    program_id: &ProgramId,
) -> Result<SessionAddress, AddressError> {
    let bytes = candidate(session_id, bump, program_id);
    if is_on_curve(&bytes) {
        return Err(AddressError::OnCurve);
    }
    Ok(SessionAddress(bytes))
}
