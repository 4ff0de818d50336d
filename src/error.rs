//! Protocol-level error taxonomy.
//!
//! Every failure a party can see maps to one [`ErrorClass`]. Input, Authority
//! and State errors are raised before anything is written; Infrastructure and
//! Verification errors are always reported, never turned into an empty
//! result.

use crate::crypto::CipherError;
use crate::fingerprint::FingerprintError;
use crate::program::ProgramError;
use thiserror::Error;

/// Broad error classes shared by every protocol failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Malformed or oversized user input.
    Input,
    /// Caller is not the party recorded for the operation.
    Authority,
    /// Operation not valid in the session's current status.
    State,
    /// Ledger, compute network or key retrieval failed.
    Infrastructure,
    /// A signed output or encrypted result failed verification.
    Verification,
}

/// Errors surfaced by the party client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error(transparent)]
    Fingerprint(#[from] FingerprintError),

    #[error(transparent)]
    Cipher(#[from] CipherError),

    #[error(transparent)]
    Program(#[from] ProgramError),

    #[error("Result could not be decrypted: {0}")]
    ResultUndecryptable(CipherError),

    #[error("Unexpected callback outcome: {0}")]
    UnexpectedOutcome(String),
}

impl ProtocolError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Fingerprint(_) => ErrorClass::Input,
            Self::Cipher(_) => ErrorClass::Infrastructure,
            Self::Program(e) => e.class(),
            Self::ResultUndecryptable(_) | Self::UnexpectedOutcome(_) => ErrorClass::Verification,
        }
    }
}
