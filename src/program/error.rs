//! Session program errors and their classification.

use crate::compute::{ComputationId, ComputeError};
use crate::error::ErrorClass;
use crate::ledger::{AddressError, LedgerError, PartyId, Role, SessionId, SessionStatus};
use std::time::Duration;
use thiserror::Error;

/// Session program errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProgramError {
    #[error("Caller {caller} is not the session's {role}")]
    Unauthorized { caller: PartyId, role: Role },

    #[error("Session {0} not found")]
    SessionNotFound(SessionId),

    #[error("Session {0} already exists")]
    SessionExists(SessionId),

    #[error("Session is {actual}, expected {expected}")]
    InvalidStatus {
        expected: SessionStatus,
        actual: SessionStatus,
    },

    #[error("Session cannot be cancelled while {0}")]
    NotCancellable(SessionStatus),

    #[error("Second party slot already claimed")]
    SecondPartyClaimed,

    #[error("First party cannot join its own session")]
    SelfJoin,

    #[error("Session state not initialized yet")]
    NotInitialized,

    #[error("A computation is already pending for session {0}")]
    ComputationPending(SessionId),

    #[error("Session {0} was cancelled")]
    Cancelled(SessionId),

    #[error("No pending computation {0}")]
    UnknownComputation(ComputationId),

    #[error("Output does not match pending computation: {0}")]
    OutputMismatch(String),

    #[error("No callback within {0:?}")]
    CallbackTimeout(Duration),

    #[error("Callback channel dropped")]
    CallbackDropped,

    #[error(transparent)]
    Address(#[from] AddressError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Compute(#[from] ComputeError),
}

impl ProgramError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Unauthorized { .. } => ErrorClass::Authority,
            Self::SessionNotFound(_)
            | Self::SessionExists(_)
            | Self::InvalidStatus { .. }
            | Self::NotCancellable(_)
            | Self::SecondPartyClaimed
            | Self::SelfJoin
            | Self::NotInitialized
            | Self::ComputationPending(_)
            | Self::Cancelled(_) => ErrorClass::State,
            Self::UnknownComputation(_) | Self::OutputMismatch(_) => ErrorClass::Verification,
            Self::CallbackTimeout(_) | Self::CallbackDropped | Self::Address(_) => {
                ErrorClass::Infrastructure
            }
            Self::Ledger(e) => match e {
                LedgerError::StatusConflict { .. }
                | LedgerError::AlreadyExists(_)
                | LedgerError::NotFound(_) => ErrorClass::State,
                LedgerError::MalformedRecord(_) | LedgerError::Unavailable(_) => {
                    ErrorClass::Infrastructure
                }
            },
            Self::Compute(e) => match e {
                ComputeError::InvalidSignature | ComputeError::MalformedOutput(_) => {
                    ErrorClass::Verification
                }
                _ => ErrorClass::Infrastructure,
            },
        }
    }
}
