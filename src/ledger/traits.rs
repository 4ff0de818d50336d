//! Trait abstraction for the session ledger.
//!
//! The ledger is an external collaborator; `MemoryLedger` implements it in
//! process for tests and simulation.

use super::address::SessionAddress;
use super::record::{RecordError, SessionRecord, SessionStatus};
use async_trait::async_trait;
use thiserror::Error;

/// Result type for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Ledger operation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("No record at address {0}")]
    NotFound(SessionAddress),

    #[error("A record already exists at address {0}")]
    AlreadyExists(SessionAddress),

    #[error("Status conflict: expected {expected}, found {actual}")]
    StatusConflict {
        expected: SessionStatus,
        actual: SessionStatus,
    },

    #[error("Malformed record: {0}")]
    MalformedRecord(#[from] RecordError),

    #[error("Ledger unavailable: {0}")]
    Unavailable(String),
}

/// Session record storage.
///
/// Records are stored in their 106-byte encoding. Each record may carry an
/// opaque sealed-state blob that only the compute cluster can open.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Read and decode the record at `address`.
    async fn get_record(&self, address: &SessionAddress) -> LedgerResult<SessionRecord>;

    /// Store a new record. Fails if the address is taken.
    async fn create_record(
        &self,
        address: &SessionAddress,
        record: &SessionRecord,
    ) -> LedgerResult<()>;

    /// Compare-and-swap: replace the record (and, if given, the sealed state)
    /// only if the stored status still equals `expected`.
    async fn update_record(
        &self,
        address: &SessionAddress,
        expected: SessionStatus,
        record: &SessionRecord,
        sealed_state: Option<&[u8]>,
    ) -> LedgerResult<()>;

    /// The sealed state stored next to the record, if any.
    async fn get_sealed_state(&self, address: &SessionAddress) -> LedgerResult<Option<Vec<u8>>>;
}
