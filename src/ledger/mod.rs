//! Session ledger: the persisted, addressable session record.
//!
//! - `record`: 106-byte record layout and status machine
//! - `address`: program-derived session addresses
//! - `traits`: the `Ledger` seam
//! - `memory`: in-process implementation

pub mod address;
pub mod memory;
pub mod record;
pub mod traits;

pub use address::{
    create_session_address, find_session_address, AddressError, ProgramId, SessionAddress,
};
pub use memory::MemoryLedger;
pub use record::{
    PartyId, RecordError, Role, SessionId, SessionRecord, SessionStatus, RECORD_SIZE,
};
pub use traits::{Ledger, LedgerError, LedgerResult};
