//! Session program: authority and status checks, computation queueing and
//! verified callbacks.

pub mod error;
pub mod events;
mod pending;
pub mod session;

pub use error::ProgramError;
pub use events::{EventStream, SessionEvent};
pub use pending::{CallbackOutcome, ComputationTicket};
pub use session::{ProgramConfig, SessionProgram, DEFAULT_CALLBACK_TIMEOUT};
