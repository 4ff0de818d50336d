//! Mutuals - private contact discovery
//!
//! Two parties learn which contact identifiers (phone numbers, emails) they
//! have in common without revealing anything else. Identifiers are reduced to
//! 128-bit fingerprints on each device, encrypted for a compute cluster, and
//! compared there with a fixed-cost oblivious intersection. A ledger-side
//! session program coordinates the exchange and verifies every signed result
//! before advancing the session.
//!
//! Key principles:
//! - Raw identifiers never leave the party's device
//! - At most 32 contacts per party, always padded to 32 slots
//! - Same number of comparisons regardless of input or overlap
//! - One intersection per session

pub mod client;
pub mod compute;
pub mod config;
pub mod crypto;
pub mod error;
pub mod fingerprint;
pub mod ledger;
pub mod program;
pub mod serialization;
