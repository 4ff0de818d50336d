//! Confidential-compute boundary
//!
//! Everything in here (except `traits` and `wire`) runs on the compute
//! cluster and sees plaintext fingerprints.
//!
//! - `engine`: the oblivious 32×32 intersection
//! - `instructions`: the four protocol entry points
//! - `state`: `SessionState` and its sealed form
//! - `traits`: requests, signed outputs and the `ComputeNetwork` seam
//! - `cluster`: in-process `ComputeNetwork`

pub mod cluster;
pub mod engine;
pub mod instructions;
pub mod output_stream;
pub mod state;
pub mod traits;
pub mod wire;

pub use cluster::LocalCluster;
pub use engine::{intersect, IntersectionOutcome, COMPARISONS};
pub use output_stream::{OutputSender, OutputStream};
pub use state::{MatchResult, SealError, SessionState, SubmitConfirmation};
pub use traits::{
    ClusterVerifyingKey, ComputationId, ComputationInput, ComputationOutput, ComputationRequest,
    ComputationResult, ComputeError, ComputeNetwork, Instruction, SignedOutput,
};
pub use wire::{EncryptedConfirmation, EncryptedMatchResult};
