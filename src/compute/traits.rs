//! Trait abstraction for the confidential-compute network.
//!
//! The session program queues computations and learns their outcome only from
//! signed outputs delivered on the network's output stream.

use super::output_stream::OutputStream;
use super::state::SealError;
use super::wire::{EncryptedConfirmation, EncryptedMatchResult};
use crate::crypto::{CipherError, ClusterPublicKey, EncryptedContactSet, EncryptedMarker};
use crate::ledger::{Role, SessionId};
use crate::serialization::{from_cbor, to_cbor, SerializationError};
use async_trait::async_trait;
use rand::Rng;
use ring::signature::{Ed25519KeyPair, UnparsedPublicKey, ED25519};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;

/// Compute network errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ComputeError {
    #[error("Compute network unavailable: {0}")]
    Unavailable(String),

    #[error("Output stream already taken")]
    StreamTaken,

    #[error("Output signature invalid")]
    InvalidSignature,

    #[error("Malformed output: {0}")]
    MalformedOutput(String),

    #[error("Session state missing for {0}")]
    MissingState(Instruction),

    #[error("Instruction {0} received the wrong kind of input")]
    UnexpectedInput(Instruction),

    #[error("Computation aborted: {0}")]
    Aborted(String),

    #[error("Key generation failed: {0}")]
    KeyGeneration(String),

    #[error(transparent)]
    Seal(#[from] SealError),

    #[error(transparent)]
    Cipher(#[from] CipherError),

    #[error(transparent)]
    Serialization(#[from] SerializationError),
}

/// Random identifier correlating a queued computation with its callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ComputationId(u64);

impl ComputationId {
    pub fn random() -> Self {
        Self(rand::thread_rng().gen())
    }

    pub fn from_u64(value: u64) -> Self {
        Self(value)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ComputationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Protocol entry point to run inside the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Instruction {
    InitSession,
    SubmitFirstParty,
    SubmitSecondPartyAndMatch,
    RevealMatches(Role),
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InitSession => write!(f, "init_session"),
            Self::SubmitFirstParty => write!(f, "submit_first_party"),
            Self::SubmitSecondPartyAndMatch => write!(f, "submit_second_party_and_match"),
            Self::RevealMatches(Role::First) => write!(f, "reveal_first_party_matches"),
            Self::RevealMatches(Role::Second) => write!(f, "reveal_second_party_matches"),
        }
    }
}

/// Encrypted input to a computation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComputationInput {
    Marker(EncryptedMarker),
    Contacts(Box<EncryptedContactSet>),
}

/// A computation queued by the session program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputationRequest {
    pub id: ComputationId,
    pub session: SessionId,
    pub instruction: Instruction,
    /// Sealed state from the ledger; `None` only for `InitSession`.
    pub sealed_state: Option<Vec<u8>>,
    pub input: ComputationInput,
}

/// What a computation produced for the requesting party.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComputationResult {
    Initialized,
    Submitted(EncryptedConfirmation),
    Matches(Box<EncryptedMatchResult>),
    Aborted { reason: String },
}

/// Output of one computation, before signing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputationOutput {
    pub id: ComputationId,
    pub session: SessionId,
    pub instruction: Instruction,
    /// New sealed state to persist. `None` for read-only or aborted runs.
    pub sealed_state: Option<Vec<u8>>,
    pub result: ComputationResult,
}

/// The cluster's Ed25519 verifying key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterVerifyingKey([u8; 32]);

impl ClusterVerifyingKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    fn verify(&self, message: &[u8], signature: &[u8]) -> bool {
        UnparsedPublicKey::new(&ED25519, &self.0)
            .verify(message, signature)
            .is_ok()
    }
}

/// CBOR-encoded output plus the cluster's signature over its SHA-256 digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedOutput {
    pub payload: Vec<u8>,
    pub signature: Vec<u8>,
}

impl SignedOutput {
    /// Encode and sign an output.
    pub fn sign(output: &ComputationOutput, key_pair: &Ed25519KeyPair) -> Result<Self, ComputeError> {
        let payload = to_cbor(output)?;
        let digest = Sha256::digest(&payload);
        let signature = key_pair.sign(&digest);
        Ok(Self {
            payload,
            signature: signature.as_ref().to_vec(),
        })
    }

    /// Check the signature, then decode. Nothing in the payload is trusted
    /// before this succeeds.
    pub fn verify(&self, key: &ClusterVerifyingKey) -> Result<ComputationOutput, ComputeError> {
        let digest = Sha256::digest(&self.payload);
        if !key.verify(&digest, &self.signature) {
            return Err(ComputeError::InvalidSignature);
        }
        from_cbor(&self.payload).map_err(|e| ComputeError::MalformedOutput(e.to_string()))
    }
}

/// Confidential-compute network.
#[async_trait]
pub trait ComputeNetwork: Send + Sync {
    /// X25519 key parties encrypt their inputs to.
    async fn cluster_public_key(&self) -> Result<ClusterPublicKey, CipherError>;

    /// Key that signs every computation output.
    fn cluster_verifying_key(&self) -> ClusterVerifyingKey;

    /// Queue a computation. Returns once queued, not once computed.
    async fn queue_computation(&self, request: ComputationRequest) -> Result<(), ComputeError>;

    /// Take the stream of signed outputs. Only one subscriber is supported.
    fn subscribe(&self) -> Result<OutputStream, ComputeError>;
}
