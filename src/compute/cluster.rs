//! In-process compute cluster.
//!
//! Holds the cluster's three secrets (X25519 static key, Ed25519 signing key,
//! state storage key), runs each queued computation on its own task and
//! publishes the signed output on the output stream. A failing computation
//! still produces a signed `Aborted` output so the waiting party is woken.

use super::instructions;
use super::output_stream::{OutputSender, OutputStream};
use super::state::{seal_state, unseal_state};
use super::traits::*;
use super::wire::{EncryptedConfirmation, EncryptedMatchResult};
use crate::crypto::cipher::random_nonce;
use crate::crypto::{decrypt_set, open_marker, CipherError, ClusterPublicKey, SharedCipher};
use async_trait::async_trait;
use rand::rngs::OsRng;
use ring::rand::{SecureRandom, SystemRandom};
use ring::signature::{Ed25519KeyPair, KeyPair};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroizing;

/// In-process `ComputeNetwork`. Clones share the same cluster.
#[derive(Clone)]
pub struct LocalCluster {
    inner: Arc<ClusterInner>,
}

struct ClusterInner {
    secret: StaticSecret,
    public_key: ClusterPublicKey,
    signing_key: Ed25519KeyPair,
    verifying_key: ClusterVerifyingKey,
    storage_secret: Zeroizing<[u8; 32]>,
    sender: OutputSender,
    stream: Mutex<Option<OutputStream>>,
    online: AtomicBool,
    engine_runs: AtomicU64,
}

impl LocalCluster {
    /// Generate fresh cluster keys.
    pub fn new() -> Result<Self, ComputeError> {
        let rng = SystemRandom::new();

        let secret = StaticSecret::random_from_rng(OsRng);
        let public_key = ClusterPublicKey::from_bytes(PublicKey::from(&secret).to_bytes());

        let pkcs8 = Ed25519KeyPair::generate_pkcs8(&rng)
            .map_err(|e| ComputeError::KeyGeneration(format!("Ed25519: {}", e)))?;
        let signing_key = Ed25519KeyPair::from_pkcs8(pkcs8.as_ref())
            .map_err(|e| ComputeError::KeyGeneration(format!("Ed25519: {}", e)))?;
        let mut verifying = [0u8; 32];
        verifying.copy_from_slice(signing_key.public_key().as_ref());

        let mut storage_secret = Zeroizing::new([0u8; 32]);
        rng.fill(&mut storage_secret[..])
            .map_err(|_| ComputeError::KeyGeneration("storage key: RNG failure".to_string()))?;

        let (stream, sender) = OutputStream::new();

        tracing::info!(cluster_key = %public_key, "Local compute cluster started");

        Ok(Self {
            inner: Arc::new(ClusterInner {
                secret,
                public_key,
                signing_key,
                verifying_key: ClusterVerifyingKey::from_bytes(verifying),
                storage_secret,
                sender,
                stream: Mutex::new(Some(stream)),
                online: AtomicBool::new(true),
                engine_runs: AtomicU64::new(0),
            }),
        })
    }

    /// Take the cluster on or offline. Offline clusters refuse keys and jobs.
    pub fn set_online(&self, online: bool) {
        self.inner.online.store(online, Ordering::SeqCst);
    }

    pub fn is_online(&self) -> bool {
        self.inner.online.load(Ordering::SeqCst)
    }

    /// How many times the intersection engine has run.
    pub fn engine_runs(&self) -> u64 {
        self.inner.engine_runs.load(Ordering::SeqCst)
    }

    /// Run one computation synchronously and sign its output.
    pub fn execute(&self, request: &ComputationRequest) -> Result<SignedOutput, ComputeError> {
        let (sealed_state, result) = match self.run(request) {
            Ok(done) => done,
            Err(e) => {
                tracing::warn!(
                    computation = %request.id,
                    instruction = %request.instruction,
                    error = %e,
                    "Computation aborted"
                );
                (
                    None,
                    ComputationResult::Aborted {
                        reason: e.to_string(),
                    },
                )
            }
        };

        let output = ComputationOutput {
            id: request.id,
            session: request.session,
            instruction: request.instruction,
            sealed_state,
            result,
        };
        SignedOutput::sign(&output, &self.inner.signing_key)
    }

    fn cipher_for(&self, peer_public: &[u8; 32]) -> Result<SharedCipher, CipherError> {
        SharedCipher::agree(&self.inner.secret, peer_public)
    }

    fn current_state(
        &self,
        request: &ComputationRequest,
    ) -> Result<super::state::SessionState, ComputeError> {
        let sealed = request
            .sealed_state
            .as_deref()
            .ok_or(ComputeError::MissingState(request.instruction))?;
        Ok(unseal_state(sealed, &self.inner.storage_secret)?)
    }

    fn seal(&self, state: &super::state::SessionState) -> Result<Vec<u8>, ComputeError> {
        Ok(seal_state(state, &self.inner.storage_secret)?)
    }

    fn run(
        &self,
        request: &ComputationRequest,
    ) -> Result<(Option<Vec<u8>>, ComputationResult), ComputeError> {
        match (request.instruction, &request.input) {
            (Instruction::InitSession, ComputationInput::Marker(marker)) => {
                let cipher = self.cipher_for(&marker.public_key)?;
                open_marker(&cipher, marker)?;
                let state = instructions::init_session();
                Ok((Some(self.seal(&state)?), ComputationResult::Initialized))
            }
            (Instruction::SubmitFirstParty, ComputationInput::Contacts(payload)) => {
                let cipher = self.cipher_for(&payload.public_key)?;
                let set = decrypt_set(&cipher, payload)?;
                let state = self.current_state(request)?;

                let (next, confirmation) = instructions::submit_first_party(&state, &set);
                let sealed = EncryptedConfirmation::seal(&cipher, &confirmation, random_nonce()?)?;
                Ok((Some(self.seal(&next)?), ComputationResult::Submitted(sealed)))
            }
            (Instruction::SubmitSecondPartyAndMatch, ComputationInput::Contacts(payload)) => {
                let cipher = self.cipher_for(&payload.public_key)?;
                let set = decrypt_set(&cipher, payload)?;
                let state = self.current_state(request)?;

                let (next, result) = instructions::submit_second_party_and_match(&state, &set);
                self.inner.engine_runs.fetch_add(1, Ordering::SeqCst);
                let sealed = EncryptedMatchResult::seal(&cipher, &result, random_nonce()?)?;
                Ok((
                    Some(self.seal(&next)?),
                    ComputationResult::Matches(Box::new(sealed)),
                ))
            }
            (Instruction::RevealMatches(role), ComputationInput::Marker(marker)) => {
                let cipher = self.cipher_for(&marker.public_key)?;
                open_marker(&cipher, marker)?;
                let state = self.current_state(request)?;

                let result = instructions::reveal_matches(&state, role);
                let sealed = EncryptedMatchResult::seal(&cipher, &result, random_nonce()?)?;
                Ok((None, ComputationResult::Matches(Box::new(sealed))))
            }
            (instruction, _) => Err(ComputeError::UnexpectedInput(instruction)),
        }
    }
}

#[async_trait]
impl ComputeNetwork for LocalCluster {
    async fn cluster_public_key(&self) -> Result<ClusterPublicKey, CipherError> {
        if !self.is_online() {
            return Err(CipherError::KeyUnavailable(
                "compute cluster offline".to_string(),
            ));
        }
        Ok(self.inner.public_key)
    }

    fn cluster_verifying_key(&self) -> ClusterVerifyingKey {
        self.inner.verifying_key
    }

    async fn queue_computation(&self, request: ComputationRequest) -> Result<(), ComputeError> {
        if !self.is_online() {
            return Err(ComputeError::Unavailable(
                "compute cluster offline".to_string(),
            ));
        }

        tracing::debug!(
            computation = %request.id,
            session = %request.session,
            instruction = %request.instruction,
            "Computation queued"
        );

        let cluster = self.clone();
        tokio::spawn(async move {
            match cluster.execute(&request) {
                Ok(signed) => {
                    if let Err(e) = cluster.inner.sender.send(signed) {
                        tracing::warn!(computation = %request.id, error = %e, "Output dropped");
                    }
                }
                Err(e) => {
                    tracing::error!(computation = %request.id, error = %e, "Failed to sign output");
                }
            }
        });
        Ok(())
    }

    fn subscribe(&self) -> Result<OutputStream, ComputeError> {
        let mut slot = self
            .inner
            .stream
            .lock()
            .map_err(|_| ComputeError::Unavailable("stream lock poisoned".to_string()))?;
        slot.take().ok_or(ComputeError::StreamTaken)
    }
}
