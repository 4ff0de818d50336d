//! Key exchange and slot cipher
//!
//! A party agrees a shared secret with the compute cluster (ephemeral X25519
//! against the cluster's static key), then derives one AES-256-GCM key per
//! submission:
//!
//! ```text
//! shared secret ──HKDF-SHA256(salt = 16-byte submission nonce)──► AES-256-GCM key
//! ```
//!
//! Every value is sealed independently under a 12-byte GCM nonce that holds
//! its slot index, so a 16-byte fingerprint becomes one 32-byte ciphertext
//! (16 bytes data, 16 bytes tag). Slots are never sealed as one block: the
//! cluster decrypts and compares them one at a time.

use hkdf::Hkdf;
use rand::rngs::OsRng;
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM};
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;
use thiserror::Error;
use x25519_dalek::{EphemeralSecret, PublicKey, StaticSecret};
use zeroize::Zeroizing;

/// HKDF info string for slot keys.
const SLOT_KEY_INFO: &[u8] = b"mutuals-slot-cipher-v1";

/// Size of one sealed value: 16 bytes plaintext plus the GCM tag.
pub const SEALED_VALUE_LEN: usize = 32;

/// Size of the per-submission nonce (the HKDF salt).
pub const SUBMISSION_NONCE_LEN: usize = 16;

/// A sealed 128-bit value.
pub type SealedValue = [u8; SEALED_VALUE_LEN];

/// Per-submission nonce.
pub type SubmissionNonce = [u8; SUBMISSION_NONCE_LEN];

/// Cipher errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CipherError {
    #[error("Compute cluster public key unavailable: {0}")]
    KeyUnavailable(String),

    #[error("Peer public key is a low-order point")]
    InvalidPublicKey,

    #[error("Key derivation failed")]
    KeyDerivation,

    #[error("Encryption failed for slot {0}")]
    Encryption(u32),

    #[error("Decryption failed for slot {0}")]
    Decryption(u32),

    #[error("Random number generator failure")]
    Rng,
}

/// The compute cluster's X25519 public key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClusterPublicKey([u8; 32]);

impl ClusterPublicKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for ClusterPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Shared secret between one party and the compute cluster.
///
/// `public_key` is the party's ephemeral key, sent alongside every payload so
/// the cluster can recompute the same secret.
pub struct SharedCipher {
    public_key: [u8; 32],
    shared_secret: Zeroizing<[u8; 32]>,
}

impl SharedCipher {
    /// Party side: fresh ephemeral keypair agreed against the cluster key.
    ///
    /// # Errors
    ///
    /// - `InvalidPublicKey`: the cluster key is a low-order point
    pub fn establish(cluster_key: &ClusterPublicKey) -> Result<Self, CipherError> {
        let secret = EphemeralSecret::random_from_rng(OsRng);
        let public_key = PublicKey::from(&secret);
        let shared = secret.diffie_hellman(&PublicKey::from(cluster_key.0));
        if !shared.was_contributory() {
            return Err(CipherError::InvalidPublicKey);
        }
        Ok(Self {
            public_key: public_key.to_bytes(),
            shared_secret: Zeroizing::new(shared.to_bytes()),
        })
    }

    /// Cluster side: agree the static cluster secret against a party's key.
    pub fn agree(cluster_secret: &StaticSecret, peer_public: &[u8; 32]) -> Result<Self, CipherError> {
        let shared = cluster_secret.diffie_hellman(&PublicKey::from(*peer_public));
        if !shared.was_contributory() {
            return Err(CipherError::InvalidPublicKey);
        }
        Ok(Self::from_shared_secret(*peer_public, shared.to_bytes()))
    }

    /// Wrap an already agreed secret. `peer_public` is the party's key.
    pub fn from_shared_secret(peer_public: [u8; 32], shared_secret: [u8; 32]) -> Self {
        Self {
            public_key: peer_public,
            shared_secret: Zeroizing::new(shared_secret),
        }
    }

    /// The party's public key for this secret.
    pub fn public_key(&self) -> [u8; 32] {
        self.public_key
    }

    /// Seal `values`, slot `i` under GCM nonce `i`.
    pub fn seal_values(
        &self,
        nonce: &SubmissionNonce,
        values: &[u128],
    ) -> Result<Vec<SealedValue>, CipherError> {
        let key = self.slot_key(nonce)?;
        values
            .iter()
            .enumerate()
            .map(|(index, value)| seal_slot(&key, index as u32, *value))
            .collect()
    }

    /// Open sealed values, slot `i` under GCM nonce `i`.
    pub fn open_values(
        &self,
        nonce: &SubmissionNonce,
        sealed: &[SealedValue],
    ) -> Result<Vec<u128>, CipherError> {
        let key = self.slot_key(nonce)?;
        sealed
            .iter()
            .enumerate()
            .map(|(index, ciphertext)| open_slot(&key, index as u32, ciphertext))
            .collect()
    }

    fn slot_key(&self, nonce: &SubmissionNonce) -> Result<LessSafeKey, CipherError> {
        let hkdf = Hkdf::<Sha256>::new(Some(&nonce[..]), &self.shared_secret[..]);
        let mut okm = Zeroizing::new([0u8; 32]);
        hkdf.expand(SLOT_KEY_INFO, &mut okm[..])
            .map_err(|_| CipherError::KeyDerivation)?;
        let unbound =
            UnboundKey::new(&AES_256_GCM, &okm[..]).map_err(|_| CipherError::KeyDerivation)?;
        Ok(LessSafeKey::new(unbound))
    }
}

impl fmt::Debug for SharedCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedCipher")
            .field("public_key", &hex::encode(self.public_key))
            .finish_non_exhaustive()
    }
}

fn slot_nonce(index: u32) -> Nonce {
    let mut bytes = [0u8; 12];
    bytes[8..].copy_from_slice(&index.to_be_bytes());
    Nonce::assume_unique_for_key(bytes)
}

fn seal_slot(key: &LessSafeKey, index: u32, value: u128) -> Result<SealedValue, CipherError> {
    let mut buffer = value.to_be_bytes().to_vec();
    key.seal_in_place_append_tag(slot_nonce(index), Aad::empty(), &mut buffer)
        .map_err(|_| CipherError::Encryption(index))?;
    let mut sealed = [0u8; SEALED_VALUE_LEN];
    sealed.copy_from_slice(&buffer);
    Ok(sealed)
}

fn open_slot(key: &LessSafeKey, index: u32, ciphertext: &SealedValue) -> Result<u128, CipherError> {
    let mut buffer = *ciphertext;
    let plaintext = key
        .open_in_place(slot_nonce(index), Aad::empty(), &mut buffer)
        .map_err(|_| CipherError::Decryption(index))?;
    let mut value = [0u8; 16];
    value.copy_from_slice(plaintext);
    Ok(u128::from_be_bytes(value))
}

/// Fresh random submission nonce.
pub fn random_nonce() -> Result<SubmissionNonce, CipherError> {
    let mut nonce = [0u8; SUBMISSION_NONCE_LEN];
    SystemRandom::new()
        .fill(&mut nonce)
        .map_err(|_| CipherError::Rng)?;
    Ok(nonce)
}
