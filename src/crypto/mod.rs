/// Client-side cryptography for contact discovery
///
/// This module implements:
/// - X25519 agreement with the compute cluster and the per-slot AES-256-GCM cipher
/// - Encrypted wire payloads (contact sets and markers)
pub mod cipher;
pub mod payload;

pub use cipher::{random_nonce, CipherError, ClusterPublicKey, SharedCipher};
pub use payload::{
    decrypt_set, encrypt_marker, encrypt_set, open_marker, EncryptedContactSet, EncryptedMarker,
};
