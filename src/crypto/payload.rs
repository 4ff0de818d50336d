//! Encrypted wire payloads sent from a party to the compute cluster.

use super::cipher::{CipherError, SealedValue, SharedCipher, SubmissionNonce};
use crate::fingerprint::{ContactSet, Fingerprint, MAX_CONTACTS};
use serde::{Deserialize, Serialize};

/// Slot index used for the sealed count.
const COUNT_SLOT: usize = MAX_CONTACTS;

/// Plaintext carried by a marker. Only its successful decryption matters.
const MARKER_VALUE: u128 = 1;

/// A contact set sealed slot by slot, plus the party's public key and the
/// submission nonce the cluster needs to rebuild the key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedContactSet {
    pub public_key: [u8; 32],
    pub nonce: SubmissionNonce,
    pub slots: [SealedValue; MAX_CONTACTS],
    pub count: SealedValue,
}

/// Dummy input for entry points that carry no contacts. It establishes which
/// key the cluster should encrypt its answer under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedMarker {
    pub public_key: [u8; 32],
    pub nonce: SubmissionNonce,
    pub ciphertext: SealedValue,
}

/// Seal every slot of `set` (including empty ones) and its count.
pub fn encrypt_set(
    cipher: &SharedCipher,
    set: &ContactSet,
    nonce: SubmissionNonce,
) -> Result<EncryptedContactSet, CipherError> {
    let mut values: Vec<u128> = set.slots().iter().map(Fingerprint::as_u128).collect();
    values.push(u128::from(set.count()));

    let sealed = cipher.seal_values(&nonce, &values)?;
    let mut slots = [[0u8; 32]; MAX_CONTACTS];
    slots.copy_from_slice(&sealed[..MAX_CONTACTS]);

    Ok(EncryptedContactSet {
        public_key: cipher.public_key(),
        nonce,
        slots,
        count: sealed[COUNT_SLOT],
    })
}

/// Open a sealed contact set. The contents are not validated.
pub fn decrypt_set(
    cipher: &SharedCipher,
    payload: &EncryptedContactSet,
) -> Result<ContactSet, CipherError> {
    let mut sealed = payload.slots.to_vec();
    sealed.push(payload.count);
    let values = cipher.open_values(&payload.nonce, &sealed)?;

    let mut slots = [Fingerprint::EMPTY; MAX_CONTACTS];
    for (slot, value) in slots.iter_mut().zip(&values) {
        *slot = Fingerprint::from_u128(*value);
    }
    // Count is the low 32 bits of the decrypted value.
    Ok(ContactSet::from_parts(slots, values[COUNT_SLOT] as u32))
}

/// Seal a marker under a fresh submission nonce.
pub fn encrypt_marker(
    cipher: &SharedCipher,
    nonce: SubmissionNonce,
) -> Result<EncryptedMarker, CipherError> {
    let sealed = cipher.seal_values(&nonce, &[MARKER_VALUE])?;
    Ok(EncryptedMarker {
        public_key: cipher.public_key(),
        nonce,
        ciphertext: sealed[0],
    })
}

/// Check that a marker decrypts under `cipher`.
pub fn open_marker(cipher: &SharedCipher, marker: &EncryptedMarker) -> Result<(), CipherError> {
    cipher.open_values(&marker.nonce, &[marker.ciphertext])?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::build_contact_set;
    use crate::serialization::{from_cbor, to_cbor};

    fn cipher() -> SharedCipher {
        SharedCipher::from_shared_secret([4u8; 32], [8u8; 32])
    }

    #[test]
    fn test_set_roundtrip() {
        let set = build_contact_set(&["alice@example.com", "+15551234567"]).unwrap();
        let payload = encrypt_set(&cipher(), &set, [2u8; 16]).unwrap();
        assert_eq!(payload.public_key, [4u8; 32]);
        assert_eq!(decrypt_set(&cipher(), &payload).unwrap(), set);
    }

    #[test]
    fn test_empty_slots_are_sealed_too() {
        let set = build_contact_set(&["alice@example.com"]).unwrap();
        let payload = encrypt_set(&cipher(), &set, [2u8; 16]).unwrap();
        // Empty slots must not be distinguishable by a fixed ciphertext.
        assert_ne!(payload.slots[1], payload.slots[2]);
    }

    #[test]
    fn test_wrong_key_cannot_open_set() {
        let set = build_contact_set(&["alice@example.com"]).unwrap();
        let payload = encrypt_set(&cipher(), &set, [2u8; 16]).unwrap();
        let other = SharedCipher::from_shared_secret([4u8; 32], [9u8; 32]);
        assert!(matches!(
            decrypt_set(&other, &payload),
            Err(CipherError::Decryption(0))
        ));
    }

    #[test]
    fn test_payload_cbor_roundtrip() {
        let set = build_contact_set(&["alice@example.com"]).unwrap();
        let payload = encrypt_set(&cipher(), &set, [2u8; 16]).unwrap();
        let bytes = to_cbor(&payload).unwrap();
        let back: EncryptedContactSet = from_cbor(&bytes).unwrap();
        assert_eq!(back, payload);
    }

    #[test]
    fn test_marker_opens_only_with_matching_key() {
        let marker = encrypt_marker(&cipher(), [5u8; 16]).unwrap();
        assert!(open_marker(&cipher(), &marker).is_ok());

        let other = SharedCipher::from_shared_secret([4u8; 32], [9u8; 32]);
        assert!(open_marker(&other, &marker).is_err());
    }
}
