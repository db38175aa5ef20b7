//! AES-256-GCM authenticated encryption.
//!
//! Each call to `encrypt` generates a fresh random 12-byte nonce and
//! prepends it to the ciphertext.  `decrypt` splits the nonce back out
//! before decrypting.
//!
//! Layout of the returned byte buffer:
//!   [ 12-byte nonce | ciphertext + 16-byte auth tag ]
//!
//! The `_with_pair` variants are used by the block stream: the pair's IV
//! is authenticated as associated data, so a ciphertext only opens under
//! the exact key+IV slot it was produced with.  The nonce is still drawn
//! fresh per call because a table slot is reused every sixth block.

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use zeroize::Zeroizing;

use super::keys::{fill_random, KeyPair};
use crate::errors::{Result, SealboxError};

/// Size of the AES-256-GCM nonce in bytes.
pub const NONCE_LEN: usize = 12;

/// Size of the GCM authentication tag in bytes.
pub const TAG_LEN: usize = 16;

/// Bytes added to every plaintext by `encrypt`.
pub const OVERHEAD: usize = NONCE_LEN + TAG_LEN;

/// Encrypt `plaintext` with a 32-byte `key`.
///
/// Returns the nonce prepended to the ciphertext (nonce || ciphertext).
pub fn encrypt(key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
    seal(key, b"", plaintext)
}

/// Decrypt data that was produced by `encrypt`.
///
/// Returns `None` when the data is truncated, the key is wrong, or the
/// tag does not verify.  Callers decide how to classify the failure.
pub fn decrypt(key: &[u8], ciphertext_with_nonce: &[u8]) -> Option<Zeroizing<Vec<u8>>> {
    open(key, b"", ciphertext_with_nonce)
}

/// Encrypt under one key table slot, binding the slot's IV.
pub fn encrypt_with_pair(pair: &KeyPair, plaintext: &[u8]) -> Result<Vec<u8>> {
    seal(pair.key(), pair.iv(), plaintext)
}

/// Decrypt data produced by `encrypt_with_pair` under the same slot.
pub fn decrypt_with_pair(pair: &KeyPair, ciphertext_with_nonce: &[u8]) -> Option<Zeroizing<Vec<u8>>> {
    open(pair.key(), pair.iv(), ciphertext_with_nonce)
}

fn seal(key: &[u8], aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| SealboxError::EncryptionFailed(format!("invalid key length: {e}")))?;

    let mut nonce_bytes = [0u8; NONCE_LEN];
    fill_random(&mut nonce_bytes)?;
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(
            nonce,
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|e| SealboxError::EncryptionFailed(format!("encryption error: {e}")))?;

    let mut output = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    output.extend_from_slice(&nonce_bytes);
    output.extend_from_slice(&ciphertext);
    Ok(output)
}

fn open(key: &[u8], aad: &[u8], ciphertext_with_nonce: &[u8]) -> Option<Zeroizing<Vec<u8>>> {
    if ciphertext_with_nonce.len() < OVERHEAD {
        return None;
    }

    let (nonce_bytes, ciphertext) = ciphertext_with_nonce.split_at(NONCE_LEN);
    let nonce = Nonce::from_slice(nonce_bytes);
    let cipher = Aes256Gcm::new_from_slice(key).ok()?;

    cipher
        .decrypt(
            nonce,
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .ok()
        .map(Zeroizing::new)
}
