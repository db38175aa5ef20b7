//! Credential-derived wrapping of session key material.
//!
//! A `KeyWrap` is derived once from the caller's (user id, passcode, PIN)
//! triple and is a pure encrypt/decrypt function afterwards.  It protects
//! the six `KeyTable` pairs at rest (one wrapped record per pair, always
//! in slot order) and the outer envelope of single-blob files.
//!
//! From the Argon2id root key two independent sub-keys are expanded with
//! HKDF-SHA256:
//! - a **wrap** key used with AES-256-GCM,
//! - a **header MAC** key used to authenticate clear archive headers.

use std::io::{Read, Write};

use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use super::encryption::{decrypt, encrypt};
use super::kdf::{derive_root_key, user_salt, Argon2Params};
use super::keys::{KeyPair, KeySlot, KeyTable, TABLE_SIZE};
use crate::errors::{Result, SealboxError};
use crate::stream::frame::{read_prefixed, write_prefixed};

/// Length of derived sub-keys (256 bits).
const SUBKEY_LEN: usize = 32;

/// Length of a header MAC tag (HMAC-SHA256).
pub const MAC_LEN: usize = 32;

/// Upper bound on a single wrapped key record.
const MAX_WRAPPED_RECORD: usize = 4096;

/// The identity triple a user supplies out-of-band.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Credentials {
    user_id: String,
    passcode: String,
    pin: u32,
}

impl Credentials {
    pub fn new(user_id: impl Into<String>, passcode: impl Into<String>, pin: u32) -> Self {
        Self {
            user_id: user_id.into(),
            passcode: passcode.into(),
            pin,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Argon2 password input: `passcode || pin (u32 LE)`.
    fn password_bytes(&self) -> Zeroizing<Vec<u8>> {
        let mut out = Zeroizing::new(Vec::with_capacity(self.passcode.len() + 4));
        out.extend_from_slice(self.passcode.as_bytes());
        out.extend_from_slice(&self.pin.to_le_bytes());
        out
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("user_id", &self.user_id)
            .finish_non_exhaustive()
    }
}

/// Wrapping context derived from a `Credentials` triple.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct KeyWrap {
    wrap_key: [u8; SUBKEY_LEN],
    mac_key: [u8; SUBKEY_LEN],
}

impl KeyWrap {
    /// Derive the wrapping context.  Same inputs always give the same keys.
    pub fn derive(credentials: &Credentials, params: &Argon2Params) -> Result<Self> {
        let salt = user_salt(credentials.user_id());
        let password = credentials.password_bytes();
        let root = derive_root_key(&password, &salt, params)?;

        Ok(Self {
            wrap_key: hkdf_derive(&root[..], b"sealbox-wrap-key")?,
            mac_key: hkdf_derive(&root[..], b"sealbox-header-mac-key")?,
        })
    }

    /// Wrap an arbitrary payload.
    pub fn encrypt(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        encrypt(&self.wrap_key, bytes)
    }

    /// Unwrap a payload.  `None` means the credentials do not match (or
    /// the record was altered); this is not an error at this layer.
    pub fn decrypt(&self, bytes: &[u8]) -> Option<Zeroizing<Vec<u8>>> {
        decrypt(&self.wrap_key, bytes)
    }

    /// Wrap each pair of `table` individually, in slot order.
    pub fn wrap_table(&self, table: &KeyTable) -> Result<Vec<Vec<u8>>> {
        KeySlot::ALL
            .iter()
            .map(|slot| self.encrypt(&table.pair(*slot).to_bytes()))
            .collect()
    }

    /// Rebuild a table from six wrapped records.
    ///
    /// Fails closed: if any record does not unwrap, no table is returned.
    pub fn unwrap_table(&self, records: &[Vec<u8>]) -> Option<KeyTable> {
        if records.len() != TABLE_SIZE {
            return None;
        }
        let mut pairs = Vec::with_capacity(TABLE_SIZE);
        for record in records {
            let clear = self.decrypt(record)?;
            pairs.push(KeyPair::from_bytes(&clear)?);
        }
        let pairs: [KeyPair; TABLE_SIZE] = pairs.try_into().ok()?;
        Some(KeyTable::from_pairs(pairs))
    }

    /// Write the six wrapped records, each `i32` length-prefixed.
    pub fn write_table<W: Write>(&self, table: &KeyTable, sink: &mut W) -> Result<()> {
        for record in self.wrap_table(table)? {
            write_prefixed(sink, &record)?;
        }
        Ok(())
    }

    /// Read six wrapped records and rebuild the table.
    ///
    /// Every record is consumed before unwrapping so the source is left
    /// positioned after the key block either way.
    pub fn read_table<R: Read>(&self, source: &mut R) -> Result<KeyTable> {
        let mut records = Vec::with_capacity(TABLE_SIZE);
        for _ in 0..TABLE_SIZE {
            records.push(read_prefixed(source, MAX_WRAPPED_RECORD)?.to_vec());
        }
        self.unwrap_table(&records).ok_or_else(|| {
            tracing::warn!("wrapped key table did not unwrap under the supplied credentials");
            SealboxError::CredentialFailure
        })
    }

    /// HMAC-SHA256 tag over `bytes` with the header MAC key.
    pub fn header_mac(&self, bytes: &[u8]) -> Result<[u8; MAC_LEN]> {
        let mut mac = Hmac::<Sha256>::new_from_slice(&self.mac_key)
            .map_err(|e| SealboxError::KeyDerivationFailed(format!("invalid HMAC key: {e}")))?;
        mac.update(bytes);
        Ok(mac.finalize().into_bytes().into())
    }

    /// Constant-time check of a header MAC tag.
    pub fn verify_header_mac(&self, bytes: &[u8], tag: &[u8]) -> Result<bool> {
        let mut mac = Hmac::<Sha256>::new_from_slice(&self.mac_key)
            .map_err(|e| SealboxError::KeyDerivationFailed(format!("invalid HMAC key: {e}")))?;
        mac.update(bytes);
        Ok(mac.verify_slice(tag).is_ok())
    }
}

/// Run HKDF-SHA256 expand with the given `info`.
///
/// The extract step is skipped because the root key already has high
/// entropy (it came from Argon2id).
fn hkdf_derive(ikm: &[u8], info: &[u8]) -> Result<[u8; SUBKEY_LEN]> {
    let hk = Hkdf::<Sha256>::new(None, ikm);

    let mut okm = [0u8; SUBKEY_LEN];
    hk.expand(info, &mut okm)
        .map_err(|e| SealboxError::KeyDerivationFailed(format!("HKDF expand failed: {e}")))?;

    Ok(okm)
}
