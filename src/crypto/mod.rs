//! Cryptographic building blocks for Sealbox.
//!
//! This module provides:
//! - AES-256-GCM encryption and decryption (`encryption`)
//! - Argon2id credential-based key derivation (`kdf`)
//! - The six-pair rotating session key table (`keys`)
//! - Credential-derived wrapping of key material (`keywrap`)
//! - Reversible ciphertext bit splicing (`obfuscate`)

pub mod encryption;
pub mod kdf;
pub mod keys;
pub mod keywrap;
pub mod obfuscate;

// Re-export the most commonly used items so callers can write:
//   use crate::crypto::{KeyTable, KeyWrap, Credentials, ...};
pub use encryption::{decrypt, encrypt};
pub use kdf::Argon2Params;
pub use keys::{KeyPair, KeySlot, KeyTable, RotationMode};
pub use keywrap::{Credentials, KeyWrap};
