use std::path::PathBuf;
use thiserror::Error;

/// All errors that can occur in Sealbox.
#[derive(Debug, Error)]
pub enum SealboxError {
    // --- Tamper / corruption ---
    #[error("Integrity check failed on block {block}: data is corrupted or was tampered with")]
    IntegrityFailure { block: usize },

    #[error("Block stream header failed authentication: data is corrupted or was tampered with")]
    StreamHeaderMismatch,

    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Archive header authentication failed: file may be tampered")]
    HeaderMacMismatch,

    #[error("Content digest mismatch for entry '{0}'")]
    EntryDigestMismatch(String),

    #[error("Secure file envelope failed authentication: file may be tampered")]
    EnvelopeMismatch,

    // --- Credentials ---
    #[error("Credential check failed: wrong user id, passcode or PIN")]
    CredentialFailure,

    // --- Crypto errors ---
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Key derivation failed: {0}")]
    KeyDerivationFailed(String),

    #[error("Secure random source unavailable: {0}")]
    RandomUnavailable(String),

    // --- Protocol misuse ---
    #[error("Protocol misuse: {0}")]
    ProtocolMisuse(&'static str),

    // --- Archive errors ---
    #[error("Archive not found at {0}")]
    ArchiveNotFound(PathBuf),

    #[error("Archive already exists at {0}")]
    ArchiveAlreadyExists(PathBuf),

    #[error("File not found at {0}")]
    FileNotFound(PathBuf),

    #[error("Entry '{0}' not found")]
    EntryNotFound(String),

    #[error("Entry '{0}' already exists")]
    EntryAlreadyExists(String),

    #[error("Invalid entry name: {0}")]
    InvalidEntryName(String),

    // --- Config errors ---
    #[error("Config file error: {0}")]
    ConfigError(String),

    // --- IO errors ---
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // --- Serialization errors ---
    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Compression failed: {0}")]
    CompressionFailed(String),
}

impl SealboxError {
    /// True for hash/tag mismatches and malformed framing.
    pub fn is_integrity_failure(&self) -> bool {
        matches!(
            self,
            SealboxError::IntegrityFailure { .. }
                | SealboxError::StreamHeaderMismatch
                | SealboxError::InvalidFormat(_)
                | SealboxError::HeaderMacMismatch
                | SealboxError::EntryDigestMismatch(_)
                | SealboxError::EnvelopeMismatch
        )
    }

    /// True when the supplied credentials could not unwrap the keys.
    ///
    /// Callers may prompt again; this is never raised for corrupted blocks.
    pub fn is_credential_failure(&self) -> bool {
        matches!(self, SealboxError::CredentialFailure)
    }

    /// True for failures of the underlying resource (file, RNG).
    ///
    /// These are the errors archive readers and writers record in their
    /// fault log.
    pub fn is_resource_failure(&self) -> bool {
        matches!(
            self,
            SealboxError::Io(_)
                | SealboxError::ArchiveNotFound(_)
                | SealboxError::ArchiveAlreadyExists(_)
                | SealboxError::FileNotFound(_)
                | SealboxError::RandomUnavailable(_)
        )
    }
}

/// Convenience type alias for Sealbox results.
pub type Result<T> = std::result::Result<T, SealboxError>;
