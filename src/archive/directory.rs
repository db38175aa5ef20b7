//! Archive directory: the ordered index of named content entries.
//!
//! The directory is serialized as a single JSON blob.  Offsets point at
//! the start of each entry's content record; `length` is always the
//! clear length, and `sha256` lets the reader check content even in the
//! clear archive variant.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::errors::{Result, SealboxError};

/// Longest accepted entry name, in bytes.
pub const MAX_NAME_LEN: usize = 1024;

/// A single content entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    /// Unique entry name (e.g. "docs/report.pdf").
    pub name: String,

    /// File offset of the content record.
    pub offset: i64,

    /// Clear content length in bytes.
    pub length: u64,

    /// When the entry was added.
    pub created_at: DateTime<Utc>,

    /// Free-form caller metadata.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,

    /// SHA-256 of the clear content (base64 in JSON).
    #[serde(serialize_with = "base64_encode", deserialize_with = "base64_decode")]
    pub sha256: Vec<u8>,
}

/// Ordered list of entries, unique by name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Directory {
    entries: Vec<DirectoryEntry>,
}

impl Directory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry, rejecting duplicate names.
    pub fn insert(&mut self, entry: DirectoryEntry) -> Result<()> {
        validate_name(&entry.name)?;
        if self.get(&entry.name).is_some() {
            return Err(SealboxError::EntryAlreadyExists(entry.name));
        }
        self.entries.push(entry);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&DirectoryEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn entries(&self) -> &[DirectoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Clear JSON, zeroed on drop.
    pub fn to_bytes(&self) -> Result<Zeroizing<Vec<u8>>> {
        serde_json::to_vec(self)
            .map(Zeroizing::new)
            .map_err(|e| SealboxError::SerializationError(format!("directory: {e}")))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let directory: Directory = serde_json::from_slice(bytes)
            .map_err(|e| SealboxError::InvalidFormat(format!("directory JSON: {e}")))?;
        for entry in &directory.entries {
            validate_name(&entry.name).map_err(|_| {
                SealboxError::InvalidFormat(format!("directory holds invalid name {:?}", entry.name))
            })?;
        }
        Ok(directory)
    }
}

/// SHA-256 digest recorded for each entry.
pub fn content_digest(data: &[u8]) -> Vec<u8> {
    Sha256::digest(data).to_vec()
}

/// Validate that an entry name is safe to store and to extract.
///
/// Names are `/`-separated relative paths: non-empty, at most
/// `MAX_NAME_LEN` bytes, no NUL or backslash, no leading `/`, and no
/// empty, `.` or `..` components.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(SealboxError::InvalidEntryName("entry name cannot be empty".into()));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(SealboxError::InvalidEntryName(format!(
            "entry name cannot exceed {MAX_NAME_LEN} bytes"
        )));
    }
    if name.contains('\0') || name.contains('\\') {
        return Err(SealboxError::InvalidEntryName(format!(
            "entry name {name:?} contains a NUL or backslash"
        )));
    }
    if name
        .split('/')
        .any(|part| part.is_empty() || part == "." || part == "..")
    {
        return Err(SealboxError::InvalidEntryName(format!(
            "entry name {name:?} must be a relative path without '.' or '..' components"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Serde helpers for base64-encoded Vec<u8> fields
// ---------------------------------------------------------------------------

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

fn base64_encode<S>(data: &[u8], serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    let encoded = BASE64.encode(data);
    serializer.serialize_str(&encoded)
}

fn base64_decode<'de, D>(deserializer: D) -> std::result::Result<Vec<u8>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    BASE64.decode(&s).map_err(serde::de::Error::custom)
}
