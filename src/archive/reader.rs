//! Archive opening and random-access reads.
//!
//! Opening an encrypted archive unwraps the key table before anything
//! else is decrypted, so wrong credentials surface as
//! `CredentialFailure` and never as garbage content.  The header MAC is
//! checked next, then the directory is read from the offset the header
//! names.

use std::fs::{self, File};
use std::io::{BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use subtle::ConstantTimeEq;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use super::directory::{content_digest, Directory, DirectoryEntry};
use super::faults::{Fault, FaultLog};
use super::header::{ArchiveHeader, ArchiveKind, HEADER_LEN};
use super::SessionKeys;
use crate::config::Settings;
use crate::crypto::keys::RotationMode;
use crate::crypto::keywrap::{Credentials, KeyWrap};
use crate::errors::{Result, SealboxError};
use crate::stream::frame::read_prefixed;
use crate::stream::BlockStreamReader;

pub struct ArchiveReader {
    path: PathBuf,
    file: File,
    header: ArchiveHeader,
    directory: Directory,
    keys: Option<SessionKeys>,
    max_entry_bytes: u64,
    faults: FaultLog,
}

impl ArchiveReader {
    /// Open an archive.  `credentials` is required for encrypted
    /// archives and ignored for clear ones.
    pub fn open(path: &Path, credentials: Option<&Credentials>) -> Result<Self> {
        Self::open_with_settings(path, credentials, &Settings::default())
    }

    pub fn open_with_settings(path: &Path, credentials: Option<&Credentials>, settings: &Settings) -> Result<Self> {
        if !path.exists() {
            return Err(SealboxError::ArchiveNotFound(path.to_path_buf()));
        }
        let mut file = File::open(path)?;
        let header = ArchiveHeader::read_from(&mut file)?;

        let keys = match header.kind {
            ArchiveKind::Clear => None,
            ArchiveKind::Encrypted => {
                let credentials = credentials
                    .ok_or(SealboxError::ProtocolMisuse("encrypted archive opened without credentials"))?;
                let params = header
                    .argon2
                    .ok_or_else(|| SealboxError::InvalidFormat("encrypted header without KDF parameters".into()))?;
                if !params.within(&settings.argon2_params()) {
                    warn!(?params, "archive KDF cost exceeds configured settings");
                    return Err(SealboxError::InvalidFormat(
                        "archive KDF cost exceeds configured settings".into(),
                    ));
                }
                let wrap = KeyWrap::derive(credentials, &params)?;

                file.seek(SeekFrom::Start(HEADER_LEN as u64))?;
                let table = wrap.read_table(&mut BufReader::new(&file))?;
                header.verify(&wrap)?;
                Some(SessionKeys { table, wrap })
            }
        };

        let mut reader = Self {
            path: path.to_path_buf(),
            file,
            header,
            directory: Directory::new(),
            keys,
            max_entry_bytes: settings.max_entry_bytes,
            faults: FaultLog::new(),
        };
        reader.directory = reader.read_directory()?;

        info!(
            path = %path.display(),
            kind = ?reader.header.kind,
            entries = reader.directory.len(),
            "opened archive"
        );
        Ok(reader)
    }

    /// Re-read the header, then the directory it points at.
    pub fn reload_directory(&mut self) -> Result<()> {
        let header = ArchiveHeader::read_from(&mut self.file);
        let header = self.faults.observe("reload_directory", None, header)?;
        if header.kind != self.header.kind {
            return Err(SealboxError::InvalidFormat("archive kind changed on disk".into()));
        }
        if let Some(keys) = &self.keys {
            header.verify(&keys.wrap)?;
        }
        self.header = header;
        self.directory = self.read_directory()?;
        Ok(())
    }

    fn read_directory(&mut self) -> Result<Directory> {
        let offset = self.header.directory_offset as u64;
        let result = self.file.seek(SeekFrom::Start(offset)).map_err(SealboxError::from);
        self.faults.observe("read_directory", None, result)?;

        let mut source = BufReader::new(&self.file);
        let bytes = match self.keys.as_mut() {
            None => read_prefixed(&mut source, self.max_entry_bytes as usize)?,
            Some(keys) => {
                keys.table.set_mode(RotationMode::Variant);
                let read = BlockStreamReader::new(&mut keys.table, source).read_to_vec();
                keys.table.set_mode(RotationMode::Standard);
                read?
            }
        };

        let directory = Directory::from_bytes(&bytes)?;
        if directory.len() != self.header.entry_count as usize {
            return Err(SealboxError::InvalidFormat(format!(
                "header lists {} entries, directory holds {}",
                self.header.entry_count,
                directory.len()
            )));
        }
        debug!(entries = directory.len(), offset, "directory loaded");
        Ok(directory)
    }

    // ------------------------------------------------------------------
    // Content operations
    // ------------------------------------------------------------------

    pub fn entries(&self) -> &[DirectoryEntry] {
        self.directory.entries()
    }

    pub fn entry(&self, name: &str) -> Option<&DirectoryEntry> {
        self.directory.get(name)
    }

    /// Read and verify a named entry.
    pub fn read_entry(&mut self, name: &str) -> Result<Zeroizing<Vec<u8>>> {
        let entry = self
            .directory
            .get(name)
            .cloned()
            .ok_or_else(|| SealboxError::EntryNotFound(name.to_string()))?;

        let data = self.read_content(entry.offset as u64, Some(entry.length))?;
        if !bool::from(content_digest(&data).ct_eq(&entry.sha256)) {
            warn!(entry = name, "entry digest mismatch");
            return Err(SealboxError::EntryDigestMismatch(name.to_string()));
        }
        Ok(data)
    }

    /// Read the content record stored at `offset`.
    pub fn read_content_at(&mut self, offset: u64) -> Result<Zeroizing<Vec<u8>>> {
        self.read_content(offset, None)
    }

    fn read_content(&mut self, offset: u64, expected_len: Option<u64>) -> Result<Zeroizing<Vec<u8>>> {
        if offset < HEADER_LEN as u64 || offset >= self.header.directory_offset as u64 {
            return Err(SealboxError::InvalidFormat(format!(
                "offset {offset} is outside the content region"
            )));
        }
        let result = self.file.seek(SeekFrom::Start(offset)).map_err(SealboxError::from);
        self.faults.observe("read_content", None, result)?;

        let mut source = BufReader::new(&self.file);
        let data = match self.keys.as_mut() {
            None => read_prefixed(&mut source, self.max_entry_bytes as usize)?,
            Some(keys) => {
                keys.table.set_mode(RotationMode::Standard);
                let mut reader = BlockStreamReader::new(&mut keys.table, source);
                if let Some(length) = expected_len {
                    reader = reader.expect_length(length);
                }
                reader.read_to_vec()?
            }
        };

        if let Some(length) = expected_len {
            if data.len() as u64 != length {
                return Err(SealboxError::InvalidFormat(format!(
                    "content at {offset} is {} bytes, directory says {length}",
                    data.len()
                )));
            }
        }
        Ok(data)
    }

    /// Write every entry below `target`.
    ///
    /// Entries that cannot be written out are recorded as faults and
    /// skipped; an integrity or credential failure aborts the whole
    /// extraction.  Returns the paths that were written.
    pub fn extract_all(&mut self, target: &Path) -> Result<Vec<PathBuf>> {
        let names: Vec<String> = self.entries().iter().map(|e| e.name.clone()).collect();
        let mut written = Vec::with_capacity(names.len());

        for name in names {
            let data = match self.read_entry(&name) {
                Ok(data) => data,
                Err(e) if self.faults.record("extract_all", Some(&name), &e) => continue,
                Err(e) => return Err(e),
            };

            let destination = target.join(&name);
            let outcome = destination
                .parent()
                .map_or(Ok(()), fs::create_dir_all)
                .and_then(|_| fs::write(&destination, &*data));
            match outcome {
                Ok(()) => written.push(destination),
                Err(e) => {
                    self.faults.record("extract_all", Some(&name), &SealboxError::Io(e));
                }
            }
        }

        Ok(written)
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> ArchiveKind {
        self.header.kind
    }

    pub fn header(&self) -> &ArchiveHeader {
        &self.header
    }

    /// Resource failures recorded so far.
    pub fn faults(&self) -> &[Fault] {
        self.faults.faults()
    }

    pub fn clear_faults(&mut self) {
        self.faults.clear();
    }

    /// Release the file.  Key material is zeroed on drop.
    pub fn close(self) {
        debug!(path = %self.path.display(), "closing archive");
    }
}

impl std::fmt::Debug for ArchiveReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveReader")
            .field("path", &self.path)
            .field("kind", &self.header.kind)
            .field("entries", &self.directory.len())
            .finish_non_exhaustive()
    }
}
