//! Archive creation and appending.
//!
//! Content records are appended after the header (and, for encrypted
//! archives, after the six wrapped key records).  `flush` writes the
//! directory at the end of the data region, truncates the file there and
//! rewrites the header in place, so the header always names the newest
//! directory.  The next content write goes where the old directory was.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use super::directory::{content_digest, validate_name, Directory, DirectoryEntry};
use super::faults::{Fault, FaultLog};
use super::header::{ArchiveHeader, ArchiveKind, HEADER_LEN};
use super::SessionKeys;
use crate::config::Settings;
use crate::crypto::kdf::Argon2Params;
use crate::crypto::keys::{KeyTable, RotationMode};
use crate::crypto::keywrap::{Credentials, KeyWrap};
use crate::errors::{Result, SealboxError};
use crate::stream::frame::write_prefixed;
use crate::stream::BlockStreamWriter;

pub struct ArchiveWriter {
    path: PathBuf,
    /// `None` once the archive has been closed.
    file: Option<File>,
    header: ArchiveHeader,
    directory: Directory,
    keys: Option<SessionKeys>,
    /// Where the next content record starts.
    data_end: u64,
    max_entry_bytes: u64,
    dirty: bool,
    faults: FaultLog,
}

impl ArchiveWriter {
    // ------------------------------------------------------------------
    // Construction
    // ------------------------------------------------------------------

    /// Create a new archive whose content and directory are stored in
    /// the clear.
    pub fn create_clear(path: &Path) -> Result<Self> {
        let header = ArchiveHeader::new(ArchiveKind::Clear, None);
        Self::create(path, header, None, &Settings::default())
    }

    /// Create a new encrypted archive.
    ///
    /// A fresh `KeyTable` is generated and stored wrapped under a key
    /// derived from `credentials`.
    pub fn create_encrypted(path: &Path, credentials: &Credentials, params: &Argon2Params) -> Result<Self> {
        let settings = Settings {
            argon2_memory_kib: params.memory_kib,
            argon2_iterations: params.iterations,
            argon2_parallelism: params.parallelism,
            ..Settings::default()
        };
        Self::create_encrypted_with_settings(path, credentials, &settings)
    }

    /// Like `create_encrypted`, taking KDF parameters and size limits
    /// from `settings`.
    pub fn create_encrypted_with_settings(
        path: &Path,
        credentials: &Credentials,
        settings: &Settings,
    ) -> Result<Self> {
        let params = settings.argon2_params();
        let wrap = KeyWrap::derive(credentials, &params)?;
        let table = KeyTable::create_random()?;
        let header = ArchiveHeader::new(ArchiveKind::Encrypted, Some(params));
        Self::create(path, header, Some(SessionKeys { table, wrap }), settings)
    }

    fn create(path: &Path, header: ArchiveHeader, keys: Option<SessionKeys>, settings: &Settings) -> Result<Self> {
        if path.exists() {
            return Err(SealboxError::ArchiveAlreadyExists(path.to_path_buf()));
        }
        let file = File::options()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;

        let mut writer = Self {
            path: path.to_path_buf(),
            file: Some(file),
            header,
            directory: Directory::new(),
            keys,
            data_end: HEADER_LEN as u64,
            max_entry_bytes: settings.max_entry_bytes,
            dirty: true,
            faults: FaultLog::new(),
        };

        // A half-written archive is unusable; remove it rather than
        // leave it behind.
        if let Err(e) = writer.initialize() {
            writer.file = None;
            let _ = fs::remove_file(path);
            return Err(e);
        }

        info!(path = %path.display(), kind = ?writer.header.kind, "created archive");
        Ok(writer)
    }

    fn initialize(&mut self) -> Result<()> {
        let file = self.file.as_mut().ok_or(SealboxError::ProtocolMisuse("archive is closed"))?;
        self.header.write_to(file)?;
        if let Some(keys) = &self.keys {
            let mut sink = BufWriter::new(&mut *file);
            keys.wrap.write_table(&keys.table, &mut sink)?;
            sink.flush()?;
            drop(sink);
            self.data_end = file.stream_position()?;
        }
        self.flush()
    }

    // ------------------------------------------------------------------
    // Content operations
    // ------------------------------------------------------------------

    /// Add a named entry.  Returns the file offset of its content.
    pub fn add_entry(&mut self, name: &str, data: &[u8]) -> Result<u64> {
        self.add_entry_with_metadata(name, data, BTreeMap::new())
    }

    /// Add a named entry with caller metadata.
    pub fn add_entry_with_metadata(
        &mut self,
        name: &str,
        data: &[u8],
        metadata: BTreeMap<String, String>,
    ) -> Result<u64> {
        validate_name(name)?;
        if self.directory.get(name).is_some() {
            return Err(SealboxError::EntryAlreadyExists(name.to_string()));
        }
        if data.len() as u64 > self.max_entry_bytes {
            return Err(SealboxError::InvalidFormat(format!(
                "entry '{name}' is {} bytes, limit is {}",
                data.len(),
                self.max_entry_bytes
            )));
        }

        let offset = self.append_content(data)?;
        self.directory.insert(DirectoryEntry {
            name: name.to_string(),
            offset: offset as i64,
            length: data.len() as u64,
            created_at: Utc::now(),
            metadata,
            sha256: content_digest(data),
        })?;
        debug!(entry = name, offset, length = data.len(), "added entry");
        Ok(offset)
    }

    /// Read a file from disk and add it under `name`.
    pub fn add_file(&mut self, name: &str, source: &Path) -> Result<u64> {
        let read = fs::read(source).map(Zeroizing::new).map_err(SealboxError::from);
        let data = self.faults.observe("add_file", Some(name), read)?;
        self.add_entry(name, &data)
    }

    /// Append one content record at the end of the data region and
    /// return its offset.  The caller is responsible for remembering the
    /// offset; `add_entry` records it in the directory.
    pub fn append_content(&mut self, data: &[u8]) -> Result<u64> {
        let result = self.write_content(data);
        self.faults.observe("append_content", None, result)
    }

    fn write_content(&mut self, data: &[u8]) -> Result<u64> {
        let file = self.file.as_mut().ok_or(SealboxError::ProtocolMisuse("archive is closed"))?;
        let offset = self.data_end;
        file.seek(SeekFrom::Start(offset))?;
        self.dirty = true;

        let mut sink = BufWriter::new(&mut *file);
        match self.keys.as_mut() {
            None => write_prefixed(&mut sink, data)?,
            Some(keys) => {
                keys.table.set_mode(RotationMode::Standard);
                sink = BlockStreamWriter::new(&mut keys.table, sink).write_all(data)?;
            }
        }
        sink.flush()?;
        drop(sink);

        self.data_end = file.stream_position()?;
        Ok(offset)
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    /// Write the directory after the last content record and point the
    /// header at it.
    pub fn flush(&mut self) -> Result<()> {
        let result = self.write_directory();
        self.faults.observe("flush", None, result)
    }

    fn write_directory(&mut self) -> Result<()> {
        let file = self.file.as_mut().ok_or(SealboxError::ProtocolMisuse("archive is closed"))?;
        let directory_bytes = self.directory.to_bytes()?;
        let offset = self.data_end;
        file.seek(SeekFrom::Start(offset))?;

        let mut sink = BufWriter::new(&mut *file);
        match self.keys.as_mut() {
            None => write_prefixed(&mut sink, &directory_bytes)?,
            Some(keys) => {
                // Directory traffic never shares a rotation start with content.
                keys.table.set_mode(RotationMode::Variant);
                let written = BlockStreamWriter::new(&mut keys.table, sink).write_all(&directory_bytes);
                keys.table.set_mode(RotationMode::Standard);
                sink = written?;
            }
        }
        sink.flush()?;
        drop(sink);

        let end = file.stream_position()?;
        file.set_len(end)?;

        self.header.directory_offset = offset as i64;
        self.header.entry_count = self.directory.len() as u32;
        if let Some(keys) = &self.keys {
            self.header.seal(&keys.wrap)?;
        }
        self.header.write_to(file)?;
        file.sync_data()?;

        self.dirty = false;
        debug!(entries = self.directory.len(), offset, "directory flushed");
        Ok(())
    }

    /// Flush and release the file.  Key material is zeroed when the
    /// writer is dropped at the end of this call.
    pub fn close(mut self) -> Result<()> {
        if self.dirty {
            self.flush()?;
        }
        self.file = None;
        info!(path = %self.path.display(), entries = self.directory.len(), "closed archive");
        Ok(())
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

    pub fn entries(&self) -> &[DirectoryEntry] {
        self.directory.entries()
    }

    /// Resource failures recorded so far.  Check after batch work.
    pub fn faults(&self) -> &[Fault] {
        self.faults.faults()
    }

    pub fn clear_faults(&mut self) {
        self.faults.clear();
    }
}

impl Drop for ArchiveWriter {
    fn drop(&mut self) {
        if self.file.is_some() && self.dirty {
            if let Err(e) = self.write_directory() {
                warn!(path = %self.path.display(), error = %e, "flush on drop failed");
            }
        }
    }
}

impl std::fmt::Debug for ArchiveWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveWriter")
            .field("path", &self.path)
            .field("kind", &self.header.kind)
            .field("entries", &self.directory.len())
            .finish_non_exhaustive()
    }
}
