//! Fixed-size clear archive header.
//!
//! The header is always the first 64 bytes of an archive and is the only
//! record read before credentials are applied:
//!
//! ```text
//! [SBAR: 4][version: 1][kind: 1][reserved: 2]
//! [directory_offset: i64 LE][entry_count: u32 LE]
//! [argon2 memory_kib: u32 LE][iterations: u32 LE][parallelism: u32 LE]
//! [HMAC-SHA256 over bytes 0..32: 32]
//! ```
//!
//! Clear archives store zero Argon2 parameters and a zero MAC.

use std::io::{Read, Seek, SeekFrom, Write};

use crate::crypto::kdf::Argon2Params;
use crate::crypto::keywrap::{KeyWrap, MAC_LEN};
use crate::errors::{Result, SealboxError};
use crate::stream::frame::read_exact;

/// Magic bytes at the start of every archive.
const MAGIC: &[u8; 4] = b"SBAR";

/// Current binary format version.
pub const CURRENT_VERSION: u8 = 1;

/// Total header size on disk.
pub const HEADER_LEN: usize = 64;

/// Bytes covered by the header MAC.
const AUTHENTICATED_LEN: usize = HEADER_LEN - MAC_LEN;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Clear,
    Encrypted,
}

impl ArchiveKind {
    fn to_byte(self) -> u8 {
        match self {
            ArchiveKind::Clear => 0,
            ArchiveKind::Encrypted => 1,
        }
    }

    fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            0 => Ok(ArchiveKind::Clear),
            1 => Ok(ArchiveKind::Encrypted),
            other => Err(SealboxError::InvalidFormat(format!("unknown archive kind {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveHeader {
    pub kind: ArchiveKind,
    /// File offset of the directory.  The header is the only place this
    /// is recorded.
    pub directory_offset: i64,
    pub entry_count: u32,
    /// KDF settings used to wrap the key table (encrypted archives only).
    pub argon2: Option<Argon2Params>,
    mac: [u8; MAC_LEN],
}

impl ArchiveHeader {
    pub fn new(kind: ArchiveKind, argon2: Option<Argon2Params>) -> Self {
        Self {
            kind,
            directory_offset: HEADER_LEN as i64,
            entry_count: 0,
            argon2,
            mac: [0u8; MAC_LEN],
        }
    }

    fn authenticated_bytes(&self) -> [u8; AUTHENTICATED_LEN] {
        let mut buf = [0u8; AUTHENTICATED_LEN];
        buf[0..4].copy_from_slice(MAGIC);
        buf[4] = CURRENT_VERSION;
        buf[5] = self.kind.to_byte();
        // 6..8 reserved
        buf[8..16].copy_from_slice(&self.directory_offset.to_le_bytes());
        buf[16..20].copy_from_slice(&self.entry_count.to_le_bytes());
        let params = self.argon2.unwrap_or(Argon2Params {
            memory_kib: 0,
            iterations: 0,
            parallelism: 0,
        });
        buf[20..24].copy_from_slice(&params.memory_kib.to_le_bytes());
        buf[24..28].copy_from_slice(&params.iterations.to_le_bytes());
        buf[28..32].copy_from_slice(&params.parallelism.to_le_bytes());
        buf
    }

    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        buf[..AUTHENTICATED_LEN].copy_from_slice(&self.authenticated_bytes());
        buf[AUTHENTICATED_LEN..].copy_from_slice(&self.mac);
        buf
    }

    pub fn from_bytes(buf: &[u8; HEADER_LEN]) -> Result<Self> {
        if &buf[0..4] != MAGIC {
            return Err(SealboxError::InvalidFormat("missing SBAR magic bytes".into()));
        }
        let version = buf[4];
        if version != CURRENT_VERSION {
            return Err(SealboxError::InvalidFormat(format!(
                "unsupported version {version}, expected {CURRENT_VERSION}"
            )));
        }
        let kind = ArchiveKind::from_byte(buf[5])?;

        let directory_offset = i64::from_le_bytes(le_field(buf, 8));
        if directory_offset < HEADER_LEN as i64 {
            return Err(SealboxError::InvalidFormat(format!(
                "directory offset {directory_offset} points inside the header"
            )));
        }
        let entry_count = u32::from_le_bytes(le_field(buf, 16));
        let argon2 = match kind {
            ArchiveKind::Clear => None,
            ArchiveKind::Encrypted => {
                let params = Argon2Params {
                    memory_kib: u32::from_le_bytes(le_field(buf, 20)),
                    iterations: u32::from_le_bytes(le_field(buf, 24)),
                    parallelism: u32::from_le_bytes(le_field(buf, 28)),
                };
                // Read before the MAC can be checked, so bound them here.
                params
                    .validate()
                    .map_err(|e| SealboxError::InvalidFormat(format!("header KDF parameters: {e}")))?;
                Some(params)
            }
        };

        let mut mac = [0u8; MAC_LEN];
        mac.copy_from_slice(&buf[AUTHENTICATED_LEN..]);

        Ok(Self {
            kind,
            directory_offset,
            entry_count,
            argon2,
            mac,
        })
    }

    /// Read the header from offset 0.
    pub fn read_from<R: Read + Seek>(source: &mut R) -> Result<Self> {
        source.seek(SeekFrom::Start(0))?;
        let mut buf = [0u8; HEADER_LEN];
        read_exact(source, &mut buf)?;
        Self::from_bytes(&buf)
    }

    /// Write (or rewrite in place) the header at offset 0.
    pub fn write_to<W: Write + Seek>(&self, sink: &mut W) -> Result<()> {
        sink.seek(SeekFrom::Start(0))?;
        sink.write_all(&self.to_bytes())?;
        Ok(())
    }

    /// Recompute the MAC after any field change.
    pub fn seal(&mut self, wrap: &KeyWrap) -> Result<()> {
        self.mac = wrap.header_mac(&self.authenticated_bytes())?;
        Ok(())
    }

    pub fn verify(&self, wrap: &KeyWrap) -> Result<()> {
        if wrap.verify_header_mac(&self.authenticated_bytes(), &self.mac)? {
            Ok(())
        } else {
            Err(SealboxError::HeaderMacMismatch)
        }
    }
}

fn le_field<const N: usize>(buf: &[u8; HEADER_LEN], at: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&buf[at..at + N]);
    out
}
