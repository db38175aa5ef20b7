//! Single-blob secure file format.
//!
//! A secure file wraps exactly one payload:
//!
//! ```text
//! 6 x [i32 len][KeyWrap(key || iv)]      fresh KeyTable, slot order
//! [i32 len][KeyWrap(block stream)]        top-level envelope
//! ```
//!
//! The payload is compressed, pushed through the block cipher stream
//! under the fresh table, and the whole stream is wrapped once more
//! with the credential-derived key.  Breaking the credential key alone
//! exposes only the inner stream; breaking the inner rotation alone
//! still leaves the envelope.

pub mod compress;

use std::fs;
use std::io::Cursor;
use std::path::Path;

use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::crypto::keys::KeyTable;
use crate::crypto::keywrap::KeyWrap;
use crate::errors::{Result, SealboxError};
use crate::stream::frame::{read_prefixed, write_prefixed};
use crate::stream::{decrypt_from_slice, encrypt_to_vec};

pub use compress::{Compressor, NoCompression};

#[cfg(feature = "zstd")]
pub use compress::ZstdCompressor;

/// Largest envelope a length prefix can describe.
const MAX_ENVELOPE: usize = i32::MAX as usize;

/// Seal `payload` into the secure file byte layout.
pub fn seal(payload: &[u8], wrap: &KeyWrap, compressor: &dyn Compressor) -> Result<Vec<u8>> {
    let mut table = KeyTable::create_random()?;

    let mut out = Vec::new();
    wrap.write_table(&table, &mut out)?;

    let compressed = compressor.compress(payload)?;
    let stream = encrypt_to_vec(&mut table, &compressed)?;
    let envelope = wrap.encrypt(&stream)?;
    write_prefixed(&mut out, &envelope)?;

    debug!(
        payload_len = payload.len(),
        compressed_len = compressed.len(),
        sealed_len = out.len(),
        "sealed secure blob"
    );
    Ok(out)
}

/// Reverse `seal`.
///
/// Wrong credentials fail with `CredentialFailure` before anything else
/// is decrypted.  If the keys unwrap but the envelope does not, the
/// envelope was altered and the error is `EnvelopeMismatch`.
pub fn unseal(bytes: &[u8], wrap: &KeyWrap, compressor: &dyn Compressor) -> Result<Zeroizing<Vec<u8>>> {
    let mut source = Cursor::new(bytes);
    let mut table = wrap.read_table(&mut source)?;

    let envelope = read_prefixed(&mut source, MAX_ENVELOPE)?;
    if source.position() != bytes.len() as u64 {
        return Err(SealboxError::InvalidFormat("trailing bytes after envelope".into()));
    }

    let stream = wrap.decrypt(&envelope).ok_or_else(|| {
        warn!("secure blob envelope failed authentication");
        SealboxError::EnvelopeMismatch
    })?;
    let compressed = decrypt_from_slice(&mut table, &stream)?;
    compressor.decompress(&compressed)
}

/// Seal `payload` and write it to `path` **atomically**.
///
/// The blob is written to a temp file in the same directory and renamed
/// over the target, so readers never see a half-written file.  On
/// failure the temp file is removed.
pub fn write_secure_file(path: &Path, payload: &[u8], wrap: &KeyWrap, compressor: &dyn Compressor) -> Result<()> {
    let sealed = seal(payload, wrap, compressor)?;

    let parent = path.parent().unwrap_or(Path::new("."));
    let tmp_path = parent.join(format!(
        ".{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy()
    ));

    let written = fs::write(&tmp_path, &sealed).and_then(|_| fs::rename(&tmp_path, path));
    if let Err(e) = written {
        let _ = fs::remove_file(&tmp_path);
        return Err(e.into());
    }
    Ok(())
}

/// Read and unseal the secure file at `path`.
pub fn read_secure_file(path: &Path, wrap: &KeyWrap, compressor: &dyn Compressor) -> Result<Zeroizing<Vec<u8>>> {
    if !path.exists() {
        return Err(SealboxError::FileNotFound(path.to_path_buf()));
    }
    let bytes = fs::read(path)?;
    unseal(&bytes, wrap, compressor)
}
