//! Non-blocking wrappers for archive open, flush and close.
//!
//! Each call moves the owned instance onto tokio's blocking pool and
//! hands it back when the work is done.  Nothing inside the crypto
//! pipeline runs in parallel: one instance is still driven by one
//! thread at a time.

use std::path::PathBuf;

use super::{ArchiveReader, ArchiveWriter};
use crate::crypto::kdf::Argon2Params;
use crate::crypto::keywrap::Credentials;
use crate::errors::{Result, SealboxError};

async fn run_blocking<T, F>(job: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(job)
        .await
        .map_err(|e| SealboxError::Io(std::io::Error::other(e)))?
}

pub async fn create_clear(path: PathBuf) -> Result<ArchiveWriter> {
    run_blocking(move || ArchiveWriter::create_clear(&path)).await
}

pub async fn create_encrypted(
    path: PathBuf,
    credentials: Credentials,
    params: Argon2Params,
) -> Result<ArchiveWriter> {
    run_blocking(move || ArchiveWriter::create_encrypted(&path, &credentials, &params)).await
}

pub async fn open(path: PathBuf, credentials: Option<Credentials>) -> Result<ArchiveReader> {
    run_blocking(move || ArchiveReader::open(&path, credentials.as_ref())).await
}

pub async fn flush(mut writer: ArchiveWriter) -> Result<ArchiveWriter> {
    run_blocking(move || {
        writer.flush()?;
        Ok(writer)
    })
    .await
}

pub async fn close(writer: ArchiveWriter) -> Result<()> {
    run_blocking(move || writer.close()).await
}
