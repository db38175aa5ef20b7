//! Block cipher stream protocol.
//!
//! This module provides:
//! - `i32` length-prefixed framing and block layout arithmetic (`frame`)
//! - `BlockStreamWriter`, which hashes, encrypts and splices 64 KiB blocks
//!   under a rotating `KeyTable` (`writer`)
//! - `BlockStreamReader`, which reverses the writer and verifies every
//!   block (`reader`)

pub mod frame;
pub mod reader;
pub mod writer;

use std::io::Cursor;

use zeroize::Zeroizing;

use crate::crypto::keys::KeyTable;
use crate::errors::Result;

pub use frame::{BlockLayout, BLOCK_SIZE, HASH_LEN};
pub use reader::BlockStreamReader;
pub use writer::BlockStreamWriter;

/// Encrypt `data` into a new in-memory stream.
pub fn encrypt_to_vec(table: &mut KeyTable, data: &[u8]) -> Result<Vec<u8>> {
    BlockStreamWriter::new(table, Vec::new()).write_all(data)
}

/// Decrypt a complete in-memory stream.
pub fn decrypt_from_slice(table: &mut KeyTable, stream: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    BlockStreamReader::new(table, Cursor::new(stream)).read_to_vec()
}
