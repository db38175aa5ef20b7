//! Block cipher stream reader.
//!
//! Mirrors `BlockStreamWriter`: decrypt the two header integers under
//! the sixth pair, reset the rotation cursor, then for every block pull
//! the next pair, decrypt the size field, read and unsplice the block,
//! decrypt it and compare the trailing SHA-512 against a fresh digest of
//! the clear data.
//!
//! Any failure aborts the whole read.  The partial output and every
//! per-block buffer live in `Zeroizing` containers sized up front, so
//! nothing clear survives an early return.

use std::io::Read;

use sha2::{Digest, Sha512};
use subtle::ConstantTimeEq;
use tracing::{debug, warn};
use zeroize::Zeroizing;

use super::frame::{read_exact, read_prefixed, BlockLayout, HASH_LEN};
use crate::crypto::encryption::{decrypt_with_pair, OVERHEAD};
use crate::crypto::keys::{KeySlot, KeyTable};
use crate::crypto::obfuscate::unsplice;
use crate::errors::{Result, SealboxError};

/// Upper bound on an encrypted size field (4 clear bytes + GCM overhead).
const MAX_SIZE_FIELD: usize = 4 + OVERHEAD;

pub struct BlockStreamReader<'t, R: Read> {
    table: &'t mut KeyTable,
    source: R,
    expected_len: Option<u64>,
    blocks_verified: usize,
}

impl<'t, R: Read> BlockStreamReader<'t, R> {
    pub fn new(table: &'t mut KeyTable, source: R) -> Self {
        Self {
            table,
            source,
            expected_len: None,
            blocks_verified: 0,
        }
    }

    /// Reject the stream unless its header declares exactly `length` bytes.
    pub fn expect_length(mut self, length: u64) -> Self {
        self.expected_len = Some(length);
        self
    }

    /// Number of blocks whose hash has been checked so far.
    pub fn blocks_verified(&self) -> usize {
        self.blocks_verified
    }

    pub fn into_inner(self) -> R {
        self.source
    }

    /// Decrypt and verify one complete stream.
    pub fn read_to_vec(&mut self) -> Result<Zeroizing<Vec<u8>>> {
        let layout = self.read_header()?;
        if let Some(expected) = self.expected_len {
            if layout.total_len() != expected {
                return Err(SealboxError::InvalidFormat(format!(
                    "stream declares {} bytes, expected {expected}",
                    layout.total_len()
                )));
            }
        }
        debug!(
            block_count = layout.block_count,
            last_block_size = layout.last_block_size,
            mode = ?self.table.mode(),
            "reading block stream"
        );

        self.table.reset();

        let total = usize::try_from(layout.total_len())
            .map_err(|_| SealboxError::InvalidFormat("stream too large for this platform".into()))?;
        let mut output = Zeroizing::new(Vec::with_capacity(total));

        for index in 0..layout.block_count {
            let block = index as usize;
            let data_len = layout.block_len(index);
            let pair = self.table.next()?;

            let encrypted_size = read_prefixed(&mut self.source, MAX_SIZE_FIELD)?;
            let size_bytes = decrypt_with_pair(pair, &encrypted_size)
                .ok_or_else(|| integrity_failure(block, "size field"))?;
            let cipher_len = <[u8; 4]>::try_from(size_bytes.as_slice())
                .map(i32::from_le_bytes)
                .map_err(|_| integrity_failure(block, "size field length"))?;
            if cipher_len < 0 || cipher_len as usize != data_len + HASH_LEN + OVERHEAD {
                return Err(integrity_failure(block, "ciphertext length"));
            }

            let mut cipher_text = vec![0u8; cipher_len as usize];
            read_exact(&mut self.source, &mut cipher_text)?;
            unsplice(&mut cipher_text);

            let clear = decrypt_with_pair(pair, &cipher_text)
                .ok_or_else(|| integrity_failure(block, "block authentication"))?;
            if clear.len() != data_len + HASH_LEN {
                return Err(integrity_failure(block, "clear block length"));
            }

            let (data, stored_hash) = clear.split_at(data_len);
            let digest = Sha512::digest(data);
            if !bool::from(digest.as_slice().ct_eq(stored_hash)) {
                return Err(integrity_failure(block, "hash mismatch"));
            }
            self.blocks_verified += 1;
            output.extend_from_slice(data);
        }

        Ok(output)
    }

    fn read_header(&mut self) -> Result<BlockLayout> {
        let block_count = self.read_header_int()?;
        let last_block_size = self.read_header_int()?;
        BlockLayout::from_header(block_count, last_block_size)
    }

    fn read_header_int(&mut self) -> Result<i32> {
        let encrypted = read_prefixed(&mut self.source, MAX_SIZE_FIELD)?;
        let clear = decrypt_with_pair(self.table.pair(KeySlot::Sixth), &encrypted).ok_or_else(|| {
            warn!("block stream header failed authentication");
            SealboxError::StreamHeaderMismatch
        })?;
        <[u8; 4]>::try_from(clear.as_slice())
            .map(i32::from_le_bytes)
            .map_err(|_| SealboxError::InvalidFormat("block stream header has wrong width".into()))
    }
}

fn integrity_failure(block: usize, what: &str) -> SealboxError {
    warn!(block, check = what, "block integrity check failed");
    SealboxError::IntegrityFailure { block }
}
