//! Block cipher stream writer.
//!
//! Wire layout produced by one pass:
//!
//! ```text
//! [i32 len][enc(block_count)]          under the sixth pair
//! [i32 len][enc(last_block_size)]      under the sixth pair
//! per block, pair = table.next():
//!   [i32 len][enc(cipher_len)]         under `pair`
//!   [cipher_len bytes]                 splice(enc(clear || sha512(clear)))
//! ```
//!
//! The writer is single-pass and consumes itself.  A failure part way
//! through leaves a truncated stream in the sink; removing the partial
//! output is the caller's job.

use std::io::{Read, Write};

use sha2::{Digest, Sha512};
use tracing::debug;
use zeroize::Zeroizing;

use super::frame::{write_prefixed, BlockLayout, BLOCK_SIZE, HASH_LEN};
use crate::crypto::encryption::encrypt_with_pair;
use crate::crypto::keys::{KeySlot, KeyTable};
use crate::crypto::obfuscate::splice;
use crate::errors::{Result, SealboxError};

pub struct BlockStreamWriter<'t, W: Write> {
    table: &'t mut KeyTable,
    sink: W,
}

impl<'t, W: Write> BlockStreamWriter<'t, W> {
    /// The table's current rotation mode decides where the pass starts.
    pub fn new(table: &'t mut KeyTable, sink: W) -> Self {
        Self { table, sink }
    }

    /// Encrypt an in-memory payload.  Returns the sink.
    pub fn write_all(self, data: &[u8]) -> Result<W> {
        let mut source = data;
        self.write_from(&mut source, data.len() as u64)
    }

    /// Encrypt exactly `length` bytes pulled from `source`.  Returns the sink.
    pub fn write_from<R: Read>(mut self, source: &mut R, length: u64) -> Result<W> {
        let layout = BlockLayout::for_length(length)?;
        debug!(
            block_count = layout.block_count,
            last_block_size = layout.last_block_size,
            mode = ?self.table.mode(),
            "starting block stream"
        );

        self.write_header(&layout)?;
        self.table.reset();

        let mut clear = Zeroizing::new(vec![0u8; BLOCK_SIZE + HASH_LEN]);
        for index in 0..layout.block_count {
            let len = layout.block_len(index);
            source.read_exact(&mut clear[..len])?;

            let digest = Sha512::digest(&clear[..len]);
            clear[len..len + HASH_LEN].copy_from_slice(&digest);

            let pair = self.table.next()?;
            let mut cipher_text = encrypt_with_pair(pair, &clear[..len + HASH_LEN])?;
            let cipher_len = i32::try_from(cipher_text.len()).map_err(|_| {
                SealboxError::EncryptionFailed(format!("block ciphertext of {} bytes", cipher_text.len()))
            })?;
            let encrypted_size = encrypt_with_pair(pair, &cipher_len.to_le_bytes())?;
            splice(&mut cipher_text);

            write_prefixed(&mut self.sink, &encrypted_size)?;
            self.sink.write_all(&cipher_text)?;
        }

        self.sink.flush()?;
        Ok(self.sink)
    }

    fn write_header(&mut self, layout: &BlockLayout) -> Result<()> {
        let sixth = self.table.pair(KeySlot::Sixth);
        let count = encrypt_with_pair(sixth, &(layout.block_count as i32).to_le_bytes())?;
        let last = encrypt_with_pair(sixth, &(layout.last_block_size as i32).to_le_bytes())?;
        write_prefixed(&mut self.sink, &count)?;
        write_prefixed(&mut self.sink, &last)?;
        Ok(())
    }
}
