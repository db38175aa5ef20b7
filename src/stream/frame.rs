//! Length-prefixed framing and block layout arithmetic.
//!
//! Every variable-length array in Sealbox files is written as
//! `[length: i32 LE][bytes]`.  Lengths are signed on the wire, so a
//! negative value or one above the caller's bound is rejected as a
//! format error before any allocation happens.

use std::io::{self, Read, Write};

use zeroize::Zeroizing;

use crate::errors::{Result, SealboxError};

/// Clear bytes per block.
pub const BLOCK_SIZE: usize = 65_536;

/// Length of the per-block SHA-512 digest.
pub const HASH_LEN: usize = 64;

/// Block count and size of the final block for a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockLayout {
    pub block_count: u32,
    pub last_block_size: u32,
}

impl BlockLayout {
    /// Layout for `length` clear bytes.
    ///
    /// An exact multiple of `BLOCK_SIZE` ends in a full block rather
    /// than an empty one; an empty payload has no blocks at all.
    pub fn for_length(length: u64) -> Result<Self> {
        if length == 0 {
            return Ok(Self {
                block_count: 0,
                last_block_size: 0,
            });
        }
        let block = BLOCK_SIZE as u64;
        let count = length.div_ceil(block);
        let block_count = i32::try_from(count)
            .map(|c| c as u32)
            .map_err(|_| SealboxError::InvalidFormat(format!("payload of {length} bytes needs too many blocks")))?;
        let last_block_size = (length - (count - 1) * block) as u32;
        Ok(Self {
            block_count,
            last_block_size,
        })
    }

    /// Validate a layout read back from a stream header.
    pub fn from_header(block_count: i32, last_block_size: i32) -> Result<Self> {
        let valid = match block_count {
            0 => last_block_size == 0,
            n if n > 0 => last_block_size > 0 && last_block_size as usize <= BLOCK_SIZE,
            _ => false,
        };
        if !valid {
            return Err(SealboxError::InvalidFormat(format!(
                "impossible stream layout: {block_count} blocks, last block {last_block_size} bytes"
            )));
        }
        Ok(Self {
            block_count: block_count as u32,
            last_block_size: last_block_size as u32,
        })
    }

    /// Clear length of block `index`.
    pub fn block_len(&self, index: u32) -> usize {
        if index + 1 == self.block_count {
            self.last_block_size as usize
        } else {
            BLOCK_SIZE
        }
    }

    /// Total clear payload length.
    pub fn total_len(&self) -> u64 {
        match self.block_count {
            0 => 0,
            n => u64::from(n - 1) * BLOCK_SIZE as u64 + u64::from(self.last_block_size),
        }
    }
}

pub fn write_i32<W: Write>(sink: &mut W, value: i32) -> Result<()> {
    sink.write_all(&value.to_le_bytes())?;
    Ok(())
}

pub fn read_i32<R: Read>(source: &mut R) -> Result<i32> {
    let mut buf = [0u8; 4];
    read_exact(source, &mut buf)?;
    Ok(i32::from_le_bytes(buf))
}

/// Write `[len: i32 LE][bytes]`.
pub fn write_prefixed<W: Write>(sink: &mut W, bytes: &[u8]) -> Result<()> {
    let len = i32::try_from(bytes.len()).map_err(|_| {
        SealboxError::SerializationError(format!("array of {} bytes exceeds i32::MAX", bytes.len()))
    })?;
    write_i32(sink, len)?;
    sink.write_all(bytes)?;
    Ok(())
}

/// Read one `[len: i32 LE][bytes]` record of at most `max_len` bytes.
///
/// The record may be clear data, so the buffer is zeroed on drop,
/// including when the read fails part way.
pub fn read_prefixed<R: Read>(source: &mut R, max_len: usize) -> Result<Zeroizing<Vec<u8>>> {
    let len = read_i32(source)?;
    let len = usize::try_from(len)
        .map_err(|_| SealboxError::InvalidFormat(format!("negative length prefix {len}")))?;
    if len > max_len {
        return Err(SealboxError::InvalidFormat(format!(
            "length prefix {len} exceeds limit {max_len}"
        )));
    }
    let mut buf = Zeroizing::new(vec![0u8; len]);
    read_exact(source, &mut buf)?;
    Ok(buf)
}

/// `read_exact` with truncation reported as a format error.
pub fn read_exact<R: Read>(source: &mut R, buf: &mut [u8]) -> Result<()> {
    source.read_exact(buf).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => SealboxError::InvalidFormat("unexpected end of data".into()),
        _ => SealboxError::Io(e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn layout_for_boundary_lengths() {
        let b = BLOCK_SIZE as u64;
        let cases = [
            (0, 0, 0),
            (1, 1, 1),
            (b - 1, 1, (b - 1) as u32),
            (b, 1, b as u32),
            (b + 1, 2, 1),
            (150_000, 3, 18_928),
            (3 * b, 3, b as u32),
        ];
        for (len, count, last) in cases {
            let layout = BlockLayout::for_length(len).unwrap();
            assert_eq!(layout.block_count, count, "length {len}");
            assert_eq!(layout.last_block_size, last, "length {len}");
            assert_eq!(layout.total_len(), len);
        }
    }

    #[test]
    fn header_layout_rejects_nonsense() {
        assert!(BlockLayout::from_header(-1, 10).is_err());
        assert!(BlockLayout::from_header(2, 0).is_err());
        assert!(BlockLayout::from_header(0, 5).is_err());
        assert!(BlockLayout::from_header(1, BLOCK_SIZE as i32 + 1).is_err());
        assert!(BlockLayout::from_header(3, 18_928).is_ok());
    }

    #[test]
    fn prefixed_records_are_little_endian() {
        let mut buf = Vec::new();
        write_prefixed(&mut buf, b"abc").unwrap();
        assert_eq!(buf, [3, 0, 0, 0, b'a', b'b', b'c']);
        let record: Zeroizing<Vec<u8>> = read_prefixed(&mut Cursor::new(buf), 16).unwrap();
        assert_eq!(record.as_slice(), b"abc");
    }

    #[test]
    fn negative_oversized_and_truncated_prefixes_fail() {
        let negative = (-5i32).to_le_bytes().to_vec();
        assert!(matches!(
            read_prefixed(&mut Cursor::new(negative), 16),
            Err(SealboxError::InvalidFormat(_))
        ));

        let mut big = Vec::new();
        write_prefixed(&mut big, &[0u8; 32]).unwrap();
        assert!(read_prefixed(&mut Cursor::new(big.clone()), 16).is_err());

        big.truncate(10);
        assert!(matches!(
            read_prefixed(&mut Cursor::new(big), 64),
            Err(SealboxError::InvalidFormat(_))
        ));
    }
}
