//! Compression collaborator for the single-blob format.
//!
//! Compression runs immediately outside the crypto boundary: payloads
//! are compressed before the block stream sees them and decompressed
//! after it has verified every block.  Sealbox ships a passthrough and,
//! behind the `zstd` feature, an adapter over the `zstd` crate.

use zeroize::Zeroizing;

use crate::errors::Result;

pub trait Compressor {
    fn compress(&self, data: &[u8]) -> Result<Zeroizing<Vec<u8>>>;
    fn decompress(&self, data: &[u8]) -> Result<Zeroizing<Vec<u8>>>;
}

/// Stores payloads unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCompression;

impl Compressor for NoCompression {
    fn compress(&self, data: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        Ok(Zeroizing::new(data.to_vec()))
    }

    fn decompress(&self, data: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        Ok(Zeroizing::new(data.to_vec()))
    }
}

#[cfg(feature = "zstd")]
pub use self::zstd_adapter::ZstdCompressor;

#[cfg(feature = "zstd")]
mod zstd_adapter {
    use zeroize::Zeroizing;

    use super::Compressor;
    use crate::config::Settings;
    use crate::errors::{Result, SealboxError};

    #[derive(Debug, Clone, Copy)]
    pub struct ZstdCompressor {
        level: i32,
    }

    impl ZstdCompressor {
        pub fn new(level: i32) -> Self {
            Self { level }
        }

        pub fn from_settings(settings: &Settings) -> Self {
            Self::new(settings.compression_level)
        }
    }

    impl Compressor for ZstdCompressor {
        fn compress(&self, data: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
            zstd::bulk::compress(data, self.level)
                .map(Zeroizing::new)
                .map_err(|e| SealboxError::CompressionFailed(e.to_string()))
        }

        fn decompress(&self, data: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
            zstd::stream::decode_all(data)
                .map(Zeroizing::new)
                .map_err(|e| SealboxError::CompressionFailed(e.to_string()))
        }
    }

}
