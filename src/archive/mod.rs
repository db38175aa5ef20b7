//! Archive container: header, directory and independently addressable
//! content records.
//!
//! This module provides:
//! - The fixed 64-byte clear header (`header`)
//! - The JSON directory of named entries (`directory`)
//! - The accumulating resource fault log (`faults`)
//! - `ArchiveWriter` for creating and appending (`writer`)
//! - `ArchiveReader` for opening and random-access reads (`reader`)
//!
//! Clear and encrypted archives share the same header and directory
//! shape.  In the encrypted variant every content record and the
//! directory itself go through the block cipher stream; the directory
//! pass runs in `RotationMode::Variant`.

pub mod directory;
pub mod faults;
pub mod header;
#[cfg(feature = "async")]
pub mod nonblocking;
pub mod reader;
pub mod writer;

use crate::crypto::keys::KeyTable;
use crate::crypto::keywrap::KeyWrap;

// Re-export the most commonly used items.
pub use directory::{Directory, DirectoryEntry};
pub use faults::{Fault, FaultLog};
pub use header::{ArchiveHeader, ArchiveKind};
pub use reader::ArchiveReader;
pub use writer::ArchiveWriter;

/// Key material held by an open encrypted archive.  Both parts zero
/// themselves on drop.
pub(crate) struct SessionKeys {
    pub(crate) table: KeyTable,
    pub(crate) wrap: KeyWrap,
}
