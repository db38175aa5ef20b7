//! Sealbox: streaming encrypted archives.
//!
//! Payloads are split into 64 KiB blocks, each hashed with SHA-512,
//! encrypted under one of six rotating session keys and spliced before
//! it is written.  The session keys themselves are stored wrapped under
//! a key derived from the user's id, passcode and PIN.
//!
//! Two containers sit on top of the block stream:
//! - [`archive`]: a header + directory + content container with clear
//!   and encrypted variants and random access to entries.
//! - [`securefile`]: a single compressed payload in a double envelope.

pub mod archive;
pub mod config;
pub mod crypto;
pub mod errors;
pub mod securefile;
pub mod stream;

pub use errors::{Result, SealboxError};
