//! Session key material: six key+IV pairs and their rotation cursor.
//!
//! A `KeyTable` is generated fresh for every write session and either
//! kept in memory for the lifetime of the writer, or rebuilt from its
//! wrapped form when a reader opens the file.  Blocks are encrypted
//! with the pairs in round-robin order, so the writer and the reader
//! must call `reset()` at the same pass boundaries and then `next()`
//! exactly once per block.
//!
//! Every pair is zeroed when the table is dropped.

use rand::rngs::OsRng;
use rand::TryRngCore;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use super::encryption::NONCE_LEN;
use crate::errors::{Result, SealboxError};

/// Length of a block key (AES-256).
pub const KEY_LEN: usize = 32;

/// Length of a block IV.
pub const IV_LEN: usize = NONCE_LEN;

/// Serialized length of one pair (`key || iv`).
pub const PAIR_LEN: usize = KEY_LEN + IV_LEN;

/// Number of pairs in a table.
pub const TABLE_SIZE: usize = 6;

/// Fill `buf` from the operating system's secure random source.
pub fn fill_random(buf: &mut [u8]) -> Result<()> {
    OsRng
        .try_fill_bytes(buf)
        .map_err(|e| SealboxError::RandomUnavailable(e.to_string()))
}

/// One symmetric key and its IV.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct KeyPair {
    key: [u8; KEY_LEN],
    iv: [u8; IV_LEN],
}

impl KeyPair {
    pub fn from_parts(key: [u8; KEY_LEN], iv: [u8; IV_LEN]) -> Self {
        Self { key, iv }
    }

    fn random() -> Result<Self> {
        let mut pair = Self {
            key: [0u8; KEY_LEN],
            iv: [0u8; IV_LEN],
        };
        fill_random(&mut pair.key)?;
        fill_random(&mut pair.iv)?;
        Ok(pair)
    }

    pub fn key(&self) -> &[u8; KEY_LEN] {
        &self.key
    }

    pub fn iv(&self) -> &[u8; IV_LEN] {
        &self.iv
    }

    /// `key || iv`, zeroed when the returned buffer is dropped.
    pub fn to_bytes(&self) -> Zeroizing<Vec<u8>> {
        let mut out = Zeroizing::new(Vec::with_capacity(PAIR_LEN));
        out.extend_from_slice(&self.key);
        out.extend_from_slice(&self.iv);
        out
    }

    /// Parse the output of `to_bytes`.  Returns `None` on a length mismatch.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != PAIR_LEN {
            return None;
        }
        let mut pair = Self {
            key: [0u8; KEY_LEN],
            iv: [0u8; IV_LEN],
        };
        pair.key.copy_from_slice(&bytes[..KEY_LEN]);
        pair.iv.copy_from_slice(&bytes[KEY_LEN..]);
        Some(pair)
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("KeyPair(<redacted>)")
    }
}

/// Ordinal names of the six table slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySlot {
    First,
    Second,
    Third,
    Fourth,
    Fifth,
    Sixth,
}

impl KeySlot {
    /// All slots in storage order.
    pub const ALL: [KeySlot; TABLE_SIZE] = [
        KeySlot::First,
        KeySlot::Second,
        KeySlot::Third,
        KeySlot::Fourth,
        KeySlot::Fifth,
        KeySlot::Sixth,
    ];

    pub fn index(self) -> usize {
        self as usize
    }
}

/// Where `reset()` places the rotation cursor.
///
/// Directory passes run in `Variant` mode and content passes in
/// `Standard` mode so the two never start from the same table position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RotationMode {
    #[default]
    Standard,
    Variant,
}

impl RotationMode {
    /// Index of the first pair handed out after a reset.
    pub fn start_index(self) -> usize {
        match self {
            RotationMode::Standard => KeySlot::First.index(),
            RotationMode::Variant => KeySlot::Fourth.index(),
        }
    }
}

/// Six key+IV pairs plus an explicit rotation cursor.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct KeyTable {
    pairs: [KeyPair; TABLE_SIZE],
    /// `None` until the first `reset()`.
    cursor: Option<usize>,
    #[zeroize(skip)]
    mode: RotationMode,
}

impl KeyTable {
    /// Generate six independent random pairs.
    pub fn create_random() -> Result<Self> {
        let pairs = [
            KeyPair::random()?,
            KeyPair::random()?,
            KeyPair::random()?,
            KeyPair::random()?,
            KeyPair::random()?,
            KeyPair::random()?,
        ];
        Ok(Self::from_pairs(pairs))
    }

    /// Rebuild a table from pairs in slot order.
    pub fn from_pairs(pairs: [KeyPair; TABLE_SIZE]) -> Self {
        Self {
            pairs,
            cursor: None,
            mode: RotationMode::Standard,
        }
    }

    /// The pair stored in `slot`, independent of the cursor.
    pub fn pair(&self, slot: KeySlot) -> &KeyPair {
        &self.pairs[slot.index()]
    }

    /// Move the cursor back to the start position of the current mode.
    pub fn reset(&mut self) {
        self.cursor = Some(self.mode.start_index());
    }

    /// Switch rotation mode and reset the cursor.
    pub fn set_mode(&mut self, mode: RotationMode) {
        self.mode = mode;
        self.reset();
    }

    pub fn mode(&self) -> RotationMode {
        self.mode
    }

    /// Current cursor position, `None` before the first reset.
    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    /// Hand out the pair under the cursor and advance, wrapping after
    /// the sixth pair.
    pub fn next(&mut self) -> Result<&KeyPair> {
        let index = self
            .cursor
            .ok_or(SealboxError::ProtocolMisuse("key rotation used before reset"))?;
        self.cursor = Some((index + 1) % TABLE_SIZE);
        Ok(&self.pairs[index])
    }
}

impl std::fmt::Debug for KeyTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyTable")
            .field("cursor", &self.cursor)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_before_reset_is_misuse() {
        let mut table = KeyTable::create_random().unwrap();
        let err = table.next().unwrap_err();
        assert!(matches!(err, SealboxError::ProtocolMisuse(_)));
    }

    #[test]
    fn variant_mode_starts_at_fourth_pair() {
        let mut table = KeyTable::create_random().unwrap();
        let fourth = table.pair(KeySlot::Fourth).to_bytes();

        table.set_mode(RotationMode::Variant);
        assert_eq!(table.cursor(), Some(3));
        assert_eq!(table.next().unwrap().to_bytes(), fourth);

        table.set_mode(RotationMode::Standard);
        assert_eq!(table.cursor(), Some(0));
    }

    #[test]
    fn pair_bytes_roundtrip_and_reject_bad_length() {
        let pair = KeyPair::random().unwrap();
        let bytes = pair.to_bytes();
        assert_eq!(bytes.len(), PAIR_LEN);
        let back = KeyPair::from_bytes(&bytes).unwrap();
        assert_eq!(back.key(), pair.key());
        assert_eq!(back.iv(), pair.iv());

        assert!(KeyPair::from_bytes(&bytes[1..]).is_none());
    }

    #[test]
    fn zeroize_clears_every_pair() {
        let mut table = KeyTable::create_random().unwrap();
        table.reset();
        table.zeroize();
        for slot in KeySlot::ALL {
            assert_eq!(table.pair(slot).key(), &[0u8; KEY_LEN]);
            assert_eq!(table.pair(slot).iv(), &[0u8; IV_LEN]);
        }
        assert_eq!(table.cursor(), None);
    }

    #[test]
    fn debug_output_hides_key_bytes() {
        let table = KeyTable::create_random().unwrap();
        let shown = format!("{table:?} {:?}", table.pair(KeySlot::First));
        assert!(shown.contains("redacted"));
    }
}
