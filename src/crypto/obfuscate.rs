//! Reversible bit splicing applied to block ciphertext.
//!
//! This is not a cipher.  It only rearranges bits so that block
//! boundaries and GCM framing do not show up as regular structure in
//! the file; every security property comes from the AEAD and the
//! per-block hash underneath it.
//!
//! `splice`: swap the low nibbles of byte `i` and byte `n-1-i` for every
//! `i < n/2`, then rotate each byte left by 3 bits.
//! `unsplice`: rotate right by 3, then the same (self-inverse) swap.

const ROTATION: u32 = 3;

/// Obfuscate `data` in place.
pub fn splice(data: &mut [u8]) {
    swap_low_nibbles(data);
    for byte in data.iter_mut() {
        *byte = byte.rotate_left(ROTATION);
    }
}

/// Undo `splice` in place.
pub fn unsplice(data: &mut [u8]) {
    for byte in data.iter_mut() {
        *byte = byte.rotate_right(ROTATION);
    }
    swap_low_nibbles(data);
}

fn swap_low_nibbles(data: &mut [u8]) {
    let n = data.len();
    for i in 0..n / 2 {
        let j = n - 1 - i;
        let (a, b) = (data[i], data[j]);
        data[i] = (a & 0xF0) | (b & 0x0F);
        data[j] = (b & 0xF0) | (a & 0x0F);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn known_vector() {
        let mut data = [0x12u8, 0x34];
        splice(&mut data);
        // swap -> [0x14, 0x32], rotl 3 -> [0xA0, 0x91]
        assert_eq!(data, [0xA0, 0x91]);
        unsplice(&mut data);
        assert_eq!(data, [0x12, 0x34]);
    }

    #[test]
    fn empty_and_single_byte() {
        let mut empty: [u8; 0] = [];
        splice(&mut empty);

        let mut one = [0b1000_0001u8];
        splice(&mut one);
        assert_eq!(one, [0b0000_1100]);
        unsplice(&mut one);
        assert_eq!(one, [0b1000_0001]);
    }

    proptest! {
        #[test]
        fn unsplice_inverts_splice(bytes in proptest::collection::vec(any::<u8>(), 0..512)) {
            let mut data = bytes.clone();
            splice(&mut data);
            unsplice(&mut data);
            prop_assert_eq!(data, bytes);
        }
    }
}
