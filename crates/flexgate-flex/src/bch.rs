//! BCH(31,21) codewords and block interleaving.
//!
//! ## Codeword Layout
//!
//! | Bits   | Field                                   |
//! |--------|-----------------------------------------|
//! | 31     | even parity over bits 0..=30            |
//! | 30..10 | 21 information bits                     |
//! | 9..0   | BCH check bits, generator `0x769`       |
//!
//! A block is eight codewords sent bit-interleaved: bit 31 of words 0..8,
//! then bit 30 of words 0..8, and so on, most significant bit first.

/// BCH(31,21) generator polynomial: x^10 + x^9 + x^8 + x^6 + x^5 + x^3 + 1.
pub const BCH_GENERATOR: u32 = 0x769;

/// Mask for the 21 information bits.
pub const DATA_MASK: u32 = 0x1F_FFFF;

/// Codewords per interleaved block.
pub const WORDS_PER_BLOCK: usize = 8;

/// Bytes per interleaved block.
pub const BLOCK_BYTES: usize = WORDS_PER_BLOCK * 4;

fn bch_remainder(value: u32) -> u32 {
    let mut reg = value;
    for bit in (10..31).rev() {
        if reg & (1 << bit) != 0 {
            reg ^= BCH_GENERATOR << (bit - 10);
        }
    }
    reg & 0x3FF
}

/// Build a 32-bit codeword from 21 information bits.
pub fn encode_codeword(data: u32) -> u32 {
    let shifted = (data & DATA_MASK) << 10;
    let cw31 = shifted | bch_remainder(shifted);
    let parity = cw31.count_ones() & 1;
    cw31 | (parity << 31)
}

/// Information bits of a codeword.
pub fn codeword_data(word: u32) -> u32 {
    (word >> 10) & DATA_MASK
}

/// Whether a codeword has a zero syndrome and even parity.
pub fn codeword_is_valid(word: u32) -> bool {
    bch_remainder(word & 0x7FFF_FFFF) == 0 && word.count_ones() % 2 == 0
}

/// Interleave one block of eight codewords into 32 bytes.
pub fn interleave_block(words: &[u32; WORDS_PER_BLOCK]) -> [u8; BLOCK_BYTES] {
    let mut out = [0u8; BLOCK_BYTES];
    let mut pos = 0;
    for bit in (0..32).rev() {
        for word in words {
            if (word >> bit) & 1 != 0 {
                out[pos / 8] |= 0x80 >> (pos % 8);
            }
            pos += 1;
        }
    }
    out
}

/// Undo [`interleave_block`].
pub fn deinterleave_block(bytes: &[u8; BLOCK_BYTES]) -> [u32; WORDS_PER_BLOCK] {
    let mut words = [0u32; WORDS_PER_BLOCK];
    let mut pos = 0;
    for bit in (0..32).rev() {
        for word in words.iter_mut() {
            if bytes[pos / 8] & (0x80 >> (pos % 8)) != 0 {
                *word |= 1 << bit;
            }
            pos += 1;
        }
    }
    words
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codewords_valid() {
        for data in [0, 1, 0x8000, 0x1234, 0x15_5555, DATA_MASK] {
            let word = encode_codeword(data);
            assert!(codeword_is_valid(word), "data {:#x}", data);
            assert_eq!(codeword_data(word), data);
        }
    }

    #[test]
    fn test_single_bit_error_detected() {
        let word = encode_codeword(0x0A_BCDE);
        for bit in 0..32 {
            assert!(!codeword_is_valid(word ^ (1 << bit)));
        }
    }

    #[test]
    fn test_zero_codeword() {
        assert_eq!(encode_codeword(0), 0);
    }

    #[test]
    fn test_interleave_bit_order() {
        let mut words = [0u32; WORDS_PER_BLOCK];
        words[0] = 0x8000_0000;
        let bytes = interleave_block(&words);
        assert_eq!(bytes[0], 0x80);
        assert!(bytes[1..].iter().all(|&b| b == 0));

        words[0] = 0;
        words[7] = 1;
        let bytes = interleave_block(&words);
        assert_eq!(bytes[BLOCK_BYTES - 1], 0x01);
    }

    #[test]
    fn test_deinterleave_recovers_words() {
        let words = [
            encode_codeword(1),
            encode_codeword(2),
            encode_codeword(0x1F_0000),
            encode_codeword(0x00_FFFF),
            0xDEAD_BEEF,
            0,
            u32::MAX,
            encode_codeword(0x12_3456),
        ];
        assert_eq!(deinterleave_block(&interleave_block(&words)), words);
    }
}
