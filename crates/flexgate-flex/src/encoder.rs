//! Single-frame FLEX encoder.
//!
//! Produces one 1600 bps, 2-level frame carrying one alphanumeric message to
//! one address.
//!
//! ## Frame Format
//!
//! | Field    | Size (bytes) | Description                                      |
//! |----------|--------------|--------------------------------------------------|
//! | BS1      | 4            | bit sync, `0xAAAAAAAA`                           |
//! | A        | 4            | sync code for 1600 bps / 2-level                 |
//! | B        | 2            | `0x5555`                                         |
//! | ~A       | 4            | inverted sync code                               |
//! | FIW      | 4            | frame information word (cycle, frame number)     |
//! | BS2      | 2            | bit sync, `0xAAAA`                               |
//! | C / ~C   | 4            | `0xED84`, `0x127B`                               |
//! | blocks   | 11 x 32      | 88 interleaved BCH codewords                     |
//!
//! ## Word Layout
//!
//! | Word          | Contents                                          |
//! |---------------|---------------------------------------------------|
//! | 0             | block information word, points at the vector      |
//! | 1 (or 1..=2)  | short (or long) address                           |
//! | next 1 (or 2) | alphanumeric vector: start word and word count    |
//! | next          | message header: checksum, fragment, mail drop     |
//! | next          | characters, 7 bits each, 3 per word, ETX padded   |
//! | rest          | idle words                                        |

use crate::bch::{encode_codeword, interleave_block, DATA_MASK, WORDS_PER_BLOCK};
use crate::capcode::{classify_capcode, AddressKind};
use crate::error::{FlexError, FlexResult};
use crate::payload::EncodedPayload;

// ============================================================================
// Frame Constants
// ============================================================================

/// Leading bit sync.
pub const BIT_SYNC_1: u32 = 0xAAAA_AAAA;

/// Sync code A for 1600 bps / 2-level.
pub const SYNC_A_1600_2: u32 = 0x870C_78F3;

/// Sync B field.
pub const SYNC_B: u16 = 0x5555;

/// Second bit sync.
pub const BIT_SYNC_2: u16 = 0xAAAA;

/// Sync C field.
pub const SYNC_C: u16 = 0xED84;

/// Interleaved blocks per frame.
pub const BLOCKS_PER_FRAME: usize = 11;

/// Codewords per frame.
pub const WORDS_PER_FRAME: usize = BLOCKS_PER_FRAME * WORDS_PER_BLOCK;

/// Size of the sync and FIW preamble in bytes.
pub const PREAMBLE_BYTES: usize = 4 + 4 + 2 + 4 + 4 + 2 + 2 + 2;

/// Size of one encoded frame in bytes.
pub const FRAME_BYTES: usize = PREAMBLE_BYTES + WORDS_PER_FRAME * 4;

/// Vector type for alphanumeric messages.
pub const VECTOR_ALPHANUMERIC: u32 = 5;

/// End-of-text padding character.
pub const ETX: u32 = 0x03;

/// Characters packed into one codeword.
pub const CHARS_PER_WORD: usize = 3;

const IDLE_DATA: u32 = DATA_MASK;

/// Fragment number used for a complete, unfragmented message.
const LAST_FRAGMENT: u32 = 3;

/// Encodes a message and capcode into an on-air payload.
pub trait PayloadEncoder: Send + Sync {
    /// Encode `message` addressed to `capcode`.
    fn encode(&self, message: &str, capcode: u64) -> FlexResult<EncodedPayload>;
}

/// FLEX encoder for single-frame alphanumeric pages, always cycle 0, frame 0.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlexEncoder;

impl FlexEncoder {
    /// Create an encoder.
    pub fn new() -> Self {
        FlexEncoder
    }

    /// Number of characters that fit in one frame for an address kind.
    pub fn capacity(kind: AddressKind) -> usize {
        let fixed = 1 + 2 * kind.word_count() + 1;
        (WORDS_PER_FRAME - fixed) * CHARS_PER_WORD
    }

    fn build_words(&self, text: &[u32], capcode: u64, kind: AddressKind) -> Vec<u32> {
        let address_words = kind.word_count();
        let vector_start = 1 + address_words;
        let message_start = vector_start + address_words;
        let char_words = pack_characters(text);

        let mut words = Vec::with_capacity(WORDS_PER_FRAME);

        // Block information word
        words.push(with_checksum((vector_start as u32) << 8));

        // Address
        match kind {
            AddressKind::Short => words.push(capcode as u32 + 0x8000),
            AddressKind::Long => {
                let low = (capcode & 0x7FFF) as u32;
                let high = (capcode >> 15) as u32;
                words.push(low + 1);
                words.push(DATA_MASK ^ high);
            }
        }

        // Vector
        let length = (1 + char_words.len()) as u32;
        words.push(with_checksum(
            (VECTOR_ALPHANUMERIC << 4) | ((message_start as u32) << 7) | (length << 14),
        ));
        if kind == AddressKind::Long {
            words.push(with_checksum(0));
        }

        // Message header and text
        let checksum = !char_words.iter().fold(0u32, |acc, w| acc.wrapping_add(*w)) & 0x3FF;
        words.push(checksum | (LAST_FRAGMENT << 11));
        words.extend(char_words);

        words.resize(WORDS_PER_FRAME, IDLE_DATA);
        words
    }

    fn frame_information_word(&self) -> u32 {
        // Cycle 0, frame 0
        encode_codeword(with_checksum(0))
    }
}

impl PayloadEncoder for FlexEncoder {
    fn encode(&self, message: &str, capcode: u64) -> FlexResult<EncodedPayload> {
        if message.is_empty() {
            return Err(FlexError::EmptyMessage);
        }
        let kind = classify_capcode(capcode).ok_or(FlexError::InvalidCapcode(capcode))?;

        let text = sanitize(message);
        let max = Self::capacity(kind);
        if text.len() > max {
            return Err(FlexError::MessageTooLong {
                len: text.len(),
                max,
            });
        }

        let words = self.build_words(&text, capcode, kind);

        let mut buf = Vec::with_capacity(FRAME_BYTES);
        buf.extend_from_slice(&BIT_SYNC_1.to_be_bytes());
        buf.extend_from_slice(&SYNC_A_1600_2.to_be_bytes());
        buf.extend_from_slice(&SYNC_B.to_be_bytes());
        buf.extend_from_slice(&(!SYNC_A_1600_2).to_be_bytes());
        buf.extend_from_slice(&self.frame_information_word().to_be_bytes());
        buf.extend_from_slice(&BIT_SYNC_2.to_be_bytes());
        buf.extend_from_slice(&SYNC_C.to_be_bytes());
        buf.extend_from_slice(&(!SYNC_C).to_be_bytes());

        for block in words.chunks_exact(WORDS_PER_BLOCK) {
            let mut codewords = [0u32; WORDS_PER_BLOCK];
            for (slot, data) in codewords.iter_mut().zip(block) {
                *slot = encode_codeword(*data);
            }
            buf.extend_from_slice(&interleave_block(&codewords));
        }

        EncodedPayload::new(buf)
    }
}

/// Fill the low nibble with a checksum so that all nibbles of the 21-bit word
/// sum to `0xF`.
pub fn with_checksum(fields: u32) -> u32 {
    let body = fields & DATA_MASK & !0xF;
    let mut sum = 0u32;
    let mut rest = body >> 4;
    while rest != 0 {
        sum += rest & 0xF;
        rest >>= 4;
    }
    body | (!sum & 0xF)
}

/// Map a message to 7-bit characters; anything outside ASCII becomes `?`.
fn sanitize(message: &str) -> Vec<u32> {
    message
        .chars()
        .map(|c| match c {
            ' '..='~' | '\n' => c as u32,
            _ => '?' as u32,
        })
        .collect()
}

fn pack_characters(text: &[u32]) -> Vec<u32> {
    text.chunks(CHARS_PER_WORD)
        .map(|chunk| {
            (0..CHARS_PER_WORD).fold(0u32, |word, i| {
                let c = chunk.get(i).copied().unwrap_or(ETX);
                word | ((c & 0x7F) << (7 * i))
            })
        })
        .collect()
}
