//! Capcode validity and address classification.

/// Largest capcode that fits a short (18-bit) address.
pub const MAX_SHORT_CAPCODE: u64 = 0x3_FFFF;

/// Largest capcode that fits a long (32-bit) address.
pub const MAX_LONG_CAPCODE: u64 = 0xFFFF_FFFF;

/// Addressing mode for a capcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressKind {
    /// One address word.
    Short,
    /// Two address words.
    Long,
}

impl AddressKind {
    /// Number of address words this kind occupies in a frame.
    pub fn word_count(&self) -> usize {
        match self {
            AddressKind::Short => 1,
            AddressKind::Long => 2,
        }
    }

    /// Human readable name used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            AddressKind::Short => "SHORT (18-bit)",
            AddressKind::Long => "LONG (32-bit)",
        }
    }
}

/// Classify a capcode. Returns `None` for reserved or out-of-range values.
///
/// Capcode 0 is reserved. Values up to [`MAX_SHORT_CAPCODE`] are short,
/// values up to [`MAX_LONG_CAPCODE`] are long.
pub fn classify_capcode(capcode: u64) -> Option<AddressKind> {
    match capcode {
        0 => None,
        1..=MAX_SHORT_CAPCODE => Some(AddressKind::Short),
        c if c <= MAX_LONG_CAPCODE => Some(AddressKind::Long),
        _ => None,
    }
}

/// Whether `capcode` can be addressed at all.
pub fn is_valid_capcode(capcode: u64) -> bool {
    classify_capcode(capcode).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_and_out_of_range() {
        assert!(!is_valid_capcode(0));
        assert!(!is_valid_capcode(MAX_LONG_CAPCODE + 1));
        assert!(!is_valid_capcode(u64::MAX));
    }

    #[test]
    fn test_short_long_boundary() {
        assert_eq!(classify_capcode(1), Some(AddressKind::Short));
        assert_eq!(classify_capcode(MAX_SHORT_CAPCODE), Some(AddressKind::Short));
        assert_eq!(classify_capcode(MAX_SHORT_CAPCODE + 1), Some(AddressKind::Long));
        assert_eq!(classify_capcode(1_122_334), Some(AddressKind::Long));
        assert_eq!(classify_capcode(MAX_LONG_CAPCODE), Some(AddressKind::Long));
    }

    #[test]
    fn test_word_count() {
        assert_eq!(AddressKind::Short.word_count(), 1);
        assert_eq!(AddressKind::Long.word_count(), 2);
    }
}
