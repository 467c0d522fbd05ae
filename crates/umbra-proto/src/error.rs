//! Wire format error types.

use thiserror::Error;

/// Result type alias for wire format operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced while parsing or serializing DNS messages.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The input ended before the expected data.
    #[error("unexpected end of message at offset {offset}")]
    UnexpectedEof {
        /// Offset at which more data was expected.
        offset: usize,
    },

    /// A label exceeded the 63-byte limit.
    #[error("label too long: {length} bytes exceeds maximum of 63")]
    LabelTooLong {
        /// Actual label length.
        length: usize,
    },

    /// A name exceeded the 255-byte wire limit.
    #[error("name too long: {length} bytes exceeds maximum of 255")]
    NameTooLong {
        /// Actual wire length.
        length: usize,
    },

    /// A label contained a character outside the hostname alphabet.
    #[error("invalid character {character:?} in label")]
    InvalidLabelChar {
        /// The offending character.
        character: char,
    },

    /// A compression pointer referenced itself or pointed forward.
    #[error("invalid compression pointer at offset {offset} targeting {target}")]
    InvalidPointer {
        /// Offset of the pointer.
        offset: usize,
        /// Target the pointer referenced.
        target: usize,
    },

    /// Too many compression pointer jumps while parsing one name.
    #[error("compression pointer chain exceeds {max} jumps")]
    PointerChainTooLong {
        /// Jump limit that was exceeded.
        max: usize,
    },

    /// A reserved label type (0x40..0xBF length byte) was encountered.
    #[error("unsupported label type 0x{value:02x} at offset {offset}")]
    UnsupportedLabelType {
        /// The raw length byte.
        value: u8,
        /// Offset of the byte.
        offset: usize,
    },

    /// RDATA did not have the length its type requires.
    #[error("bad RDATA length for {rtype}: expected {expected}, got {actual}")]
    BadRDataLength {
        /// Record type name.
        rtype: &'static str,
        /// Required length.
        expected: usize,
        /// Observed length.
        actual: usize,
    },
}

impl Error {
    /// Creates an [`Error::UnexpectedEof`] at the given offset.
    #[inline]
    pub fn eof(offset: usize) -> Self {
        Self::UnexpectedEof { offset }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_offsets() {
        assert_eq!(
            Error::eof(17).to_string(),
            "unexpected end of message at offset 17"
        );
        assert_eq!(
            Error::LabelTooLong { length: 64 }.to_string(),
            "label too long: 64 bytes exceeds maximum of 63"
        );
    }
}
