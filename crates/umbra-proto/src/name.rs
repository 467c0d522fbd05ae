//! DNS domain names.
//!
//! A name is stored as its uncompressed wire form: a sequence of
//! length-prefixed labels terminated by the zero-length root label.
//! `www.example.com.` is held as:
//!
//! ```text
//! 03 'w' 'w' 'w' 07 'e' 'x' 'a' 'm' 'p' 'l' 'e' 03 'c' 'o' 'm' 00
//! ```
//!
//! Comparison and hashing are case-insensitive per RFC 1035. Parsing
//! from a message resolves compression pointers (RFC 1035 §4.1.4);
//! pointers must target earlier offsets and the chain length is bounded.

use crate::error::{Error, Result};
use crate::{MAX_LABEL_LENGTH, MAX_NAME_LENGTH};
use bytes::BytesMut;
use smallvec::SmallVec;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// Maximum number of compression pointer jumps tolerated in one name.
const MAX_POINTER_JUMPS: usize = 64;

/// A fully-qualified DNS domain name in uncompressed wire form.
///
/// Typical names fit in the inline buffer; nothing is heap-allocated
/// for names up to 64 wire bytes.
#[derive(Clone)]
pub struct Name {
    /// Wire form including the terminating root label.
    wire: SmallVec<[u8; 64]>,
}

impl Name {
    /// Returns the root name (`.`).
    pub fn root() -> Self {
        Self {
            wire: SmallVec::from_slice(&[0]),
        }
    }

    /// Returns true if this is the root name.
    #[inline]
    pub fn is_root(&self) -> bool {
        self.wire.len() == 1
    }

    /// Returns the uncompressed wire form, terminator included.
    #[inline]
    pub fn as_wire(&self) -> &[u8] {
        &self.wire
    }

    /// Returns the wire length, terminator included.
    #[inline]
    pub fn wire_len(&self) -> usize {
        self.wire.len()
    }

    /// Returns an iterator over the non-root labels as byte slices.
    pub fn labels(&self) -> Labels<'_> {
        Labels {
            wire: &self.wire,
            pos: 0,
        }
    }

    /// Returns the number of non-root labels.
    pub fn label_count(&self) -> usize {
        self.labels().count()
    }

    /// Appends the wire form to a buffer.
    pub fn write_to(&self, buf: &mut BytesMut) {
        buf.extend_from_slice(&self.wire);
    }

    /// Parses a name out of a message, following compression pointers.
    ///
    /// `message` must be the complete message so that pointer targets can
    /// be resolved. Returns the name and the number of bytes the name
    /// occupies at `offset` (a pointer counts as two bytes regardless of
    /// where it leads).
    pub fn parse(message: &[u8], offset: usize) -> Result<(Self, usize)> {
        let mut wire = SmallVec::<[u8; 64]>::new();
        let mut pos = offset;
        let mut consumed = 0usize;
        let mut jumped = false;
        let mut jumps = 0usize;

        loop {
            let len_byte = *message.get(pos).ok_or_else(|| Error::eof(pos))?;

            if len_byte & 0xC0 == 0xC0 {
                let low = *message.get(pos + 1).ok_or_else(|| Error::eof(pos + 1))?;
                let target = usize::from(u16::from_be_bytes([len_byte & 0x3F, low]));

                // Forward or self-referencing pointers cannot terminate.
                if target >= pos {
                    return Err(Error::InvalidPointer {
                        offset: pos,
                        target,
                    });
                }

                if !jumped {
                    consumed = pos + 2 - offset;
                    jumped = true;
                }

                jumps += 1;
                if jumps > MAX_POINTER_JUMPS {
                    return Err(Error::PointerChainTooLong {
                        max: MAX_POINTER_JUMPS,
                    });
                }

                pos = target;
                continue;
            }

            if len_byte & 0xC0 != 0 {
                return Err(Error::UnsupportedLabelType {
                    value: len_byte,
                    offset: pos,
                });
            }

            let len = usize::from(len_byte);

            if len == 0 {
                wire.push(0);
                if !jumped {
                    consumed = pos + 1 - offset;
                }
                break;
            }

            let end = pos + 1 + len;
            if end > message.len() {
                return Err(Error::eof(end));
            }
            if wire.len() + 1 + len + 1 > MAX_NAME_LENGTH {
                return Err(Error::NameTooLong {
                    length: wire.len() + 1 + len + 1,
                });
            }

            wire.push(len_byte);
            wire.extend_from_slice(&message[pos + 1..end]);
            pos = end;
        }

        Ok((Self { wire }, consumed))
    }

    /// Skips over a name at `offset` without materializing it.
    pub fn skip(message: &[u8], offset: usize) -> Result<usize> {
        let mut pos = offset;

        loop {
            let len_byte = *message.get(pos).ok_or_else(|| Error::eof(pos))?;

            if len_byte & 0xC0 == 0xC0 {
                // A pointer terminates the name.
                if pos + 1 >= message.len() {
                    return Err(Error::eof(pos + 1));
                }
                return Ok(pos + 2 - offset);
            }

            if len_byte & 0xC0 != 0 {
                return Err(Error::UnsupportedLabelType {
                    value: len_byte,
                    offset: pos,
                });
            }

            if len_byte == 0 {
                return Ok(pos + 1 - offset);
            }

            pos += 1 + usize::from(len_byte);
        }
    }
}

impl FromStr for Name {
    type Err = Error;

    /// Parses the dotted presentation form. A trailing dot is accepted
    /// and implied when absent.
    fn from_str(s: &str) -> Result<Self> {
        if s.is_empty() || s == "." {
            return Ok(Self::root());
        }

        let s = s.strip_suffix('.').unwrap_or(s);
        let mut wire = SmallVec::<[u8; 64]>::new();

        for label in s.split('.') {
            if label.is_empty() || label.len() > MAX_LABEL_LENGTH {
                return Err(Error::LabelTooLong {
                    length: label.len(),
                });
            }
            for c in label.chars() {
                if !c.is_ascii_alphanumeric() && c != '-' && c != '_' && c != '*' {
                    return Err(Error::InvalidLabelChar { character: c });
                }
            }
            wire.push(label.len() as u8);
            wire.extend_from_slice(label.as_bytes());
        }

        wire.push(0);
        if wire.len() > MAX_NAME_LENGTH {
            return Err(Error::NameTooLong { length: wire.len() });
        }

        Ok(Self { wire })
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            return write!(f, ".");
        }
        for label in self.labels() {
            for &b in label {
                if b.is_ascii_graphic() && b != b'.' && b != b'\\' {
                    write!(f, "{}", b as char)?;
                } else {
                    write!(f, "\\{:03}", b)?;
                }
            }
            write!(f, ".")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Name({})", self)
    }
}

impl PartialEq for Name {
    fn eq(&self, other: &Self) -> bool {
        // Length bytes are below 0x41 so a bytewise case-insensitive
        // comparison of the wire form is exact.
        self.wire.eq_ignore_ascii_case(&other.wire)
    }
}

impl Eq for Name {}

impl Hash for Name {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for &b in self.wire.iter() {
            state.write_u8(b.to_ascii_lowercase());
        }
    }
}

impl Default for Name {
    fn default() -> Self {
        Self::root()
    }
}

/// Iterator over the non-root labels of a [`Name`].
pub struct Labels<'a> {
    wire: &'a [u8],
    pos: usize,
}

impl<'a> Iterator for Labels<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<&'a [u8]> {
        let len = usize::from(*self.wire.get(self.pos)?);
        if len == 0 {
            return None;
        }
        let start = self.pos + 1;
        self.pos = start + len;
        self.wire.get(start..start + len)
    }
}
