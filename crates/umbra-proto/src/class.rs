//! DNS record classes.

use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::fmt;

/// Record classes with assigned mnemonics. Practically everything is IN.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u16)]
pub enum RecordClass {
    /// Internet - RFC 1035
    IN = 1,
    /// Chaos - RFC 1035
    CH = 3,
    /// Hesiod - RFC 1035
    HS = 4,
    /// Any class (query only) - RFC 1035
    ANY = 255,
}

impl fmt::Display for RecordClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::IN => "IN",
            Self::CH => "CH",
            Self::HS => "HS",
            Self::ANY => "ANY",
        };
        f.write_str(name)
    }
}

/// A record class as it appears on the wire, preserving unknown values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Class {
    /// A class with an assigned mnemonic.
    Known(RecordClass),
    /// Any other 16-bit class value.
    Unknown(u16),
}

impl Class {
    /// Converts from the wire value.
    #[inline]
    pub fn from_u16(value: u16) -> Self {
        RecordClass::try_from(value)
            .map(Self::Known)
            .unwrap_or(Self::Unknown(value))
    }

    /// Converts to the wire value.
    #[inline]
    pub fn to_u16(self) -> u16 {
        match self {
            Self::Known(c) => c.into(),
            Self::Unknown(v) => v,
        }
    }
}

impl From<RecordClass> for Class {
    fn from(c: RecordClass) -> Self {
        Self::Known(c)
    }
}

impl fmt::Display for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Known(c) => c.fmt(f),
            Self::Unknown(v) => write!(f, "CLASS{}", v),
        }
    }
}
