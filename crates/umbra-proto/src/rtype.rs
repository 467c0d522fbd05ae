//! DNS record types.

use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::fmt;

/// Record types the resolver can name.
///
/// Only A and AAAA are interpreted by the blocking path; everything
/// else is carried through to and from upstreams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u16)]
pub enum RecordType {
    /// IPv4 address - RFC 1035
    A = 1,
    /// Authoritative name server - RFC 1035
    NS = 2,
    /// Canonical name - RFC 1035
    CNAME = 5,
    /// Start of authority - RFC 1035
    SOA = 6,
    /// Domain name pointer - RFC 1035
    PTR = 12,
    /// Mail exchange - RFC 1035
    MX = 15,
    /// Text strings - RFC 1035
    TXT = 16,
    /// IPv6 address - RFC 3596
    AAAA = 28,
    /// Service location - RFC 2782
    SRV = 33,
    /// EDNS(0) pseudo-record - RFC 6891
    OPT = 41,
    /// HTTPS service binding - RFC 9460
    HTTPS = 65,
    /// Any record type (query only) - RFC 1035
    ANY = 255,
}

impl RecordType {
    /// Returns the textual mnemonic.
    pub const fn name(self) -> &'static str {
        match self {
            Self::A => "A",
            Self::NS => "NS",
            Self::CNAME => "CNAME",
            Self::SOA => "SOA",
            Self::PTR => "PTR",
            Self::MX => "MX",
            Self::TXT => "TXT",
            Self::AAAA => "AAAA",
            Self::SRV => "SRV",
            Self::OPT => "OPT",
            Self::HTTPS => "HTTPS",
            Self::ANY => "ANY",
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A record type as it appears on the wire.
///
/// Unrecognized values are preserved verbatim so that messages carrying
/// them survive a parse/serialize round-trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Type {
    /// A type this crate knows by name.
    Known(RecordType),
    /// Any other 16-bit type value.
    Unknown(u16),
}

impl Type {
    /// Converts from the wire value.
    #[inline]
    pub fn from_u16(value: u16) -> Self {
        RecordType::try_from(value)
            .map(Self::Known)
            .unwrap_or(Self::Unknown(value))
    }

    /// Converts to the wire value.
    #[inline]
    pub fn to_u16(self) -> u16 {
        match self {
            Self::Known(t) => t.into(),
            Self::Unknown(v) => v,
        }
    }

    /// Returns the known type, if any.
    #[inline]
    pub fn as_known(self) -> Option<RecordType> {
        match self {
            Self::Known(t) => Some(t),
            Self::Unknown(_) => None,
        }
    }

    /// Returns true if this is A or AAAA.
    #[inline]
    pub fn is_address(self) -> bool {
        matches!(self, Self::Known(RecordType::A) | Self::Known(RecordType::AAAA))
    }
}

impl From<RecordType> for Type {
    fn from(t: RecordType) -> Self {
        Self::Known(t)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Known(t) => t.fmt(f),
            Self::Unknown(v) => write!(f, "TYPE{}", v),
        }
    }
}
