//! DNS response codes.

use std::fmt;

/// The 4-bit RCODE from the message header.
///
/// Values without an assigned meaning here are preserved as
/// [`ResponseCode::Other`] so any header round-trips.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseCode {
    /// No error condition.
    NoError,
    /// The server could not interpret the query.
    FormErr,
    /// The server failed to process the query.
    ServFail,
    /// The queried name does not exist.
    NXDomain,
    /// The query kind is not supported.
    NotImp,
    /// The server refuses to answer for policy reasons.
    Refused,
    /// Any other header RCODE value.
    Other(u8),
}

impl ResponseCode {
    /// Converts from the 4-bit header field.
    pub fn from_u4(value: u8) -> Self {
        match value & 0x0F {
            0 => Self::NoError,
            1 => Self::FormErr,
            2 => Self::ServFail,
            3 => Self::NXDomain,
            4 => Self::NotImp,
            5 => Self::Refused,
            v => Self::Other(v),
        }
    }

    /// Converts to the 4-bit header field.
    pub fn to_u4(self) -> u8 {
        match self {
            Self::NoError => 0,
            Self::FormErr => 1,
            Self::ServFail => 2,
            Self::NXDomain => 3,
            Self::NotImp => 4,
            Self::Refused => 5,
            Self::Other(v) => v & 0x0F,
        }
    }

    /// Returns true for NOERROR.
    #[inline]
    pub fn is_success(self) -> bool {
        matches!(self, Self::NoError)
    }

    /// Returns true for SERVFAIL.
    #[inline]
    pub fn is_servfail(self) -> bool {
        matches!(self, Self::ServFail)
    }
}

impl Default for ResponseCode {
    fn default() -> Self {
        Self::NoError
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoError => f.write_str("NOERROR"),
            Self::FormErr => f.write_str("FORMERR"),
            Self::ServFail => f.write_str("SERVFAIL"),
            Self::NXDomain => f.write_str("NXDOMAIN"),
            Self::NotImp => f.write_str("NOTIMP"),
            Self::Refused => f.write_str("REFUSED"),
            Self::Other(v) => write!(f, "RCODE{}", v),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_header_values_roundtrip() {
        for v in 0u8..16 {
            assert_eq!(ResponseCode::from_u4(v).to_u4(), v);
        }
    }

    #[test]
    fn predicates() {
        assert!(ResponseCode::NoError.is_success());
        assert!(ResponseCode::ServFail.is_servfail());
        assert!(!ResponseCode::NXDomain.is_servfail());
    }
}
