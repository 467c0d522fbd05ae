//! DNS resource records.
//!
//! # Wire Format
//!
//! ```text
//! /                      NAME                     /
//! +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
//! |                      TYPE                     |
//! +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
//! |                     CLASS                     |
//! +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
//! |                      TTL                      |
//! |                                               |
//! +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
//! |                   RDLENGTH                    |
//! +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
//! /                     RDATA                     /
//! +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
//! ```

use crate::class::{Class, RecordClass};
use crate::error::{Error, Result};
use crate::name::Name;
use crate::rdata::RData;
use crate::rtype::{RecordType, Type};
use bytes::BytesMut;
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

/// A single resource record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceRecord {
    name: Name,
    rtype: Type,
    rclass: Class,
    ttl: u32,
    rdata: RData,
}

impl ResourceRecord {
    /// Creates a record from its parts.
    pub fn new(name: Name, rtype: Type, rclass: Class, ttl: u32, rdata: RData) -> Self {
        Self {
            name,
            rtype,
            rclass,
            ttl,
            rdata,
        }
    }

    /// Creates an A/IN record.
    pub fn a(name: Name, ttl: u32, addr: Ipv4Addr) -> Self {
        Self::new(
            name,
            Type::Known(RecordType::A),
            Class::Known(RecordClass::IN),
            ttl,
            RData::A(addr),
        )
    }

    /// Creates an AAAA/IN record.
    pub fn aaaa(name: Name, ttl: u32, addr: Ipv6Addr) -> Self {
        Self::new(
            name,
            Type::Known(RecordType::AAAA),
            Class::Known(RecordClass::IN),
            ttl,
            RData::Aaaa(addr),
        )
    }

    /// Returns the owner name.
    #[inline]
    pub fn name(&self) -> &Name {
        &self.name
    }

    /// Returns the record type.
    #[inline]
    pub fn rtype(&self) -> Type {
        self.rtype
    }

    /// Returns the record class.
    #[inline]
    pub fn rclass(&self) -> Class {
        self.rclass
    }

    /// Returns the TTL in seconds.
    #[inline]
    pub const fn ttl(&self) -> u32 {
        self.ttl
    }

    /// Returns the record data.
    #[inline]
    pub fn rdata(&self) -> &RData {
        &self.rdata
    }

    /// Returns a copy with a different TTL.
    #[must_use]
    pub fn with_ttl(&self, ttl: u32) -> Self {
        let mut copy = self.clone();
        copy.ttl = ttl;
        copy
    }

    /// Parses a record at `offset`, returning it and the bytes consumed.
    pub fn parse(message: &[u8], offset: usize) -> Result<(Self, usize)> {
        let (name, name_len) = Name::parse(message, offset)?;

        let fixed = offset + name_len;
        let bytes = message
            .get(fixed..fixed + 10)
            .ok_or_else(|| Error::eof(fixed + 10))?;

        let rtype = Type::from_u16(u16::from_be_bytes([bytes[0], bytes[1]]));
        let rclass = Class::from_u16(u16::from_be_bytes([bytes[2], bytes[3]]));
        let ttl = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        let rdlength = usize::from(u16::from_be_bytes([bytes[8], bytes[9]]));

        let rdata = RData::parse(rtype, message, fixed + 10, rdlength)?;

        Ok((
            Self {
                name,
                rtype,
                rclass,
                ttl,
                rdata,
            },
            name_len + 10 + rdlength,
        ))
    }

    /// Returns the serialized length.
    pub fn wire_len(&self) -> usize {
        self.name.wire_len() + 10 + self.rdata.wire_len()
    }

    /// Appends the record to a buffer.
    pub fn write_to(&self, buf: &mut BytesMut) {
        self.name.write_to(buf);
        buf.extend_from_slice(&self.rtype.to_u16().to_be_bytes());
        buf.extend_from_slice(&self.rclass.to_u16().to_be_bytes());
        buf.extend_from_slice(&self.ttl.to_be_bytes());
        buf.extend_from_slice(&(self.rdata.wire_len() as u16).to_be_bytes());
        self.rdata.write_to(buf);
    }
}

impl fmt::Display for ResourceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {}",
            self.name, self.ttl, self.rclass, self.rtype, self.rdata
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn a_record_roundtrip() {
        let record = ResourceRecord::a(
            Name::from_str("example.com").unwrap(),
            300,
            Ipv4Addr::new(192, 0, 2, 1),
        );

        let mut buf = BytesMut::new();
        record.write_to(&mut buf);
        assert_eq!(buf.len(), record.wire_len());

        let (parsed, consumed) = ResourceRecord::parse(&buf, 0).unwrap();
        assert_eq!(consumed, buf.len());
        assert_eq!(parsed, record);
    }

    #[test]
    fn ttl_adjustment() {
        let record = ResourceRecord::aaaa(
            Name::from_str("example.com").unwrap(),
            300,
            Ipv6Addr::LOCALHOST,
        );
        assert_eq!(record.with_ttl(10).ttl(), 10);
        assert_eq!(record.ttl(), 300);
    }

    #[test]
    fn unknown_type_roundtrip() {
        let record = ResourceRecord::new(
            Name::from_str("example.com").unwrap(),
            Type::Unknown(4711),
            Class::Known(RecordClass::IN),
            60,
            RData::Unknown(vec![1, 2, 3]),
        );

        let mut buf = BytesMut::new();
        record.write_to(&mut buf);

        let (parsed, _) = ResourceRecord::parse(&buf, 0).unwrap();
        assert_eq!(parsed, record);
    }

    #[test]
    fn truncated_rdata_is_rejected() {
        let record = ResourceRecord::a(
            Name::from_str("example.com").unwrap(),
            300,
            Ipv4Addr::new(192, 0, 2, 1),
        );
        let mut buf = BytesMut::new();
        record.write_to(&mut buf);
        let short = &buf[..buf.len() - 2];

        assert!(ResourceRecord::parse(short, 0).is_err());
    }
}
