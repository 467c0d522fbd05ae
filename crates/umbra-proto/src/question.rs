//! The DNS question section.

use crate::class::{Class, RecordClass};
use crate::error::Result;
use crate::name::Name;
use crate::rtype::{RecordType, Type};
use bytes::BytesMut;
use std::fmt;

/// A single question: name, type, class.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Question {
    /// The name being queried.
    pub qname: Name,
    /// The requested record type.
    pub qtype: Type,
    /// The query class (almost always IN).
    pub qclass: Class,
}

impl Question {
    /// Creates a question for a known type and class.
    pub fn new(qname: Name, qtype: RecordType, qclass: RecordClass) -> Self {
        Self {
            qname,
            qtype: Type::Known(qtype),
            qclass: Class::Known(qclass),
        }
    }

    /// Creates an A/IN question.
    pub fn a(qname: Name) -> Self {
        Self::new(qname, RecordType::A, RecordClass::IN)
    }

    /// Creates an AAAA/IN question.
    pub fn aaaa(qname: Name) -> Self {
        Self::new(qname, RecordType::AAAA, RecordClass::IN)
    }

    /// Returns true if this asks for an address record (A or AAAA).
    #[inline]
    pub fn is_address_query(&self) -> bool {
        self.qtype.is_address()
    }

    /// Parses a question at `offset`, returning it and the bytes consumed.
    pub fn parse(message: &[u8], offset: usize) -> Result<(Self, usize)> {
        let (qname, name_len) = Name::parse(message, offset)?;

        let fixed = offset + name_len;
        let bytes = message
            .get(fixed..fixed + 4)
            .ok_or_else(|| crate::error::Error::eof(fixed + 4))?;

        Ok((
            Self {
                qname,
                qtype: Type::from_u16(u16::from_be_bytes([bytes[0], bytes[1]])),
                qclass: Class::from_u16(u16::from_be_bytes([bytes[2], bytes[3]])),
            },
            name_len + 4,
        ))
    }

    /// Returns the serialized length.
    pub fn wire_len(&self) -> usize {
        self.qname.wire_len() + 4
    }

    /// Appends the question to a buffer.
    pub fn write_to(&self, buf: &mut BytesMut) {
        self.qname.write_to(buf);
        buf.extend_from_slice(&self.qtype.to_u16().to_be_bytes());
        buf.extend_from_slice(&self.qclass.to_u16().to_be_bytes());
    }
}

impl fmt::Display for Question {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.qname, self.qclass, self.qtype)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn wire_roundtrip() {
        let question = Question::aaaa(Name::from_str("www.example.com").unwrap());

        let mut buf = BytesMut::new();
        question.write_to(&mut buf);

        let (parsed, consumed) = Question::parse(&buf, 0).unwrap();
        assert_eq!(consumed, buf.len());
        assert_eq!(parsed, question);
    }

    #[test]
    fn address_query_predicate() {
        let name = Name::from_str("example.com").unwrap();
        assert!(Question::a(name.clone()).is_address_query());
        assert!(Question::aaaa(name.clone()).is_address_query());
        assert!(!Question::new(name, RecordType::TXT, RecordClass::IN).is_address_query());
    }

    #[test]
    fn truncated_question_is_rejected() {
        let name = Name::from_str("example.com").unwrap();
        let mut buf = BytesMut::new();
        name.write_to(&mut buf);
        buf.extend_from_slice(&[0, 1]); // type only, class missing

        assert!(Question::parse(&buf, 0).is_err());
    }
}
