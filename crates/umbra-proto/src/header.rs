//! The fixed DNS message header.
//!
//! # Wire Format
//!
//! ```text
//!                                 1  1  1  1  1  1
//!   0  1  2  3  4  5  6  7  8  9  0  1  2  3  4  5
//! +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
//! |                      ID                       |
//! +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
//! |QR|   Opcode  |AA|TC|RD|RA| Z|AD|CD|   RCODE   |
//! +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
//! |                    QDCOUNT                    |
//! +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
//! |                    ANCOUNT                    |
//! +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
//! |                    NSCOUNT                    |
//! +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
//! |                    ARCOUNT                    |
//! +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
//! ```

use crate::error::{Error, Result};
use crate::rcode::ResponseCode;
use bitflags::bitflags;
use bytes::BytesMut;
use std::fmt;

/// Size of the fixed header in bytes.
pub const HEADER_SIZE: usize = 12;

bitflags! {
    /// The single-bit header flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct HeaderFlags: u16 {
        /// Query (0) / response (1).
        const QR = 0x8000;
        /// Authoritative answer.
        const AA = 0x0400;
        /// Truncated message.
        const TC = 0x0200;
        /// Recursion desired.
        const RD = 0x0100;
        /// Recursion available.
        const RA = 0x0080;
        /// Reserved, must be zero.
        const Z = 0x0040;
        /// Authentic data (DNSSEC).
        const AD = 0x0020;
        /// Checking disabled (DNSSEC).
        const CD = 0x0010;
    }
}

/// A parsed DNS header.
///
/// The opcode is kept as its raw 4-bit value: this server forwards
/// whatever opcode a client sends, so there is nothing to gain from an
/// enum that could reject one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Message identifier.
    pub id: u16,
    /// Single-bit flags.
    pub flags: HeaderFlags,
    /// Raw 4-bit opcode.
    pub opcode: u8,
    /// Response code.
    pub rcode: ResponseCode,
    /// Question count.
    pub qd_count: u16,
    /// Answer count.
    pub an_count: u16,
    /// Authority count.
    pub ns_count: u16,
    /// Additional count.
    pub ar_count: u16,
}

impl Header {
    /// Creates an empty header with the given id.
    pub const fn new(id: u16) -> Self {
        Self {
            id,
            flags: HeaderFlags::empty(),
            opcode: 0,
            rcode: ResponseCode::NoError,
            qd_count: 0,
            an_count: 0,
            ns_count: 0,
            ar_count: 0,
        }
    }

    /// Creates a recursion-desired query header with a random id.
    pub fn query() -> Self {
        Self {
            id: rand::random(),
            flags: HeaderFlags::RD,
            ..Self::new(0)
        }
    }

    /// Creates a response header for a query: same id and opcode, QR
    /// set, RD copied through.
    pub fn response_from(query: &Header) -> Self {
        Self {
            id: query.id,
            flags: HeaderFlags::QR | (query.flags & HeaderFlags::RD),
            opcode: query.opcode,
            rcode: ResponseCode::NoError,
            qd_count: 0,
            an_count: 0,
            ns_count: 0,
            ar_count: 0,
        }
    }

    /// Returns true if the QR bit is clear.
    #[inline]
    pub fn is_query(&self) -> bool {
        !self.flags.contains(HeaderFlags::QR)
    }

    /// Returns true if the QR bit is set.
    #[inline]
    pub fn is_response(&self) -> bool {
        self.flags.contains(HeaderFlags::QR)
    }

    /// Returns true if the TC bit is set.
    #[inline]
    pub fn is_truncated(&self) -> bool {
        self.flags.contains(HeaderFlags::TC)
    }

    /// Parses a header from the start of a message.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_SIZE {
            return Err(Error::eof(data.len()));
        }

        let id = u16::from_be_bytes([data[0], data[1]]);
        let raw = u16::from_be_bytes([data[2], data[3]]);

        Ok(Self {
            id,
            flags: HeaderFlags::from_bits_truncate(raw),
            opcode: ((raw >> 11) & 0x0F) as u8,
            rcode: ResponseCode::from_u4((raw & 0x0F) as u8),
            qd_count: u16::from_be_bytes([data[4], data[5]]),
            an_count: u16::from_be_bytes([data[6], data[7]]),
            ns_count: u16::from_be_bytes([data[8], data[9]]),
            ar_count: u16::from_be_bytes([data[10], data[11]]),
        })
    }

    /// Serializes the header.
    pub fn to_wire(&self) -> [u8; HEADER_SIZE] {
        let raw = self.flags.bits()
            | (u16::from(self.opcode & 0x0F) << 11)
            | u16::from(self.rcode.to_u4());

        let mut buf = [0u8; HEADER_SIZE];
        buf[0..2].copy_from_slice(&self.id.to_be_bytes());
        buf[2..4].copy_from_slice(&raw.to_be_bytes());
        buf[4..6].copy_from_slice(&self.qd_count.to_be_bytes());
        buf[6..8].copy_from_slice(&self.an_count.to_be_bytes());
        buf[8..10].copy_from_slice(&self.ns_count.to_be_bytes());
        buf[10..12].copy_from_slice(&self.ar_count.to_be_bytes());
        buf
    }

    /// Appends the header to a buffer.
    pub fn write_to(&self, buf: &mut BytesMut) {
        buf.extend_from_slice(&self.to_wire());
    }
}

impl Default for Header {
    fn default() -> Self {
        Self::new(0)
    }
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "id:{:04x} {} opcode:{} {} qd:{} an:{} ns:{} ar:{}",
            self.id,
            if self.is_query() { "query" } else { "response" },
            self.opcode,
            self.rcode,
            self.qd_count,
            self.an_count,
            self.ns_count,
            self.ar_count,
        )
    }
}
