//! Record data.
//!
//! RDATA for the common record types is decoded; in particular, names
//! embedded in RDATA are decompressed at parse time so a record lifted
//! out of one message can be written into another. Types with no
//! decoder (including OPT, whose payload carries no names) are kept as
//! raw bytes and written back verbatim.

use crate::error::{Error, Result};
use crate::name::Name;
use crate::rtype::{RecordType, Type};
use bytes::BytesMut;
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

/// Decoded record data.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RData {
    /// IPv4 address.
    A(Ipv4Addr),
    /// IPv6 address.
    Aaaa(Ipv6Addr),
    /// Canonical name.
    Cname(Name),
    /// Name server.
    Ns(Name),
    /// Pointer (reverse lookups).
    Ptr(Name),
    /// Mail exchange.
    Mx {
        /// Preference, lower wins.
        preference: u16,
        /// Exchange host.
        exchange: Name,
    },
    /// Start of authority.
    Soa {
        /// Primary name server.
        mname: Name,
        /// Responsible mailbox.
        rname: Name,
        /// Zone serial.
        serial: u32,
        /// Refresh interval, seconds.
        refresh: u32,
        /// Retry interval, seconds.
        retry: u32,
        /// Expire limit, seconds.
        expire: u32,
        /// Minimum / negative TTL, seconds.
        minimum: u32,
    },
    /// Service location.
    Srv {
        /// Priority, lower wins.
        priority: u16,
        /// Weight among equal priorities.
        weight: u16,
        /// Target port.
        port: u16,
        /// Target host.
        target: Name,
    },
    /// Text record, raw character-string data.
    Txt(Vec<u8>),
    /// Anything else, carried verbatim.
    Unknown(Vec<u8>),
}

impl RData {
    /// Decodes RDATA of the given type.
    ///
    /// `message` is the whole message (for compression pointers); the
    /// RDATA itself is `message[start..start + rdlength]`.
    pub fn parse(rtype: Type, message: &[u8], start: usize, rdlength: usize) -> Result<Self> {
        let end = start + rdlength;
        let data = message.get(start..end).ok_or_else(|| Error::eof(end))?;

        let Some(known) = rtype.as_known() else {
            return Ok(Self::Unknown(data.to_vec()));
        };

        match known {
            RecordType::A => {
                if data.len() != 4 {
                    return Err(Error::BadRDataLength {
                        rtype: "A",
                        expected: 4,
                        actual: data.len(),
                    });
                }
                let octets: [u8; 4] = data.try_into().expect("length checked");
                Ok(Self::A(Ipv4Addr::from(octets)))
            }
            RecordType::AAAA => {
                if data.len() != 16 {
                    return Err(Error::BadRDataLength {
                        rtype: "AAAA",
                        expected: 16,
                        actual: data.len(),
                    });
                }
                let octets: [u8; 16] = data.try_into().expect("length checked");
                Ok(Self::Aaaa(Ipv6Addr::from(octets)))
            }
            RecordType::CNAME => Ok(Self::Cname(Name::parse(message, start)?.0)),
            RecordType::NS => Ok(Self::Ns(Name::parse(message, start)?.0)),
            RecordType::PTR => Ok(Self::Ptr(Name::parse(message, start)?.0)),
            RecordType::MX => {
                if data.len() < 3 {
                    return Err(Error::eof(end));
                }
                let preference = u16::from_be_bytes([data[0], data[1]]);
                let (exchange, _) = Name::parse(message, start + 2)?;
                Ok(Self::Mx {
                    preference,
                    exchange,
                })
            }
            RecordType::SOA => {
                let (mname, mname_len) = Name::parse(message, start)?;
                let (rname, rname_len) = Name::parse(message, start + mname_len)?;

                let fixed = start + mname_len + rname_len;
                let tail = message
                    .get(fixed..fixed + 20)
                    .ok_or_else(|| Error::eof(fixed + 20))?;
                let field =
                    |i: usize| u32::from_be_bytes([tail[i], tail[i + 1], tail[i + 2], tail[i + 3]]);

                Ok(Self::Soa {
                    mname,
                    rname,
                    serial: field(0),
                    refresh: field(4),
                    retry: field(8),
                    expire: field(12),
                    minimum: field(16),
                })
            }
            RecordType::SRV => {
                if data.len() < 7 {
                    return Err(Error::eof(end));
                }
                let (target, _) = Name::parse(message, start + 6)?;
                Ok(Self::Srv {
                    priority: u16::from_be_bytes([data[0], data[1]]),
                    weight: u16::from_be_bytes([data[2], data[3]]),
                    port: u16::from_be_bytes([data[4], data[5]]),
                    target,
                })
            }
            RecordType::TXT => Ok(Self::Txt(data.to_vec())),
            _ => Ok(Self::Unknown(data.to_vec())),
        }
    }

    /// Returns the serialized length.
    pub fn wire_len(&self) -> usize {
        match self {
            Self::A(_) => 4,
            Self::Aaaa(_) => 16,
            Self::Cname(n) | Self::Ns(n) | Self::Ptr(n) => n.wire_len(),
            Self::Mx { exchange, .. } => 2 + exchange.wire_len(),
            Self::Soa { mname, rname, .. } => mname.wire_len() + rname.wire_len() + 20,
            Self::Srv { target, .. } => 6 + target.wire_len(),
            Self::Txt(data) | Self::Unknown(data) => data.len(),
        }
    }

    /// Appends the RDATA to a buffer, uncompressed.
    pub fn write_to(&self, buf: &mut BytesMut) {
        match self {
            Self::A(addr) => buf.extend_from_slice(&addr.octets()),
            Self::Aaaa(addr) => buf.extend_from_slice(&addr.octets()),
            Self::Cname(n) | Self::Ns(n) | Self::Ptr(n) => n.write_to(buf),
            Self::Mx {
                preference,
                exchange,
            } => {
                buf.extend_from_slice(&preference.to_be_bytes());
                exchange.write_to(buf);
            }
            Self::Soa {
                mname,
                rname,
                serial,
                refresh,
                retry,
                expire,
                minimum,
            } => {
                mname.write_to(buf);
                rname.write_to(buf);
                buf.extend_from_slice(&serial.to_be_bytes());
                buf.extend_from_slice(&refresh.to_be_bytes());
                buf.extend_from_slice(&retry.to_be_bytes());
                buf.extend_from_slice(&expire.to_be_bytes());
                buf.extend_from_slice(&minimum.to_be_bytes());
            }
            Self::Srv {
                priority,
                weight,
                port,
                target,
            } => {
                buf.extend_from_slice(&priority.to_be_bytes());
                buf.extend_from_slice(&weight.to_be_bytes());
                buf.extend_from_slice(&port.to_be_bytes());
                target.write_to(buf);
            }
            Self::Txt(data) | Self::Unknown(data) => buf.extend_from_slice(data),
        }
    }

    /// Returns the IPv4 address for an A record.
    #[inline]
    pub fn as_a(&self) -> Option<Ipv4Addr> {
        match self {
            Self::A(addr) => Some(*addr),
            _ => None,
        }
    }

    /// Returns the IPv6 address for an AAAA record.
    #[inline]
    pub fn as_aaaa(&self) -> Option<Ipv6Addr> {
        match self {
            Self::Aaaa(addr) => Some(*addr),
            _ => None,
        }
    }
}

impl fmt::Display for RData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::A(addr) => write!(f, "{}", addr),
            Self::Aaaa(addr) => write!(f, "{}", addr),
            Self::Cname(n) | Self::Ns(n) | Self::Ptr(n) => write!(f, "{}", n),
            Self::Mx {
                preference,
                exchange,
            } => write!(f, "{} {}", preference, exchange),
            Self::Soa { mname, serial, .. } => write!(f, "{} {}", mname, serial),
            Self::Srv { port, target, .. } => write!(f, "{}:{}", target, port),
            Self::Txt(data) => write!(f, "{} bytes", data.len()),
            Self::Unknown(data) => write!(f, "\\# {}", data.len()),
        }
    }
}
