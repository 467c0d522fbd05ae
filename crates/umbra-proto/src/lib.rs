//! # Umbra DNS wire format
//!
//! Parsing and serialization for the subset of DNS that a blocking
//! forwarder needs: the fixed header, questions, and resource records
//! with decoded RDATA for the common types. Names are parsed with full
//! compression-pointer support; records of types we do not interpret
//! (including OPT) are carried as opaque RDATA so that forwarded
//! messages round-trip.
//!
//! Nothing here performs I/O; the listener and resolver crates feed
//! byte slices in and take [`bytes::Bytes`] out.

pub mod class;
pub mod error;
pub mod header;
pub mod message;
pub mod name;
pub mod question;
pub mod rcode;
pub mod rdata;
pub mod record;
pub mod rtype;

pub use class::{Class, RecordClass};
pub use error::{Error, Result};
pub use header::{Header, HeaderFlags, HEADER_SIZE};
pub use message::Message;
pub use name::Name;
pub use question::Question;
pub use rcode::ResponseCode;
pub use rdata::RData;
pub use record::ResourceRecord;
pub use rtype::{RecordType, Type};

/// Maximum length of a single label in bytes.
pub const MAX_LABEL_LENGTH: usize = 63;

/// Maximum length of a name in wire format, including length bytes and
/// the root label.
pub const MAX_NAME_LENGTH: usize = 255;

/// Maximum size of a DNS message we are willing to handle.
pub const MAX_MESSAGE_SIZE: usize = 65535;
