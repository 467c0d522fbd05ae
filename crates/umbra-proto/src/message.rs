//! Complete DNS messages.
//!
//! A message is the fixed header plus four sections. This type does not
//! interpret EDNS: an OPT pseudo-record parses like any other record and
//! stays in the additional section, which is sufficient for a forwarder
//! that never edits OPT payloads.

use crate::error::{Error, Result};
use crate::header::{Header, HEADER_SIZE};
use crate::question::Question;
use crate::rcode::ResponseCode;
use crate::record::ResourceRecord;
use bytes::{Bytes, BytesMut};
use std::fmt;

/// A parsed or constructed DNS message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    header: Header,
    questions: Vec<Question>,
    answers: Vec<ResourceRecord>,
    authority: Vec<ResourceRecord>,
    additional: Vec<ResourceRecord>,
}

impl Message {
    /// Creates an empty message with the given header.
    pub fn new(header: Header) -> Self {
        Self {
            header,
            questions: Vec::new(),
            answers: Vec::new(),
            authority: Vec::new(),
            additional: Vec::new(),
        }
    }

    /// Creates a recursion-desired query with a random id.
    pub fn query(question: Question) -> Self {
        let mut message = Self::new(Header::query());
        message.questions.push(question);
        message.header.qd_count = 1;
        message
    }

    /// Creates an empty response to a query: id and opcode copied, the
    /// question echoed back.
    pub fn response_from(query: &Message) -> Self {
        let mut message = Self::new(Header::response_from(&query.header));
        message.questions = query.questions.clone();
        message.header.qd_count = message.questions.len() as u16;
        message
    }

    /// Creates a SERVFAIL response to a query.
    pub fn servfail_for(query: &Message) -> Self {
        let mut message = Self::response_from(query);
        message.set_rcode(ResponseCode::ServFail);
        message
    }

    /// Returns the header.
    #[inline]
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Returns a mutable reference to the header.
    #[inline]
    pub fn header_mut(&mut self) -> &mut Header {
        &mut self.header
    }

    /// Returns the message id.
    #[inline]
    pub fn id(&self) -> u16 {
        self.header.id
    }

    /// Sets the message id.
    #[inline]
    pub fn set_id(&mut self, id: u16) {
        self.header.id = id;
    }

    /// Returns the response code.
    #[inline]
    pub fn rcode(&self) -> ResponseCode {
        self.header.rcode
    }

    /// Sets the response code.
    #[inline]
    pub fn set_rcode(&mut self, rcode: ResponseCode) {
        self.header.rcode = rcode;
    }

    /// Returns true if this is a SERVFAIL response.
    #[inline]
    pub fn is_servfail(&self) -> bool {
        self.header.rcode.is_servfail()
    }

    /// Returns the question section.
    #[inline]
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    /// Returns the first question, if any.
    #[inline]
    pub fn question(&self) -> Option<&Question> {
        self.questions.first()
    }

    /// Returns the answer section.
    #[inline]
    pub fn answers(&self) -> &[ResourceRecord] {
        &self.answers
    }

    /// Returns the authority section.
    #[inline]
    pub fn authority(&self) -> &[ResourceRecord] {
        &self.authority
    }

    /// Returns the additional section.
    #[inline]
    pub fn additional(&self) -> &[ResourceRecord] {
        &self.additional
    }

    /// Appends an answer record.
    pub fn add_answer(&mut self, record: ResourceRecord) {
        self.answers.push(record);
        self.header.an_count = self.answers.len() as u16;
    }

    /// Parses a message from its wire form.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let header = Header::parse(data)?;
        let mut offset = HEADER_SIZE;

        let mut questions = Vec::with_capacity(usize::from(header.qd_count.min(4)));
        for _ in 0..header.qd_count {
            let (question, consumed) = Question::parse(data, offset)?;
            offset += consumed;
            questions.push(question);
        }

        let answers = Self::parse_section(data, &mut offset, header.an_count)?;
        let authority = Self::parse_section(data, &mut offset, header.ns_count)?;
        let additional = Self::parse_section(data, &mut offset, header.ar_count)?;

        Ok(Self {
            header,
            questions,
            answers,
            authority,
            additional,
        })
    }

    fn parse_section(
        data: &[u8],
        offset: &mut usize,
        count: u16,
    ) -> Result<Vec<ResourceRecord>> {
        let mut records = Vec::with_capacity(usize::from(count.min(32)));
        for _ in 0..count {
            let (record, consumed) = ResourceRecord::parse(data, *offset)?;
            *offset += consumed;
            records.push(record);
        }
        Ok(records)
    }

    /// Returns the serialized length.
    pub fn wire_len(&self) -> usize {
        let mut len = HEADER_SIZE;
        len += self.questions.iter().map(Question::wire_len).sum::<usize>();
        len += self.answers.iter().map(ResourceRecord::wire_len).sum::<usize>();
        len += self.authority.iter().map(ResourceRecord::wire_len).sum::<usize>();
        len += self.additional.iter().map(ResourceRecord::wire_len).sum::<usize>();
        len
    }

    /// Appends the message to a buffer with up-to-date section counts.
    pub fn write_to(&self, buf: &mut BytesMut) {
        let mut header = self.header;
        header.qd_count = self.questions.len() as u16;
        header.an_count = self.answers.len() as u16;
        header.ns_count = self.authority.len() as u16;
        header.ar_count = self.additional.len() as u16;
        header.write_to(buf);

        for question in &self.questions {
            question.write_to(buf);
        }
        for record in &self.answers {
            record.write_to(buf);
        }
        for record in &self.authority {
            record.write_to(buf);
        }
        for record in &self.additional {
            record.write_to(buf);
        }
    }

    /// Serializes the message.
    pub fn to_wire(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.wire_len());
        self.write_to(&mut buf);
        buf.freeze()
    }

    /// Validates that the data at least holds a header, for cheap
    /// rejection before a full parse.
    pub fn sniff(data: &[u8]) -> Result<Header> {
        if data.len() < HEADER_SIZE {
            return Err(Error::eof(data.len()));
        }
        Header::parse(data)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, ";; {}", self.header)?;
        for q in &self.questions {
            writeln!(f, ";{}", q)?;
        }
        for r in &self.answers {
            writeln!(f, "{}", r)?;
        }
        for r in &self.authority {
            writeln!(f, "{}", r)?;
        }
        for r in &self.additional {
            writeln!(f, "{}", r)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::name::Name;
    use std::net::Ipv4Addr;
    use std::str::FromStr;

    fn example_query() -> Message {
        let mut query = Message::query(Question::a(Name::from_str("example.com").unwrap()));
        query.set_id(0x1234);
        query
    }

    #[test]
    fn query_roundtrip() {
        let query = example_query();
        let parsed = Message::parse(&query.to_wire()).unwrap();

        assert_eq!(parsed, query);
        assert!(parsed.header().is_query());
        assert_eq!(parsed.question().unwrap().qname.to_string(), "example.com.");
    }

    #[test]
    fn response_echoes_question_and_id() {
        let query = example_query();
        let mut response = Message::response_from(&query);
        response.add_answer(ResourceRecord::a(
            Name::from_str("example.com").unwrap(),
            60,
            Ipv4Addr::new(192, 0, 2, 1),
        ));

        let parsed = Message::parse(&response.to_wire()).unwrap();
        assert_eq!(parsed.id(), 0x1234);
        assert!(parsed.header().is_response());
        assert_eq!(parsed.questions().len(), 1);
        assert_eq!(parsed.answers().len(), 1);
        assert_eq!(parsed.answers()[0].rdata().as_a(), Some(Ipv4Addr::new(192, 0, 2, 1)));
    }

    #[test]
    fn servfail_response() {
        let query = example_query();
        let response = Message::servfail_for(&query);

        let parsed = Message::parse(&response.to_wire()).unwrap();
        assert!(parsed.is_servfail());
        assert_eq!(parsed.id(), query.id());
        assert!(parsed.answers().is_empty());
    }

    #[test]
    fn counts_are_recomputed_on_write() {
        let query = example_query();
        let mut response = Message::response_from(&query);
        for i in 0..3 {
            response.add_answer(ResourceRecord::a(
                Name::from_str("example.com").unwrap(),
                60,
                Ipv4Addr::new(192, 0, 2, i),
            ));
        }
        // Corrupt the stored count; the writer must fix it.
        response.header_mut().an_count = 0;

        let parsed = Message::parse(&response.to_wire()).unwrap();
        assert_eq!(parsed.answers().len(), 3);
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(Message::parse(&[0u8; 5]).is_err());

        // Valid header claiming a question that is not there.
        let mut header = Header::new(1);
        header.qd_count = 1;
        assert!(Message::parse(&header.to_wire()).is_err());
    }
}
