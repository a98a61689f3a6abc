// Copyright 2024 the verity developers.
//
// Licensed under the Apache License, Version 2.0 (the "License"); you
// may not use this file except in compliance with the License. You may
// obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or
// implied. See the License for the specific language governing
// permissions and limitations under the License.

//! Implementation of the [`Writer`] type to write on-the-wire DNS
//! messages.

use std::fmt;

use super::constants::*;
use super::{Opcode, Question, Rcode};
use crate::class::Class;
use crate::name::Name;
use crate::rr::{Ttl, Type};

////////////////////////////////////////////////////////////////////////
// WRITER                                                             //
////////////////////////////////////////////////////////////////////////

/// A "frame" around a buffer that serializes a DNS message into it.
///
/// A `Writer` is constructed using [`Writer::new`] (to set a message
/// size limit smaller than the underlying buffer size) or with its
/// [`TryFrom`] implementation (which sets the message size limit equal
/// to the buffer length). The underlying buffer and message size limit
/// must be long enough to accommodate a full DNS message header of 12
/// octets. The message header is initially zeroed.
///
/// Since header information is in a fixed position, it can be written
/// at any time through the appropriate `Writer` methods. Questions and
/// resource records are written sequentially into the buffer based on a
/// cursor, using [`Writer::add_question`] and [`Writer::add_answer`].
/// Questions must be added before answers; attempts to use these
/// methods out of order fail with [`Error::OutOfOrder`].
///
/// Domain names are always written in uncompressed form. The QDCOUNT
/// and ANCOUNT header fields are filled in when [`Writer::finish`] is
/// called.
pub struct Writer<'a> {
    octets: &'a mut [u8],
    cursor: usize,
    limit: usize,
    section: Section,
    qdcount: u16,
    ancount: u16,
}

/// A type for recording which section of a DNS message a [`Writer`] is
/// currently serializing.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Section {
    Question,
    Answer,
}

impl<'a> Writer<'a> {
    /// Creates a new `Writer` from the underlying buffer `octets`. The
    /// message size is limited to `limit` or `octets.len()` (whichever
    /// is smaller). If the smaller limit is too small to hold a full
    /// DNS message header of 12 octets, then this will fail.
    pub fn new(octets: &'a mut [u8], limit: usize) -> Result<Self> {
        let limit = limit.min(octets.len());
        if limit < HEADER_SIZE {
            Err(Error::Truncation)
        } else {
            octets[0..HEADER_SIZE].fill(0);
            Ok(Self {
                octets,
                cursor: HEADER_SIZE,
                limit,
                section: Section::Question,
                qdcount: 0,
                ancount: 0,
            })
        }
    }

    /// Returns the current 16-bit ID of the message.
    pub fn id(&self) -> u16 {
        u16::from_be_bytes(self.octets[ID_START..ID_END].try_into().unwrap())
    }

    /// Sets the 16-bit ID of the message.
    pub fn set_id(&mut self, id: u16) {
        self.write_u16(ID_START, id);
    }

    /// Returns the current value of the QR (query response) bit.
    pub fn qr(&self) -> bool {
        (self.octets[QR_BYTE] & QR_MASK) != 0
    }

    /// Sets or clears the QR (query response) bit.
    pub fn set_qr(&mut self, qr: bool) {
        if qr {
            self.octets[QR_BYTE] |= QR_MASK;
        } else {
            self.octets[QR_BYTE] &= !QR_MASK;
        }
    }

    /// Returns the message's current opcode.
    pub fn opcode(&self) -> Opcode {
        let raw = (self.octets[OPCODE_BYTE] & OPCODE_MASK) >> OPCODE_SHIFT;
        raw.try_into().unwrap()
    }

    /// Sets the message's opcode.
    pub fn set_opcode(&mut self, opcode: Opcode) {
        self.octets[OPCODE_BYTE] &= !OPCODE_MASK;
        self.octets[OPCODE_BYTE] |= u8::from(opcode) << OPCODE_SHIFT;
    }

    /// Returns the current value of the AA (authoritative answer) bit.
    pub fn aa(&self) -> bool {
        (self.octets[AA_BYTE] & AA_MASK) != 0
    }

    /// Sets or clears the AA (authoritative answer) bit.
    pub fn set_aa(&mut self, aa: bool) {
        if aa {
            self.octets[AA_BYTE] |= AA_MASK;
        } else {
            self.octets[AA_BYTE] &= !AA_MASK;
        }
    }

    /// Returns the current value of the TC (truncation) bit.
    pub fn tc(&self) -> bool {
        (self.octets[TC_BYTE] & TC_MASK) != 0
    }

    /// Sets or clears the TC (truncation) bit.
    pub fn set_tc(&mut self, tc: bool) {
        if tc {
            self.octets[TC_BYTE] |= TC_MASK;
        } else {
            self.octets[TC_BYTE] &= !TC_MASK;
        }
    }

    /// Returns the message's current RCODE.
    pub fn rcode(&self) -> Rcode {
        let raw = self.octets[RCODE_BYTE] & RCODE_MASK;
        raw.try_into().unwrap()
    }

    /// Sets the message's RCODE.
    pub fn set_rcode(&mut self, rcode: Rcode) {
        self.octets[RCODE_BYTE] &= !RCODE_MASK;
        self.octets[RCODE_BYTE] |= u8::from(rcode);
    }

    /// Returns the current number of questions in the message.
    pub fn qdcount(&self) -> u16 {
        self.qdcount
    }

    /// Returns the current number of answer RRs in the message.
    pub fn ancount(&self) -> u16 {
        self.ancount
    }

    /// Adds a question to the message. This must be used before any
    /// resource records are added.
    ///
    /// This method is atomic, in that the cursor is not changed on
    /// failure.
    pub fn add_question(&mut self, question: &Question) -> Result<()> {
        if self.section != Section::Question {
            Err(Error::OutOfOrder)
        } else if let Some(new_qdcount) = self.qdcount.checked_add(1) {
            self.with_rollback(|this| {
                this.try_push(question.qname.wire_repr())?;
                this.try_push_u16(question.qtype.into())?;
                this.try_push_u16(question.qclass.into())
            })?;
            self.qdcount = new_qdcount;
            Ok(())
        } else {
            Err(Error::CountOverflow)
        }
    }

    /// Adds a resource record to the answer section of the message.
    /// This must be used after any questions are added. The RDATA is
    /// written exactly as provided.
    ///
    /// This method is atomic, in that the cursor is not changed on
    /// failure.
    pub fn add_answer(
        &mut self,
        owner: &Name,
        rr_type: Type,
        class: Class,
        ttl: Ttl,
        rdata: &[u8],
    ) -> Result<()> {
        if rdata.len() > u16::MAX as usize {
            Err(Error::RdataTooLong)
        } else if let Some(new_ancount) = self.ancount.checked_add(1) {
            self.with_rollback(|this| {
                this.section = Section::Answer;
                this.try_push(owner.wire_repr())?;
                this.try_push_u16(rr_type.into())?;
                this.try_push_u16(class.into())?;
                this.try_push_u32(ttl.into())?;
                this.try_push_u16(rdata.len() as u16)?;
                this.try_push(rdata)
            })?;
            self.ancount = new_ancount;
            Ok(())
        } else {
            Err(Error::CountOverflow)
        }
    }

    /// Finishes writing the message, filling in the header's count
    /// fields. The final length of the message is returned.
    pub fn finish(mut self) -> usize {
        self.write_u16(QDCOUNT_START, self.qdcount);
        self.write_u16(ANCOUNT_START, self.ancount);
        self.write_u16(NSCOUNT_START, 0);
        self.write_u16(ARCOUNT_START, 0);
        self.cursor
    }

    /// Executes `f(self)`, returning the result and rolling back the
    /// section and cursor to the current values first if the result is
    /// an error.
    fn with_rollback<F, T>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        let saved_section = self.section;
        let saved_cursor = self.cursor;
        let result = f(self);
        if result.is_err() {
            self.section = saved_section;
            self.cursor = saved_cursor;
        }
        result
    }

    /// Tries to write `data` to the underlying buffer at the current
    /// cursor, failing if there is not sufficient space.
    fn try_push(&mut self, data: &[u8]) -> Result<()> {
        if self.limit - self.cursor >= data.len() {
            self.write(self.cursor, data);
            self.cursor += data.len();
            Ok(())
        } else {
            Err(Error::Truncation)
        }
    }

    /// Tries to write `data` in network byte order to the underlying
    /// buffer, failing if there is not sufficient space.
    fn try_push_u16(&mut self, data: u16) -> Result<()> {
        self.try_push(&data.to_be_bytes())
    }

    /// Tries to write `data` in network byte order to the underlying
    /// buffer, failing if there is not sufficient space.
    fn try_push_u32(&mut self, data: u32) -> Result<()> {
        self.try_push(&data.to_be_bytes())
    }

    /// Writes `data` to the underlying buffer at `position`. Note that
    /// this performs no bounds checking.
    fn write(&mut self, position: usize, data: &[u8]) {
        self.octets[position..position + data.len()].copy_from_slice(data);
    }

    /// Writes `data` in network byte order to the underlying buffer at
    /// `position`. Note that this performs no bounds checking.
    fn write_u16(&mut self, position: usize, data: u16) {
        self.write(position, &data.to_be_bytes());
    }
}

impl<'a> TryFrom<&'a mut [u8]> for Writer<'a> {
    type Error = Error;

    fn try_from(octets: &'a mut [u8]) -> Result<Self> {
        Self::new(octets, octets.len())
    }
}

////////////////////////////////////////////////////////////////////////
// ERRORS                                                             //
////////////////////////////////////////////////////////////////////////

/// An error signaling that a [`Writer`] operation could not be
/// performed.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Error {
    /// Adding the question or resource record would overflow the
    /// corresponding 16-bit counter in the DNS header.
    CountOverflow,

    /// There is not enough room left in the buffer.
    Truncation,

    /// An attempt was made to serialize a question or resource record
    /// in the wrong place in the message (e.g., adding a question after
    /// an answer resource record has already been serialized).
    OutOfOrder,

    /// The provided RDATA does not fit in the 16-bit RDLENGTH field.
    RdataTooLong,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Self::CountOverflow => f.write_str("record count would overflow"),
            Self::Truncation => f.write_str("message would be truncated"),
            Self::OutOfOrder => f.write_str("question or record serialized out of order"),
            Self::RdataTooLong => f.write_str("RDATA too long"),
        }
    }
}

impl std::error::Error for Error {}

/// The type returned by fallible [`Writer`] methods.
pub type Result<T> = std::result::Result<T, Error>;

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::super::{Qclass, Qtype};
    use super::*;

    fn example_question() -> Question {
        Question {
            qname: "example.com.".parse().unwrap(),
            qtype: Qtype::from(Type::A),
            qclass: Qclass::from(Class::IN),
        }
    }

    #[test]
    fn writer_produces_expected_octets() {
        let question = example_question();
        let mut buf = [0xffu8; 512];
        let mut writer = Writer::try_from(buf.as_mut_slice()).unwrap();
        writer.set_id(0x0703);
        writer.set_qr(true);
        writer.set_opcode(Opcode::Query);
        writer.set_aa(true);
        writer.set_rcode(Rcode::NoError);
        writer.add_question(&question).unwrap();
        writer
            .add_answer(
                &question.qname,
                Type::A,
                Class::IN,
                Ttl::from(3600),
                b"\x7f\x00\x00\x01",
            )
            .unwrap();
        let len = writer.finish();
        assert_eq!(
            &buf[0..len],
            b"\x07\x03\x84\x00\x00\x01\x00\x01\x00\x00\x00\x00\
              \x07example\x03com\x00\x00\x01\x00\x01\
              \x07example\x03com\x00\x00\x01\x00\x01\x00\x00\x0e\x10\x00\x04\x7f\x00\x00\x01"
                .as_slice()
        );
    }

    #[test]
    fn writer_rejects_short_buffers() {
        let mut buf = [0u8; HEADER_SIZE - 1];
        assert!(matches!(
            Writer::try_from(buf.as_mut_slice()),
            Err(Error::Truncation)
        ));
    }

    #[test]
    fn add_question_fails_when_out_of_order() {
        let question = example_question();
        let mut buf = [0u8; 512];
        let mut writer = Writer::try_from(buf.as_mut_slice()).unwrap();
        writer.add_question(&question).unwrap();
        writer
            .add_answer(
                &question.qname,
                Type::A,
                Class::IN,
                Ttl::from(3600),
                b"\x7f\x00\x00\x01",
            )
            .unwrap();
        assert_eq!(writer.add_question(&question), Err(Error::OutOfOrder));
    }

    #[test]
    fn add_answer_rolls_back_on_truncation() {
        let question = example_question();
        let mut buf = [0u8; 512];
        // Room for the header and the question, but not the answer.
        let mut writer = Writer::new(buf.as_mut_slice(), HEADER_SIZE + 17).unwrap();
        writer.add_question(&question).unwrap();
        let result = writer.add_answer(
            &question.qname,
            Type::A,
            Class::IN,
            Ttl::from(3600),
            b"\x7f\x00\x00\x01",
        );
        assert_eq!(result, Err(Error::Truncation));
        assert_eq!(writer.ancount(), 0);
        let len = writer.finish();
        assert_eq!(len, HEADER_SIZE + 17);
        assert_eq!(&buf[ANCOUNT_START..ANCOUNT_END], b"\x00\x00");
    }
}
