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

//! The processing logic of the DNS responder.
//!
//! The [`Server`] structure is the heart of this module; see its
//! documentation for details.

use std::sync::{Arc, RwLock};

use log::debug;

use crate::message::{writer, Rcode, Reader, Writer};
use crate::store::RecordStore;

/// The maximum size of a UDP DNS message, without EDNS (which this
/// server does not speak).
pub const MAX_UDP_PAYLOAD: usize = 512;

////////////////////////////////////////////////////////////////////////
// SERVER PUBLIC API AND CORE MESSAGE-HANDLING LOGIC                  //
////////////////////////////////////////////////////////////////////////

/// An authoritative DNS responder, abstracted from any underlying
/// network I/O provider.
///
/// The `Server` structure implements the message-processing logic of
/// the responder. It parses and responds to DNS messages through the
/// [`Server::handle_message`] method. An underlying network I/O
/// provider is responsible for receiving these messages from the
/// network through whatever operating system I/O APIs are chosen, and
/// then sending the responses that the `Server` produces.
///
/// Responses are produced from a [`RecordStore`]. The store is held
/// behind a lock so that it can be swapped for a freshly loaded one
/// (see [`Server::set_store`]) while queries are being served.
pub struct Server {
    store: RwLock<Arc<RecordStore>>,
}

impl Server {
    /// Creates a new `Server` that will serve the provided store.
    pub fn new(store: Arc<RecordStore>) -> Self {
        Self {
            store: RwLock::new(store),
        }
    }

    /// Returns the current record store of the server.
    pub fn store(&self) -> Arc<RecordStore> {
        self.store.read().unwrap().clone()
    }

    /// Sets the record store of the `Server`. Some in-flight message
    /// handling may continue to use the old store (depending on how far
    /// it has gotten), but handling started after this call completes
    /// will see the new one.
    pub fn set_store(&self, store: Arc<RecordStore>) {
        *self.store.write().unwrap() = store;
    }

    /// Handles a received DNS message. This is the central entry point
    /// through which I/O providers submit messages.
    ///
    /// `received_buf` contains the message received, and `response_buf`
    /// is the buffer into which the response message is serialized.
    /// `response_buf` must be at least [`MAX_UDP_PAYLOAD`] octets long;
    /// if it is not, then this method will panic.
    ///
    /// Every received datagram, no matter how mangled, gets a reply:
    /// the length of the response message written into `response_buf`
    /// is returned.
    pub fn handle_message(&self, received_buf: &[u8], response_buf: &mut [u8]) -> usize {
        if response_buf.len() < MAX_UDP_PAYLOAD {
            panic!("the response buffer is not large enough");
        }

        // Messages without a full DNS header, and messages that are
        // themselves responses, get a header-only FORMERR reply.
        let mut received = match Reader::try_from(received_buf) {
            Ok(reader) if !reader.qr() => reader,
            _ => return error_response(received_buf, response_buf, Rcode::FormErr),
        };

        // In practice only one question per message is used, and like
        // most implementations we do not try to answer anything else.
        if received.qdcount() != 1 {
            return error_response(received_buf, response_buf, Rcode::NotImp);
        }

        let question = match received.read_question() {
            Ok(question) => question,
            Err(err) => {
                debug!("rejecting malformed question: {}", err);
                return error_response(received_buf, response_buf, Rcode::FormErr);
            }
        };

        // Start the response by copying information from the received
        // message and setting the QR and AA bits. The unwrap is okay:
        // we have checked that the buffer is at least MAX_UDP_PAYLOAD
        // octets long.
        let mut response = Writer::new(response_buf, MAX_UDP_PAYLOAD).unwrap();
        response.set_id(received.id());
        response.set_qr(true);
        response.set_opcode(received.opcode());
        response.set_aa(true);
        if response.add_question(&question).is_err() {
            // A decoded question always fits in a 512-octet response,
            // so this is unreachable in practice, but a lost question
            // should not lose the reply.
            response.set_rcode(Rcode::ServFail);
            return response.finish();
        }

        let store = self.store();
        let mut n_matched = 0;
        for record in store.lookup(&question) {
            n_matched += 1;
            match response.add_answer(
                &record.name,
                record.rr_type,
                record.class,
                record.ttl,
                &record.rdata,
            ) {
                Ok(()) => (),
                Err(writer::Error::Truncation) => {
                    response.set_tc(true);
                    break;
                }
                Err(err) => {
                    debug!("could not serialize answer for {}: {}", question, err);
                    break;
                }
            }
        }

        debug!("answering {} with {} record(s)", question, n_matched);
        response.set_rcode(if n_matched > 0 {
            Rcode::NoError
        } else {
            Rcode::NxDomain
        });
        response.finish()
    }
}

/// Produces a header-only response with the given RCODE. The ID and
/// opcode are echoed from whatever octets of the received message are
/// present; missing octets are taken to be zero.
fn error_response(received_buf: &[u8], response_buf: &mut [u8], rcode: Rcode) -> usize {
    let mut response = Writer::new(response_buf, MAX_UDP_PAYLOAD).unwrap();
    let id = received_buf
        .get(0..2)
        .map_or(0, |octets| u16::from_be_bytes(octets.try_into().unwrap()));
    let opcode = received_buf.get(2).map_or(0, |octet| (octet & 0x78) >> 3);
    response.set_id(id);
    response.set_qr(true);
    response.set_opcode(opcode.try_into().unwrap());
    response.set_rcode(rcode);
    response.finish()
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::Class;
    use crate::message::{Opcode, Qclass, Qtype, Question};
    use crate::name::Name;
    use crate::rr::{Ttl, Type};
    use crate::store::Record;

    fn server_with_records(records: Vec<Record>) -> Server {
        Server::new(Arc::new(RecordStore::new(records)))
    }

    fn a_record(name: &str, rdata: &[u8]) -> Record {
        Record {
            name: name.parse().unwrap(),
            class: Class::IN,
            rr_type: Type::A,
            ttl: Ttl::from(3600),
            rdata: rdata.into(),
        }
    }

    fn a_question(qname: &str) -> Question {
        Question {
            qname: qname.parse().unwrap(),
            qtype: Qtype::from(Type::A),
            qclass: Qclass::from(Class::IN),
        }
    }

    fn make_query(id: u16, question: &Question) -> Vec<u8> {
        let mut buf = vec![0; MAX_UDP_PAYLOAD];
        let mut query = Writer::try_from(buf.as_mut_slice()).unwrap();
        query.set_id(id);
        query.add_question(question).unwrap();
        let len = query.finish();
        buf.truncate(len);
        buf
    }

    #[test]
    fn matching_queries_get_answers() {
        let server = server_with_records(vec![a_record("example.com.", b"\xc0\xa8\x00\x01")]);
        let query = make_query(0x0703, &a_question("example.com."));
        let mut buf = [0u8; MAX_UDP_PAYLOAD];
        let len = server.handle_message(&query, &mut buf);

        let mut response = Reader::try_from(&buf[0..len]).unwrap();
        assert_eq!(response.id(), 0x0703);
        assert!(response.qr());
        assert!(response.aa());
        assert!(!response.tc());
        assert!(!response.rd());
        assert_eq!(response.rcode(), Rcode::NoError);
        assert_eq!(response.qdcount(), 1);
        assert_eq!(response.ancount(), 1);
        assert_eq!(response.read_question().unwrap(), a_question("example.com."));
        let answer = response.read_rr().unwrap();
        assert_eq!(answer.owner, "example.com.".parse::<Name>().unwrap());
        assert_eq!(answer.rr_type, Type::A);
        assert_eq!(answer.class, Class::IN);
        assert_eq!(answer.ttl, Ttl::from(3600));
        assert_eq!(answer.rdata, b"\xc0\xa8\x00\x01");
        assert!(response.at_eom());
    }

    #[test]
    fn all_matching_records_are_served() {
        let server = server_with_records(vec![
            a_record("example.com.", b"\xc0\xa8\x00\x01"),
            a_record("example.org.", b"\xc0\xa8\x00\x63"),
            a_record("example.com.", b"\xc0\xa8\x00\x02"),
        ]);
        let query = make_query(1, &a_question("example.com."));
        let mut buf = [0u8; MAX_UDP_PAYLOAD];
        let len = server.handle_message(&query, &mut buf);

        let mut response = Reader::try_from(&buf[0..len]).unwrap();
        assert_eq!(response.ancount(), 2);
        response.read_question().unwrap();
        assert_eq!(response.read_rr().unwrap().rdata, b"\xc0\xa8\x00\x01");
        assert_eq!(response.read_rr().unwrap().rdata, b"\xc0\xa8\x00\x02");
    }

    #[test]
    fn unknown_names_get_nxdomain() {
        let server = server_with_records(vec![a_record("example.com.", b"\xc0\xa8\x00\x01")]);
        let query = make_query(2, &a_question("unknown.example.com."));
        let mut buf = [0u8; MAX_UDP_PAYLOAD];
        let len = server.handle_message(&query, &mut buf);

        let mut response = Reader::try_from(&buf[0..len]).unwrap();
        assert_eq!(response.rcode(), Rcode::NxDomain);
        assert_eq!(response.qdcount(), 1);
        assert_eq!(response.ancount(), 0);
        assert_eq!(
            response.read_question().unwrap(),
            a_question("unknown.example.com.")
        );
        assert!(response.at_eom());
    }

    #[test]
    fn short_datagrams_get_a_header_only_formerr() {
        let server = server_with_records(Vec::new());
        let mut buf = [0u8; MAX_UDP_PAYLOAD];
        let len = server.handle_message(b"\xab\xcd\x01\x00\x00\x01\x00\x00", &mut buf);

        assert_eq!(len, 12);
        let response = Reader::try_from(&buf[0..len]).unwrap();
        assert_eq!(response.id(), 0xabcd);
        assert!(response.qr());
        assert_eq!(response.opcode(), Opcode::Query);
        assert_eq!(response.rcode(), Rcode::FormErr);
        assert_eq!(response.qdcount(), 0);
        assert_eq!(response.ancount(), 0);
    }

    #[test]
    fn empty_datagrams_get_a_header_only_formerr() {
        let server = server_with_records(Vec::new());
        let mut buf = [0u8; MAX_UDP_PAYLOAD];
        let len = server.handle_message(b"", &mut buf);
        assert_eq!(len, 12);
        let response = Reader::try_from(&buf[0..len]).unwrap();
        assert_eq!(response.id(), 0);
        assert_eq!(response.rcode(), Rcode::FormErr);
    }

    #[test]
    fn responses_get_a_formerr() {
        let server = server_with_records(vec![a_record("example.com.", b"\xc0\xa8\x00\x01")]);
        let mut query = make_query(3, &a_question("example.com."));
        query[2] |= 0x80; // QR
        let mut buf = [0u8; MAX_UDP_PAYLOAD];
        let len = server.handle_message(&query, &mut buf);

        let response = Reader::try_from(&buf[0..len]).unwrap();
        assert_eq!(len, 12);
        assert_eq!(response.rcode(), Rcode::FormErr);
    }

    #[test]
    fn multi_question_messages_get_notimp() {
        let server = server_with_records(vec![a_record("example.com.", b"\xc0\xa8\x00\x01")]);
        let question = a_question("example.com.");
        let mut buf = [0u8; MAX_UDP_PAYLOAD];
        let mut query = Writer::try_from(buf.as_mut_slice()).unwrap();
        query.set_id(4);
        query.add_question(&question).unwrap();
        query.add_question(&question).unwrap();
        let query_len = query.finish();
        let query = buf[0..query_len].to_vec();

        let mut response_buf = [0u8; MAX_UDP_PAYLOAD];
        let len = server.handle_message(&query, &mut response_buf);
        assert_eq!(len, 12);
        let response = Reader::try_from(&response_buf[0..len]).unwrap();
        assert_eq!(response.id(), 4);
        assert_eq!(response.rcode(), Rcode::NotImp);
    }

    #[test]
    fn pointer_loops_get_a_formerr() {
        // The QNAME is a compression pointer pointing at itself.
        let query = b"\x00\x05\x00\x00\x00\x01\x00\x00\x00\x00\x00\x00\
                      \xc0\x0c\x00\x01\x00\x01";
        let server = server_with_records(Vec::new());
        let mut buf = [0u8; MAX_UDP_PAYLOAD];
        let len = server.handle_message(query, &mut buf);
        assert_eq!(len, 12);
        let response = Reader::try_from(&buf[0..len]).unwrap();
        assert_eq!(response.id(), 5);
        assert_eq!(response.rcode(), Rcode::FormErr);
    }

    #[test]
    fn oversized_answer_sets_are_truncated() {
        let records = (0..24)
            .map(|i| a_record("example.com.", &[10, 0, 0, i]))
            .collect();
        let server = server_with_records(records);
        let query = make_query(6, &a_question("example.com."));
        let mut buf = [0u8; MAX_UDP_PAYLOAD];
        let len = server.handle_message(&query, &mut buf);

        assert!(len <= MAX_UDP_PAYLOAD);
        let response = Reader::try_from(&buf[0..len]).unwrap();
        assert!(response.tc());
        assert_eq!(response.rcode(), Rcode::NoError);
        assert!(response.ancount() < 24);
    }

    #[test]
    fn opcode_is_echoed_in_replies() {
        let question = a_question("example.com.");
        let mut buf = [0u8; MAX_UDP_PAYLOAD];
        let mut query = Writer::try_from(buf.as_mut_slice()).unwrap();
        query.set_id(7);
        query.set_opcode(Opcode::Status);
        query.add_question(&question).unwrap();
        let query_len = query.finish();
        let query = buf[0..query_len].to_vec();

        let server = server_with_records(Vec::new());
        let mut response_buf = [0u8; MAX_UDP_PAYLOAD];
        let len = server.handle_message(&query, &mut response_buf);
        let response = Reader::try_from(&response_buf[0..len]).unwrap();
        assert_eq!(response.opcode(), Opcode::Status);
        assert_eq!(response.rcode(), Rcode::NxDomain);
    }

    #[test]
    #[should_panic(expected = "response buffer is not large enough")]
    fn handle_message_rejects_short_response_buffers() {
        let server = server_with_records(Vec::new());
        let mut buf = [0u8; MAX_UDP_PAYLOAD - 1];
        server.handle_message(b"", &mut buf);
    }
}
