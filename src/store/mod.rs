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

//! The in-memory store of resource records served by the server.

use std::fmt;

use crate::class::Class;
use crate::message::Question;
use crate::name::Name;
use crate::rr::{Ttl, Type};

pub mod file;

////////////////////////////////////////////////////////////////////////
// RECORDS                                                            //
////////////////////////////////////////////////////////////////////////

/// A single resource record ready to be served.
///
/// The RDATA is kept in its on-the-wire form, so serving a record is
/// simply a matter of copying it into a response message.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Record {
    pub name: Name,
    pub class: Class,
    pub rr_type: Type,
    pub ttl: Ttl,
    pub rdata: Box<[u8]>,
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} {} {} {}",
            self.name, self.class, self.rr_type, self.ttl,
        )
    }
}

////////////////////////////////////////////////////////////////////////
// THE RECORD STORE                                                   //
////////////////////////////////////////////////////////////////////////

/// An immutable collection of [`Record`]s with exact-match lookup.
///
/// A `RecordStore` is built once (e.g. from a record file through
/// [`file::load`]) and then shared read-only with the code answering
/// queries; reloading record data means building a new store and
/// swapping it in.
#[derive(Debug, Default)]
pub struct RecordStore {
    records: Vec<Record>,
}

impl RecordStore {
    /// Creates a new `RecordStore` containing `records`.
    pub fn new(records: Vec<Record>) -> Self {
        Self { records }
    }

    /// Returns the number of records in the store.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Looks up the records matching `question`. A record matches when
    /// its name, class, and type equal the QNAME, QCLASS, and QTYPE
    /// exactly; no wildcard, CNAME, or QTYPE/QCLASS `*` processing is
    /// performed. Records are yielded in the order they were loaded.
    pub fn lookup<'a>(&'a self, question: &'a Question) -> impl Iterator<Item = &'a Record> {
        self.records.iter().filter(move |record| {
            record.name == question.qname
                && Class::from(question.qclass) == record.class
                && Type::from(question.qtype) == record.rr_type
        })
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Qclass, Qtype};

    fn record(name: &str, rr_type: Type, rdata: &[u8]) -> Record {
        Record {
            name: name.parse().unwrap(),
            class: Class::IN,
            rr_type,
            ttl: Ttl::from(3600),
            rdata: rdata.into(),
        }
    }

    fn question(qname: &str, qtype: Qtype, qclass: Qclass) -> Question {
        Question {
            qname: qname.parse().unwrap(),
            qtype,
            qclass,
        }
    }

    #[test]
    fn lookup_returns_matching_records_in_order() {
        let store = RecordStore::new(vec![
            record("example.com.", Type::A, b"\xc0\xa8\x00\x01"),
            record("example.org.", Type::A, b"\xc0\xa8\x00\x02"),
            record("example.com.", Type::A, b"\xc0\xa8\x00\x03"),
        ]);
        let question = question("example.com.", Type::A.into(), Class::IN.into());
        let rdatas: Vec<&[u8]> = store
            .lookup(&question)
            .map(|record| record.rdata.as_ref())
            .collect();
        assert_eq!(
            rdatas,
            [b"\xc0\xa8\x00\x01".as_slice(), b"\xc0\xa8\x00\x03".as_slice()]
        );
    }

    #[test]
    fn lookup_requires_exact_type_and_class_matches() {
        let store = RecordStore::new(vec![record("example.com.", Type::A, b"\xc0\xa8\x00\x01")]);
        let wrong_type = question("example.com.", Type::AAAA.into(), Class::IN.into());
        assert_eq!(store.lookup(&wrong_type).count(), 0);
        let wrong_class = question("example.com.", Type::A.into(), Class::CH.into());
        assert_eq!(store.lookup(&wrong_class).count(), 0);
        let any_type = question("example.com.", Qtype::ANY, Class::IN.into());
        assert_eq!(store.lookup(&any_type).count(), 0);
    }

    #[test]
    fn lookup_misses_for_unknown_names() {
        let store = RecordStore::new(vec![record("example.com.", Type::A, b"\xc0\xa8\x00\x01")]);
        let question = question("www.example.com.", Type::A.into(), Class::IN.into());
        assert_eq!(store.lookup(&question).count(), 0);
    }
}
