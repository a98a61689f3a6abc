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

//! A minimal authoritative DNS responder.
//!
//! The heart of this crate is the RFC 1035 wire-format codec: the
//! [`message`] module reads untrusted query messages (including
//! compressed domain names) and serializes well-formed responses, and
//! the [`name`] module implements the domain-name label encoding the
//! codec rests on. Around the codec sit a flat, read-only record table
//! ([`store`]), the query-processing pipeline ([`server`]), and a
//! blocking UDP front end ([`io`]).
//!
//! The codec itself is transport-agnostic: [`server::Server`] consumes
//! a received byte buffer and produces a reply byte buffer, and every
//! detectable fault in a query becomes a DNS response code rather than
//! an error surfaced to the caller.

pub mod class;
pub mod io;
pub mod message;
pub mod name;
pub mod rr;
pub mod server;
pub mod store;
mod util;
