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

//! Loading of record files.
//!
//! A record file is a line-oriented text file. Each non-empty line that
//! does not start with a semicolon describes one record:
//!
//! ```text
//! name class type ttl value
//! ```
//!
//! The name, class, type, and TTL fields are whitespace-separated; the
//! value field is the rest of the line. The class and type may be given
//! as mnemonics (`IN`, `A`) or as decimal numbers. For class IN records
//! of type A, the value is parsed as a dotted-quad IPv4 address and
//! stored as the four-octet RDATA; for all other records, the value's
//! bytes are stored as the RDATA verbatim.
//!
//! In order to maintain consistency in error messages, all syntax
//! errors are recorded with an [`ErrorKind`] value that can be used by
//! calling code to get an appropriate error message.

use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::net::Ipv4Addr;
use std::path::Path;

use crate::class::Class;
use crate::name::{self, Name};
use crate::rr::{Ttl, Type};

use super::{Record, RecordStore};

////////////////////////////////////////////////////////////////////////
// LOADING                                                            //
////////////////////////////////////////////////////////////////////////

/// Loads a [`RecordStore`] from the record file at `path`.
pub fn load(path: &Path) -> Result<RecordStore> {
    read(File::open(path)?)
}

/// Reads a [`RecordStore`] from record-file data in `source`.
pub fn read(source: impl Read) -> Result<RecordStore> {
    let mut records = Vec::new();
    for (index, line) in BufReader::new(source).lines().enumerate() {
        let line = line?;
        let line_number = index + 1;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with(';') {
            continue;
        }
        records.push(parse_record(trimmed, line_number)?);
    }
    Ok(RecordStore::new(records))
}

/// Parses a single record line. `line` must already be trimmed and
/// non-empty.
fn parse_record(line: &str, line_number: usize) -> Result<Record> {
    let syntax = |kind| Error::Syntax { line_number, kind };
    let require = |field: &str, kind| {
        if field.is_empty() {
            Err(syntax(kind))
        } else {
            Ok(())
        }
    };

    let (name_field, rest) = split_field(line);
    let (class_field, rest) = split_field(rest);
    let (type_field, rest) = split_field(rest);
    let (ttl_field, rest) = split_field(rest);
    let value = rest.trim_start();

    let name = parse_name(name_field).map_err(|err| syntax(ErrorKind::InvalidName(err)))?;
    require(class_field, ErrorKind::MissingClass)?;
    let class: Class = class_field
        .parse()
        .map_err(|_| syntax(ErrorKind::InvalidClass))?;
    require(type_field, ErrorKind::MissingType)?;
    let rr_type: Type = type_field
        .parse()
        .map_err(|_| syntax(ErrorKind::InvalidType))?;
    require(ttl_field, ErrorKind::MissingTtl)?;
    let ttl = ttl_field
        .parse::<u32>()
        .map(Ttl::from)
        .map_err(|_| syntax(ErrorKind::InvalidTtl))?;
    require(value, ErrorKind::MissingValue)?;

    let rdata = if class == Class::IN && rr_type == Type::A {
        let address: Ipv4Addr = value
            .parse()
            .map_err(|_| syntax(ErrorKind::InvalidAddress))?;
        Box::from(address.octets().as_slice())
    } else {
        Box::from(value.as_bytes())
    };

    Ok(Record {
        name,
        class,
        rr_type,
        ttl,
        rdata,
    })
}

/// Splits the next whitespace-separated field off the front of `s`,
/// returning the field and the remainder of the line.
fn split_field(s: &str) -> (&str, &str) {
    let s = s.trim_start();
    match s.find(char::is_whitespace) {
        Some(end) => (&s[..end], &s[end..]),
        None => (s, ""),
    }
}

/// Parses the name field. A missing trailing dot is tolerated, so both
/// `example.com.` and `example.com` denote the same (absolute) name.
fn parse_name(field: &str) -> std::result::Result<Name, name::Error> {
    match field.parse() {
        Err(name::Error::NonNullTerminal) => format!("{field}.").parse(),
        result => result,
    }
}

////////////////////////////////////////////////////////////////////////
// ERRORS                                                             //
////////////////////////////////////////////////////////////////////////

/// Represents errors that may occur while loading a record file.
#[derive(Debug)]
pub enum Error {
    /// I/O errors encountered while reading a record file.
    Io(io::Error),

    /// Syntax errors.
    Syntax { line_number: usize, kind: ErrorKind },
}

impl From<io::Error> for Error {
    fn from(io_error: io::Error) -> Self {
        Self::Io(io_error)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Io(io_error) => write!(f, "I/O error: {}", io_error),
            Self::Syntax { line_number, kind } => write!(f, "{} at line {}", kind, line_number),
        }
    }
}

impl std::error::Error for Error {}

/// A result type for record file loading.
pub type Result<T> = std::result::Result<T, Error>;

/// Kinds of record file syntax errors.
#[derive(Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum ErrorKind {
    MissingClass,
    MissingType,
    MissingTtl,
    MissingValue,
    InvalidName(name::Error),
    InvalidClass,
    InvalidType,
    InvalidTtl,
    InvalidAddress,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::MissingClass => f.write_str("missing class field"),
            Self::MissingType => f.write_str("missing type field"),
            Self::MissingTtl => f.write_str("missing TTL field"),
            Self::MissingValue => f.write_str("missing value field"),
            Self::InvalidName(err) => write!(f, "invalid name: {}", err),
            Self::InvalidClass => f.write_str("invalid class field"),
            Self::InvalidType => f.write_str("invalid type field"),
            Self::InvalidTtl => f.write_str("invalid TTL field"),
            Self::InvalidAddress => f.write_str("invalid IPv4 address"),
        }
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
