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

//! Implementation of data structures related to domain names.

use std::fmt;
use std::iter::FusedIterator;
use std::str::FromStr;

use arrayvec::ArrayVec;

mod error;
mod wire;
pub use error::Error;

/// The maximum length of the uncompressed on-the-wire representation of
/// a domain name.
const MAX_WIRE_LEN: usize = 255;

/// The maximum length of a label in a domain name (not including the
/// octet that provides the length).
const MAX_LABEL_LEN: usize = 63;

////////////////////////////////////////////////////////////////////////
// NAME STRUCTURE                                                     //
////////////////////////////////////////////////////////////////////////

/// A structure to represent a domain name.
///
/// A `Name` owns the uncompressed on-the-wire representation of the
/// name, as defined in [RFC 1035 § 3.1], including the null label that
/// terminates it. `Name`s can be constructed in two ways:
///
/// * through the [`FromStr`] implementation; and
/// * from compressed on-the-wire names through
///   [`Name::try_from_compressed`].
///
/// Both constructors validate the name fully, so a `Name`, once built,
/// is always well formed.
///
/// Note that the derived equality and hashing implementations compare
/// the on-the-wire representation octet for octet, so names that differ
/// only in ASCII case compare unequal.
///
/// [RFC 1035 § 3.1]: https://datatracker.ietf.org/doc/html/rfc1035#section-3.1
#[derive(Clone, Eq, Hash, PartialEq)]
pub struct Name {
    n_labels: u8,
    wire: Box<[u8]>,
}

impl Name {
    /// Returns the root name.
    pub fn root() -> Self {
        Self {
            n_labels: 1,
            wire: Box::new([0]),
        }
    }

    /// Returns the number of labels in the `Name`, including the null
    /// label.
    pub fn n_labels(&self) -> usize {
        self.n_labels as usize
    }

    /// Returns the length of the `Name`'s uncompressed on-the-wire
    /// representation.
    pub fn wire_len(&self) -> usize {
        self.wire.len()
    }

    /// Returns whether this is the root name.
    pub fn is_root(&self) -> bool {
        self.n_labels == 1
    }

    /// Returns the uncompressed on-the-wire representation of the
    /// `Name`.
    pub fn wire_repr(&self) -> &[u8] {
        &self.wire
    }

    /// Returns an iterator over the non-null labels of the `Name`.
    pub fn labels(&self) -> Labels {
        Labels {
            wire: &self.wire,
            offset: 0,
        }
    }

    /// Parses a compressed on-the-wire name starting at index `start`
    /// of `octets`. Compression pointers are followed; indices given in
    /// pointers are treated as indices of `octets`, so the intention is
    /// for an entire DNS message to be passed in `octets`.
    ///
    /// On success, this returns the parsed `Name` along with the length
    /// of its first chunk, that is, the number of octets the name
    /// occupies at `start` before any pointer is followed.
    pub fn try_from_compressed(octets: &[u8], start: usize) -> Result<(Self, usize), Error> {
        wire::parse_compressed_name(octets, start)
    }
}

////////////////////////////////////////////////////////////////////////
// CONVERSION FROM STRINGS                                            //
////////////////////////////////////////////////////////////////////////

impl FromStr for Name {
    type Err = Error;

    /// Parses a `Name` from a string in the traditional dotted format.
    /// The name must be absolute, i.e., it must end with a dot.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(Error::StrEmpty);
        } else if !s.is_ascii() {
            return Err(Error::StrNotAscii);
        } else if s == "." {
            return Ok(Self::root());
        } else if !s.ends_with('.') {
            return Err(Error::NonNullTerminal);
        }

        let mut n_labels = 1;
        let mut wire = ArrayVec::<u8, MAX_WIRE_LEN>::new();
        for label in s[..s.len() - 1].split('.') {
            if label.is_empty() {
                return Err(Error::NullNonTerminal);
            } else if label.len() > MAX_LABEL_LEN {
                return Err(Error::LabelTooLong);
            }
            wire.try_push(label.len() as u8)
                .or(Err(Error::NameTooLong))?;
            wire.try_extend_from_slice(label.as_bytes())
                .or(Err(Error::NameTooLong))?;
            n_labels += 1;
        }
        wire.try_push(0).or(Err(Error::NameTooLong))?;

        Ok(Self {
            n_labels,
            wire: wire.as_slice().into(),
        })
    }
}

////////////////////////////////////////////////////////////////////////
// DISPLAY AND DEBUGGING                                              //
////////////////////////////////////////////////////////////////////////

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_root() {
            return f.write_str(".");
        }
        for label in self.labels() {
            for &octet in label {
                match octet {
                    b'.' | b'\\' => write!(f, "\\{}", octet as char)?,
                    octet if octet.is_ascii_graphic() => write!(f, "{}", octet as char)?,
                    octet => write!(f, "\\{octet:03}")?,
                }
            }
            f.write_str(".")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{self}")
    }
}

////////////////////////////////////////////////////////////////////////
// LABEL ITERATION                                                    //
////////////////////////////////////////////////////////////////////////

/// An iterator over the non-null labels of a [`Name`].
#[derive(Clone, Debug)]
pub struct Labels<'a> {
    wire: &'a [u8],
    offset: usize,
}

impl<'a> Iterator for Labels<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        let len = self.wire[self.offset] as usize;
        if len == 0 {
            None
        } else {
            let start = self.offset + 1;
            self.offset = start + len;
            Some(&self.wire[start..self.offset])
        }
    }
}

impl FusedIterator for Labels<'_> {}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_str_works_for_valid_names() {
        let name: Name = "example.test.".parse().unwrap();
        assert_eq!(name.wire_repr(), b"\x07example\x04test\x00");
        assert_eq!(name.n_labels(), 3);
        assert_eq!(name.wire_len(), 14);
    }

    #[test]
    fn from_str_works_for_the_root() {
        let name: Name = ".".parse().unwrap();
        assert!(name.is_root());
        assert_eq!(name.wire_repr(), b"\x00");
    }

    #[test]
    fn from_str_rejects_empty_strings() {
        assert_eq!("".parse::<Name>(), Err(Error::StrEmpty));
    }

    #[test]
    fn from_str_rejects_non_ascii_strings() {
        assert_eq!("exämple.test.".parse::<Name>(), Err(Error::StrNotAscii));
    }

    #[test]
    fn from_str_rejects_relative_names() {
        assert_eq!("example.test".parse::<Name>(), Err(Error::NonNullTerminal));
    }

    #[test]
    fn from_str_rejects_empty_labels() {
        assert_eq!("example..test.".parse::<Name>(), Err(Error::NullNonTerminal));
        assert_eq!(".example.test.".parse::<Name>(), Err(Error::NullNonTerminal));
    }

    #[test]
    fn from_str_rejects_long_labels() {
        let s = format!("{}.", "x".repeat(MAX_LABEL_LEN + 1));
        assert_eq!(s.parse::<Name>(), Err(Error::LabelTooLong));
    }

    #[test]
    fn from_str_rejects_long_names() {
        let s = "x.".repeat(128);
        assert_eq!(s.parse::<Name>(), Err(Error::NameTooLong));
    }

    #[test]
    fn labels_iterates_over_non_null_labels() {
        let name: Name = "example.test.".parse().unwrap();
        let labels: Vec<&[u8]> = name.labels().collect();
        assert_eq!(labels, [b"example".as_slice(), b"test".as_slice()]);
        assert_eq!(Name::root().labels().next(), None);
    }

    #[test]
    fn display_prints_the_dotted_format() {
        let name: Name = "example.test.".parse().unwrap();
        assert_eq!(name.to_string(), "example.test.");
        assert_eq!(Name::root().to_string(), ".");
    }

    #[test]
    fn display_escapes_special_octets() {
        let (name, _) = Name::try_from_compressed(b"\x04a.b\\\x02\x01c\x00", 0).unwrap();
        assert_eq!(name.to_string(), "a\\.b\\\\.\\001c.");
    }

    #[test]
    fn equality_is_case_sensitive() {
        let lower: Name = "example.test.".parse().unwrap();
        let upper: Name = "EXAMPLE.test.".parse().unwrap();
        assert_ne!(lower, upper);
        assert_eq!(lower, lower.clone());
    }
}
