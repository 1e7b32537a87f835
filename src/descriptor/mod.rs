//! Descriptors provide metadata about an element of a Transport Stream.
//!
//! For example, a descriptor may be used to specify the language of an audio track, or the
//! name of a service.  Use of specific descriptors is often not mandatory (many streams do not
//! describe the language of their audio).
//!
//! The syntax of the service information tables allows descriptors to be attached to the table
//! itself, or to entries within the table, usually as a _descriptor loop_: a 12-bit length
//! followed by that many bytes of back-to-back descriptors.
//!
//! Each descriptor keeps its own body bytes, and its typed accessors parse those on demand.  The
//! lengths of any fixed or length-prefixed fields are checked once, when the descriptor is read,
//! so that the accessors themselves can not fail.
//!
//! ```
//! # use dvbt_demux::descriptor::{read_descriptor_loop, Descriptor};
//! let data = [0xf0, 0x06, 0x40, 0x04, b'T', b'e', b's', b't'];
//! let (descriptors, consumed) = read_descriptor_loop(&data).unwrap();
//! assert_eq!(consumed, data.len());
//! if let Descriptor::NetworkName(name) = &descriptors[0] {
//!     assert_eq!(name.name(), "Test");
//! }
//! ```

pub mod iso_639_language;
pub mod local_time_offset;
pub mod network_name;
pub mod service;
pub mod short_event;
pub mod terrestrial_delivery;

use self::iso_639_language::Iso639LanguageDescriptor;
use self::local_time_offset::LocalTimeOffsetDescriptor;
use self::network_name::NetworkNameDescriptor;
use self::service::ServiceDescriptor;
use self::short_event::ShortEventDescriptor;
use self::terrestrial_delivery::TerrestrialDeliverySystemDescriptor;
use std::fmt;
use thiserror::Error;

/// Size of the tag and length bytes preceding each descriptor body
pub const DESCRIPTOR_HEADER_SIZE: usize = 2;
/// Size of the length prefix of a descriptor loop
pub const LOOP_HEADER_SIZE: usize = 2;

/// Errors produced while reading descriptors
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum DescriptorError {
    /// Either the tag/length header, or the body the length calls for, or a fixed field within a
    /// known descriptor's body, does not fit in the available bytes.
    #[error("truncated descriptor (tag {tag:?}): {expected} bytes required, {actual} available")]
    TruncatedDescriptor {
        /// tag of the descriptor, if at least one byte was available
        tag: Option<u8>,
        /// the number of bytes needed
        expected: usize,
        /// the number of bytes present
        actual: usize,
    },
    /// The length prefix of a descriptor loop exceeds the bytes remaining.
    #[error("truncated descriptor loop: {expected} bytes declared, {actual} available")]
    TruncatedLoop {
        /// the number of bytes the loop declared (including the length prefix)
        expected: usize,
        /// the number of bytes present
        actual: usize,
    },
}

/// Fails with `TruncatedDescriptor` if `buf` is shorter than `len`.
pub(crate) fn descriptor_len(buf: &[u8], tag: u8, len: usize) -> Result<(), DescriptorError> {
    if buf.len() < len {
        Err(DescriptorError::TruncatedDescriptor {
            tag: Some(tag),
            expected: len,
            actual: buf.len(),
        })
    } else {
        Ok(())
    }
}

/// Checks a length-prefixed field starting at `offset`, returning the offset just beyond it.
pub(crate) fn length_prefixed(buf: &[u8], tag: u8, offset: usize) -> Result<usize, DescriptorError> {
    descriptor_len(buf, tag, offset + 1)?;
    let end = offset + 1 + buf[offset] as usize;
    descriptor_len(buf, tag, end)?;
    Ok(end)
}

macro_rules! descriptor_enum {
    (
        $(#[$outer:meta])*
        $name:ident {
            $(
                $(#[$inner:ident $($args:tt)*])*
                $case_name:ident $($tags:pat_param)|* => $t:ident
            ),*,
        }
    ) => {
        $(#[$outer])*
        pub enum $name {
            $(
                $(#[$inner $($args)*])*
                $case_name($t),
            )*
        }
        impl $name {
            /// Reads the descriptor at the start of `buf`, returning it along with the number of
            /// bytes it occupied (header plus body).
            pub fn from_bytes(buf: &[u8]) -> Result<(Self, usize), DescriptorError> {
                if buf.len() < DESCRIPTOR_HEADER_SIZE {
                    return Err(DescriptorError::TruncatedDescriptor {
                        tag: buf.first().copied(),
                        expected: DESCRIPTOR_HEADER_SIZE,
                        actual: buf.len(),
                    });
                }
                let tag = buf[0];
                let len = buf[1] as usize;
                let tag_end = len + DESCRIPTOR_HEADER_SIZE;
                if tag_end > buf.len() {
                    return Err(DescriptorError::TruncatedDescriptor {
                        tag: Some(tag),
                        expected: len,
                        actual: buf.len() - DESCRIPTOR_HEADER_SIZE,
                    });
                }
                let payload = &buf[DESCRIPTOR_HEADER_SIZE..tag_end];
                let desc = match tag {
                    $( $( $tags )|* => $name::$case_name($t::new(tag, payload)?), )*
                };
                Ok((desc, tag_end))
            }

            /// The `descriptor_tag` value
            pub fn tag(&self) -> u8 {
                match self {
                    $( $name::$case_name(d) => d.tag(), )*
                }
            }

            /// The bytes following the descriptor's tag and length
            pub fn body(&self) -> &[u8] {
                match self {
                    $( $name::$case_name(d) => d.body(), )*
                }
            }
        }
    }
}

/// A descriptor whose tag has no specific handling.
#[derive(Clone, PartialEq, Eq)]
pub struct UnknownDescriptor {
    /// the `descriptor_tag` value
    pub tag: u8,
    body: Vec<u8>,
}
impl UnknownDescriptor {
    pub(crate) fn new(tag: u8, body: &[u8]) -> Result<UnknownDescriptor, DescriptorError> {
        Ok(UnknownDescriptor {
            tag,
            body: body.to_vec(),
        })
    }
    /// The `descriptor_tag` value
    pub fn tag(&self) -> u8 {
        self.tag
    }
    /// The undecoded descriptor body
    pub fn body(&self) -> &[u8] {
        &self.body
    }
}
impl fmt::Debug for UnknownDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        f.debug_struct("UnknownDescriptor")
            .field("tag", &format_args!("0x{:02x}", self.tag))
            .field("len", &self.body.len())
            .finish()
    }
}

descriptor_enum! {
    /// The descriptors this crate understands, plus a catch-all for the rest.
    #[derive(Debug, Clone, PartialEq)]
    Descriptor {
        Iso639Language 0x0a => Iso639LanguageDescriptor,
        NetworkName 0x40 => NetworkNameDescriptor,
        Service 0x48 => ServiceDescriptor,
        ShortEvent 0x4d => ShortEventDescriptor,
        LocalTimeOffset 0x58 => LocalTimeOffsetDescriptor,
        TerrestrialDeliverySystem 0x5a => TerrestrialDeliverySystemDescriptor,
        Unknown _ => UnknownDescriptor,
    }
}

impl Descriptor {
    /// Serialise this descriptor as tag, length and body.
    pub fn to_bytes(&self) -> Vec<u8> {
        let body = self.body();
        let mut out = Vec::with_capacity(DESCRIPTOR_HEADER_SIZE + body.len());
        out.push(self.tag());
        out.push(body.len() as u8);
        out.extend_from_slice(body);
        out
    }
}

/// Reads a single descriptor from the start of `bytes`, returning it along with the number of
/// bytes consumed.
pub fn read_descriptor(bytes: &[u8]) -> Result<(Descriptor, usize), DescriptorError> {
    Descriptor::from_bytes(bytes)
}

/// Reads back-to-back descriptors until `bytes` is exhausted.
pub fn read_descriptors(mut bytes: &[u8]) -> Result<Vec<Descriptor>, DescriptorError> {
    let mut result = vec![];
    while !bytes.is_empty() {
        let (desc, len) = read_descriptor(bytes)?;
        result.push(desc);
        bytes = &bytes[len..];
    }
    Ok(result)
}

/// Reads a descriptor loop: a 2-byte prefix whose low 12 bits give the length of the
/// descriptors that follow.  Returns the descriptors and the total bytes consumed, including
/// the prefix.
pub fn read_descriptor_loop(bytes: &[u8]) -> Result<(Vec<Descriptor>, usize), DescriptorError> {
    if bytes.len() < LOOP_HEADER_SIZE {
        return Err(DescriptorError::TruncatedLoop {
            expected: LOOP_HEADER_SIZE,
            actual: bytes.len(),
        });
    }
    let len = usize::from(bytes[0] & 0x0f) << 8 | usize::from(bytes[1]);
    let end = LOOP_HEADER_SIZE + len;
    if end > bytes.len() {
        return Err(DescriptorError::TruncatedLoop {
            expected: end,
            actual: bytes.len(),
        });
    }
    Ok((read_descriptors(&bytes[LOOP_HEADER_SIZE..end])?, end))
}

/// Serialises descriptors as a descriptor loop, with the four reserved bits of the length prefix
/// set.
pub fn write_descriptor_loop(descriptors: &[Descriptor]) -> Vec<u8> {
    let body: Vec<u8> = descriptors.iter().flat_map(|d| d.to_bytes()).collect();
    let mut out = Vec::with_capacity(LOOP_HEADER_SIZE + body.len());
    out.push(0xf0 | ((body.len() >> 8) & 0x0f) as u8);
    out.push(body.len() as u8);
    out.extend(body);
    out
}

/// Returns the first descriptor for which `f` returns `Some`.
pub fn find<'a, T, F>(descriptors: &'a [Descriptor], f: F) -> Option<&'a T>
where
    F: Fn(&'a Descriptor) -> Option<&'a T>,
{
    descriptors.iter().find_map(f)
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_matches::assert_matches;
    use hex_literal::hex;

    #[test]
    fn unknown_tag() {
        let data = hex!("0e03c00184ff");
        let (desc, len) = read_descriptor(&data).unwrap();
        assert_eq!(len, 5);
        assert_matches!(desc, Descriptor::Unknown(ref u) => {
            assert_eq!(u.tag, 0x0e);
            assert_eq!(u.body(), &hex!("c00184"));
        });
        assert!(!format!("{:?}", desc).is_empty());
    }

    #[test]
    fn header_too_short() {
        assert_matches!(
            read_descriptor(&hex!("40")),
            Err(DescriptorError::TruncatedDescriptor {
                tag: Some(0x40),
                expected: 2,
                actual: 1
            })
        );
        assert_matches!(
            read_descriptor(&[]),
            Err(DescriptorError::TruncatedDescriptor { tag: None, .. })
        );
    }

    #[test]
    fn body_too_short() {
        assert_matches!(
            read_descriptor(&hex!("400541")),
            Err(DescriptorError::TruncatedDescriptor {
                tag: Some(0x40),
                expected: 5,
                actual: 1
            })
        );
    }

    #[test]
    fn loop_round_trip() {
        let descriptors = read_descriptors(&hex!(
            "4003414243 0e0100 f0020102 0a04637a6500"
        ))
        .unwrap();
        assert_eq!(descriptors.len(), 4);
        let encoded = write_descriptor_loop(&descriptors);
        let (decoded, consumed) = read_descriptor_loop(&encoded).unwrap();
        assert_eq!(consumed, encoded.len());
        assert_eq!(decoded, descriptors);
        let tags: Vec<u8> = decoded.iter().map(|d| d.tag()).collect();
        assert_eq!(tags, vec![0x40, 0x0e, 0xf0, 0x0a]);
        let lens: Vec<usize> = decoded.iter().map(|d| d.body().len()).collect();
        assert_eq!(lens, vec![3, 1, 2, 4]);
    }

    #[test]
    fn loop_consumes_only_declared_length() {
        // trailing bytes after the loop belong to the caller
        let data = hex!("f003 0e0100 aabb");
        let (decoded, consumed) = read_descriptor_loop(&data).unwrap();
        assert_eq!(consumed, 5);
        assert_eq!(decoded.len(), 1);
    }

    #[test]
    fn empty_loop() {
        let (decoded, consumed) = read_descriptor_loop(&hex!("f000")).unwrap();
        assert!(decoded.is_empty());
        assert_eq!(consumed, 2);
    }

    #[test]
    fn truncated_loop() {
        assert_matches!(
            read_descriptor_loop(&hex!("f0050e0100")),
            Err(DescriptorError::TruncatedLoop {
                expected: 7,
                actual: 5
            })
        );
        assert_matches!(
            read_descriptor_loop(&hex!("f0")),
            Err(DescriptorError::TruncatedLoop { .. })
        );
    }

    #[test]
    fn truncated_descriptor_inside_loop() {
        assert_matches!(
            read_descriptor_loop(&hex!("f003 0e0500")),
            Err(DescriptorError::TruncatedDescriptor { tag: Some(0x0e), .. })
        );
    }

    #[test]
    fn find_first() {
        let descriptors = read_descriptors(&hex!("4001 41 4001 42")).unwrap();
        let name = find(&descriptors, |d| match d {
            Descriptor::NetworkName(n) => Some(n),
            _ => None,
        })
        .unwrap();
        assert_eq!(name.name(), "A");
    }
}
