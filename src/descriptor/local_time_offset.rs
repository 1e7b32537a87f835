//! Offsets of local time from UTC per country and region, carried in the _Time Offset Table_.

use super::DescriptorError;
use crate::time;
use chrono::{Duration, NaiveDateTime};
use std::fmt;

/// One country/region entry of a `LocalTimeOffsetDescriptor`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalTimeOffset {
    /// ISO 3166 alpha-3 country code
    pub country_code: String,
    /// 6-bit region within the country, `0` when the whole country shares one offset
    pub region_id: u8,
    /// Offset in force until `time_of_change`, already signed by the polarity bit
    pub offset: Duration,
    /// When `next_offset` takes over from `offset`, `None` if undefined
    pub time_of_change: Option<NaiveDateTime>,
    /// Offset in force from `time_of_change`, already signed by the polarity bit
    pub next_offset: Duration,
}
impl LocalTimeOffset {
    const SIZE: usize = 13;

    fn from_bytes(buf: &[u8]) -> LocalTimeOffset {
        let negative = buf[3] & 0b0000_0001 != 0;
        let (country, _) = encoding_rs::WINDOWS_1252.decode_without_bom_handling(&buf[0..3]);
        LocalTimeOffset {
            country_code: country.into_owned(),
            region_id: buf[3] >> 2,
            offset: time::bcd_offset(&buf[4..6], negative).unwrap_or_else(Duration::zero),
            time_of_change: time::utc_time(&buf[6..11]),
            next_offset: time::bcd_offset(&buf[11..13], negative).unwrap_or_else(Duration::zero),
        }
    }

    /// The offset applying at the given UTC time
    pub fn offset_at(&self, utc: NaiveDateTime) -> Duration {
        match self.time_of_change {
            Some(change) if utc >= change => self.next_offset,
            _ => self.offset,
        }
    }

    /// Converts the given UTC time to local time
    pub fn to_local(&self, utc: NaiveDateTime) -> NaiveDateTime {
        utc + self.offset_at(utc)
    }
}

/// Local time offsets, one entry per country/region
#[derive(Clone, PartialEq, Eq)]
pub struct LocalTimeOffsetDescriptor {
    body: Vec<u8>,
}
impl LocalTimeOffsetDescriptor {
    /// The descriptor tag value which identifies the descriptor as a `LocalTimeOffsetDescriptor`.
    pub const TAG: u8 = 0x58;

    pub(crate) fn new(tag: u8, body: &[u8]) -> Result<LocalTimeOffsetDescriptor, DescriptorError> {
        if body.len() % LocalTimeOffset::SIZE != 0 {
            return Err(DescriptorError::TruncatedDescriptor {
                tag: Some(tag),
                expected: (body.len() / LocalTimeOffset::SIZE + 1) * LocalTimeOffset::SIZE,
                actual: body.len(),
            });
        }
        Ok(LocalTimeOffsetDescriptor {
            body: body.to_vec(),
        })
    }

    /// All entries of the descriptor
    pub fn entries(&self) -> impl Iterator<Item = LocalTimeOffset> + '_ {
        self.body
            .chunks_exact(LocalTimeOffset::SIZE)
            .map(LocalTimeOffset::from_bytes)
    }

    /// The first entry, which is the one that applies when the receiver's region is not known
    pub fn first(&self) -> Option<LocalTimeOffset> {
        self.entries().next()
    }

    pub(crate) fn tag(&self) -> u8 {
        Self::TAG
    }
    pub(crate) fn body(&self) -> &[u8] {
        &self.body
    }
}
impl fmt::Debug for LocalTimeOffsetDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.entries()).finish()
    }
}

#[cfg(test)]
mod test {
    use super::super::{read_descriptor, Descriptor, DescriptorError};
    use crate::time::utc_time;
    use assert_matches::assert_matches;
    use chrono::Duration;
    use hex_literal::hex;

    // CZE, region 0, +01:00 until 2024-03-31 01:00:00 UTC, then +02:00
    const CZE: [u8; 15] = hex!("580d 435a45 02 0100 ebf0010000 0200");

    #[test]
    fn descriptor() {
        let (desc, _) = read_descriptor(&CZE).unwrap();
        assert_matches!(desc, Descriptor::LocalTimeOffset(lto) => {
            let entry = lto.first().unwrap();
            assert_eq!(entry.country_code, "CZE");
            assert_eq!(entry.region_id, 0);
            assert_eq!(entry.offset, Duration::hours(1));
            assert_eq!(entry.next_offset, Duration::hours(2));
            assert_eq!(
                entry.time_of_change.unwrap().to_string(),
                "2024-03-31 01:00:00"
            );
            assert_eq!(lto.entries().count(), 1);
        });
    }

    #[test]
    fn offset_switches_at_time_of_change() {
        let (desc, _) = read_descriptor(&CZE).unwrap();
        assert_matches!(desc, Descriptor::LocalTimeOffset(lto) => {
            let entry = lto.first().unwrap();
            let before = utc_time(&hex!("ebf0005959")).unwrap();
            let after = utc_time(&hex!("ebf0010000")).unwrap();
            assert_eq!(entry.offset_at(before), Duration::hours(1));
            assert_eq!(entry.offset_at(after), Duration::hours(2));
            assert_eq!(entry.to_local(after).to_string(), "2024-03-31 03:00:00");
        });
    }

    #[test]
    fn negative_polarity() {
        let data = hex!("580d 555341 07 0500 ebf0010000 0400");
        let (desc, _) = read_descriptor(&data).unwrap();
        assert_matches!(desc, Descriptor::LocalTimeOffset(lto) => {
            let entry = lto.first().unwrap();
            assert_eq!(entry.region_id, 1);
            assert_eq!(entry.offset, Duration::hours(-5));
            assert_eq!(entry.next_offset, Duration::hours(-4));
        });
    }

    #[test]
    fn no_entries() {
        let (desc, len) = read_descriptor(&hex!("5800")).unwrap();
        assert_eq!(len, 2);
        assert_matches!(desc, Descriptor::LocalTimeOffset(lto) => {
            assert!(lto.first().is_none());
            assert_eq!(lto.entries().count(), 0);
        });
    }

    #[test]
    fn partial_entry() {
        assert_matches!(
            read_descriptor(&hex!("5805 435a450201")),
            Err(DescriptorError::TruncatedDescriptor { tag: Some(0x58), expected: 13, actual: 5 })
        );
    }
}
