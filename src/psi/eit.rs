//! Types related to the _Event Information Table_, the programme guide of each service.
//!
//! Sections with `table_id` `0x4e` describe the present and following events of a service in
//! this transport stream, and `0x50` to `0x5f` its schedule.  The equivalent tables for other
//! transport streams (`0x4f`, `0x60` to `0x6f`) decode the same way.

use crate::descriptor::short_event::ShortEventDescriptor;
use crate::descriptor::{self, Descriptor};
use crate::packet::Pid;
use crate::psi::{record_descriptors, record_len, PsiError, RunningStatus, Section};
use crate::time;
use chrono::{Duration, NaiveDateTime};

/// Present/following events of this transport stream
pub const TABLE_ID_PRESENT_ACTUAL: u8 = 0x4e;
/// Present/following events of another transport stream
pub const TABLE_ID_PRESENT_OTHER: u8 = 0x4f;

/// Is the given `table_id` any kind of EIT section?
pub fn is_eit_table(table_id: u8) -> bool {
    matches!(table_id, 0x4e..=0x6f)
}

#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    pub event_id: u16,
    /// UTC start time, `None` if undefined
    pub start_time: Option<NaiveDateTime>,
    /// `None` if undefined
    pub duration: Option<Duration>,
    pub running_status: RunningStatus,
    pub free_ca_mode: bool,
    pub descriptors: Vec<Descriptor>,
}

impl Event {
    const HEADER_SIZE: usize = 10;

    fn from_bytes(data: &[u8]) -> Result<(Event, usize), PsiError> {
        record_len(data, "EIT event", Self::HEADER_SIZE + 2)?;
        let (descriptors, len) = record_descriptors(data, "EIT event", Self::HEADER_SIZE)?;
        let duration = if data[7..10].iter().all(|&b| b == 0xff) {
            None
        } else {
            time::bcd_duration(&data[7..10])
        };
        let event = Event {
            event_id: u16::from(data[0]) << 8 | u16::from(data[1]),
            start_time: time::utc_time(&data[2..7]),
            duration,
            running_status: RunningStatus::from(data[10] >> 5),
            free_ca_mode: data[10] & 0b0001_0000 != 0,
            descriptors,
        };
        Ok((event, len))
    }

    /// The short event descriptor giving this event's name and summary
    pub fn short_event(&self) -> Option<&ShortEventDescriptor> {
        descriptor::find(&self.descriptors, |d| match d {
            Descriptor::ShortEvent(e) => Some(e),
            _ => None,
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct EitSection {
    pub table_id: u8,
    pub service_id: u16,
    pub transport_stream_id: u16,
    pub original_network_id: u16,
    pub segment_last_section_number: u8,
    pub last_table_id: u8,
    pub events: Vec<Event>,
}

impl EitSection {
    const HEADER_SIZE: usize = 6;

    /// Decode a section read from PID `0x0012`
    pub fn from_section(section: &Section) -> Result<EitSection, PsiError> {
        section.expect_table(Pid::EIT, is_eit_table, "event_information_section")?;
        let service_id = section.table_syntax_header()?.id();
        let data = section.payload()?;
        record_len(data, "EIT header", Self::HEADER_SIZE)?;
        let mut buf = &data[Self::HEADER_SIZE..];
        let mut events = vec![];
        while !buf.is_empty() {
            let (event, len) = Event::from_bytes(buf)?;
            events.push(event);
            buf = &buf[len..];
        }
        Ok(EitSection {
            table_id: section.table_id(),
            service_id,
            transport_stream_id: u16::from(data[0]) << 8 | u16::from(data[1]),
            original_network_id: u16::from(data[2]) << 8 | u16::from(data[3]),
            segment_last_section_number: data[4],
            last_table_id: data[5],
            events,
        })
    }

    /// Present/following information for this transport stream
    pub fn is_present_following(&self) -> bool {
        self.table_id == TABLE_ID_PRESENT_ACTUAL
    }

    /// Schedule information for this transport stream
    pub fn is_schedule(&self) -> bool {
        matches!(self.table_id, 0x50..=0x5f)
    }

    /// Describes a service of some other transport stream
    pub fn is_other(&self) -> bool {
        self.table_id == TABLE_ID_PRESENT_OTHER || matches!(self.table_id, 0x60..=0x6f)
    }
}
