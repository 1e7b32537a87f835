//! Types related to the _Time and Date Table_ and _Time Offset Table_, both carried on PID
//! `0x0014`.  The TDT gives only the current UTC time; the TOT adds the local time offsets.

use crate::descriptor::local_time_offset::LocalTimeOffset;
use crate::descriptor::{self, Descriptor};
use crate::packet::Pid;
use crate::psi::{record_len, PsiError, Section};
use crate::time::{self, UTC_TIME_SIZE};
use chrono::NaiveDateTime;

/// `table_id` of a _time_date_section_
pub const TABLE_ID_TDT: u8 = 0x70;
/// `table_id` of a _time_offset_section_
pub const TABLE_ID_TOT: u8 = 0x73;

#[derive(Clone, Debug, PartialEq)]
pub struct TotSection {
    pub table_id: u8,
    /// `None` if the broadcast time is undefined
    pub utc_time: Option<NaiveDateTime>,
    /// Always empty for a TDT
    pub descriptors: Vec<Descriptor>,
}

impl TotSection {
    /// Decode a TOT or TDT section read from PID `0x0014`.  The TOT's CRC is not checked here.
    pub fn from_section(section: &Section) -> Result<TotSection, PsiError> {
        section.expect_table(
            Pid::TOT,
            |id| id == TABLE_ID_TDT || id == TABLE_ID_TOT,
            "time_offset_section",
        )?;
        let (data, descriptors) = if section.table_id() == TABLE_ID_TOT {
            let data = section.body_without_crc()?;
            record_len(data, "TOT header", UTC_TIME_SIZE)?;
            let (descriptors, _) = descriptor::read_descriptor_loop(&data[UTC_TIME_SIZE..])?;
            (data, descriptors)
        } else {
            (section.body(), vec![])
        };
        record_len(data, "UTC_time", UTC_TIME_SIZE)?;
        Ok(TotSection {
            table_id: section.table_id(),
            utc_time: time::utc_time(data),
            descriptors,
        })
    }

    /// The first entry of the first local time offset descriptor having any
    pub fn local_time_offset(&self) -> Option<LocalTimeOffset> {
        self.descriptors.iter().find_map(|d| match d {
            Descriptor::LocalTimeOffset(lto) => lto.first(),
            _ => None,
        })
    }
}
