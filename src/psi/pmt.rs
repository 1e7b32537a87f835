//! Types related to the _Program Map Table_

use crate::descriptor::{self, Descriptor};
use crate::packet::Pid;
use crate::psi::{record_descriptors, record_len, PsiError, Section};
use crate::StreamType;
use std::fmt;

/// `table_id` of a _TS_program_map_section_
pub const TABLE_ID: u8 = 0x02;

/// Sections of the _Program Map Table_ give details of the streams within a particular program
#[derive(Clone, PartialEq)]
pub struct PmtSection {
    pub program_number: u16,
    pub pcr_pid: Pid,
    pub descriptors: Vec<Descriptor>,
    pub streams: Vec<StreamInfo>,
}
impl fmt::Debug for PmtSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        f.debug_struct("PmtSection")
            .field("program_number", &self.program_number)
            .field("pcr_pid", &self.pcr_pid)
            .field("descriptors", &self.descriptors)
            .field("streams", &self.streams)
            .finish()
    }
}

impl PmtSection {
    const HEADER_SIZE: usize = 2;

    /// Decode a section read from the given PMT PID (as announced in the PAT)
    pub fn from_section(section: &Section, pid: Pid) -> Result<PmtSection, PsiError> {
        section.expect_table(pid, |id| id == TABLE_ID, "TS_program_map_section")?;
        let program_number = section.table_syntax_header()?.id();
        let data = section.payload()?;
        record_len(data, "PMT header", Self::HEADER_SIZE)?;
        let pcr_pid = Pid::from_bytes(data[0], data[1]);
        let (descriptors, len) = descriptor::read_descriptor_loop(&data[Self::HEADER_SIZE..])?;
        let mut buf = &data[Self::HEADER_SIZE + len..];
        let mut streams = vec![];
        while !buf.is_empty() {
            let (stream, len) = StreamInfo::from_bytes(buf)?;
            streams.push(stream);
            buf = &buf[len..];
        }
        Ok(PmtSection {
            program_number,
            pcr_pid,
            descriptors,
            streams,
        })
    }
}

/// Details of a particular elementary stream within a program.
///
///  - `stream_type` gives an indication of the kind of content carried within the stream
///  - The `elementary_pid` property allows us to find Transport Stream packets that belong to the
///    elementary stream
///  - `descriptors` _may_ provide extra metadata describing some of the
///     stream's properties (for example, the streams 'language' might be given in a descriptor; or
///     it might not)
#[derive(Clone, PartialEq)]
pub struct StreamInfo {
    pub stream_type: StreamType,
    pub elementary_pid: Pid,
    pub descriptors: Vec<Descriptor>,
}

impl StreamInfo {
    const HEADER_SIZE: usize = 3;

    fn from_bytes(data: &[u8]) -> Result<(StreamInfo, usize), PsiError> {
        record_len(data, "PMT stream info", Self::HEADER_SIZE)?;
        let (descriptors, len) = record_descriptors(data, "PMT stream info", Self::HEADER_SIZE)?;
        let info = StreamInfo {
            stream_type: data[0].into(),
            elementary_pid: Pid::from_bytes(data[1], data[2]),
            descriptors,
        };
        Ok((info, len))
    }
}
impl fmt::Debug for StreamInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        f.debug_struct("StreamInfo")
            .field("stream_type", &self.stream_type)
            .field("elementary_pid", &self.elementary_pid)
            .field("descriptors", &self.descriptors)
            .finish()
    }
}
