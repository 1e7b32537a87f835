//! Types for processing tables of *Program Specific Information* and DVB *Service Information*
//! in a transport stream.
//!
//! # Concepts
//!
//! * There are multiple standard types of table, like the *Program Association Table* and
//!   *Program Map Table* from _ISO/IEC 13818-1_, plus the DVB tables of _ETSI EN 300 468_.
//! * A table is split into *Sections*.
//! * A Section can be split across a small number of individual transport stream *Packets*,
//!   all carrying the same PID.  The first packet of a section has its
//!   `payload_unit_start_indicator` set, and its payload starts with a _pointer field_ giving the
//!   number of bytes that still belong to the previous section.
//!
//! # Core types
//!
//! * [`SectionAssembler`](struct.SectionAssembler.html) converts *Packets* into a *Section*
//! * [`read_section()`](fn.read_section.html) drives an assembler over a `PacketSource`
//! * The submodules decode sections of each specific table type
//!
//! ```
//! # use dvbt_demux::psi::Section;
//! # use dvbt_demux::packet::Pid;
//! // an (empty) program association section, CRC included
//! let data = vec![0x00, 0xb0, 0x09, 0x00, 0x01, 0xc1, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];
//! let section = Section::from_bytes(Pid::PAT, data).unwrap();
//! assert_eq!(section.table_id(), 0x00);
//! assert_eq!(section.section_length(), 9);
//! ```

pub mod eit;
pub mod nit;
pub mod pat;
pub mod pmt;
pub mod sdt;
pub mod tot;

use crate::descriptor::{self, Descriptor, DescriptorError};
use crate::packet::{ContinuityCounter, Packet, PacketError, Pid};
use crate::source::PacketSource;
use crc::{Crc, CRC_32_MPEG_2};
use log::{debug, trace, warn};
use std::fmt;
use std::io::{self, Read, Seek};
use thiserror::Error;

const CRC: Crc<u32> = Crc::<u32>::new(&CRC_32_MPEG_2);

/// Size of the trailing `CRC_32` field of a section
pub const CRC_SIZE: usize = 4;

/// `table_id` value marking the rest of a packet payload as stuffing
pub const STUFFING_TABLE_ID: u8 = 0xff;

/// Computes the _CRC-32/MPEG-2_ checksum used to protect sections.
///
/// ```
/// # use dvbt_demux::psi::crc32;
/// assert_eq!(crc32(b"123456789"), 0x0376_e6e7);
/// ```
pub fn crc32(buf: &[u8]) -> u32 {
    CRC.checksum(buf)
}

/// Problems encountered while reassembling or decoding a section
#[derive(Debug, Error)]
pub enum PsiError {
    /// A section, or the fixed header of a section, needed more bytes than were available
    #[error("truncated section on PID {pid}: {expected} bytes required, {actual} available")]
    TruncatedSection {
        /// the PID the section was read from
        pid: Pid,
        /// the number of bytes needed
        expected: usize,
        /// the number of bytes present
        actual: usize,
    },
    /// A record within a table section extends beyond the end of the section
    #[error("truncated {record}: {expected} bytes required, {actual} available")]
    TruncatedRecord {
        /// the kind of record being read
        record: &'static str,
        /// the number of bytes needed
        expected: usize,
        /// the number of bytes present
        actual: usize,
    },
    /// A new section started (the pointer field was given) at a point which does not line up
    /// with the end of the section in progress.
    #[error("overlapping section on PID {pid}: {needed:?} bytes outstanding, pointer field {pointer}")]
    OverlappingSection {
        /// the PID the section was read from
        pid: Pid,
        /// the bytes still needed by the section in progress, if its length was yet known
        needed: Option<usize>,
        /// the value of the pointer field
        pointer: usize,
    },
    /// The section does not belong to the table the caller tried to decode
    #[error("unexpected table_id 0x{table_id:02x} on PID {pid}, expected {expected}")]
    UnexpectedTable {
        /// the PID the section was read from
        pid: Pid,
        /// the `table_id` found
        table_id: u8,
        /// the kind of table that was expected
        expected: &'static str,
    },
    /// Continuity counter values show that packets were lost
    #[error("continuity gap on PID {pid}: counter {actual} does not follow {previous}")]
    ContinuityGap {
        /// the PID concerned
        pid: Pid,
        /// the previous counter value
        previous: u8,
        /// the counter value found
        actual: u8,
    },
    /// The `CRC_32` field did not match the section content
    #[error("CRC mismatch in table_id 0x{table_id:02x} section on PID {pid}")]
    CrcMismatch {
        /// the PID the section was read from
        pid: Pid,
        /// the `table_id` of the damaged section
        table_id: u8,
    },
    /// A descriptor within the section could not be read
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),
    /// A packet contributing to the section could not be read
    #[error(transparent)]
    Packet(#[from] PacketError),
    /// The underlying source failed
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Fails with `TruncatedRecord` unless `buf` holds at least `len` bytes.
pub(crate) fn record_len(buf: &[u8], record: &'static str, len: usize) -> Result<(), PsiError> {
    if buf.len() < len {
        Err(PsiError::TruncatedRecord {
            record,
            expected: len,
            actual: buf.len(),
        })
    } else {
        Ok(())
    }
}

/// Reads the descriptor loop found `offset` bytes into the sub-record `data`, returning the
/// descriptors and the record's total length.  A loop running past the end of the section is
/// reported as a `TruncatedRecord`.
pub(crate) fn record_descriptors(
    data: &[u8],
    record: &'static str,
    offset: usize,
) -> Result<(Vec<Descriptor>, usize), PsiError> {
    match descriptor::read_descriptor_loop(&data[offset..]) {
        Ok((descriptors, len)) => Ok((descriptors, offset + len)),
        Err(DescriptorError::TruncatedLoop { expected, .. }) => Err(PsiError::TruncatedRecord {
            record,
            expected: offset + expected,
            actual: data.len(),
        }),
        Err(e) => Err(e.into()),
    }
}

/// Applicability of a table section
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum CurrentNext {
    /// the section applies now
    Current,
    /// the section will become applicable later
    Next,
}

impl CurrentNext {
    fn from(v: u8) -> CurrentNext {
        if v & 1 == 1 {
            CurrentNext::Current
        } else {
            CurrentNext::Next
        }
    }
}

/// The _running_status_ of a service or event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunningStatus {
    Undefined,
    NotRunning,
    StartsInAFewSeconds,
    Pausing,
    Running,
    ServiceOffAir,
    Reserved(u8),
}
impl From<u8> for RunningStatus {
    fn from(v: u8) -> Self {
        match v {
            0 => RunningStatus::Undefined,
            1 => RunningStatus::NotRunning,
            2 => RunningStatus::StartsInAFewSeconds,
            3 => RunningStatus::Pausing,
            4 => RunningStatus::Running,
            5 => RunningStatus::ServiceOffAir,
            _ => RunningStatus::Reserved(v),
        }
    }
}

/// The three bytes which start every section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionCommonHeader {
    pub table_id: u8,
    pub section_syntax_indicator: bool,
    pub private_indicator: bool,
    pub section_length: usize,
}

impl SectionCommonHeader {
    pub const SIZE: usize = 3;

    /// Panics if fewer than `SIZE` bytes are given.
    pub fn new(buf: &[u8]) -> SectionCommonHeader {
        assert!(buf.len() >= Self::SIZE);
        SectionCommonHeader {
            table_id: buf[0],
            section_syntax_indicator: buf[1] & 0b1000_0000 != 0,
            private_indicator: buf[1] & 0b0100_0000 != 0,
            section_length: ((u16::from(buf[1] & 0b0000_1111) << 8) | u16::from(buf[2])) as usize,
        }
    }
}

/// Represents the fields that appear within table sections that use the common 'section syntax'.
///
/// Only sections whose `section_syntax_indicator` is set carry these fields.
pub struct TableSyntaxHeader<'buf> {
    buf: &'buf [u8],
}

impl<'buf> TableSyntaxHeader<'buf> {
    pub const SIZE: usize = 5;

    /// Panics if fewer than `SIZE` bytes are given.
    pub fn new(buf: &'buf [u8]) -> TableSyntaxHeader<'buf> {
        assert!(buf.len() >= Self::SIZE);
        TableSyntaxHeader { buf }
    }
    /// The 16-bit field immediately following `section_length`.  Depending on the table, this is
    /// the `transport_stream_id`, `program_number`, `network_id` or `service_id`.
    pub fn id(&self) -> u16 {
        u16::from(self.buf[0]) << 8 | u16::from(self.buf[1])
    }
    /// A 5-bit value that changes whenever the table content changes.
    pub fn version(&self) -> u8 {
        (self.buf[2] >> 1) & 0b0001_1111
    }
    /// Is this table applicable now, or will it become applicable at some future time.
    pub fn current_next_indicator(&self) -> CurrentNext {
        CurrentNext::from(self.buf[2] & 1)
    }
    /// The number of this section, within a potentially multi-section table.
    pub fn section_number(&self) -> u8 {
        self.buf[3]
    }
    /// The `section_number()` of the final section of the table.
    pub fn last_section_number(&self) -> u8 {
        self.buf[4]
    }
}
impl<'buf> fmt::Debug for TableSyntaxHeader<'buf> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        f.debug_struct("TableSyntaxHeader")
            .field("id", &self.id())
            .field("version", &self.version())
            .field("current_next_indicator", &self.current_next_indicator())
            .field("section_number", &self.section_number())
            .field("last_section_number", &self.last_section_number())
            .finish()
    }
}

/// A complete section, as read from the given PID: the common header, the body and (for most
/// tables) the trailing CRC.
#[derive(Clone, PartialEq, Eq)]
pub struct Section {
    pid: Pid,
    data: Vec<u8>,
}

impl Section {
    /// Wraps the bytes of a section.  Bytes beyond the declared `section_length` are stuffing
    /// and are dropped.
    pub fn from_bytes(pid: Pid, mut data: Vec<u8>) -> Result<Section, PsiError> {
        if data.len() < SectionCommonHeader::SIZE {
            return Err(PsiError::TruncatedSection {
                pid,
                expected: SectionCommonHeader::SIZE,
                actual: data.len(),
            });
        }
        let header = SectionCommonHeader::new(&data[..SectionCommonHeader::SIZE]);
        let len = SectionCommonHeader::SIZE + header.section_length;
        if data.len() < len {
            return Err(PsiError::TruncatedSection {
                pid,
                expected: len,
                actual: data.len(),
            });
        }
        data.truncate(len);
        Ok(Section { pid, data })
    }

    /// The PID the section was read from
    pub fn pid(&self) -> Pid {
        self.pid
    }
    pub fn header(&self) -> SectionCommonHeader {
        SectionCommonHeader::new(&self.data[..SectionCommonHeader::SIZE])
    }
    pub fn table_id(&self) -> u8 {
        self.data[0]
    }
    pub fn section_syntax_indicator(&self) -> bool {
        self.header().section_syntax_indicator
    }
    pub fn section_length(&self) -> usize {
        self.header().section_length
    }
    /// All bytes of the section, from `table_id` to the end of the CRC
    pub fn data(&self) -> &[u8] {
        &self.data
    }
    /// The bytes following the common header
    pub fn body(&self) -> &[u8] {
        &self.data[SectionCommonHeader::SIZE..]
    }

    fn truncated(&self, expected: usize) -> PsiError {
        PsiError::TruncatedSection {
            pid: self.pid,
            expected,
            actual: self.data.len(),
        }
    }

    /// The bytes following the common header, excluding the trailing `CRC_32`
    pub fn body_without_crc(&self) -> Result<&[u8], PsiError> {
        if self.data.len() < SectionCommonHeader::SIZE + CRC_SIZE {
            return Err(self.truncated(SectionCommonHeader::SIZE + CRC_SIZE));
        }
        Ok(&self.data[SectionCommonHeader::SIZE..self.data.len() - CRC_SIZE])
    }

    /// The long-form header fields, for sections using the 'section syntax'
    pub fn table_syntax_header(&self) -> Result<TableSyntaxHeader<'_>, PsiError> {
        let end = SectionCommonHeader::SIZE + TableSyntaxHeader::SIZE;
        if self.data.len() < end + CRC_SIZE {
            return Err(self.truncated(end + CRC_SIZE));
        }
        Ok(TableSyntaxHeader::new(&self.data[SectionCommonHeader::SIZE..end]))
    }

    /// The table-specific content of a long-form section, between the `TableSyntaxHeader` and the
    /// `CRC_32`
    pub fn payload(&self) -> Result<&[u8], PsiError> {
        let start = SectionCommonHeader::SIZE + TableSyntaxHeader::SIZE;
        if self.data.len() < start + CRC_SIZE {
            return Err(self.truncated(start + CRC_SIZE));
        }
        Ok(&self.data[start..self.data.len() - CRC_SIZE])
    }

    /// Does this section end with a `CRC_32`?  All long-form sections do, as does the TOT.
    pub fn has_crc(&self) -> bool {
        self.section_syntax_indicator() || self.table_id() == tot::TABLE_ID_TOT
    }

    /// Checks the trailing `CRC_32` against the rest of the section.
    pub fn verify_crc(&self) -> Result<(), PsiError> {
        if self.data.len() < SectionCommonHeader::SIZE + CRC_SIZE {
            return Err(self.truncated(SectionCommonHeader::SIZE + CRC_SIZE));
        }
        let (content, crc) = self.data.split_at(self.data.len() - CRC_SIZE);
        let expected = u32::from_be_bytes([crc[0], crc[1], crc[2], crc[3]]);
        if crc32(content) == expected {
            Ok(())
        } else {
            Err(PsiError::CrcMismatch {
                pid: self.pid,
                table_id: self.table_id(),
            })
        }
    }

    /// Fails with `UnexpectedTable` unless this section was read from `pid` and has a
    /// `table_id` accepted by `accept`.
    pub(crate) fn expect_table(
        &self,
        pid: Pid,
        accept: impl Fn(u8) -> bool,
        expected: &'static str,
    ) -> Result<(), PsiError> {
        if self.pid == pid && accept(self.table_id()) {
            Ok(())
        } else {
            Err(PsiError::UnexpectedTable {
                pid: self.pid,
                table_id: self.table_id(),
                expected,
            })
        }
    }
}
impl fmt::Debug for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        f.debug_struct("Section")
            .field("pid", &self.pid)
            .field("table_id", &format_args!("0x{:02x}", self.table_id()))
            .field("section_length", &self.section_length())
            .finish()
    }
}

/// The state of a `SectionAssembler`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblerState {
    /// Waiting for a packet starting a section
    Scanning,
    /// Part of a section has been collected
    Accumulating,
    /// A whole section was produced
    Complete,
    /// The section could not be assembled
    Failed,
}

/// Collects the bytes of one section from the packets of the target PID.
///
/// Packets are given to `push()` in stream order.  Once a section is produced (or an error
/// returned) the assembler stops accepting data until `reset()` is called.
pub struct SectionAssembler {
    pid: Pid,
    state: AssemblerState,
    buf: Vec<u8>,
    target: Option<usize>,
    last_cc: Option<ContinuityCounter>,
    packets: usize,
    gaps: usize,
}

impl SectionAssembler {
    pub fn new(pid: Pid) -> SectionAssembler {
        SectionAssembler {
            pid,
            state: AssemblerState::Scanning,
            buf: Vec::new(),
            target: None,
            last_cc: None,
            packets: 0,
            gaps: 0,
        }
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn state(&self) -> AssemblerState {
        self.state
    }

    /// The number of packets whose payload contributed to the current (or just completed) section
    pub fn packets(&self) -> usize {
        self.packets
    }

    /// The number of continuity gaps seen since this assembler was created
    pub fn continuity_gaps(&self) -> usize {
        self.gaps
    }

    /// Discard any partial section and start scanning again
    pub fn reset(&mut self) {
        self.state = AssemblerState::Scanning;
        self.buf.clear();
        self.target = None;
        self.last_cc = None;
        self.packets = 0;
    }

    /// Drop the partial section but keep the continuity counter tracking
    fn restart(&mut self) {
        self.state = AssemblerState::Scanning;
        self.buf.clear();
        self.target = None;
        self.packets = 0;
    }

    fn fail(&mut self, err: PsiError) -> Result<Option<Section>, PsiError> {
        self.state = AssemblerState::Failed;
        self.buf.clear();
        Err(err)
    }

    /// Feed the next packet of the stream.  Returns the section once its final byte arrives.
    pub fn push(&mut self, pk: &Packet<'_>) -> Result<Option<Section>, PsiError> {
        if pk.pid() != self.pid {
            return Ok(None);
        }
        match self.state {
            AssemblerState::Complete | AssemblerState::Failed => return Ok(None),
            AssemblerState::Scanning | AssemblerState::Accumulating => (),
        }
        if pk.transport_error_indicator() {
            debug!("{}: transport_error_indicator set, restarting section", self.pid);
            self.reset();
            return Ok(None);
        }
        let payload = pk.payload();
        let cc = pk.continuity_counter();
        if let Some(last) = self.last_cc {
            let expected = if payload.is_some() {
                if cc == last {
                    trace!("{}: ignoring duplicate packet, counter {}", self.pid, cc.count());
                    return Ok(None);
                }
                cc.follows(last)
            } else {
                cc == last
            };
            if !expected {
                warn!(
                    "{}",
                    PsiError::ContinuityGap {
                        pid: self.pid,
                        previous: last.count(),
                        actual: cc.count(),
                    }
                );
                self.gaps += 1;
                self.reset();
                return Ok(None);
            }
        }
        self.last_cc = Some(cc);
        let payload = match payload {
            Some(p) => p,
            None => return Ok(None),
        };

        if pk.payload_unit_start_indicator() {
            let pointer = payload[0] as usize;
            if self.state == AssemblerState::Accumulating {
                let needed = self.target.map(|t| t - self.buf.len());
                if needed.map_or(false, |n| n != pointer) {
                    return self.fail(PsiError::OverlappingSection {
                        pid: self.pid,
                        needed,
                        pointer,
                    });
                }
                if pointer + 1 > payload.len() {
                    return self.fail(PsiError::TruncatedSection {
                        pid: self.pid,
                        expected: pointer + 1,
                        actual: payload.len(),
                    });
                }
                let before = self.buf.len();
                self.buf.extend_from_slice(&payload[1..1 + pointer]);
                if needed.is_none() {
                    // the header straddled the packets; its length must end exactly at the pointer
                    let target = self.header_target();
                    if target != Some(self.buf.len()) {
                        return self.fail(PsiError::OverlappingSection {
                            pid: self.pid,
                            needed: target.map(|t| t.saturating_sub(before)),
                            pointer,
                        });
                    }
                }
            } else {
                if pointer + 1 >= payload.len() {
                    return self.fail(PsiError::TruncatedSection {
                        pid: self.pid,
                        expected: pointer + 2,
                        actual: payload.len(),
                    });
                }
                self.buf.extend_from_slice(&payload[1 + pointer..]);
                self.state = AssemblerState::Accumulating;
            }
        } else if self.state == AssemblerState::Accumulating {
            let take = match self.target {
                Some(t) => (t - self.buf.len()).min(payload.len()),
                None => payload.len(),
            };
            self.buf.extend_from_slice(&payload[..take]);
        } else {
            trace!("{}: no section in progress, ignoring continuation", self.pid);
            return Ok(None);
        }
        self.packets += 1;
        Ok(self.check_complete())
    }

    /// Total length of the section in progress, once its common header has been collected
    fn header_target(&self) -> Option<usize> {
        if self.buf.len() < SectionCommonHeader::SIZE {
            return None;
        }
        let header = SectionCommonHeader::new(&self.buf[..SectionCommonHeader::SIZE]);
        Some(SectionCommonHeader::SIZE + header.section_length)
    }

    fn check_complete(&mut self) -> Option<Section> {
        if self.target.is_none() && self.buf.len() >= SectionCommonHeader::SIZE {
            if self.buf[0] == STUFFING_TABLE_ID {
                trace!("{}: stuffing in place of section", self.pid);
                self.restart();
                return None;
            }
            self.target = self.header_target();
        }
        match self.target {
            Some(target) if self.buf.len() >= target => {
                self.buf.truncate(target);
                self.state = AssemblerState::Complete;
                Some(Section {
                    pid: self.pid,
                    data: std::mem::take(&mut self.buf),
                })
            }
            _ => None,
        }
    }
}

/// Reads the next complete section carried on `pid`, returning `None` at end of input.
///
/// When the section spanned several packets, the source is left positioned on the last of
/// them, since a new section may begin within that same packet.  On error the source is
/// left positioned on the packet that caused the failure.
pub fn read_section<R: Read + Seek>(
    source: &mut PacketSource<R>,
    pid: Pid,
) -> Result<Option<Section>, PsiError> {
    let mut assembler = SectionAssembler::new(pid);
    loop {
        let frame = source.position();
        let buf = match source.next_packet()? {
            Some(buf) => buf,
            None => return Ok(None),
        };
        let result = Packet::from_bytes(buf)
            .map_err(PsiError::from)
            .and_then(|pk| assembler.push(&pk));
        match result {
            Ok(Some(section)) => {
                if assembler.packets() > 1 {
                    source.seek_to(frame)?;
                }
                return Ok(Some(section));
            }
            Ok(None) => (),
            Err(e) => {
                source.seek_to(frame)?;
                return Err(e);
            }
        }
    }
}
