//! Support for Packetised Elementary Stream syntax within Transport Stream packet payloads.
//! Elementary streams are split into 'elementary stream packets', which are then further split into
//! the payloads of transport stream packets.
//!
//! A [`PesReassembler`](struct.PesReassembler.html) collects the pieces carried on one PID back
//! into whole [`ElementaryUnit`](struct.ElementaryUnit.html)s, stripping the PES header, and
//! hands each completed unit to a [`UnitSink`](../sink/trait.UnitSink.html).  A unit is only
//! known to be complete when the next one starts, so the final unit of a stream is delivered by
//! `finish()`.

use crate::packet::{ContinuityCounter, Packet, Pid};
use crate::sink::UnitSink;
use log::{debug, trace, warn};
use std::{fmt, io, mem, num};
use thiserror::Error;

/// Type for the length of a PES packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PesLength {
    /// `PES_packet_length` of zero: the PES packet continues until the next TS packet that has
    /// `payload_unit_start_indicator` set.  Normally seen on video streams, whose units can exceed
    /// the 65535 bytes the field can express.
    Unbounded,
    /// The PES packet's length (likely to exceed the size of the TS packet that contains the
    /// PES packet header).
    Bounded(num::NonZeroU16),
}

/// Values identifying the kind of content within the Packetized Elementary Stream, per
/// _ISO/IEC 13818-1_, _Table 2-22_.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamId {
    /// `program_stream_map`
    ProgramStreamMap,
    /// `private_stream_1`, used in DVB for AC-3, subtitles and teletext
    PrivateStream1,
    /// `padding_stream`
    PaddingStream,
    /// `private_stream_2`
    PrivateStream2,
    /// ISO/IEC 13818-3 or ISO/IEC 11172-3 or ISO/IEC 13818-7 or ISO/IEC 14496-3 audio stream
    Audio(u8),
    /// Rec. ITU-T H.262 | ISO/IEC 13818-2, ISO/IEC 11172-2, ISO/IEC 14496-2, Rec. ITU-T H.264 |
    /// ISO/IEC 14496-10 or Rec. ITU-T H.265 | ISO/IEC 23008-2 video stream
    Video(u8),
    /// `ECM_stream`
    EcmStream,
    /// `EMM_stream`
    EmmStream,
    /// Rec. ITU-T H.222.0 | ISO/IEC 13818-1 Annex B or ISO/IEC 13818-6_DSMCC_stream
    DsmCc,
    /// `program_stream_directory`
    ProgramStreamDirectory,
    /// Any other stream_id value
    Other(u8),
}
impl StreamId {
    /// Stream ids whose PES header continues with the optional fields: two flag bytes, the
    /// `PES_header_data_length` and that many bytes of header data.
    fn has_header_extension(self) -> bool {
        matches!(
            self,
            StreamId::PrivateStream1 | StreamId::Audio(_) | StreamId::Video(_)
        )
    }
}
impl From<u8> for StreamId {
    fn from(v: u8) -> Self {
        match v {
            0b1011_1100 => StreamId::ProgramStreamMap,
            0b1011_1101 => StreamId::PrivateStream1,
            0b1011_1110 => StreamId::PaddingStream,
            0b1011_1111 => StreamId::PrivateStream2,
            0b1100_0000..=0b1101_1111 => StreamId::Audio(v & 0b0001_1111),
            0b1110_0000..=0b1110_1111 => StreamId::Video(v & 0b0000_1111),
            0b1111_0000 => StreamId::EcmStream,
            0b1111_0001 => StreamId::EmmStream,
            0b1111_0010 => StreamId::DsmCc,
            0b1111_1111 => StreamId::ProgramStreamDirectory,
            _ => StreamId::Other(v),
        }
    }
}

/// Errors which may be encountered while processing PES data.
#[derive(Debug, Error)]
pub enum PesError {
    /// The payload starting a unit did not begin with the `0x000001` start code
    #[error("invalid packet_start_code_prefix 0x{prefix:06x}, expected 0x000001")]
    MissingStartCode {
        /// the 24 bits found instead
        prefix: u32,
    },
    /// There is not enough data in the buffer to hold the expected syntax element
    #[error("PES header needs {requested} bytes, only {available} available")]
    NotEnoughData {
        /// the number of bytes required to hold the requested syntax element
        requested: usize,
        /// the number of bytes actually remaining in the buffer
        available: usize,
    },
    /// The sink receiving the units failed
    #[error(transparent)]
    Sink(#[from] io::Error),
}

/// Reads `buf` as a big-endian unsigned value.
fn accumulate(buf: &[u8]) -> u32 {
    buf.iter().fold(0, |acc, &b| acc << 8 | u32::from(b))
}

/// Header at the start of every PES packet.
///
/// The header identifies the stream, the declared size of the packet (which may well be larger
/// than the payload of the transport stream packet holding the header) and the number of header
/// bytes preceding the elementary stream data.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PesHeader {
    stream_id: StreamId,
    pes_packet_length: PesLength,
    header_len: usize,
}
impl PesHeader {
    const FIXED_HEADER_SIZE: usize = 6;
    const EXTENSION_SIZE: usize = 3;

    /// Parses the header at the start of the given slice, failing if the start code prefix is
    /// missing or if the header does not fit in the buffer.
    pub fn from_bytes(buf: &[u8]) -> Result<PesHeader, PesError> {
        if buf.len() < Self::FIXED_HEADER_SIZE {
            return Err(PesError::NotEnoughData {
                requested: Self::FIXED_HEADER_SIZE,
                available: buf.len(),
            });
        }
        let prefix = accumulate(&buf[0..3]);
        if prefix != 1 {
            return Err(PesError::MissingStartCode { prefix });
        }
        let stream_id = StreamId::from(buf[3]);
        let pes_packet_length = match num::NonZeroU16::new(accumulate(&buf[4..6]) as u16) {
            None => PesLength::Unbounded,
            Some(l) => PesLength::Bounded(l),
        };
        let mut header_len = Self::FIXED_HEADER_SIZE;
        if stream_id.has_header_extension() {
            let fixed = Self::FIXED_HEADER_SIZE + Self::EXTENSION_SIZE;
            if buf.len() < fixed {
                return Err(PesError::NotEnoughData {
                    requested: fixed,
                    available: buf.len(),
                });
            }
            header_len = fixed + buf[fixed - 1] as usize;
            if buf.len() < header_len {
                return Err(PesError::NotEnoughData {
                    requested: header_len,
                    available: buf.len(),
                });
            }
        }
        Ok(PesHeader {
            stream_id,
            pes_packet_length,
            header_len,
        })
    }

    /// Indicator of the type of stream per _ISO/IEC 13818-1_, _Table 2-18_.
    pub fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    /// The overall length of the PES packet, once all pieces from the transport stream have
    /// been collected.
    pub fn pes_packet_length(&self) -> PesLength {
        self.pes_packet_length
    }

    /// The number of bytes preceding the elementary stream data
    pub fn header_len(&self) -> usize {
        self.header_len
    }
}
impl fmt::Debug for PesHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        f.debug_struct("PesHeader")
            .field("stream_id", &self.stream_id)
            .field("pes_packet_length", &self.pes_packet_length)
            .field("header_len", &self.header_len)
            .finish()
    }
}

/// The elementary stream data of one PES packet, reassembled from the transport stream packets
/// that carried it.
#[derive(Clone, PartialEq, Eq)]
pub struct ElementaryUnit {
    pub pid: Pid,
    /// `None` for scrambled units, whose header can not be read
    pub header: Option<PesHeader>,
    /// Set if any contributing packet was scrambled, in which case `payload` holds the raw
    /// packet payloads, header included
    pub scrambled: bool,
    pub payload: Vec<u8>,
}
impl fmt::Debug for ElementaryUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        f.debug_struct("ElementaryUnit")
            .field("pid", &self.pid)
            .field("header", &self.header)
            .field("scrambled", &self.scrambled)
            .field("len", &self.payload.len())
            .finish()
    }
}

#[derive(Debug)]
enum PesState {
    /// Nothing started yet; continuation data is discarded
    Begin,
    Started(ElementaryUnit),
    /// A unit was lost or damaged; ignore data until the next unit starts
    IgnoreRest,
}

/// Rebuilds the `ElementaryUnit`s carried on a single PID.
pub struct PesReassembler {
    pid: Pid,
    ccounter: Option<ContinuityCounter>,
    state: PesState,
    continuity_errors: usize,
}
impl PesReassembler {
    pub fn new(pid: Pid) -> PesReassembler {
        PesReassembler {
            pid,
            ccounter: None,
            state: PesState::Begin,
            continuity_errors: 0,
        }
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// The number of gaps in continuity counter values seen so far
    pub fn continuity_errors(&self) -> usize {
        self.continuity_errors
    }

    /// `None` if the packet repeats the previous one, otherwise whether it follows on
    fn check_continuity(&self, packet: &Packet<'_>) -> Option<bool> {
        let cc = match self.ccounter {
            Some(cc) => cc,
            None => return Some(true),
        };
        let this = packet.continuity_counter();
        // counter only increases if the packet has a payload,
        if packet.adaptation_control().has_payload() {
            if this == cc {
                None
            } else {
                Some(this.follows(cc))
            }
        } else {
            Some(this == cc)
        }
    }

    /// Consumes the next packet of the PID, passing any unit it completes to `sink`.
    ///
    /// An error parsing the PES header of a new unit drops that unit; any unit it completed has
    /// already been delivered.
    pub fn push<S>(&mut self, packet: &Packet<'_>, sink: &mut S) -> Result<(), PesError>
    where
        S: UnitSink + ?Sized,
    {
        match self.check_continuity(packet) {
            None => {
                trace!("{}: duplicate packet", self.pid);
                return Ok(());
            }
            Some(false) => {
                warn!(
                    "{}: continuity counter {} after {:?}, dropping unit",
                    self.pid,
                    packet.continuity_counter().count(),
                    self.ccounter.map(ContinuityCounter::count)
                );
                self.continuity_errors += 1;
                if let PesState::Started(_) = self.state {
                    self.state = PesState::IgnoreRest;
                }
            }
            Some(true) => (),
        }
        self.ccounter = Some(packet.continuity_counter());
        let payload = match packet.payload() {
            Some(payload) => payload,
            None => return Ok(()),
        };
        let scrambled = packet.transport_scrambling_control().is_scrambled();
        if packet.payload_unit_start_indicator() {
            if let PesState::Started(unit) = mem::replace(&mut self.state, PesState::IgnoreRest) {
                self.deliver(unit, sink)?;
            }
            let unit = if scrambled {
                ElementaryUnit {
                    pid: self.pid,
                    header: None,
                    scrambled: true,
                    payload: payload.to_vec(),
                }
            } else {
                let header = PesHeader::from_bytes(payload)?;
                ElementaryUnit {
                    pid: self.pid,
                    header: Some(header),
                    scrambled: false,
                    payload: payload[header.header_len()..].to_vec(),
                }
            };
            self.state = PesState::Started(unit);
        } else {
            match self.state {
                PesState::Started(ref mut unit) => {
                    unit.scrambled |= scrambled;
                    unit.payload.extend_from_slice(payload);
                }
                PesState::Begin => {
                    debug!(
                        "{}: ignoring elementary stream content without a payload_unit_start_indicator",
                        self.pid
                    );
                }
                PesState::IgnoreRest => (),
            }
        }
        Ok(())
    }

    fn deliver<S>(&self, unit: ElementaryUnit, sink: &mut S) -> Result<(), PesError>
    where
        S: UnitSink + ?Sized,
    {
        if unit.payload.is_empty() {
            trace!("{}: dropping empty unit", self.pid);
            Ok(())
        } else {
            sink.accept(unit).map_err(PesError::from)
        }
    }

    /// At end of input, delivers the final unit, which no following unit start will complete.
    pub fn finish<S>(&mut self, sink: &mut S) -> Result<(), PesError>
    where
        S: UnitSink + ?Sized,
    {
        if let PesState::Started(unit) = mem::replace(&mut self.state, PesState::Begin) {
            self.deliver(unit, sink)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_util::{packet, packetize_pes};
    use assert_matches::assert_matches;
    use bitstream_io::{BigEndian, BitWrite, BitWriter, BE};
    use hex_literal::hex;

    const PID: Pid = Pid::new(0x101);

    fn make_test_data<F>(builder: F) -> Vec<u8>
    where
        F: Fn(&mut BitWriter<Vec<u8>, BE>) -> Result<(), io::Error>,
    {
        let data: Vec<u8> = Vec::new();
        let mut w = BitWriter::endian(data, BigEndian);
        builder(&mut w).unwrap();
        w.into_writer()
    }

    /// An audio PES packet with a PTS in its header, followed by `payload`
    fn audio_pes(payload: &[u8]) -> Vec<u8> {
        let mut data = make_test_data(|w| {
            w.write(24, 1)?; // packet_start_code_prefix
            w.write(8, 0xc0)?; // stream_id
            w.write(16, 8 + payload.len() as u32)?; // PES_packet_length
            w.write(2, 0b10)?; // check-bits
            w.write(6, 0)?; // scrambling control, priority, alignment, copyright, original
            w.write(2, 0b10)?; // PTS_DTS_flags
            w.write(6, 0)?; // remaining flags
            w.write(8, 5)?; // PES_header_data_length
            w.write(4, 0b0010)?;
            w.write(3, 0)?;
            w.write(1, 1)?; // marker_bit
            w.write(15, 0)?;
            w.write(1, 1)?; // marker_bit
            w.write(15, 1234)?;
            w.write(1, 1) // marker_bit
        });
        data.extend_from_slice(payload);
        data
    }

    fn push_all(r: &mut PesReassembler, packets: &[Vec<u8>], sink: &mut Vec<ElementaryUnit>) {
        for pk in packets {
            r.push(&Packet::from_bytes(pk).unwrap(), sink).unwrap();
        }
    }

    #[test]
    fn parse_audio_header() {
        let data = audio_pes(&[0xff, 0xfd]);
        let header = PesHeader::from_bytes(&data).unwrap();
        assert_eq!(header.stream_id(), StreamId::Audio(0));
        assert_matches!(header.pes_packet_length(), PesLength::Bounded(l) if l.get() == 10);
        assert_eq!(header.header_len(), 14);
    }

    #[test]
    fn header_without_extension() {
        let header = PesHeader::from_bytes(&hex!("000001be0000 ffff")).unwrap();
        assert_eq!(header.stream_id(), StreamId::PaddingStream);
        assert_eq!(header.pes_packet_length(), PesLength::Unbounded);
        assert_eq!(header.header_len(), 6);
    }

    #[test]
    fn bad_headers() {
        assert_matches!(
            PesHeader::from_bytes(&hex!("000002c00000")),
            Err(PesError::MissingStartCode { prefix: 2 })
        );
        assert_matches!(
            PesHeader::from_bytes(&hex!("000001c0")),
            Err(PesError::NotEnoughData {
                requested: 6,
                available: 4
            })
        );
        assert_matches!(
            PesHeader::from_bytes(&hex!("000001e00000 8080 05 00")),
            Err(PesError::NotEnoughData {
                requested: 14,
                available: 10
            })
        );
    }

    #[test]
    fn reassembles_across_packets() {
        let first: Vec<u8> = (0..400).map(|i| i as u8).collect();
        let second = vec![0xaa; 10];
        let mut packets = packetize_pes(PID, &audio_pes(&first), 0);
        let next_cc = packets.len() as u8;
        packets.extend(packetize_pes(PID, &audio_pes(&second), next_cc));
        let mut r = PesReassembler::new(PID);
        let mut sink = vec![];
        push_all(&mut r, &packets, &mut sink);
        // the second unit is only complete at end of input
        assert_eq!(sink.len(), 1);
        assert_eq!(sink[0].payload, first);
        assert_eq!(sink[0].header.unwrap().stream_id(), StreamId::Audio(0));
        r.finish(&mut sink).unwrap();
        assert_eq!(sink.len(), 2);
        assert_eq!(sink[1].payload, second);
        assert!(!sink[1].scrambled);
    }

    #[test]
    fn fragments_before_first_start_are_discarded() {
        let mut packets = vec![packet(PID, false, 0, &[0x11; 20])];
        packets.extend(packetize_pes(PID, &audio_pes(&[0x22; 4]), 1));
        let mut r = PesReassembler::new(PID);
        let mut sink = vec![];
        push_all(&mut r, &packets, &mut sink);
        r.finish(&mut sink).unwrap();
        assert_eq!(sink.len(), 1);
        assert_eq!(sink[0].payload, vec![0x22; 4]);
    }

    #[test]
    fn bad_start_drops_unit() {
        let mut r = PesReassembler::new(PID);
        let mut sink = vec![];
        push_all(&mut r, &packetize_pes(PID, &audio_pes(&[1, 2, 3]), 0), &mut sink);
        let bad = packet(PID, true, 1, &hex!("000002c00000"));
        assert_matches!(
            r.push(&Packet::from_bytes(&bad).unwrap(), &mut sink),
            Err(PesError::MissingStartCode { .. })
        );
        // the unit before the damaged one was still delivered
        assert_eq!(sink.len(), 1);
        // continuation of the damaged unit is ignored
        let cont = packet(PID, false, 2, &[0x33; 10]);
        r.push(&Packet::from_bytes(&cont).unwrap(), &mut sink).unwrap();
        r.finish(&mut sink).unwrap();
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn continuity_gap_drops_unit() {
        let unit: Vec<u8> = vec![0x44; 300];
        let mut packets = packetize_pes(PID, &audio_pes(&unit), 0);
        // counter 1 went missing
        packets[1][3] = (packets[1][3] & 0xf0) | 2;
        packets.extend(packetize_pes(PID, &audio_pes(&[0x55; 3]), 3));
        let mut r = PesReassembler::new(PID);
        let mut sink = vec![];
        push_all(&mut r, &packets, &mut sink);
        r.finish(&mut sink).unwrap();
        assert_eq!(r.continuity_errors(), 1);
        assert_eq!(sink.len(), 1);
        assert_eq!(sink[0].payload, vec![0x55; 3]);
    }

    #[test]
    fn scrambled_payload_passed_through() {
        let mut pk = packet(PID, true, 0, &[0x99; 30]);
        pk[3] |= 0b1000_0000; // even key
        let mut r = PesReassembler::new(PID);
        let mut sink = vec![];
        r.push(&Packet::from_bytes(&pk).unwrap(), &mut sink).unwrap();
        r.finish(&mut sink).unwrap();
        assert_eq!(sink.len(), 1);
        assert!(sink[0].scrambled);
        assert!(sink[0].header.is_none());
        assert_eq!(sink[0].payload, vec![0x99; 30]);
    }
}
