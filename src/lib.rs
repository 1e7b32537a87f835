//! Demultiplexing of DVB-T transport streams recorded to a file, per _ISO/IEC 13818-1_ and
//! _ETSI EN 300 468_.
//!
//! # Design principals
//!
//!  * *Replayable input*.  The source is a finite, seekable recording.  Service information is
//!    discovered with one pass per table over the [`PacketSource`](source/struct.PacketSource.html),
//!    after which a single forward pass routes elementary stream data.
//!  * *Recover, don't abort*.  Broadcast recordings contain lost and damaged packets.  Section
//!    reads that fail are retried from the following packet, and only a missing _Program
//!    Association Table_ is fatal.
//!  * *Owned results*.  Decoded tables and descriptors own their bytes, so they can outlive the
//!    packet buffer they were read from.
//!
//! # Layout
//!
//!  * [`packet`](packet/index.html), [`descriptor`](descriptor/index.html) and
//!    [`psi`](psi/index.html) decode the wire formats
//!  * [`recover`](recover/index.html) and [`discovery`](discovery/index.html) locate the tables
//!  * [`pes`](pes/index.html), [`sink`](sink/index.html) and
//!    [`demultiplex`](demultiplex/index.html) reassemble and deliver elementary streams
//!  * [`program`](program/index.html) joins the tables into per-service records

pub mod demultiplex;
pub mod descriptor;
pub mod discovery;
pub mod packet;
pub mod pes;
pub mod program;
pub mod psi;
pub mod recover;
pub mod sink;
pub mod source;
pub mod text;
pub mod time;

/// The types of elementary stream a program may carry, as given in the _Program Map Table_.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum StreamType {
    /// MPEG-1 video
    Iso11172Video,
    /// MPEG-2 video
    H262,
    /// MPEG-1 audio
    Iso11172Audio,
    /// MPEG-2 audio
    Iso138183Audio,
    /// Private sections
    H2220PrivateSections,
    /// PES packets containing private data, in DVB often AC-3, subtitles or teletext
    H2220PesPrivateData,
    /// DSM-CC sections
    DsmccSections,
    /// AAC audio with ADTS transport syntax
    Adts,
    /// MPEG-4 visual
    Iso144962Visual,
    /// AAC audio with LATM transport syntax
    Latm,
    /// AVC video
    H264,
    /// HEVC video
    H265,
    /// 0x80-0xff privately defined
    Private(u8),
    /// Any other value
    Reserved(u8),
}

impl StreamType {
    /// Stream types whose payload can be dumped as a raw video elementary stream
    pub fn is_video(self) -> bool {
        matches!(
            self,
            StreamType::Iso11172Video | StreamType::H262 | StreamType::H264 | StreamType::H265
        )
    }

    /// Stream types carrying MPEG or AAC audio
    pub fn is_audio(self) -> bool {
        matches!(
            self,
            StreamType::Iso11172Audio
                | StreamType::Iso138183Audio
                | StreamType::Adts
                | StreamType::Latm
        )
    }
}

impl From<u8> for StreamType {
    fn from(val: u8) -> Self {
        match val {
            0x01 => StreamType::Iso11172Video,
            0x02 => StreamType::H262,
            0x03 => StreamType::Iso11172Audio,
            0x04 => StreamType::Iso138183Audio,
            0x05 => StreamType::H2220PrivateSections,
            0x06 => StreamType::H2220PesPrivateData,
            0x0D => StreamType::DsmccSections,
            0x0F => StreamType::Adts,
            0x10 => StreamType::Iso144962Visual,
            0x11 => StreamType::Latm,
            0x1b => StreamType::H264,
            0x24 => StreamType::H265,
            _ => {
                if val >= 0x80 {
                    StreamType::Private(val)
                } else {
                    StreamType::Reserved(val)
                }
            }
        }
    }
}

impl From<StreamType> for u8 {
    fn from(val: StreamType) -> Self {
        match val {
            StreamType::Iso11172Video => 0x01,
            StreamType::H262 => 0x02,
            StreamType::Iso11172Audio => 0x03,
            StreamType::Iso138183Audio => 0x04,
            StreamType::H2220PrivateSections => 0x05,
            StreamType::H2220PesPrivateData => 0x06,
            StreamType::DsmccSections => 0x0D,
            StreamType::Adts => 0x0F,
            StreamType::Iso144962Visual => 0x10,
            StreamType::Latm => 0x11,
            StreamType::H264 => 0x1b,
            StreamType::H265 => 0x24,
            StreamType::Reserved(val) => val,
            StreamType::Private(val) => val,
        }
    }
}

/// Builders for synthetic transport streams
#[cfg(test)]
pub(crate) mod test_util {
    use crate::packet::{Packet, Pid};
    use crate::psi::crc32;
    use crate::source::PacketSource;
    use std::io::Cursor;

    const PAYLOAD_SIZE: usize = Packet::SIZE - 4;

    /// A single packet carrying exactly the given payload, padded with an adaptation field when
    /// the payload is short.
    pub fn packet(pid: Pid, pusi: bool, cc: u8, payload: &[u8]) -> Vec<u8> {
        assert!(payload.len() <= PAYLOAD_SIZE);
        let pid = u16::from(pid);
        let mut pk = Vec::with_capacity(Packet::SIZE);
        pk.push(Packet::SYNC_BYTE);
        pk.push((if pusi { 0x40 } else { 0 }) | (pid >> 8) as u8);
        pk.push(pid as u8);
        if payload.len() == PAYLOAD_SIZE {
            pk.push(0x10 | (cc & 0x0f));
        } else {
            pk.push(0x30 | (cc & 0x0f));
            let af_len = PAYLOAD_SIZE - 1 - payload.len();
            pk.push(af_len as u8);
            if af_len > 0 {
                pk.push(0x00);
                pk.resize(pk.len() + af_len - 1, 0xff);
            }
        }
        pk.extend_from_slice(payload);
        assert_eq!(pk.len(), Packet::SIZE);
        pk
    }

    /// A packet with an adaptation field and no payload
    pub fn adaptation_only(pid: Pid, cc: u8) -> Vec<u8> {
        let pid = u16::from(pid);
        let mut pk = vec![0xff; Packet::SIZE];
        pk[0] = Packet::SYNC_BYTE;
        pk[1] = (pid >> 8) as u8;
        pk[2] = pid as u8;
        pk[3] = 0x20 | (cc & 0x0f);
        pk[4] = 183;
        pk[5] = 0x00;
        pk
    }

    fn packetize(pid: Pid, first: Vec<u8>, rest: &[u8], cc: u8) -> Vec<Vec<u8>> {
        let mut packets = vec![];
        let split = rest.len().min(PAYLOAD_SIZE - first.len());
        let mut head = first;
        head.extend_from_slice(&rest[..split]);
        packets.push(packet(pid, true, cc, &head));
        for (i, chunk) in rest[split..].chunks(PAYLOAD_SIZE).enumerate() {
            packets.push(packet(pid, false, cc.wrapping_add(1 + i as u8), chunk));
        }
        packets
    }

    /// The packets carrying a section, the first with a zero pointer field
    pub fn packetize_section_packets(pid: Pid, section: &[u8], cc: u8) -> Vec<Vec<u8>> {
        packetize(pid, vec![0x00], section, cc)
    }

    pub fn packetize_section(pid: Pid, section: &[u8], cc: u8) -> Vec<u8> {
        packetize_section_packets(pid, section, cc).concat()
    }

    /// The packets carrying a PES packet
    pub fn packetize_pes(pid: Pid, pes: &[u8], cc: u8) -> Vec<Vec<u8>> {
        packetize(pid, vec![], pes, cc)
    }

    /// A long-form section with version 0, section 0 of 0, current, ending in a valid CRC.
    pub fn long_section(table_id: u8, id: u16, payload: &[u8]) -> Vec<u8> {
        let section_length = 5 + payload.len() + 4;
        let mut data = vec![
            table_id,
            0xb0 | (section_length >> 8) as u8,
            section_length as u8,
            (id >> 8) as u8,
            id as u8,
            0xc1,
            0x00,
            0x00,
        ];
        data.extend_from_slice(payload);
        let crc = crc32(&data);
        data.extend_from_slice(&crc.to_be_bytes());
        data
    }

    pub fn source(data: Vec<u8>) -> PacketSource<Cursor<Vec<u8>>> {
        PacketSource::new(Cursor::new(data))
    }
}
