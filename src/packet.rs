//! A [`Packet`](./struct.Packet.html) struct and associated infrastructure to read a DVB
//! transport stream packet

use std::convert::TryFrom;
use std::fmt;
use thiserror::Error;

/// the different values indicating whether a `Packet`'s `adaptation_field()` and `payload()`
/// methods will return `Some` or `None`.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum AdaptationControl {
    /// This value is used if the transport stream packet `adaptation_control` field uses the value
    /// `0b00`, which is not defined by the standard.  Such packets carry neither an adaptation
    /// field nor a payload.
    Reserved,
    /// indicates that this packet contains a payload, but not an adaptation field
    PayloadOnly,
    /// indicates that this packet contains an adaptation field, but not a payload
    AdaptationFieldOnly,
    /// indicates that this packet contains both an adaptation field and a payload
    AdaptationFieldAndPayload,
}

impl AdaptationControl {
    #[inline(always)]
    fn from(val: u8) -> AdaptationControl {
        match val & 0b11 {
            0 => AdaptationControl::Reserved,
            1 => AdaptationControl::PayloadOnly,
            2 => AdaptationControl::AdaptationFieldOnly,
            _ => AdaptationControl::AdaptationFieldAndPayload,
        }
    }

    /// True if this AdaptationControl variant indicates that the packet will have a payload
    #[inline(always)]
    pub fn has_payload(self) -> bool {
        match self {
            AdaptationControl::Reserved | AdaptationControl::AdaptationFieldOnly => false,
            AdaptationControl::PayloadOnly | AdaptationControl::AdaptationFieldAndPayload => true,
        }
    }

    /// True if this AdaptationControl variant indicates that the packet will have an
    /// adaptation field
    #[inline(always)]
    pub fn has_adaptation_field(self) -> bool {
        match self {
            AdaptationControl::Reserved | AdaptationControl::PayloadOnly => false,
            AdaptationControl::AdaptationFieldOnly
            | AdaptationControl::AdaptationFieldAndPayload => true,
        }
    }
}

/// Indicates content scrambling in use, if any.
///
/// The scrambling scheme itself is defined by the conditional access system, so payloads of
/// scrambled packets are passed along untouched.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum TransportScramblingControl {
    /// The stream is not scrambled.
    NotScrambled,
    /// Reserved value `0b01`.
    Reserved,
    /// Scrambled with the even key.
    EvenKey,
    /// Scrambled with the odd key.
    OddKey,
}

impl TransportScramblingControl {
    fn from(val: u8) -> TransportScramblingControl {
        match val & 0b11 {
            0 => TransportScramblingControl::NotScrambled,
            1 => TransportScramblingControl::Reserved,
            2 => TransportScramblingControl::EvenKey,
            _ => TransportScramblingControl::OddKey,
        }
    }

    /// true for any value other than `NotScrambled`
    pub fn is_scrambled(self) -> bool {
        self != TransportScramblingControl::NotScrambled
    }
}

/// A collection of fields that may optionally appear within the header of a transport stream
/// `Packet`.
///
/// As returned by [`Packet::adaptation_field()`](struct.Packet.html#method.adaptation_field)
pub struct AdaptationField<'buf> {
    buf: &'buf [u8],
}

impl<'buf> AdaptationField<'buf> {
    /// Mask over the flags byte selecting `opcr_flag`, `splicing_point_flag`,
    /// `transport_private_data_flag` and `adaptation_field_extension_flag`.
    pub const EXTENSION_FLAGS_MASK: u8 = 0b0000_1111;

    fn new(buf: &'buf [u8]) -> Option<AdaptationField<'buf>> {
        if buf.is_empty() {
            None
        } else {
            Some(AdaptationField { buf })
        }
    }

    /// Get the value of the _discontinuity_indicator_ field which might have been written into
    /// the transport stream by some 'upstream' processor on discovering that there was a break
    /// in the data.
    pub fn discontinuity_indicator(&self) -> bool {
        self.buf[0] & 0b1000_0000 != 0
    }
    /// Get the value of the _random_access_indicator_ field.
    pub fn random_access_indicator(&self) -> bool {
        self.buf[0] & 0b0100_0000 != 0
    }
    /// Get the value of the _elementary_stream_priority_indicator_ field.
    pub fn elementary_stream_priority_indicator(&self) -> bool {
        self.buf[0] & 0b0010_0000 != 0
    }
    /// true if a _Program Clock Reference_ follows the flags byte
    pub fn pcr_flag(&self) -> bool {
        self.buf[0] & 0b0001_0000 != 0
    }
    /// The remaining optional-field flags, masked by `EXTENSION_FLAGS_MASK`.
    pub fn extension_flags(&self) -> u8 {
        self.buf[0] & Self::EXTENSION_FLAGS_MASK
    }
    /// Number of bytes following the `adaptation_field_length` byte.
    pub fn len(&self) -> usize {
        self.buf.len()
    }
    /// Always false, since an adaptation field holding no bytes is never constructed.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

impl<'buf> fmt::Debug for AdaptationField<'buf> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdaptationField")
            .field("discontinuity_indicator", &self.discontinuity_indicator())
            .field("random_access_indicator", &self.random_access_indicator())
            .field(
                "elementary_stream_priority_indicator",
                &self.elementary_stream_priority_indicator(),
            )
            .field("pcr_flag", &self.pcr_flag())
            .field("extension_flags", &format_args!("{:04b}", self.extension_flags()))
            .finish()
    }
}

/// A counter value used within a transport stream to detect discontinuities in a sequence of packets.
/// The continuity counter should increase by one for each packet with a given PID for which
/// `adaptation_control` indicates that a payload should be present.
///
/// See [`Packet.continuity_counter()`](struct.Packet.html#method.continuity_counter)
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub struct ContinuityCounter {
    val: u8,
}

impl From<u8> for ContinuityCounter {
    #[inline]
    fn from(count: u8) -> ContinuityCounter {
        ContinuityCounter::new(count)
    }
}

impl ContinuityCounter {
    /// Only the low four bits of the given value are used.
    #[inline]
    pub fn new(count: u8) -> ContinuityCounter {
        ContinuityCounter {
            val: count & 0b1111,
        }
    }

    /// Returns this counter's value, which will be between 0 and 15 inclusive.
    #[inline]
    pub fn count(self) -> u8 {
        self.val
    }

    /// true iff the given `ContinuityCounter` value follows this one.  Note that the maximum counter
    /// value is 15, and the counter 'wraps around':
    ///
    /// ```rust
    /// # use dvbt_demux::packet::ContinuityCounter;
    /// let a = ContinuityCounter::new(0);
    /// let b = ContinuityCounter::new(15);
    /// assert!(a.follows(b));  // after 15, counter wraps around to 0
    /// ```
    #[inline]
    pub fn follows(self, other: ContinuityCounter) -> bool {
        (other.val + 1) & 0b1111 == self.val
    }
}

/// A Packet Identifier value, between `0x0000` and `0x1fff`.
///
/// PID values identify a particular sub-stream within the overall Transport Stream.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pid(u16);
impl Pid {
    /// The largest possible PID value, `0x1fff`.
    pub const MAX_VALUE: u16 = 0x1fff;

    /// The total number of distinct PID values, `0x2000` (equal to `MAX_VALUE` + 1)
    pub const PID_COUNT: usize = (Self::MAX_VALUE + 1) as usize;

    /// Program Association Table
    pub const PAT: Pid = Pid::new(0x0000);
    /// Default Network Information Table PID, used when the PAT does not name one
    pub const NIT: Pid = Pid::new(0x0010);
    /// Service Description Table
    pub const SDT: Pid = Pid::new(0x0011);
    /// Event Information Table
    pub const EIT: Pid = Pid::new(0x0012);
    /// Time and Date / Time Offset Table
    pub const TOT: Pid = Pid::new(0x0014);
    /// Null packets
    pub const STUFFING: Pid = Pid::new(0x1fff);

    /// Panics if the given value is greater than `Pid::MAX_VALUE`.
    pub const fn new(pid: u16) -> Pid {
        assert!(pid <= 0x1fff);
        Pid(pid)
    }

    /// Builds a Pid from the low 13 bits of the given big-endian pair of bytes.
    #[inline]
    pub fn from_bytes(hi: u8, lo: u8) -> Pid {
        Pid(u16::from(hi & 0b0001_1111) << 8 | u16::from(lo))
    }
}
impl TryFrom<u16> for Pid {
    type Error = ();

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        if value <= Pid::MAX_VALUE {
            Ok(Pid(value))
        } else {
            Err(())
        }
    }
}
impl From<Pid> for u16 {
    #[inline]
    fn from(pid: Pid) -> Self {
        pid.0
    }
}
impl From<Pid> for usize {
    #[inline]
    fn from(pid: Pid) -> Self {
        pid.0 as usize
    }
}
impl fmt::Debug for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "Pid({:04x})", self.0)
    }
}
impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "0x{:04x}", self.0)
    }
}

/// Problems preventing a buffer from being interpreted as a transport stream packet
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PacketError {
    /// The buffer was not exactly `Packet::SIZE` bytes, or did not start with the sync byte.
    #[error("malformed packet: {len} bytes, first byte {first:?}")]
    MalformedPacket {
        /// length of the rejected buffer
        len: usize,
        /// the value found where the sync byte was expected, if any
        first: Option<u8>,
    },
}

/// A transport stream `Packet` is a wrapper around a byte slice which allows the bytes to be
/// interpreted as a packet structure per _ISO/IEC 13818-1, Section 2.4.3.3_.
pub struct Packet<'buf> {
    buf: &'buf [u8],
}

const FIXED_HEADER_SIZE: usize = 4;
// when AF present, a 1-byte 'length' field precedes the content,
const ADAPTATION_FIELD_OFFSET: usize = FIXED_HEADER_SIZE + 1;
const MAX_ADAPTATION_FIELD_LENGTH: usize = 183;

impl<'buf> Packet<'buf> {
    /// The value `0x47`, which must appear in the first byte of every transport stream packet.
    pub const SYNC_BYTE: u8 = 0x47;

    /// The fixed 188 byte size of a transport stream packet.
    pub const SIZE: usize = 188;

    /// returns `true` if the given value is a valid synchronisation byte, the value
    /// `Packet::SYNC_BYTE` (0x47), which must appear at the start of every transport stream
    /// packet.
    #[inline(always)]
    pub fn is_sync_byte(b: u8) -> bool {
        b == Self::SYNC_BYTE
    }

    /// Wraps the given buffer, failing with `PacketError::MalformedPacket` unless it is exactly
    /// `Packet::SIZE` bytes starting with `Packet::SYNC_BYTE`.
    pub fn from_bytes(buf: &'buf [u8]) -> Result<Packet<'buf>, PacketError> {
        if buf.len() != Self::SIZE || !Self::is_sync_byte(buf[0]) {
            return Err(PacketError::MalformedPacket {
                len: buf.len(),
                first: buf.first().copied(),
            });
        }
        Ok(Packet { buf })
    }

    /// *May* have been set if some previous processing of this TS data detected at least
    /// 1 uncorrectable bit error in this TS packet.
    #[inline]
    pub fn transport_error_indicator(&self) -> bool {
        self.buf[1] & 0b1000_0000 != 0
    }

    /// a structure larger than a single packet payload needs to be split across multiple packets,
    /// `payload_unit_start()` indicates if this packet payload contains the start of the
    /// structure.  If `false`, this packets payload is a continuation of a structure which began
    /// in an earlier packet within the transport stream.
    #[inline]
    pub fn payload_unit_start_indicator(&self) -> bool {
        self.buf[1] & 0b0100_0000 != 0
    }

    /// When `1`, this TS packet has higher priority than other packets of the the same PID.
    pub fn transport_priority(&self) -> bool {
        self.buf[1] & 0b0010_0000 != 0
    }

    /// The sub-stream to which a particular packet belongs is indicated by this Packet Identifier
    /// value.
    #[inline]
    pub fn pid(&self) -> Pid {
        Pid::from_bytes(self.buf[1], self.buf[2])
    }

    /// Value of the _transport_scrambling_control_ field.
    pub fn transport_scrambling_control(&self) -> TransportScramblingControl {
        TransportScramblingControl::from(self.buf[3] >> 6)
    }

    /// The returned enum value indicates if `adaptation_field()`, `payload()` or both will return
    /// something.
    #[inline]
    pub fn adaptation_control(&self) -> AdaptationControl {
        AdaptationControl::from(self.buf[3] >> 4)
    }

    /// Each packet with a given `pid()` value within a transport stream should have a continuity
    /// counter value which increases by 1 from the last counter value seen.
    #[inline]
    pub fn continuity_counter(&self) -> ContinuityCounter {
        ContinuityCounter::new(self.buf[3] & 0b0000_1111)
    }

    /// declared _adaptation_field_length_, clamped to the 183 bytes which could possibly fit
    fn adaptation_field_length(&self) -> usize {
        (self.buf[FIXED_HEADER_SIZE] as usize).min(MAX_ADAPTATION_FIELD_LENGTH)
    }

    /// Number of bytes occupied by the fixed packet header.
    pub fn header_len(&self) -> usize {
        FIXED_HEADER_SIZE
    }

    /// Number of bytes belonging to the adaptation field, including its length byte.  When the
    /// packet has no payload the adaptation field occupies everything after the header.
    pub fn adaptation_field_len(&self) -> usize {
        match self.adaptation_control() {
            AdaptationControl::Reserved | AdaptationControl::PayloadOnly => 0,
            AdaptationControl::AdaptationFieldOnly => Self::SIZE - FIXED_HEADER_SIZE,
            AdaptationControl::AdaptationFieldAndPayload => 1 + self.adaptation_field_length(),
        }
    }

    /// Number of payload bytes, possibly zero.
    pub fn payload_len(&self) -> usize {
        if self.adaptation_control().has_payload() {
            Self::SIZE - self.content_offset()
        } else {
            0
        }
    }

    /// An `AdaptationField` contains additional packet headers that may be present in the packet.
    /// `None` if absent or if the declared length is zero.
    pub fn adaptation_field(&self) -> Option<AdaptationField<'buf>> {
        if !self.adaptation_control().has_adaptation_field() {
            return None;
        }
        let len = self.adaptation_field_length();
        AdaptationField::new(&self.buf[ADAPTATION_FIELD_OFFSET..ADAPTATION_FIELD_OFFSET + len])
    }

    /// The data contained within the packet, not including the packet headers.
    /// Not all packets have a payload, and `None` is returned if `adaptation_control()` indicates
    /// that no payload is present, or if the adaptation field fills the whole packet.
    /// If `Some` payload is returned, it is guaranteed not to be an empty slice.
    #[inline(always)]
    pub fn payload(&self) -> Option<&'buf [u8]> {
        if !self.adaptation_control().has_payload() {
            return None;
        }
        let offset = self.content_offset();
        if offset >= self.buf.len() {
            None
        } else {
            Some(&self.buf[offset..])
        }
    }

    /// borrow a reference to the underlying buffer of this packet
    pub fn buffer(&self) -> &'buf [u8] {
        self.buf
    }

    #[inline]
    fn content_offset(&self) -> usize {
        FIXED_HEADER_SIZE + self.adaptation_field_len()
    }
}

impl<'buf> fmt::Debug for Packet<'buf> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Packet")
            .field("pid", &self.pid())
            .field("pusi", &self.payload_unit_start_indicator())
            .field("tei", &self.transport_error_indicator())
            .field("cc", &self.continuity_counter().count())
            .field("adaptation_control", &self.adaptation_control())
            .field("payload_len", &self.payload_len())
            .finish()
    }
}

#[cfg(test)]
mod test {
    use crate::packet::*;
    use assert_matches::assert_matches;

    fn packet_with(control: u8, af_len: u8) -> [u8; Packet::SIZE] {
        let mut buf = [0xffu8; Packet::SIZE];
        buf[0] = Packet::SYNC_BYTE;
        buf[1] = 0x41;
        buf[2] = 0x00;
        buf[3] = control << 4 | 0x7;
        buf[4] = af_len;
        buf
    }

    #[test]
    fn pid() {
        assert!(Pid::try_from(0x2000).is_err());
        assert_eq!(Pid::from_bytes(0xff, 0xff), Pid::STUFFING);
        assert_eq!(format!("{}", Pid::SDT), "0x0011");
    }

    #[test]
    fn wrong_size() {
        let buf = [0x47u8; 187];
        assert_matches!(
            Packet::from_bytes(&buf[..]),
            Err(PacketError::MalformedPacket { len: 187, .. })
        );
        assert_matches!(
            Packet::from_bytes(&[][..]),
            Err(PacketError::MalformedPacket { len: 0, first: None })
        );
    }

    #[test]
    fn lost_sync() {
        let mut buf = [0u8; Packet::SIZE];
        buf[0] = 0x46;
        assert_matches!(
            Packet::from_bytes(&buf[..]),
            Err(PacketError::MalformedPacket { first: Some(0x46), .. })
        );
    }

    #[test]
    fn header_fields() {
        let mut buf = [0xffu8; Packet::SIZE];
        buf[0] = Packet::SYNC_BYTE;
        buf[4] = 28;
        let pk = Packet::from_bytes(&buf[..]).unwrap();
        assert_eq!(u16::from(pk.pid()), 0b1111111111111u16);
        assert!(pk.transport_error_indicator());
        assert!(pk.payload_unit_start_indicator());
        assert!(pk.transport_priority());
        assert_eq!(
            pk.transport_scrambling_control(),
            TransportScramblingControl::OddKey
        );
        assert_eq!(
            pk.adaptation_control(),
            AdaptationControl::AdaptationFieldAndPayload
        );
        assert_eq!(pk.continuity_counter().count(), 0b1111);
        let af = pk.adaptation_field().unwrap();
        assert!(af.discontinuity_indicator());
        assert!(af.random_access_indicator());
        assert!(af.elementary_stream_priority_indicator());
        assert!(af.pcr_flag());
        assert_eq!(af.extension_flags(), 0b1111);
        assert_eq!(af.len(), 28);
        assert_eq!(pk.payload().unwrap().len(), Packet::SIZE - 4 - 1 - 28);
        assert!(!format!("{:?}", pk).is_empty());
    }

    #[test]
    fn lengths_sum_to_packet_size() {
        for control in 1..=3 {
            for af_len in [0u8, 1, 7, 182, 183, 184, 255] {
                let buf = packet_with(control, af_len);
                let pk = Packet::from_bytes(&buf[..]).unwrap();
                assert_eq!(
                    pk.header_len() + pk.adaptation_field_len() + pk.payload_len(),
                    Packet::SIZE,
                    "control={} af_len={}",
                    control,
                    af_len
                );
            }
        }
    }

    #[test]
    fn payload_only() {
        let buf = packet_with(0b01, 0x12);
        let pk = Packet::from_bytes(&buf[..]).unwrap();
        assert!(pk.adaptation_field().is_none());
        let payload = pk.payload().unwrap();
        assert_eq!(payload.len(), 184);
        assert_eq!(payload[0], 0x12);
    }

    #[test]
    fn adaptation_field_only() {
        let buf = packet_with(0b10, 183);
        let pk = Packet::from_bytes(&buf[..]).unwrap();
        assert!(pk.payload().is_none());
        assert_eq!(pk.payload_len(), 0);
        assert_eq!(pk.adaptation_field().unwrap().len(), 183);
    }

    #[test]
    fn oversized_adaptation_field_is_clamped() {
        let buf = packet_with(0b11, 200);
        let pk = Packet::from_bytes(&buf[..]).unwrap();
        assert_eq!(pk.adaptation_field().unwrap().len(), 183);
        assert!(pk.payload().is_none());
        assert_eq!(pk.payload_len(), 0);
    }

    #[test]
    fn empty_adaptation_field() {
        let buf = packet_with(0b11, 0);
        let pk = Packet::from_bytes(&buf[..]).unwrap();
        assert!(pk.adaptation_field().is_none());
        assert_eq!(pk.adaptation_field_len(), 1);
        assert_eq!(pk.payload().unwrap().len(), 183);
    }

    #[test]
    fn reserved_control_has_nothing() {
        let buf = packet_with(0b00, 10);
        let pk = Packet::from_bytes(&buf[..]).unwrap();
        assert_eq!(pk.adaptation_control(), AdaptationControl::Reserved);
        assert!(pk.adaptation_field().is_none());
        assert!(pk.payload().is_none());
    }

    #[test]
    fn continuity() {
        let a = ContinuityCounter::new(3);
        assert!(ContinuityCounter::new(4).follows(a));
        assert!(!ContinuityCounter::new(5).follows(a));
        assert!(!a.follows(a));
        assert_eq!(ContinuityCounter::from(0x1f).count(), 0xf);
    }
}
