//! Physical parameters of a DVB-T multiplex, carried in the _Network Information Table_.
//!
//! Besides the tuning information, these parameters fix the useful bitrate the multiplex can
//! carry, see [`channel_capacity()`](struct.TerrestrialDeliverySystemDescriptor.html#method.channel_capacity).

use super::{descriptor_len, DescriptorError};
use std::fmt;

/// Channel bandwidth
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Bandwidth {
    /// 8 MHz
    Mhz8,
    /// 7 MHz
    Mhz7,
    /// 6 MHz
    Mhz6,
    /// 5 MHz
    Mhz5,
    /// reserved for future use
    Reserved(u8),
}
impl From<u8> for Bandwidth {
    fn from(v: u8) -> Self {
        match v {
            0 => Bandwidth::Mhz8,
            1 => Bandwidth::Mhz7,
            2 => Bandwidth::Mhz6,
            3 => Bandwidth::Mhz5,
            _ => Bandwidth::Reserved(v),
        }
    }
}
impl Bandwidth {
    /// Bandwidth in Hz, or `None` for reserved values
    pub fn hz(self) -> Option<f64> {
        match self {
            Bandwidth::Mhz8 => Some(8_000_000.0),
            Bandwidth::Mhz7 => Some(7_000_000.0),
            Bandwidth::Mhz6 => Some(6_000_000.0),
            Bandwidth::Mhz5 => Some(5_000_000.0),
            Bandwidth::Reserved(_) => None,
        }
    }
}
impl fmt::Display for Bandwidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bandwidth::Mhz8 => f.write_str("8 MHz"),
            Bandwidth::Mhz7 => f.write_str("7 MHz"),
            Bandwidth::Mhz6 => f.write_str("6 MHz"),
            Bandwidth::Mhz5 => f.write_str("5 MHz"),
            Bandwidth::Reserved(v) => write!(f, "reserved({})", v),
        }
    }
}

/// Modulation of the OFDM carriers
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Constellation {
    /// 2 bits per symbol
    Qpsk,
    /// 4 bits per symbol
    Qam16,
    /// 6 bits per symbol
    Qam64,
    /// reserved for future use
    Reserved(u8),
}
impl From<u8> for Constellation {
    fn from(v: u8) -> Self {
        match v {
            0 => Constellation::Qpsk,
            1 => Constellation::Qam16,
            2 => Constellation::Qam64,
            _ => Constellation::Reserved(v),
        }
    }
}
impl Constellation {
    /// The number of bits carried per modulation symbol
    pub fn bits_per_symbol(self) -> Option<f64> {
        match self {
            Constellation::Qpsk => Some(2.0),
            Constellation::Qam16 => Some(4.0),
            Constellation::Qam64 => Some(6.0),
            Constellation::Reserved(_) => None,
        }
    }
}
impl fmt::Display for Constellation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constellation::Qpsk => f.write_str("QPSK"),
            Constellation::Qam16 => f.write_str("16-QAM"),
            Constellation::Qam64 => f.write_str("64-QAM"),
            Constellation::Reserved(v) => write!(f, "reserved({})", v),
        }
    }
}

/// Inner forward-error-correction code rate
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum CodeRate {
    /// 1/2
    Rate1_2,
    /// 2/3
    Rate2_3,
    /// 3/4
    Rate3_4,
    /// 5/6
    Rate5_6,
    /// 7/8
    Rate7_8,
    /// reserved for future use
    Reserved(u8),
}
impl From<u8> for CodeRate {
    fn from(v: u8) -> Self {
        match v {
            0 => CodeRate::Rate1_2,
            1 => CodeRate::Rate2_3,
            2 => CodeRate::Rate3_4,
            3 => CodeRate::Rate5_6,
            4 => CodeRate::Rate7_8,
            _ => CodeRate::Reserved(v),
        }
    }
}
impl CodeRate {
    /// The fraction of transmitted bits which carry data
    pub fn value(self) -> Option<f64> {
        match self {
            CodeRate::Rate1_2 => Some(1.0 / 2.0),
            CodeRate::Rate2_3 => Some(2.0 / 3.0),
            CodeRate::Rate3_4 => Some(3.0 / 4.0),
            CodeRate::Rate5_6 => Some(5.0 / 6.0),
            CodeRate::Rate7_8 => Some(7.0 / 8.0),
            CodeRate::Reserved(_) => None,
        }
    }
}
impl fmt::Display for CodeRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodeRate::Rate1_2 => f.write_str("1/2"),
            CodeRate::Rate2_3 => f.write_str("2/3"),
            CodeRate::Rate3_4 => f.write_str("3/4"),
            CodeRate::Rate5_6 => f.write_str("5/6"),
            CodeRate::Rate7_8 => f.write_str("7/8"),
            CodeRate::Reserved(v) => write!(f, "reserved({})", v),
        }
    }
}

/// Length of the guard interval relative to the useful symbol duration
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum GuardInterval {
    /// 1/32
    Guard1_32,
    /// 1/16
    Guard1_16,
    /// 1/8
    Guard1_8,
    /// 1/4
    Guard1_4,
}
impl From<u8> for GuardInterval {
    fn from(v: u8) -> Self {
        match v & 0b11 {
            0 => GuardInterval::Guard1_32,
            1 => GuardInterval::Guard1_16,
            2 => GuardInterval::Guard1_8,
            _ => GuardInterval::Guard1_4,
        }
    }
}
impl GuardInterval {
    /// Share of airtime spent on useful symbols, e.g. `32/33` for a 1/32 guard interval
    pub fn efficiency(self) -> f64 {
        match self {
            GuardInterval::Guard1_32 => 32.0 / 33.0,
            GuardInterval::Guard1_16 => 16.0 / 17.0,
            GuardInterval::Guard1_8 => 8.0 / 9.0,
            GuardInterval::Guard1_4 => 4.0 / 5.0,
        }
    }
}
impl fmt::Display for GuardInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            GuardInterval::Guard1_32 => "1/32",
            GuardInterval::Guard1_16 => "1/16",
            GuardInterval::Guard1_8 => "1/8",
            GuardInterval::Guard1_4 => "1/4",
        })
    }
}

/// Number of OFDM carriers
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum TransmissionMode {
    /// 2k mode
    Mode2k,
    /// 8k mode
    Mode8k,
    /// 4k mode
    Mode4k,
    /// reserved for future use
    Reserved,
}
impl From<u8> for TransmissionMode {
    fn from(v: u8) -> Self {
        match v & 0b11 {
            0 => TransmissionMode::Mode2k,
            1 => TransmissionMode::Mode8k,
            2 => TransmissionMode::Mode4k,
            _ => TransmissionMode::Reserved,
        }
    }
}

/// Tuning and modulation parameters of a terrestrial multiplex
#[derive(Clone, PartialEq, Eq)]
pub struct TerrestrialDeliverySystemDescriptor {
    body: Vec<u8>,
}
impl TerrestrialDeliverySystemDescriptor {
    /// The descriptor tag value which identifies the descriptor as a
    /// `TerrestrialDeliverySystemDescriptor`.
    pub const TAG: u8 = 0x5a;
    const BODY_SIZE: usize = 11;

    /// Ratio of useful transport stream bits to the raw OFDM bit rate, once pilots, TPS carriers
    /// and Reed-Solomon overhead are accounted for.
    pub const USEFUL_PAYLOAD_RATIO: f64 = 423.0 / 544.0;

    pub(crate) fn new(
        tag: u8,
        body: &[u8],
    ) -> Result<TerrestrialDeliverySystemDescriptor, DescriptorError> {
        descriptor_len(body, tag, Self::BODY_SIZE)?;
        Ok(TerrestrialDeliverySystemDescriptor {
            body: body.to_vec(),
        })
    }

    /// The `centre_frequency` field, in units of 10 Hz
    pub fn centre_frequency(&self) -> u32 {
        u32::from(self.body[0]) << 24
            | u32::from(self.body[1]) << 16
            | u32::from(self.body[2]) << 8
            | u32::from(self.body[3])
    }
    /// Centre frequency in Hz
    pub fn centre_frequency_hz(&self) -> u64 {
        u64::from(self.centre_frequency()) * 10
    }
    /// Channel bandwidth
    pub fn bandwidth(&self) -> Bandwidth {
        Bandwidth::from((self.body[4] & 0b1110_0000) >> 5)
    }
    /// `true` when the high-priority stream of a hierarchical transmission is described
    pub fn priority(&self) -> bool {
        self.body[4] & 0b0001_0000 != 0
    }
    /// `true` when time slicing is *not* in use (the field is active-low)
    pub fn time_slicing_indicator(&self) -> bool {
        self.body[4] & 0b0000_1000 != 0
    }
    /// `true` when MPE-FEC is *not* in use (the field is active-low)
    pub fn mpe_fec_indicator(&self) -> bool {
        self.body[4] & 0b0000_0100 != 0
    }
    /// Carrier modulation
    pub fn constellation(&self) -> Constellation {
        Constellation::from((self.body[5] & 0b1100_0000) >> 6)
    }
    /// The `hierarchy_information` field, `0` for non-hierarchical transmission
    pub fn hierarchy_information(&self) -> u8 {
        (self.body[5] & 0b0011_1000) >> 3
    }
    /// Code rate of the high-priority stream
    pub fn code_rate_hp(&self) -> CodeRate {
        CodeRate::from(self.body[5] & 0b0000_0111)
    }
    /// Code rate of the low-priority stream
    pub fn code_rate_lp(&self) -> CodeRate {
        CodeRate::from((self.body[6] & 0b1110_0000) >> 5)
    }
    /// Guard interval
    pub fn guard_interval(&self) -> GuardInterval {
        GuardInterval::from((self.body[6] & 0b0001_1000) >> 3)
    }
    /// Transmission mode
    pub fn transmission_mode(&self) -> TransmissionMode {
        TransmissionMode::from((self.body[6] & 0b0000_0110) >> 1)
    }
    /// `true` when other frequencies carry the same multiplex
    pub fn other_frequency_flag(&self) -> bool {
        self.body[6] & 0b0000_0001 != 0
    }
    /// The code rate of the stream this descriptor describes, selected by `priority()`
    pub fn code_rate(&self) -> CodeRate {
        if self.priority() {
            self.code_rate_hp()
        } else {
            self.code_rate_lp()
        }
    }

    /// Useful bitrate of the whole multiplex in bits per second,
    ///
    /// ```text
    /// 423/544 × bandwidth × code rate × bits per symbol × guard efficiency
    /// ```
    ///
    /// or `None` if any parameter has a reserved value.
    pub fn channel_capacity(&self) -> Option<f64> {
        Some(
            Self::USEFUL_PAYLOAD_RATIO
                * self.bandwidth().hz()?
                * self.code_rate().value()?
                * self.constellation().bits_per_symbol()?
                * self.guard_interval().efficiency(),
        )
    }

    pub(crate) fn tag(&self) -> u8 {
        Self::TAG
    }
    pub(crate) fn body(&self) -> &[u8] {
        &self.body
    }
}

impl fmt::Debug for TerrestrialDeliverySystemDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TerrestrialDeliverySystemDescriptor")
            .field("centre_frequency_hz", &self.centre_frequency_hz())
            .field("bandwidth", &self.bandwidth())
            .field("priority", &self.priority())
            .field("constellation", &self.constellation())
            .field("hierarchy_information", &self.hierarchy_information())
            .field("code_rate_hp", &self.code_rate_hp())
            .field("code_rate_lp", &self.code_rate_lp())
            .field("guard_interval", &self.guard_interval())
            .field("transmission_mode", &self.transmission_mode())
            .field("other_frequency_flag", &self.other_frequency_flag())
            .finish()
    }
}
