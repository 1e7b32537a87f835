//! Types related to the _Network Information Table_, which describes the physical network
//! carrying the multiplex.

use crate::descriptor::network_name::NetworkNameDescriptor;
use crate::descriptor::terrestrial_delivery::TerrestrialDeliverySystemDescriptor;
use crate::descriptor::{self, Descriptor};
use crate::packet::Pid;
use crate::psi::{record_descriptors, record_len, PsiError, Section};

/// `table_id` of a NIT section describing the network carrying this stream
pub const TABLE_ID_ACTUAL: u8 = 0x40;
/// `table_id` of a NIT section describing some other network
pub const TABLE_ID_OTHER: u8 = 0x41;

/// A transport stream entry within the NIT
#[derive(Clone, Debug, PartialEq)]
pub struct TransportStream {
    pub transport_stream_id: u16,
    pub original_network_id: u16,
    pub descriptors: Vec<Descriptor>,
}

impl TransportStream {
    const HEADER_SIZE: usize = 4;

    fn from_bytes(data: &[u8]) -> Result<(TransportStream, usize), PsiError> {
        record_len(data, "NIT transport stream", Self::HEADER_SIZE)?;
        let (descriptors, len) =
            record_descriptors(data, "NIT transport stream", Self::HEADER_SIZE)?;
        let ts = TransportStream {
            transport_stream_id: u16::from(data[0]) << 8 | u16::from(data[1]),
            original_network_id: u16::from(data[2]) << 8 | u16::from(data[3]),
            descriptors,
        };
        Ok((ts, len))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct NitSection {
    pub table_id: u8,
    pub network_id: u16,
    pub descriptors: Vec<Descriptor>,
    pub transport_streams: Vec<TransportStream>,
}

impl NitSection {
    /// Decode a section read from `pid`, which the PAT gave as the network PID.
    pub fn from_section(section: &Section, pid: Pid) -> Result<NitSection, PsiError> {
        section.expect_table(
            pid,
            |id| id == TABLE_ID_ACTUAL || id == TABLE_ID_OTHER,
            "network_information_section",
        )?;
        let network_id = section.table_syntax_header()?.id();
        let data = section.payload()?;
        let (descriptors, len) = descriptor::read_descriptor_loop(data)?;
        let data = &data[len..];
        record_len(data, "NIT transport stream loop", 2)?;
        let loop_len = usize::from(data[0] & 0x0f) << 8 | usize::from(data[1]);
        record_len(data, "NIT transport stream loop", 2 + loop_len)?;
        let mut buf = &data[2..2 + loop_len];
        let mut transport_streams = vec![];
        while !buf.is_empty() {
            let (ts, len) = TransportStream::from_bytes(buf)?;
            transport_streams.push(ts);
            buf = &buf[len..];
        }
        Ok(NitSection {
            table_id: section.table_id(),
            network_id,
            descriptors,
            transport_streams,
        })
    }

    /// From the network name descriptor, if present
    pub fn network_name(&self) -> Option<String> {
        descriptor::find(&self.descriptors, |d| match d {
            Descriptor::NetworkName(n) => Some(n),
            _ => None,
        })
        .map(NetworkNameDescriptor::name)
    }

    /// The first terrestrial delivery system descriptor, searching the network descriptors and
    /// then each transport stream's.
    pub fn terrestrial_delivery(&self) -> Option<&TerrestrialDeliverySystemDescriptor> {
        fn is_terrestrial(d: &Descriptor) -> Option<&TerrestrialDeliverySystemDescriptor> {
            match d {
                Descriptor::TerrestrialDeliverySystem(t) => Some(t),
                _ => None,
            }
        }
        self.descriptors.iter().find_map(is_terrestrial).or_else(|| {
            self.transport_streams
                .iter()
                .flat_map(|ts| ts.descriptors.iter())
                .find_map(is_terrestrial)
        })
    }
}
