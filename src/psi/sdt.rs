//! Types related to the _Service Description Table_, which names the services of a multiplex.

use crate::descriptor::service::ServiceDescriptor;
use crate::descriptor::{self, Descriptor};
use crate::packet::Pid;
use crate::psi::{record_descriptors, record_len, PsiError, RunningStatus, Section};

/// `table_id` of an SDT section describing this transport stream
pub const TABLE_ID_ACTUAL: u8 = 0x42;
/// `table_id` of an SDT section describing some other transport stream
pub const TABLE_ID_OTHER: u8 = 0x46;

#[derive(Clone, Debug, PartialEq)]
pub struct Service {
    /// Equal to the `program_number` of the corresponding PAT / PMT entries
    pub service_id: u16,
    pub eit_schedule_flag: bool,
    pub eit_present_following_flag: bool,
    pub running_status: RunningStatus,
    pub free_ca_mode: bool,
    pub descriptors: Vec<Descriptor>,
}

impl Service {
    const HEADER_SIZE: usize = 3;

    fn from_bytes(data: &[u8]) -> Result<(Service, usize), PsiError> {
        record_len(data, "SDT service", Self::HEADER_SIZE + 2)?;
        let (descriptors, len) = record_descriptors(data, "SDT service", Self::HEADER_SIZE)?;
        let service = Service {
            service_id: u16::from(data[0]) << 8 | u16::from(data[1]),
            eit_schedule_flag: data[2] & 0b10 != 0,
            eit_present_following_flag: data[2] & 0b01 != 0,
            running_status: RunningStatus::from(data[3] >> 5),
            free_ca_mode: data[3] & 0b0001_0000 != 0,
            descriptors,
        };
        Ok((service, len))
    }

    /// The service descriptor, naming this service
    pub fn service_descriptor(&self) -> Option<&ServiceDescriptor> {
        descriptor::find(&self.descriptors, |d| match d {
            Descriptor::Service(s) => Some(s),
            _ => None,
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SdtSection {
    pub table_id: u8,
    pub transport_stream_id: u16,
    pub original_network_id: u16,
    pub services: Vec<Service>,
}

impl SdtSection {
    const HEADER_SIZE: usize = 3;

    /// Decode a section read from PID `0x0011`
    pub fn from_section(section: &Section) -> Result<SdtSection, PsiError> {
        section.expect_table(
            Pid::SDT,
            |id| id == TABLE_ID_ACTUAL || id == TABLE_ID_OTHER,
            "service_description_section",
        )?;
        let transport_stream_id = section.table_syntax_header()?.id();
        let data = section.payload()?;
        record_len(data, "SDT header", Self::HEADER_SIZE)?;
        let original_network_id = u16::from(data[0]) << 8 | u16::from(data[1]);
        let mut buf = &data[Self::HEADER_SIZE..];
        let mut services = vec![];
        while !buf.is_empty() {
            let (service, len) = Service::from_bytes(buf)?;
            services.push(service);
            buf = &buf[len..];
        }
        Ok(SdtSection {
            table_id: section.table_id(),
            transport_stream_id,
            original_network_id,
            services,
        })
    }

    pub fn service(&self, service_id: u16) -> Option<&Service> {
        self.services.iter().find(|s| s.service_id == service_id)
    }
}
