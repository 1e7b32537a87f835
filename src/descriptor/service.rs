//! Names a service and its provider, in the _Service Description Table_.

use super::{descriptor_len, length_prefixed, DescriptorError};
use crate::text;
use std::fmt;

/// The kind of content a service carries, per _ETSI EN 300 468_, Table 87.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ServiceType {
    /// `0x01`, MPEG-2 SD television
    DigitalTelevision,
    /// `0x02`, MPEG-1 Layer II radio
    DigitalRadio,
    /// `0x03`
    Teletext,
    /// `0x0a`, advanced codec radio
    AdvancedCodecRadio,
    /// `0x11`, MPEG-2 HD television
    Mpeg2HdTelevision,
    /// `0x16`, H.264/AVC SD television
    AdvancedCodecSdTelevision,
    /// `0x19`, H.264/AVC HD television
    AdvancedCodecHdTelevision,
    /// `0x1f`, HEVC television
    HevcTelevision,
    /// any other value
    Other(u8),
}
impl From<u8> for ServiceType {
    fn from(v: u8) -> Self {
        match v {
            0x01 => ServiceType::DigitalTelevision,
            0x02 => ServiceType::DigitalRadio,
            0x03 => ServiceType::Teletext,
            0x0a => ServiceType::AdvancedCodecRadio,
            0x11 => ServiceType::Mpeg2HdTelevision,
            0x16 => ServiceType::AdvancedCodecSdTelevision,
            0x19 => ServiceType::AdvancedCodecHdTelevision,
            0x1f => ServiceType::HevcTelevision,
            _ => ServiceType::Other(v),
        }
    }
}
impl ServiceType {
    /// true for the television service types
    pub fn is_television(self) -> bool {
        matches!(
            self,
            ServiceType::DigitalTelevision
                | ServiceType::Mpeg2HdTelevision
                | ServiceType::AdvancedCodecSdTelevision
                | ServiceType::AdvancedCodecHdTelevision
                | ServiceType::HevcTelevision
        )
    }
}

/// Service type, provider name and service name
#[derive(Clone, PartialEq, Eq)]
pub struct ServiceDescriptor {
    body: Vec<u8>,
    provider_end: usize,
}
impl ServiceDescriptor {
    /// The descriptor tag value which identifies the descriptor as a `ServiceDescriptor`.
    pub const TAG: u8 = 0x48;

    pub(crate) fn new(tag: u8, body: &[u8]) -> Result<ServiceDescriptor, DescriptorError> {
        descriptor_len(body, tag, 1)?;
        let provider_end = length_prefixed(body, tag, 1)?;
        length_prefixed(body, tag, provider_end)?;
        Ok(ServiceDescriptor {
            body: body.to_vec(),
            provider_end,
        })
    }

    /// The `service_type` field
    pub fn service_type(&self) -> ServiceType {
        ServiceType::from(self.body[0])
    }
    /// Name of the service provider
    pub fn provider_name(&self) -> String {
        text::decode(&self.body[2..self.provider_end])
    }
    /// Name of the service
    pub fn service_name(&self) -> String {
        let start = self.provider_end + 1;
        let len = self.body[self.provider_end] as usize;
        text::decode(&self.body[start..start + len])
    }

    pub(crate) fn tag(&self) -> u8 {
        Self::TAG
    }
    pub(crate) fn body(&self) -> &[u8] {
        &self.body
    }
}
impl fmt::Debug for ServiceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceDescriptor")
            .field("service_type", &self.service_type())
            .field("provider_name", &self.provider_name())
            .field("service_name", &self.service_name())
            .finish()
    }
}
