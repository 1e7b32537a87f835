//! Carries the name of the delivery system network, in the _Network Information Table_.

use super::DescriptorError;
use crate::text;
use std::fmt;

/// The name of the network described by the NIT to which this descriptor is attached
#[derive(Clone, PartialEq, Eq)]
pub struct NetworkNameDescriptor {
    body: Vec<u8>,
}
impl NetworkNameDescriptor {
    /// The descriptor tag value which identifies the descriptor as a `NetworkNameDescriptor`.
    pub const TAG: u8 = 0x40;

    pub(crate) fn new(_tag: u8, body: &[u8]) -> Result<NetworkNameDescriptor, DescriptorError> {
        Ok(NetworkNameDescriptor {
            body: body.to_vec(),
        })
    }

    /// The decoded network name
    pub fn name(&self) -> String {
        text::decode(&self.body)
    }

    pub(crate) fn tag(&self) -> u8 {
        Self::TAG
    }
    pub(crate) fn body(&self) -> &[u8] {
        &self.body
    }
}
impl fmt::Debug for NetworkNameDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkNameDescriptor")
            .field("name", &self.name())
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::super::{read_descriptor, Descriptor};
    use assert_matches::assert_matches;
    use hex_literal::hex;

    #[test]
    fn descriptor() {
        let data = hex!("4009 4d 55 58 20 31 20 43 52 41");
        let (desc, len) = read_descriptor(&data).unwrap();
        assert_eq!(len, data.len());
        assert_matches!(desc, Descriptor::NetworkName(name) => {
            assert_eq!(name.name(), "MUX 1 CRA");
        });
    }
}
