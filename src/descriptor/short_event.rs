//! The name and a short description of an event, in the _Event Information Table_.

use super::{descriptor_len, length_prefixed, DescriptorError};
use crate::text;
use std::fmt;

/// Event name and text in a single language
#[derive(Clone, PartialEq, Eq)]
pub struct ShortEventDescriptor {
    body: Vec<u8>,
    name_end: usize,
}
impl ShortEventDescriptor {
    /// The descriptor tag value which identifies the descriptor as a `ShortEventDescriptor`.
    pub const TAG: u8 = 0x4d;
    const LANGUAGE_SIZE: usize = 3;

    pub(crate) fn new(tag: u8, body: &[u8]) -> Result<ShortEventDescriptor, DescriptorError> {
        descriptor_len(body, tag, Self::LANGUAGE_SIZE)?;
        let name_end = length_prefixed(body, tag, Self::LANGUAGE_SIZE)?;
        length_prefixed(body, tag, name_end)?;
        Ok(ShortEventDescriptor {
            body: body.to_vec(),
            name_end,
        })
    }

    /// ISO 639-2 language code of the name and text
    pub fn language(&self) -> String {
        String::from_utf8_lossy(&self.body[..Self::LANGUAGE_SIZE]).into_owned()
    }
    /// The event name
    pub fn event_name(&self) -> String {
        text::decode(&self.body[Self::LANGUAGE_SIZE + 1..self.name_end])
    }
    /// A short description of the event
    pub fn text(&self) -> String {
        let start = self.name_end + 1;
        let len = self.body[self.name_end] as usize;
        text::decode(&self.body[start..start + len])
    }

    pub(crate) fn tag(&self) -> u8 {
        Self::TAG
    }
    pub(crate) fn body(&self) -> &[u8] {
        &self.body
    }
}
impl fmt::Debug for ShortEventDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShortEventDescriptor")
            .field("language", &self.language())
            .field("event_name", &self.event_name())
            .field("text", &self.text())
            .finish()
    }
}
