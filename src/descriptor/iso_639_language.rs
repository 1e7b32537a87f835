//! Language and audio-type tags for the elementary stream to which this descriptor is attached,
//! found in the _Program Map Table_.

use super::DescriptorError;
use std::fmt;

/// Languages of an elementary stream
#[derive(Clone, PartialEq, Eq)]
pub struct Iso639LanguageDescriptor {
    body: Vec<u8>,
}
impl Iso639LanguageDescriptor {
    /// The descriptor tag value which identifies the descriptor as an `Iso639LanguageDescriptor`.
    pub const TAG: u8 = 0x0a;
    const ENTRY_SIZE: usize = 4;

    pub(crate) fn new(tag: u8, body: &[u8]) -> Result<Iso639LanguageDescriptor, DescriptorError> {
        if body.len() % Self::ENTRY_SIZE != 0 {
            return Err(DescriptorError::TruncatedDescriptor {
                tag: Some(tag),
                expected: (body.len() / Self::ENTRY_SIZE + 1) * Self::ENTRY_SIZE,
                actual: body.len(),
            });
        }
        Ok(Iso639LanguageDescriptor {
            body: body.to_vec(),
        })
    }

    /// Iterator over the language entries in this descriptor
    pub fn languages(&self) -> impl Iterator<Item = Language<'_>> {
        self.body.chunks_exact(Self::ENTRY_SIZE).map(Language::new)
    }

    pub(crate) fn tag(&self) -> u8 {
        Self::TAG
    }
    pub(crate) fn body(&self) -> &[u8] {
        &self.body
    }
}

/// Metadata about the role of the audio elementary stream to which this descriptor is attached.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum AudioType {
    /// The audio has no particular role defined
    Undefined,
    /// There is no language-specific content within the audio
    CleanEffects,
    /// The audio is prepared for the hearing impaired
    HearingImpaired,
    /// The audio is prepared for the visually impaired
    VisualImpairedCommentary,
    /// Values `0x04` to `0xFF` are reserved
    Reserved(u8),
}
impl From<u8> for AudioType {
    fn from(v: u8) -> Self {
        match v {
            0 => AudioType::Undefined,
            1 => AudioType::CleanEffects,
            2 => AudioType::HearingImpaired,
            3 => AudioType::VisualImpairedCommentary,
            _ => AudioType::Reserved(v),
        }
    }
}
impl AudioType {
    /// True for the audio types which make up a program's primary soundtrack, `Undefined` and
    /// `CleanEffects`, as opposed to the accessibility tracks.
    pub fn is_main(self) -> bool {
        matches!(self, AudioType::Undefined | AudioType::CleanEffects)
    }
}

/// One language entry of an `Iso639LanguageDescriptor`
pub struct Language<'buf> {
    buf: &'buf [u8],
}
impl<'buf> Language<'buf> {
    fn new(buf: &'buf [u8]) -> Language<'buf> {
        Language { buf }
    }
    /// The 3-letter ISO-639 language code
    pub fn code(&self) -> String {
        let (code, _) = encoding_rs::WINDOWS_1252.decode_without_bom_handling(&self.buf[0..3]);
        code.into_owned()
    }
    /// The type of the audio stream
    pub fn audio_type(&self) -> AudioType {
        AudioType::from(self.buf[3])
    }
}
impl<'buf> fmt::Debug for Language<'buf> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        f.debug_struct("Language")
            .field("code", &self.code())
            .field("audio_type", &self.audio_type())
            .finish()
    }
}

struct LangsDebug<'buf>(&'buf Iso639LanguageDescriptor);
impl<'buf> fmt::Debug for LangsDebug<'buf> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        f.debug_list().entries(self.0.languages()).finish()
    }
}
impl fmt::Debug for Iso639LanguageDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        f.debug_struct("Iso639LanguageDescriptor")
            .field("languages", &LangsDebug(self))
            .finish()
    }
}
