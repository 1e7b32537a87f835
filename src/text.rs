//! Decoding of the text fields carried in service information, per _ETSI EN 300 468_, Annex A.
//!
//! The first byte of a text field may select the character table; without a selector the
//! default (ISO/IEC 6937 based) table applies.  The default table is approximated by
//! Latin-1 after dropping its non-spacing diacritical marks.

use encoding_rs::Encoding;
use log::debug;

/// Decode the given service-information text into a `String`.
pub fn decode(bytes: &[u8]) -> String {
    let (encoding, text) = match bytes.first() {
        None => return String::new(),
        Some(&b) if b >= 0x20 => return decode_default(bytes),
        Some(&0x10) if bytes.len() >= 3 => (iso_8859_part(bytes[2]), &bytes[3..]),
        Some(&b) => (selected_table(b), &bytes[1..]),
    };
    match encoding {
        Some(encoding) if matches!(bytes[0], 0x11..=0x15) => {
            let (decoded, _had_errors) = encoding.decode_without_bom_handling(text);
            decoded.into_owned()
        }
        Some(encoding) => {
            let stripped = strip_control_codes(text);
            let (decoded, _had_errors) = encoding.decode_without_bom_handling(&stripped);
            decoded.into_owned()
        }
        None => {
            debug!("unsupported character table selector 0x{:02x}", bytes[0]);
            decode_default(text)
        }
    }
}

fn selected_table(selector: u8) -> Option<&'static Encoding> {
    match selector {
        0x01 => Some(encoding_rs::ISO_8859_5),
        0x02 => Some(encoding_rs::ISO_8859_6),
        0x03 => Some(encoding_rs::ISO_8859_7),
        0x04 => Some(encoding_rs::ISO_8859_8),
        0x05 => Some(encoding_rs::WINDOWS_1254),
        0x06 => Some(encoding_rs::ISO_8859_10),
        0x07 => Some(encoding_rs::WINDOWS_874),
        0x09 => Some(encoding_rs::ISO_8859_13),
        0x0A => Some(encoding_rs::ISO_8859_14),
        0x0B => Some(encoding_rs::ISO_8859_15),
        0x11 => Some(encoding_rs::UTF_16BE),
        0x12 => Some(encoding_rs::EUC_KR),
        0x13 => Some(encoding_rs::GBK),
        0x14 => Some(encoding_rs::BIG5),
        0x15 => Some(encoding_rs::UTF_8),
        _ => None,
    }
}

fn iso_8859_part(part: u8) -> Option<&'static Encoding> {
    match part {
        0x01 => Some(encoding_rs::WINDOWS_1252),
        0x02 => Some(encoding_rs::ISO_8859_2),
        0x03 => Some(encoding_rs::ISO_8859_3),
        0x04 => Some(encoding_rs::ISO_8859_4),
        0x05 => Some(encoding_rs::ISO_8859_5),
        0x06 => Some(encoding_rs::ISO_8859_6),
        0x07 => Some(encoding_rs::ISO_8859_7),
        0x08 => Some(encoding_rs::ISO_8859_8),
        0x09 => Some(encoding_rs::WINDOWS_1254),
        0x0A => Some(encoding_rs::ISO_8859_10),
        0x0B => Some(encoding_rs::WINDOWS_874),
        0x0D => Some(encoding_rs::ISO_8859_13),
        0x0E => Some(encoding_rs::ISO_8859_14),
        0x0F => Some(encoding_rs::ISO_8859_15),
        0x10 => Some(encoding_rs::ISO_8859_16),
        _ => None,
    }
}

fn decode_default(bytes: &[u8]) -> String {
    // 0xC0..=0xCF are non-spacing diacritics which would prefix the letter they modify
    let filtered: Vec<u8> = strip_control_codes(bytes)
        .into_iter()
        .filter(|b| !(0xC0..=0xCF).contains(b))
        .collect();
    let (decoded, _had_errors) = encoding_rs::WINDOWS_1252.decode_without_bom_handling(&filtered);
    decoded.into_owned()
}

/// Drops the single-byte control codes (emphasis on/off and friends), mapping the CR/LF code
/// to `'\n'`.
fn strip_control_codes(bytes: &[u8]) -> Vec<u8> {
    bytes
        .iter()
        .filter_map(|&b| match b {
            0x8A => Some(b'\n'),
            0x80..=0x9F => None,
            _ => Some(b),
        })
        .collect()
}
