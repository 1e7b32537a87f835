//! Destinations for reassembled elementary stream units.
//!
//! The demultiplexer hands each [`ElementaryUnit`](../pes/struct.ElementaryUnit.html) of a
//! selected PID to that PID's `UnitSink`, and calls `finalize()` once the input is exhausted.
//! What happens to the data from there (transcoding audio, muxing into a container) is up to the
//! implementation; `ElementaryStreamWriter` simply dumps the payload bytes to a `Write`.

use crate::packet::Pid;
use crate::pes::ElementaryUnit;
use crate::StreamType;
use log::{debug, info, trace};
use std::io::{self, Write};

/// Receives the units of one elementary stream.
pub trait UnitSink {
    /// Takes the next complete unit, in stream order
    fn accept(&mut self, unit: ElementaryUnit) -> io::Result<()>;

    /// No more units will follow for the given PID
    fn finalize(&mut self, pid: Pid) -> io::Result<()>;
}

/// Collects units in memory
impl UnitSink for Vec<ElementaryUnit> {
    fn accept(&mut self, unit: ElementaryUnit) -> io::Result<()> {
        self.push(unit);
        Ok(())
    }

    fn finalize(&mut self, _pid: Pid) -> io::Result<()> {
        Ok(())
    }
}

impl<S: UnitSink + ?Sized> UnitSink for Box<S> {
    fn accept(&mut self, unit: ElementaryUnit) -> io::Result<()> {
        (**self).accept(unit)
    }

    fn finalize(&mut self, pid: Pid) -> io::Result<()> {
        (**self).finalize(pid)
    }
}

/// `sequence_header_code` of ISO/IEC 11172-2 and ISO/IEC 13818-2 video
pub const SEQUENCE_HEADER_CODE: [u8; 4] = [0x00, 0x00, 0x01, 0xb3];

/// Writes the payload of each unit to the wrapped `Write`, producing a raw elementary stream.
///
/// MPEG-1 and MPEG-2 video can only be decoded from a sequence header onwards, so for those
/// stream types everything before the first `sequence_header_code` is dropped.  Scrambled units
/// are never written.
pub struct ElementaryStreamWriter<W: Write> {
    out: W,
    awaiting_sequence_header: bool,
    units: u64,
    bytes: u64,
    scrambled: u64,
}

impl<W: Write> ElementaryStreamWriter<W> {
    pub fn new(out: W, stream_type: StreamType) -> ElementaryStreamWriter<W> {
        ElementaryStreamWriter {
            out,
            awaiting_sequence_header: matches!(
                stream_type,
                StreamType::Iso11172Video | StreamType::H262
            ),
            units: 0,
            bytes: 0,
            scrambled: 0,
        }
    }

    /// Units written so far
    pub fn units(&self) -> u64 {
        self.units
    }

    /// Payload bytes written so far
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Units dropped because they were scrambled
    pub fn scrambled_units(&self) -> u64 {
        self.scrambled
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> UnitSink for ElementaryStreamWriter<W> {
    fn accept(&mut self, unit: ElementaryUnit) -> io::Result<()> {
        if unit.scrambled {
            self.scrambled += 1;
            return Ok(());
        }
        let mut data = &unit.payload[..];
        if self.awaiting_sequence_header {
            match data
                .windows(SEQUENCE_HEADER_CODE.len())
                .position(|w| w == SEQUENCE_HEADER_CODE)
            {
                Some(offset) => {
                    debug!("{}: sequence header found, starting output", unit.pid);
                    self.awaiting_sequence_header = false;
                    data = &data[offset..];
                }
                None => {
                    trace!("{}: skipping unit before sequence header", unit.pid);
                    return Ok(());
                }
            }
        }
        self.out.write_all(data)?;
        self.units += 1;
        self.bytes += data.len() as u64;
        Ok(())
    }

    fn finalize(&mut self, pid: Pid) -> io::Result<()> {
        info!(
            "{}: wrote {} bytes in {} units ({} scrambled units dropped)",
            pid, self.bytes, self.units, self.scrambled
        );
        self.out.flush()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use hex_literal::hex;

    const PID: Pid = Pid::new(0x100);

    fn unit(payload: &[u8]) -> ElementaryUnit {
        ElementaryUnit {
            pid: PID,
            header: None,
            scrambled: false,
            payload: payload.to_vec(),
        }
    }

    #[test]
    fn vec_collects() {
        let mut sink: Vec<ElementaryUnit> = vec![];
        sink.accept(unit(&[1])).unwrap();
        sink.accept(unit(&[2])).unwrap();
        sink.finalize(PID).unwrap();
        assert_eq!(sink.len(), 2);
    }

    #[test]
    fn boxed_sink_forwards() {
        let mut sink: Box<dyn UnitSink> = Box::new(ElementaryStreamWriter::new(
            Vec::new(),
            StreamType::Iso138183Audio,
        ));
        sink.accept(unit(&[1, 2, 3])).unwrap();
        sink.finalize(PID).unwrap();
    }

    #[test]
    fn audio_written_as_is() {
        let mut w = ElementaryStreamWriter::new(Vec::new(), StreamType::Iso138183Audio);
        w.accept(unit(&hex!("fffd 0102"))).unwrap();
        w.accept(unit(&hex!("fffd 0304"))).unwrap();
        w.finalize(PID).unwrap();
        assert_eq!(w.units(), 2);
        assert_eq!(w.bytes(), 8);
        assert_eq!(w.into_inner(), hex!("fffd0102 fffd0304").to_vec());
    }

    #[test]
    fn mpeg2_video_starts_at_sequence_header() {
        let mut w = ElementaryStreamWriter::new(Vec::new(), StreamType::H262);
        w.accept(unit(&hex!("00000100 aabb"))).unwrap();
        w.accept(unit(&hex!("1122 000001b3 3344"))).unwrap();
        w.accept(unit(&hex!("00000100 5566"))).unwrap();
        assert_eq!(w.units(), 2);
        assert_eq!(
            w.into_inner(),
            hex!("000001b3 3344 00000100 5566").to_vec()
        );
    }

    #[test]
    fn h264_not_gated() {
        let mut w = ElementaryStreamWriter::new(Vec::new(), StreamType::H264);
        w.accept(unit(&hex!("00000001 09f0"))).unwrap();
        assert_eq!(w.into_inner(), hex!("00000001 09f0").to_vec());
    }

    #[test]
    fn scrambled_dropped() {
        let mut w = ElementaryStreamWriter::new(Vec::new(), StreamType::Adts);
        let mut u = unit(&[0xff; 8]);
        u.scrambled = true;
        w.accept(u).unwrap();
        assert_eq!(w.scrambled_units(), 1);
        assert_eq!(w.units(), 0);
        assert!(w.into_inner().is_empty());
    }
}
