//! A replayable cursor over transport stream packets held in a seekable byte source.
//!
//! Discovery of the service information tables makes several passes over the input, each one
//! starting again from the beginning, and the section reader sometimes needs to step back onto a
//! packet it has already seen.  `PacketSource` keeps track of the packet number (the _frame_) so
//! that positions can be logged and restored.

use crate::packet::Packet;
use log::warn;
use std::io::{self, Read, Seek, SeekFrom};

/// Reads consecutive 188-byte packets from a `Read + Seek` byte source.
pub struct PacketSource<R> {
    reader: R,
    buf: [u8; Packet::SIZE],
    position: u64,
}

impl<R: Read + Seek> PacketSource<R> {
    /// Wrap the given reader, which is assumed to be positioned at its start.
    pub fn new(reader: R) -> PacketSource<R> {
        PacketSource {
            reader,
            buf: [0; Packet::SIZE],
            position: 0,
        }
    }

    /// The number of the packet that the next call to `next_packet()` will return, counting
    /// from zero.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Move back to the first packet.
    pub fn rewind(&mut self) -> io::Result<()> {
        self.seek_to(0)
    }

    /// Position the cursor so that the next packet returned will be the given frame.
    pub fn seek_to(&mut self, frame: u64) -> io::Result<()> {
        self.reader
            .seek(SeekFrom::Start(frame * Packet::SIZE as u64))?;
        self.position = frame;
        Ok(())
    }

    /// Step over the next packet without reading it.
    pub fn skip_packet(&mut self) -> io::Result<()> {
        self.seek_to(self.position + 1)
    }

    /// Read the next packet's bytes, or `None` once the input is exhausted.  A truncated final
    /// packet is treated as the end of input.
    pub fn next_packet(&mut self) -> io::Result<Option<&[u8]>> {
        let mut filled = 0;
        while filled < Packet::SIZE {
            match self.reader.read(&mut self.buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        if filled < Packet::SIZE {
            if filled > 0 {
                warn!(
                    "packet {}: ignoring {} trailing bytes at end of input",
                    self.position, filled
                );
                // leave the cursor where the partial packet began
                self.reader
                    .seek(SeekFrom::Start(self.position * Packet::SIZE as u64))?;
            }
            return Ok(None);
        }
        self.position += 1;
        Ok(Some(&self.buf[..]))
    }

    /// Give back the underlying reader
    pub fn into_inner(self) -> R {
        self.reader
    }
}
