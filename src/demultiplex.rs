//! The final pass over the input, routing the packets of selected PIDs into elementary stream
//! reassembly, and counting the packets of every PID.
//!
//! Each PID is given a [`Channel`](enum.Channel.html) the first time it is seen, or up front via
//! `select_video()` / `select_audio()`.  Once every packet has been consumed, the counts give the
//! share of the multiplex's capacity used by each PID:
//!
//! ```rust
//! # use dvbt_demux::demultiplex::Demultiplexer;
//! # use dvbt_demux::source::PacketSource;
//! # use std::io::Cursor;
//! # fn main() -> std::io::Result<()> {
//! let mut source = PacketSource::new(Cursor::new(vec![]));
//! let mut demux = Demultiplexer::new();
//! demux.run(&mut source)?;
//! for rate in demux.bitrates(24_128_342.0) {
//!     println!("{} {:.3} Mbit/s", rate.pid, rate.mbps());
//! }
//! # Ok(())
//! # }
//! ```

use crate::packet::{Packet, Pid};
use crate::pes::{PesError, PesReassembler};
use crate::sink::UnitSink;
use crate::source::PacketSource;
use fixedbitset::FixedBitSet;
use log::{debug, info, warn};
use std::cmp::Ordering;
use std::fmt;
use std::io::{self, Read, Seek};

/// An elementary stream being reassembled into its sink
pub struct PesChannel {
    reassembler: PesReassembler,
    sink: Box<dyn UnitSink>,
}

impl PesChannel {
    fn new(pid: Pid, sink: Box<dyn UnitSink>) -> PesChannel {
        PesChannel {
            reassembler: PesReassembler::new(pid),
            sink,
        }
    }

    fn consume(&mut self, pk: &Packet<'_>, frame: u64) -> io::Result<()> {
        match self.reassembler.push(pk, &mut self.sink) {
            Ok(()) => Ok(()),
            Err(PesError::Sink(e)) => Err(e),
            Err(e) => {
                warn!("{} packet {}: {}", pk.pid(), frame, e);
                Ok(())
            }
        }
    }

    fn finish(&mut self) -> io::Result<()> {
        match self.reassembler.finish(&mut self.sink) {
            Ok(()) => (),
            Err(PesError::Sink(e)) => return Err(e),
            Err(e) => warn!("{}: {}", self.reassembler.pid(), e),
        }
        self.sink.finalize(self.reassembler.pid())
    }
}

/// What is done with the packets of one PID, decided once per PID.
pub enum Channel {
    Video(PesChannel),
    Audio(PesChannel),
    /// Packets are only counted
    Counting,
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Video(c) => write!(f, "Video({})", c.reassembler.pid()),
            Channel::Audio(c) => write!(f, "Audio({})", c.reassembler.pid()),
            Channel::Counting => f.write_str("Counting"),
        }
    }
}

impl Channel {
    fn consume(&mut self, pk: &Packet<'_>, frame: u64) -> io::Result<()> {
        match self {
            Channel::Video(c) | Channel::Audio(c) => c.consume(pk, frame),
            Channel::Counting => Ok(()),
        }
    }

    fn finish(&mut self) -> io::Result<()> {
        match self {
            Channel::Video(c) | Channel::Audio(c) => c.finish(),
            Channel::Counting => Ok(()),
        }
    }
}

/// Share of the multiplex used by one PID
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PidBitrate {
    pub pid: Pid,
    pub packets: u64,
    /// bits per second
    pub bitrate: f64,
}

impl PidBitrate {
    /// The bitrate in Mbit/s
    pub fn mbps(&self) -> f64 {
        self.bitrate / 1_000_000.0
    }
}

pub struct Demultiplexer {
    channels_by_pid: Vec<Option<Channel>>,
    packets_by_pid: Vec<u64>,
    total_packets: u64,
    malformed_packets: u64,
    scrambled_warned: FixedBitSet,
}

impl Default for Demultiplexer {
    fn default() -> Demultiplexer {
        Demultiplexer::new()
    }
}

impl Demultiplexer {
    pub fn new() -> Demultiplexer {
        Demultiplexer {
            channels_by_pid: (0..Pid::PID_COUNT).map(|_| None).collect(),
            packets_by_pid: vec![0; Pid::PID_COUNT],
            total_packets: 0,
            malformed_packets: 0,
            scrambled_warned: FixedBitSet::with_capacity(Pid::PID_COUNT),
        }
    }

    /// Reassemble the video stream on `pid` into `sink`
    pub fn select_video(&mut self, pid: Pid, sink: Box<dyn UnitSink>) {
        self.insert(pid, Channel::Video(PesChannel::new(pid, sink)));
    }

    /// Reassemble the audio stream on `pid` into `sink`
    pub fn select_audio(&mut self, pid: Pid, sink: Box<dyn UnitSink>) {
        self.insert(pid, Channel::Audio(PesChannel::new(pid, sink)));
    }

    fn insert(&mut self, pid: Pid, channel: Channel) {
        let slot = &mut self.channels_by_pid[usize::from(pid)];
        if slot.is_some() {
            debug!("{}: replacing existing channel", pid);
        }
        *slot = Some(channel);
    }

    pub fn channel(&self, pid: Pid) -> Option<&Channel> {
        self.channels_by_pid[usize::from(pid)].as_ref()
    }

    /// Consume one packet, `frame` being its position in the input for diagnostics.
    ///
    /// A packet that can not be decoded is logged and skipped.  Errors are only returned when a
    /// sink fails.
    pub fn push(&mut self, buf: &[u8], frame: u64) -> io::Result<()> {
        let pk = match Packet::from_bytes(buf) {
            Ok(pk) => pk,
            Err(e) => {
                warn!("packet {}: {}", frame, e);
                self.malformed_packets += 1;
                return Ok(());
            }
        };
        let pid = pk.pid();
        let index = usize::from(pid);
        self.packets_by_pid[index] += 1;
        self.total_packets += 1;
        if pk.transport_scrambling_control().is_scrambled() && !self.scrambled_warned.contains(index)
        {
            warn!("{} packet {}: payload is scrambled", pid, frame);
            self.scrambled_warned.insert(index);
        }
        let channel = self.channels_by_pid[index].get_or_insert_with(|| {
            debug!("{}: first seen at packet {}", pid, frame);
            Channel::Counting
        });
        channel.consume(&pk, frame)
    }

    /// Process the whole input from its start, then `finish()`.
    pub fn run<R: Read + Seek>(&mut self, source: &mut PacketSource<R>) -> io::Result<()> {
        source.rewind()?;
        loop {
            let frame = source.position();
            match source.next_packet()? {
                Some(buf) => self.push(buf, frame)?,
                None => break,
            }
        }
        info!(
            "demultiplexed {} packets ({} malformed)",
            self.total_packets, self.malformed_packets
        );
        self.finish()
    }

    /// Deliver the last unit of each elementary stream and finalize every sink.
    pub fn finish(&mut self) -> io::Result<()> {
        for channel in self.channels_by_pid.iter_mut().flatten() {
            channel.finish()?;
        }
        Ok(())
    }

    pub fn packets(&self, pid: Pid) -> u64 {
        self.packets_by_pid[usize::from(pid)]
    }

    /// Well formed packets seen, over all PIDs
    pub fn total_packets(&self) -> u64 {
        self.total_packets
    }

    pub fn malformed_packets(&self) -> u64 {
        self.malformed_packets
    }

    /// The bitrate of each PID seen, given the multiplex's total `capacity` in bits per second,
    /// highest first.
    pub fn bitrates(&self, capacity: f64) -> Vec<PidBitrate> {
        if self.total_packets == 0 {
            return vec![];
        }
        let mut rates: Vec<PidBitrate> = self
            .packets_by_pid
            .iter()
            .enumerate()
            .filter(|(_, count)| **count > 0)
            .map(|(pid, &count)| PidBitrate {
                pid: Pid::new(pid as u16),
                packets: count,
                bitrate: capacity * count as f64 / self.total_packets as f64,
            })
            .collect();
        rates.sort_by(|a, b| {
            b.bitrate
                .partial_cmp(&a.bitrate)
                .unwrap_or(Ordering::Equal)
                .then(a.pid.cmp(&b.pid))
        });
        rates
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::pes::ElementaryUnit;
    use crate::test_util::*;
    use assert_matches::assert_matches;
    use hex_literal::hex;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Shares the collected units with the test after the demultiplexer takes the sink
    #[derive(Clone, Default)]
    struct SharedSink {
        units: Rc<RefCell<Vec<ElementaryUnit>>>,
        finalized: Rc<RefCell<Vec<Pid>>>,
    }
    impl UnitSink for SharedSink {
        fn accept(&mut self, unit: ElementaryUnit) -> io::Result<()> {
            self.units.borrow_mut().push(unit);
            Ok(())
        }
        fn finalize(&mut self, pid: Pid) -> io::Result<()> {
            self.finalized.borrow_mut().push(pid);
            Ok(())
        }
    }

    struct FailingSink;
    impl UnitSink for FailingSink {
        fn accept(&mut self, _unit: ElementaryUnit) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::Other, "disk full"))
        }
        fn finalize(&mut self, _pid: Pid) -> io::Result<()> {
            Ok(())
        }
    }

    fn pes(payload: &[u8]) -> Vec<u8> {
        let mut data = hex!("000001e0 0000 8000 00").to_vec();
        data.extend_from_slice(payload);
        data
    }

    #[test]
    fn empty_input() {
        let mut demux = Demultiplexer::new();
        demux.run(&mut source(vec![])).unwrap();
        assert_eq!(demux.total_packets(), 0);
        assert!(demux.bitrates(1_000_000.0).is_empty());
    }

    #[test]
    fn bitrate_share() {
        let video = Pid::new(0x101);
        let other = Pid::new(0x200);
        let mut data = vec![];
        for i in 0..100u8 {
            let pid = if i % 10 == 0 { video } else { other };
            data.extend(adaptation_only(pid, 0));
        }
        let mut demux = Demultiplexer::new();
        demux.run(&mut source(data)).unwrap();
        assert_eq!(demux.total_packets(), 100);
        assert_eq!(demux.packets(video), 10);
        assert_matches!(demux.channel(other), Some(Channel::Counting));

        let capacity = 24_000_000.0;
        let rates = demux.bitrates(capacity);
        assert_eq!(rates.len(), 2);
        assert_eq!(rates[0].pid, other);
        assert_eq!(rates[1].pid, video);
        assert!((rates[1].bitrate - capacity * 10.0 / 100.0).abs() < 1e-6);
        assert!((rates[1].mbps() - 2.4).abs() < 1e-9);
    }

    #[test]
    fn selected_pid_reassembled() {
        let video = Pid::new(0x101);
        let mut data = vec![];
        let mut cc = 0;
        for payload in &[[1u8, 2, 3], [4, 5, 6]] {
            let packets = packetize_pes(video, &pes(payload), cc);
            cc += packets.len() as u8;
            data.extend(packets.concat());
        }
        data.extend(adaptation_only(Pid::new(0x200), 0));
        let sink = SharedSink::default();
        let mut demux = Demultiplexer::new();
        demux.select_video(video, Box::new(sink.clone()));
        demux.run(&mut source(data)).unwrap();

        let units = sink.units.borrow();
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].payload, vec![1, 2, 3]);
        assert_eq!(units[1].payload, vec![4, 5, 6]);
        assert_eq!(*sink.finalized.borrow(), vec![video]);
        assert_eq!(demux.total_packets(), 3);
        assert_matches!(demux.channel(video), Some(Channel::Video(_)));
        assert_eq!(
            format!("{:?}", demux.channel(video).unwrap()),
            format!("Video({})", video)
        );
    }

    #[test]
    fn malformed_packet_skipped() {
        let pid = Pid::new(0x200);
        let mut data = adaptation_only(pid, 0);
        let mut bad = adaptation_only(pid, 1);
        bad[0] = 0x00;
        data.extend(bad);
        data.extend(adaptation_only(pid, 1));
        let mut demux = Demultiplexer::new();
        demux.run(&mut source(data)).unwrap();
        assert_eq!(demux.malformed_packets(), 1);
        assert_eq!(demux.packets(pid), 2);
    }

    #[test]
    fn sink_failure_returned() {
        let video = Pid::new(0x101);
        let mut data = packetize_pes(video, &pes(&[1]), 0).concat();
        data.extend(packetize_pes(video, &pes(&[2]), 1).concat());
        let mut demux = Demultiplexer::new();
        demux.select_video(video, Box::new(FailingSink));
        assert!(demux.run(&mut source(data)).is_err());
    }
}
