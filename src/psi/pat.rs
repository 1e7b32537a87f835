//! Types related to the _Program Association Table_

use crate::packet::Pid;
use crate::psi::{record_len, PsiError, Section};

/// `table_id` of a _program_association_section_
pub const TABLE_ID: u8 = 0x00;

/// An entry in the _Program Association Table_.  Program number zero is reserved to give the PID
/// of the _Network Information Table_.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProgramDescriptor {
    Network { pid: Pid },
    Program { program_number: u16, pid: Pid },
}

impl ProgramDescriptor {
    const SIZE: usize = 4;

    /// panics if fewer than 4 bytes are provided
    pub fn from_bytes(data: &[u8]) -> ProgramDescriptor {
        let program_number = (u16::from(data[0]) << 8) | u16::from(data[1]);
        let pid = Pid::from_bytes(data[2], data[3]);
        if program_number == 0 {
            ProgramDescriptor::Network { pid }
        } else {
            ProgramDescriptor::Program {
                program_number,
                pid,
            }
        }
    }

    pub fn pid(&self) -> Pid {
        match *self {
            ProgramDescriptor::Network { pid } => pid,
            ProgramDescriptor::Program { pid, .. } => pid,
        }
    }
}

/// Sections of the _Program Association Table_ give details of the programs within a transport
/// stream.  In the case of a broadcast multiplex there will be many.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PatSection {
    pub transport_stream_id: u16,
    pub programs: Vec<ProgramDescriptor>,
}

impl PatSection {
    /// Decode a section read from PID `0x0000`.
    pub fn from_section(section: &Section) -> Result<PatSection, PsiError> {
        section.expect_table(Pid::PAT, |id| id == TABLE_ID, "program_association_section")?;
        let transport_stream_id = section.table_syntax_header()?.id();
        let mut buf = section.payload()?;
        let mut programs = Vec::with_capacity(buf.len() / ProgramDescriptor::SIZE);
        while !buf.is_empty() {
            record_len(buf, "PAT program", ProgramDescriptor::SIZE)?;
            let (head, tail) = buf.split_at(ProgramDescriptor::SIZE);
            programs.push(ProgramDescriptor::from_bytes(head));
            buf = tail;
        }
        Ok(PatSection {
            transport_stream_id,
            programs,
        })
    }

    /// The PID carrying the _Network Information Table_, if the PAT gives one
    pub fn network_pid(&self) -> Option<Pid> {
        self.programs.iter().find_map(|p| match *p {
            ProgramDescriptor::Network { pid } => Some(pid),
            ProgramDescriptor::Program { .. } => None,
        })
    }

    /// The `(program_number, pmt_pid)` of every program, excluding the network entry
    pub fn programs(&self) -> impl Iterator<Item = (u16, Pid)> + '_ {
        self.programs.iter().filter_map(|p| match *p {
            ProgramDescriptor::Network { .. } => None,
            ProgramDescriptor::Program {
                program_number,
                pid,
            } => Some((program_number, pid)),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_util::long_section;
    use assert_matches::assert_matches;
    use hex_literal::hex;

    #[test]
    fn programs_and_network() {
        let data = long_section(0x00, 0x0401, &hex!("0000e010 0001e100 0002e200"));
        let section = Section::from_bytes(Pid::PAT, data).unwrap();
        let pat = PatSection::from_section(&section).unwrap();
        assert_eq!(pat.transport_stream_id, 0x0401);
        assert_eq!(pat.network_pid(), Some(Pid::NIT));
        let programs: Vec<_> = pat.programs().collect();
        assert_eq!(
            programs,
            vec![(1, Pid::new(0x100)), (2, Pid::new(0x200))]
        );
    }

    #[test]
    fn wrong_table() {
        let data = long_section(0x02, 1, &[]);
        let section = Section::from_bytes(Pid::PAT, data).unwrap();
        assert_matches!(
            PatSection::from_section(&section),
            Err(PsiError::UnexpectedTable { table_id: 0x02, .. })
        );
        let data = long_section(0x00, 1, &[]);
        let section = Section::from_bytes(Pid::new(0x100), data).unwrap();
        assert_matches!(
            PatSection::from_section(&section),
            Err(PsiError::UnexpectedTable { .. })
        );
    }

    #[test]
    fn partial_entry() {
        let data = long_section(0x00, 1, &hex!("0001e100 0002"));
        let section = Section::from_bytes(Pid::PAT, data).unwrap();
        assert_matches!(
            PatSection::from_section(&section),
            Err(PsiError::TruncatedRecord {
                expected: 4,
                actual: 2,
                ..
            })
        );
    }
}
