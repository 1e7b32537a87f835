//! Locating the service information tables of a recorded multiplex.
//!
//! Each table is found by a separate pass over the input, starting from the beginning:
//!
//! 1. the _Program Association Table_, without which nothing else can be found,
//! 2. the _Network Information Table_, on the PID the PAT gives (or the default `0x0010`),
//! 3. the _Service Description Table_,
//! 4. the _Time Offset Table_, preferring one that carries a local time offset,
//! 5. the _Program Map Table_ of each program,
//! 6. every _Event Information Table_ section to the end of the input.
//!
//! Only the PAT is mandatory; any other table that can not be read is left out of the result.

use crate::packet::Pid;
use crate::psi::eit::EitSection;
use crate::psi::nit::{self, NitSection};
use crate::psi::pat::PatSection;
use crate::psi::pmt::{self, PmtSection};
use crate::psi::sdt::{self, SdtSection};
use crate::psi::tot::TotSection;
use crate::psi::{PsiError, Section};
use crate::recover::{read_mandatory_table, read_optional_table, ReadError, RetryPolicy};
use crate::source::PacketSource;
use log::{debug, info};
use std::collections::BTreeMap;
use std::io::{Read, Seek};

/// Settings for `discover()`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryConfig {
    /// Failed attempts tolerated when reading each of the PAT, NIT, SDT and PMTs
    pub retries: u32,
    /// Reject sections whose `CRC_32` does not match
    pub verify_crc: bool,
    /// Keep EIT schedule sections, rather than only present/following
    pub scan_eit_schedule: bool,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        DiscoveryConfig {
            retries: 100,
            verify_crc: true,
            scan_eit_schedule: true,
        }
    }
}

/// The tables found in a multiplex
#[derive(Debug, Clone, PartialEq)]
pub struct PsiTables {
    pub pat: PatSection,
    pub nit: Option<NitSection>,
    pub sdt: Option<SdtSection>,
    pub tot: Option<TotSection>,
    /// Keyed by `program_number`
    pub pmts: BTreeMap<u16, PmtSection>,
    /// In stream order
    pub eits: Vec<EitSection>,
}

impl PsiTables {
    /// The PID the NIT is carried on
    pub fn network_pid(&self) -> Pid {
        self.pat.network_pid().unwrap_or(Pid::NIT)
    }
}

fn checked<T>(
    verify: bool,
    decode: impl Fn(&Section) -> Result<T, PsiError>,
) -> impl Fn(&Section) -> Result<T, PsiError> {
    move |section| {
        if verify && section.has_crc() {
            section.verify_crc()?;
        }
        decode(section)
    }
}

/// Find the tables of the multiplex, making one pass over `source` per table.
pub fn discover<R: Read + Seek>(
    source: &mut PacketSource<R>,
    config: &DiscoveryConfig,
) -> Result<PsiTables, ReadError> {
    let policy = RetryPolicy::limited(config.retries);

    let pat = read_mandatory_table(
        source,
        Pid::PAT,
        "PAT",
        &policy,
        checked(config.verify_crc, PatSection::from_section),
    )?;
    info!(
        "PAT: transport_stream_id {} with {} programs",
        pat.transport_stream_id,
        pat.programs().count()
    );

    let nit_pid = pat.network_pid().unwrap_or(Pid::NIT);
    let nit = read_optional_table(
        source,
        nit_pid,
        "NIT",
        &policy,
        checked(config.verify_crc, |s| {
            let table = NitSection::from_section(s, nit_pid)?;
            only_actual(s, table, nit::TABLE_ID_ACTUAL, "NIT actual")
        }),
    )?;
    if let Some(ref nit) = nit {
        info!("NIT: network {:?}", nit.network_name());
    }

    let sdt = read_optional_table(
        source,
        Pid::SDT,
        "SDT",
        &policy,
        checked(config.verify_crc, |s| {
            let table = SdtSection::from_section(s)?;
            only_actual(s, table, sdt::TABLE_ID_ACTUAL, "SDT actual")
        }),
    )?;
    if let Some(ref sdt) = sdt {
        info!("SDT: {} services", sdt.services.len());
    }

    let tot = read_tot(source, config)?;

    let mut pmts = BTreeMap::new();
    for (program_number, pid) in pat.programs() {
        let pmt = read_optional_table(
            source,
            pid,
            "PMT",
            &policy,
            checked(config.verify_crc, |s| {
                let table = PmtSection::from_section(s, pid)?;
                if table.program_number == program_number {
                    Ok(table)
                } else {
                    Err(PsiError::UnexpectedTable {
                        pid,
                        table_id: pmt::TABLE_ID,
                        expected: "PMT of another program",
                    })
                }
            }),
        )?;
        match pmt {
            Some(pmt) => {
                debug!("PMT for program {}: {} streams", program_number, pmt.streams.len());
                pmts.insert(program_number, pmt);
            }
            None => info!("no PMT for program {} on {}", program_number, pid),
        }
    }

    let eits = read_eits(source, config)?;
    info!("EIT: {} sections", eits.len());

    Ok(PsiTables {
        pat,
        nit,
        sdt,
        tot,
        pmts,
        eits,
    })
}

fn only_actual<T>(
    section: &Section,
    table: T,
    table_id: u8,
    expected: &'static str,
) -> Result<T, PsiError> {
    if section.table_id() == table_id {
        Ok(table)
    } else {
        Err(PsiError::UnexpectedTable {
            pid: section.pid(),
            table_id: section.table_id(),
            expected,
        })
    }
}

/// Keeps reading TDT / TOT sections until one gives a local time offset, settling for the last
/// one read if none does.
fn read_tot<R: Read + Seek>(
    source: &mut PacketSource<R>,
    config: &DiscoveryConfig,
) -> Result<Option<TotSection>, ReadError> {
    let mut policy = RetryPolicy::unlimited();
    let mut found = None;
    while let Some(tot) = read_optional_table(
        source,
        Pid::TOT,
        "TOT",
        &policy,
        checked(config.verify_crc, TotSection::from_section),
    )? {
        let has_offset = tot.local_time_offset().is_some();
        found = Some(tot);
        if has_offset {
            break;
        }
        policy = policy.without_reset();
    }
    match found {
        Some(ref tot) => info!(
            "TOT: {:?}, offset {:?}",
            tot.utc_time,
            tot.local_time_offset().map(|lto| lto.offset)
        ),
        None => info!("no TDT or TOT"),
    }
    Ok(found)
}

fn read_eits<R: Read + Seek>(
    source: &mut PacketSource<R>,
    config: &DiscoveryConfig,
) -> Result<Vec<EitSection>, ReadError> {
    let mut policy = RetryPolicy::unlimited();
    let mut eits = vec![];
    while let Some(eit) = read_optional_table(
        source,
        Pid::EIT,
        "EIT",
        &policy,
        checked(config.verify_crc, EitSection::from_section),
    )? {
        policy = policy.without_reset();
        if eit.is_schedule() && !config.scan_eit_schedule {
            continue;
        }
        eits.push(eit);
    }
    Ok(eits)
}
