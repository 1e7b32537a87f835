//! Reading tables from damaged streams.
//!
//! A failed read (lost packets, an overlapping section, a truncated record) is usually cured by
//! simply trying again further on, since tables are repeated throughout the stream.  The
//! `RetryPolicy` bounds how many times this is attempted.

use crate::packet::Pid;
use crate::psi::{read_section, PsiError, Section};
use crate::source::PacketSource;
use log::{debug, error, warn};
use std::io::{self, Read, Seek};
use thiserror::Error;

/// How many failed attempts are tolerated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempts {
    /// Give up after the given number of failures
    Limited(u32),
    /// Keep trying until the end of input
    Unlimited,
}

/// Controls `read_table()`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: Attempts,
    /// Rewind to the start of the input before the first attempt
    pub reset: bool,
}

impl RetryPolicy {
    /// Rewind, then allow up to `n` failures
    pub fn limited(n: u32) -> RetryPolicy {
        RetryPolicy {
            attempts: Attempts::Limited(n),
            reset: true,
        }
    }

    /// Rewind, then retry until the end of input
    pub fn unlimited() -> RetryPolicy {
        RetryPolicy {
            attempts: Attempts::Unlimited,
            reset: true,
        }
    }

    /// Continue from the current position rather than rewinding
    pub fn without_reset(self) -> RetryPolicy {
        RetryPolicy {
            reset: false,
            ..self
        }
    }
}

#[derive(Debug, Error)]
pub enum ReadError {
    #[error("gave up reading PID {pid} after {attempts} failed attempts")]
    RetryBudgetExhausted { pid: Pid, attempts: u32 },
    #[error("mandatory table {table} could not be read")]
    MandatoryTableMissing { table: &'static str },
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Reads sections from `pid` until `decode` accepts one, returning its result, or `None` if the
/// input ends first.
///
/// When a section can not be assembled, the source is advanced one packet beyond the packet
/// that caused the failure and the read tried again.  A section that was assembled but rejected
/// by `decode` has already been consumed, so reading simply continues.  Either kind of failure
/// counts against the policy's budget.
pub fn read_table<R, T, F>(
    source: &mut PacketSource<R>,
    pid: Pid,
    policy: &RetryPolicy,
    mut decode: F,
) -> Result<Option<T>, ReadError>
where
    R: Read + Seek,
    F: FnMut(&Section) -> Result<T, PsiError>,
{
    if policy.reset {
        source.rewind()?;
    }
    let mut failures = 0;
    loop {
        let err = match read_section(source, pid) {
            Ok(None) => return Ok(None),
            Ok(Some(section)) => match decode(&section) {
                Ok(table) => return Ok(Some(table)),
                Err(e) => e,
            },
            Err(PsiError::Io(e)) => return Err(ReadError::Io(e)),
            Err(e) => {
                source.skip_packet()?;
                e
            }
        };
        warn!("{} before packet {}: {}", pid, source.position(), err);
        failures += 1;
        if let Attempts::Limited(n) = policy.attempts {
            if failures >= n {
                return Err(ReadError::RetryBudgetExhausted {
                    pid,
                    attempts: failures,
                });
            }
        }
    }
}

/// As `read_table()`, but a table that can not be found is an error.
pub fn read_mandatory_table<R, T, F>(
    source: &mut PacketSource<R>,
    pid: Pid,
    table: &'static str,
    policy: &RetryPolicy,
    decode: F,
) -> Result<T, ReadError>
where
    R: Read + Seek,
    F: FnMut(&Section) -> Result<T, PsiError>,
{
    match read_table(source, pid, policy, decode) {
        Ok(Some(t)) => Ok(t),
        Ok(None) => {
            error!("{} not found before end of input", table);
            Err(ReadError::MandatoryTableMissing { table })
        }
        Err(ReadError::RetryBudgetExhausted { attempts, .. }) => {
            error!("{} unreadable after {} attempts", table, attempts);
            Err(ReadError::MandatoryTableMissing { table })
        }
        Err(e) => Err(e),
    }
}

/// As `read_table()`, but failure to find the table is logged and reported as `None`.
pub fn read_optional_table<R, T, F>(
    source: &mut PacketSource<R>,
    pid: Pid,
    table: &'static str,
    policy: &RetryPolicy,
    decode: F,
) -> Result<Option<T>, ReadError>
where
    R: Read + Seek,
    F: FnMut(&Section) -> Result<T, PsiError>,
{
    match read_table(source, pid, policy, decode) {
        Ok(None) => {
            debug!("{} not present", table);
            Ok(None)
        }
        Err(ReadError::RetryBudgetExhausted { attempts, .. }) => {
            warn!("{} unreadable after {} attempts, continuing without it", table, attempts);
            Ok(None)
        }
        other => other,
    }
}
