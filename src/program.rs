//! Joins the discovered tables into one record per television service.
//!
//! The PAT gives each program's PMT, the SDT names the service with the same id, the PMTs say
//! which PIDs carry its pictures and sound, and the EIT lists its events.  Any of the optional
//! tables may be missing, in which case the corresponding fields are left empty.

use crate::descriptor::iso_639_language::Iso639LanguageDescriptor;
use crate::descriptor::local_time_offset::LocalTimeOffset;
use crate::descriptor::service::ServiceType;
use crate::descriptor::terrestrial_delivery::TerrestrialDeliverySystemDescriptor;
use crate::descriptor::{self, Descriptor};
use crate::discovery::PsiTables;
use crate::packet::Pid;
use crate::psi::eit::{EitSection, Event};
use crate::psi::pmt::{PmtSection, StreamInfo};
use crate::psi::RunningStatus;
use crate::StreamType;
use chrono::{Duration, NaiveDateTime};
use log::{debug, warn};
use std::collections::BTreeMap;

/// Used for the network name when there is no NIT, or the NIT does not give one
pub const UNKNOWN_NETWORK_NAME: &str = "(unknown)";

/// An elementary stream chosen for extraction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementaryStream {
    pub pid: Pid,
    pub stream_type: StreamType,
    /// ISO 639-2 code, for audio streams that declare one
    pub language: Option<String>,
}

/// One event of a service's programme guide, with its start time in local time
#[derive(Debug, Clone, PartialEq)]
pub struct ProgramEvent {
    pub event_id: u16,
    pub start_time: Option<NaiveDateTime>,
    pub duration: Option<Duration>,
    pub running_status: RunningStatus,
    pub name: Option<String>,
    pub text: Option<String>,
}

impl ProgramEvent {
    fn new(event: &Event, offset: Option<&LocalTimeOffset>) -> ProgramEvent {
        let start_time = match (event.start_time, offset) {
            (Some(utc), Some(lto)) => Some(lto.to_local(utc)),
            (start, _) => start,
        };
        let short = event.short_event();
        ProgramEvent {
            event_id: event.event_id,
            start_time,
            duration: event.duration,
            running_status: event.running_status,
            name: short.map(|s| s.event_name()),
            text: short.map(|s| s.text()),
        }
    }
}

/// A television service and the streams carrying it
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub program_number: u16,
    /// PID carrying the program's PMT
    pub pmt_pid: Pid,
    pub provider_name: Option<String>,
    pub service_name: Option<String>,
    pub service_type: Option<ServiceType>,
    pub video: Vec<ElementaryStream>,
    pub audio: Vec<ElementaryStream>,
    /// Present / following events, by start time
    pub present_events: Vec<ProgramEvent>,
    /// Schedule events, by start time
    pub schedule_events: Vec<ProgramEvent>,
}

impl Program {
    /// A name for this program usable as a single path component: the PMT PID, provider and
    /// service names, with path separators and control characters replaced by `_`.
    pub fn directory_name(&self) -> String {
        let name = format!(
            "0x{:04x}-{}-{}",
            u16::from(self.pmt_pid),
            self.provider_name.as_deref().unwrap_or("unknown"),
            self.service_name.as_deref().unwrap_or("unknown"),
        );
        name.chars()
            .map(|c| match c {
                '/' | '\\' => '_',
                c if c.is_control() => '_',
                c => c,
            })
            .collect()
    }
}

/// Description of the whole multiplex
#[derive(Debug, Clone, PartialEq)]
pub struct MultiplexInfo {
    pub network_name: String,
    pub network_id: Option<u16>,
    pub transport_stream_id: u16,
    pub delivery: Option<TerrestrialDeliverySystemDescriptor>,
    /// Broadcast time from the TDT / TOT
    pub utc_time: Option<NaiveDateTime>,
    pub local_time_offset: Option<LocalTimeOffset>,
    pub programs: Vec<Program>,
}

impl MultiplexInfo {
    /// Combine the given tables
    pub fn from_tables(tables: &PsiTables) -> MultiplexInfo {
        let network_name = tables
            .nit
            .as_ref()
            .and_then(|nit| nit.network_name())
            .unwrap_or_else(|| UNKNOWN_NETWORK_NAME.to_string());
        let delivery = tables
            .nit
            .as_ref()
            .and_then(|nit| nit.terrestrial_delivery())
            .cloned();
        if delivery.is_none() {
            warn!("no terrestrial delivery system descriptor, bitrates can not be calculated");
        }
        let local_time_offset = tables.tot.as_ref().and_then(|tot| tot.local_time_offset());

        let programs = tables
            .pat
            .programs()
            .filter_map(|(program_number, pmt_pid)| match tables.pmts.get(&program_number) {
                Some(pmt) => build_program(tables, pmt, pmt_pid, local_time_offset.as_ref()),
                None => {
                    debug!("program {}: no PMT, skipped", program_number);
                    None
                }
            })
            .collect();

        MultiplexInfo {
            network_name,
            network_id: tables.nit.as_ref().map(|nit| nit.network_id),
            transport_stream_id: tables.pat.transport_stream_id,
            delivery,
            utc_time: tables.tot.as_ref().and_then(|tot| tot.utc_time),
            local_time_offset,
            programs,
        }
    }

    /// Useful bitrate of the multiplex in bits per second, when the delivery parameters are known
    pub fn channel_capacity(&self) -> Option<f64> {
        self.delivery.as_ref().and_then(|d| d.channel_capacity())
    }
}

/// Radio, teletext and other services with no pictures
fn is_non_television(service_type: ServiceType) -> bool {
    matches!(
        service_type,
        ServiceType::DigitalRadio | ServiceType::AdvancedCodecRadio | ServiceType::Teletext
    )
}

fn build_program(
    tables: &PsiTables,
    pmt: &PmtSection,
    pmt_pid: Pid,
    offset: Option<&LocalTimeOffset>,
) -> Option<Program> {
    let program_number = pmt.program_number;
    let service = tables
        .sdt
        .as_ref()
        .and_then(|sdt| sdt.service(program_number))
        .and_then(|s| s.service_descriptor());
    if service.is_none() {
        debug!("program {}: no service descriptor, names unknown", program_number);
    }
    if let Some(s) = service {
        if is_non_television(s.service_type()) {
            debug!(
                "program {}: skipping {:?} service",
                program_number,
                s.service_type()
            );
            return None;
        }
    }

    let video = pmt
        .streams
        .iter()
        .filter(|s| s.stream_type.is_video())
        .map(|s| ElementaryStream {
            pid: s.elementary_pid,
            stream_type: s.stream_type,
            language: None,
        })
        .collect();
    let audio = pmt.streams.iter().filter_map(main_audio).collect();

    Some(Program {
        program_number,
        pmt_pid,
        provider_name: service.map(|s| s.provider_name()),
        service_name: service.map(|s| s.service_name()),
        service_type: service.map(|s| s.service_type()),
        video,
        audio,
        present_events: events(
            &tables.eits,
            program_number,
            offset,
            EitSection::is_present_following,
        ),
        schedule_events: events(&tables.eits, program_number, offset, EitSection::is_schedule),
    })
}

/// Audio streams without a language descriptor are kept, as are those whose descriptor has an
/// entry for the main soundtrack; accessibility tracks are not.
fn main_audio(stream: &StreamInfo) -> Option<ElementaryStream> {
    if !stream.stream_type.is_audio() {
        return None;
    }
    let language = match descriptor::find(&stream.descriptors, |d| match d {
        Descriptor::Iso639Language(l) => Some(l),
        _ => None,
    }) {
        None => None,
        Some(desc) => Some(main_language(desc)?),
    };
    Some(ElementaryStream {
        pid: stream.elementary_pid,
        stream_type: stream.stream_type,
        language,
    })
}

fn main_language(desc: &Iso639LanguageDescriptor) -> Option<String> {
    desc.languages()
        .find(|l| l.audio_type().is_main())
        .map(|l| l.code())
}

/// The events of `service_id` from the EIT sections accepted by `table`, unique by start time
/// and event id, later sections replacing earlier ones.
fn events<F>(
    eits: &[EitSection],
    service_id: u16,
    offset: Option<&LocalTimeOffset>,
    table: F,
) -> Vec<ProgramEvent>
where
    F: Fn(&EitSection) -> bool,
{
    let mut by_start = BTreeMap::new();
    for eit in eits
        .iter()
        .filter(|eit| eit.service_id == service_id && !eit.is_other() && table(eit))
    {
        for event in &eit.events {
            let event = ProgramEvent::new(event, offset);
            by_start.insert((event.start_time, event.event_id), event);
        }
    }
    by_start.into_values().collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::psi::nit::NitSection;
    use crate::psi::pat::PatSection;
    use crate::psi::sdt::SdtSection;
    use crate::psi::tot::TotSection;
    use crate::psi::Section;
    use crate::test_util::long_section;
    use hex_literal::hex;

    fn section(pid: Pid, data: Vec<u8>) -> Section {
        Section::from_bytes(pid, data).unwrap()
    }

    fn pmt(pid: Pid, program_number: u16, streams: &[u8]) -> PmtSection {
        let mut payload = hex!("e101 f000").to_vec();
        payload.extend_from_slice(streams);
        let data = long_section(0x02, program_number, &payload);
        PmtSection::from_section(&section(pid, data), pid).unwrap()
    }

    fn eit(table_id: u8, service_id: u16, events: &[u8]) -> EitSection {
        let mut payload = hex!("0401 3001 00 4e").to_vec();
        payload.extend_from_slice(events);
        let data = long_section(table_id, service_id, &payload);
        EitSection::from_section(&section(Pid::EIT, data)).unwrap()
    }

    fn tables() -> PsiTables {
        let pat = PatSection::from_section(&section(
            Pid::PAT,
            long_section(0x00, 0x0401, &hex!("0000e010 0001e100 0002e200 0003e300")),
        ))
        .unwrap();
        let mut pmts = BTreeMap::new();
        pmts.insert(
            1,
            pmt(
                Pid::new(0x100),
                1,
                &hex!(
                    "02 e101 f000"
                    "03 e102 f006 0a04 636573 00"
                    "04 e103 f006 0a04 656e67 02"
                    "0f e104 f000"
                    "06 e105 f000"
                ),
            ),
        );
        pmts.insert(2, pmt(Pid::new(0x200), 2, &hex!("03 e201 f000")));
        pmts.insert(3, pmt(Pid::new(0x300), 3, &hex!("1b e301 f000")));
        let sdt = SdtSection::from_section(&section(
            Pid::SDT,
            long_section(
                0x42,
                0x0401,
                &hex!(
                    "3001 ff"
                    "0001 fd 800d 480b 01 04 50726f76 04 4368616e"
                    "0002 fd 800d 480b 02 04 50726f76 04 52616469"
                ),
            ),
        ))
        .unwrap();
        let nit = NitSection::from_section(
            &section(
                Pid::NIT,
                long_section(
                    0x40,
                    0x3001,
                    &hex!(
                        "f00b 4009 4d555820312043 5241"
                        "f013"
                        "0401 3001 f00d 5a0b 03c76840 1f 81 3a ffffffff"
                    ),
                ),
            ),
            Pid::NIT,
        )
        .unwrap();
        let tot = TotSection::from_section(&section(Pid::TOT, {
            let body = hex!("c079124500 f00f 580d 435a45 02 0100 ebf00100 00 0200");
            let len = body.len() + 4;
            let mut data = vec![0x73, 0x70 | (len >> 8) as u8, len as u8];
            data.extend_from_slice(&body);
            let crc = crate::psi::crc32(&data);
            data.extend_from_slice(&crc.to_be_bytes());
            data
        }))
        .unwrap();
        let eits = vec![
            eit(
                0x4e,
                1,
                &hex!("1234 c079124500 013000 8010 4d0e 637a65 05 5a70726176 04 44656e6e"),
            ),
            eit(
                0x4e,
                1,
                &hex!("1234 c079124500 013000 8010 4d0e 637a65 05 5a70726176 04 4e6f6331"),
            ),
            eit(
                0x50,
                1,
                &hex!(
                    "1236 c079140000 003000 2000"
                    "1235 c079110000 003000 2000"
                ),
            ),
            eit(0x4f, 1, &hex!("1237 c079124500 013000 8000")),
            eit(0x4e, 3, &hex!("1238 c079124500 013000 8000")),
        ];
        PsiTables {
            pat,
            nit: Some(nit),
            sdt: Some(sdt),
            tot: Some(tot),
            pmts,
            eits,
        }
    }

    #[test]
    fn television_services_only() {
        let info = MultiplexInfo::from_tables(&tables());
        let numbers: Vec<u16> = info.programs.iter().map(|p| p.program_number).collect();
        // program 2 is radio, program 3 has no service description at all
        assert_eq!(numbers, vec![1, 3]);
        let unnamed = &info.programs[1];
        assert_eq!(unnamed.service_name, None);
        assert_eq!(unnamed.video[0].stream_type, StreamType::H264);
        assert_eq!(unnamed.present_events.len(), 1);
        assert_eq!(unnamed.directory_name(), "0x0300-unknown-unknown");
    }

    #[test]
    fn directory_name_is_one_component() {
        let mut program = MultiplexInfo::from_tables(&tables()).programs.remove(0);
        program.provider_name = Some("A/B\\C".to_string());
        program.service_name = Some("News\n24/7".to_string());
        let name = program.directory_name();
        assert_eq!(name, "0x0100-A_B_C-News_24_7");
        assert_eq!(std::path::Path::new(&name).components().count(), 1);
    }

    #[test]
    fn streams_selected() {
        let info = MultiplexInfo::from_tables(&tables());
        let p = &info.programs[0];
        assert_eq!(p.pmt_pid, Pid::new(0x100));
        assert_eq!(p.provider_name.as_deref(), Some("Prov"));
        assert_eq!(p.service_name.as_deref(), Some("Chan"));
        assert_eq!(p.service_type, Some(ServiceType::DigitalTelevision));
        assert_eq!(
            p.video,
            vec![ElementaryStream {
                pid: Pid::new(0x101),
                stream_type: StreamType::H262,
                language: None,
            }]
        );
        let audio: Vec<(Pid, Option<&str>)> = p
            .audio
            .iter()
            .map(|a| (a.pid, a.language.as_deref()))
            .collect();
        assert_eq!(
            audio,
            vec![(Pid::new(0x102), Some("ces")), (Pid::new(0x104), None)]
        );
    }

    #[test]
    fn later_event_wins() {
        let info = MultiplexInfo::from_tables(&tables());
        let present = &info.programs[0].present_events;
        assert_eq!(present.len(), 1);
        assert_eq!(present[0].name.as_deref(), Some("Zprav"));
        assert_eq!(present[0].text.as_deref(), Some("Noc1"));
        // corrected to local time, CZE being UTC+1
        assert_eq!(
            present[0].start_time.unwrap().to_string(),
            "1993-10-13 13:45:00"
        );
        assert_eq!(present[0].duration, Some(Duration::minutes(90)));
    }

    #[test]
    fn schedule_in_start_order() {
        let info = MultiplexInfo::from_tables(&tables());
        let ids: Vec<u16> = info.programs[0]
            .schedule_events
            .iter()
            .map(|e| e.event_id)
            .collect();
        assert_eq!(ids, vec![0x1235, 0x1236]);
        assert!(info.programs[0].schedule_events[0].name.is_none());
    }

    #[test]
    fn multiplex_details() {
        let info = MultiplexInfo::from_tables(&tables());
        assert_eq!(info.network_name, "MUX 1 CRA");
        assert_eq!(info.network_id, Some(0x3001));
        assert_eq!(info.transport_stream_id, 0x0401);
        assert!(info.channel_capacity().is_some());
        assert_eq!(info.local_time_offset.unwrap().country_code, "CZE");
    }

    #[test]
    fn unknown_network() {
        let mut tables = tables();
        tables.nit = None;
        tables.sdt = None;
        tables.tot = None;
        let info = MultiplexInfo::from_tables(&tables);
        assert_eq!(info.network_name, UNKNOWN_NETWORK_NAME);
        assert_eq!(info.network_id, None);
        assert!(info.channel_capacity().is_none());
        // without the SDT nothing is known to be radio
        assert_eq!(info.programs.len(), 3);
        assert_eq!(
            info.programs[0].present_events[0].start_time.unwrap().to_string(),
            "1993-10-13 12:45:00"
        );
    }
}
