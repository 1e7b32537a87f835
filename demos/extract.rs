//! Reads a recorded DVB-T multiplex, prints what it carries and writes the elementary streams of
//! each television service to the output directory.
//!
//! ```text
//! cargo run --example extract -- recording.ts out/
//! ```

use dvbt_demux::demultiplex::Demultiplexer;
use dvbt_demux::discovery::{discover, DiscoveryConfig};
use dvbt_demux::program::{ElementaryStream, MultiplexInfo, ProgramEvent};
use dvbt_demux::sink::ElementaryStreamWriter;
use dvbt_demux::source::PacketSource;
use std::env;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::process;

fn stream_file(dir: &Path, stream: &ElementaryStream, ext: &str) -> io::Result<BufWriter<File>> {
    let name = format!("{:04x}.{}", u16::from(stream.pid), ext);
    Ok(BufWriter::new(File::create(dir.join(name))?))
}

fn print_events(title: &str, events: &[ProgramEvent]) {
    println!("    {}:", title);
    for e in events {
        let start = e
            .start_time
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "????-??-?? ??:??:??".to_string());
        println!(
            "      {} {} - {}",
            start,
            e.name.as_deref().unwrap_or("?"),
            e.text.as_deref().unwrap_or("")
        );
    }
}

fn run(input: &Path, out_dir: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let mut source = PacketSource::new(BufReader::new(File::open(input)?));
    let tables = discover(&mut source, &DiscoveryConfig::default())?;
    let info = MultiplexInfo::from_tables(&tables);

    println!("Network name: {}", info.network_name);
    match info.network_id {
        Some(id) => println!("Network ID: {}", id),
        None => println!("Network ID: (unknown)"),
    }
    if let Some(ref d) = info.delivery {
        println!("Bandwidth: {}", d.bandwidth());
        println!("Constellation: {}", d.constellation());
        println!("Guard interval: {}", d.guard_interval());
        println!("Code rate: {}", d.code_rate());
    }

    let mut demux = Demultiplexer::new();
    for program in &info.programs {
        let dir: PathBuf = out_dir.join(program.directory_name());
        fs::create_dir_all(&dir)?;
        println!(
            "Program {} {:?}",
            program.program_number,
            program.service_name.as_deref().unwrap_or("unknown")
        );
        print_events("present", &program.present_events);
        print_events("schedule", &program.schedule_events);
        for v in &program.video {
            let out = stream_file(&dir, v, "video")?;
            demux.select_video(v.pid, Box::new(ElementaryStreamWriter::new(out, v.stream_type)));
        }
        for a in &program.audio {
            let out = stream_file(&dir, a, "audio")?;
            demux.select_audio(a.pid, Box::new(ElementaryStreamWriter::new(out, a.stream_type)));
        }
    }

    demux.run(&mut source)?;

    match info.channel_capacity() {
        Some(capacity) => {
            println!("Bitrate:");
            for rate in demux.bitrates(capacity) {
                println!("  {}: {:.2} Mbps", rate.pid, rate.mbps());
            }
        }
        None => println!("Bitrate: (unknown)"),
    }
    Ok(())
}

fn main() {
    env_logger::init();
    let mut args = env::args().skip(1);
    let (input, out_dir) = match (args.next(), args.next()) {
        (Some(input), Some(out_dir)) => (PathBuf::from(input), PathBuf::from(out_dir)),
        _ => {
            eprintln!("usage: extract <input.ts> <output-dir>");
            process::exit(2);
        }
    };
    if let Err(e) = run(&input, &out_dir) {
        eprintln!("{}: {}", input.display(), e);
        process::exit(1);
    }
}
