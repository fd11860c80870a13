//! Command bodies for the rectune CLI.

use std::collections::HashMap;
use std::fs;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use colored::Colorize;
use indicatif::{HumanBytes, ProgressBar, ProgressStyle};
use log::{debug, info, warn};
use thiserror::Error;

use rectune::channels::{parse_scan_file, ScanFileError, TuneRequest};
use rectune::ts_analyzer::psi::table_name;
use rectune::ts_analyzer::{SectionCollector, SectionDeduper, SiSection, TsPacket, TS_PACKET_SIZE};
use rectune::tuner::{PID_ATSC_SI_BASE, PID_DVB_SDT, PID_PAT};
use rectune::{DeviceConfig, FilterType, TunerController, TunerError};

const READ_BUFFER_SIZE: usize = TS_PACKET_SIZE * 1024;

#[derive(Debug, Error)]
pub(crate) enum CommandError {
    #[error(transparent)]
    ScanFile(#[from] ScanFileError),

    #[error(transparent)]
    Tuner(#[from] TunerError),

    #[error("scan file has no entry at index {0}")]
    NoSuchChannel(usize),

    #[error("tuning failed")]
    TuneFailed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn load_channels(path: &Path) -> Result<Vec<TuneRequest>, CommandError> {
    let file = fs::File::open(path)?;
    let requests = parse_scan_file(BufReader::new(file))?;
    info!("{}: {} channels", path.display(), requests.len());
    Ok(requests)
}

/// One-line description of a scan-file entry, for listings and logs.
fn describe(request: &TuneRequest) -> String {
    match request {
        TuneRequest::Atsc {
            frequency,
            modulation,
            rf_number,
        } => match rf_number {
            Some(rf) => format!("ATSC RF {rf}, {frequency} Hz {modulation}"),
            None => format!("ATSC {frequency} Hz {modulation}"),
        },
        TuneRequest::Dvb(params) => format!(
            "{:?} {} kHz {} {} kSym/s {} {}",
            params.system,
            params.frequency,
            params.polarization,
            params.symbol_rate,
            params.fec,
            params.modulation
        ),
        TuneRequest::File { path, .. } => format!("file {}", path.display()),
    }
}

fn open_output(location: &str) -> std::io::Result<Box<dyn Write>> {
    if location == "-" {
        Ok(Box::new(std::io::stdout().lock()))
    } else {
        Ok(Box::new(BufWriter::new(fs::File::create(location)?)))
    }
}

/// Flag cleared by Ctrl-C (or SIGTERM).
fn interrupt_flag() -> Arc<AtomicBool> {
    let running = Arc::new(AtomicBool::new(true));
    let handle = running.clone();
    if let Err(err) = ctrlc::set_handler(move || handle.store(false, Ordering::SeqCst)) {
        warn!("can't install Ctrl-C handler: {err}");
    }
    running
}

fn recording_deadline(time: Option<f64>) -> Option<Instant> {
    time.filter(|t| *t > 0.0)
        .map(|t| Instant::now() + Duration::from_secs_f64(t))
}

pub(crate) fn tune(
    channels: &Path,
    index: usize,
    adapter: Option<u32>,
    pids: &[u16],
    time: Option<f64>,
    output: &str,
) -> Result<(), CommandError> {
    let requests = load_channels(channels)?;
    let request = requests
        .get(index)
        .ok_or(CommandError::NoSuchChannel(index))?;
    info!("tuning {}", describe(request));

    if let TuneRequest::File { path, .. } = request {
        return replay_file(path, output);
    }

    let controller = TunerController::open_first_available(&DeviceConfig {
        adapter,
        frontend: 0,
    })?;
    if !controller.tune(request) {
        return Err(CommandError::TuneFailed);
    }
    for &pid in pids {
        controller.add_pid_filter(pid, FilterType::Other);
    }

    let mut out = open_output(output)?;
    let written = record(&controller, out.as_mut(), time)?;
    controller.stop_tune();
    eprintln!("{} {}", "recorded".green(), HumanBytes(written));
    Ok(())
}

/// Copies a file-replay entry straight to the output.
fn replay_file(path: &Path, output: &str) -> Result<(), CommandError> {
    info!("replaying {}", path.display());
    let mut input = fs::File::open(path)?;
    let mut out = open_output(output)?;
    let written = std::io::copy(&mut input, &mut out)?;
    out.flush()?;
    eprintln!("{} {}", "replayed".green(), HumanBytes(written));
    Ok(())
}

/// Pulls the stream until the deadline passes or the user interrupts.
fn record(
    controller: &TunerController,
    out: &mut dyn Write,
    time: Option<f64>,
) -> Result<u64, CommandError> {
    let running = interrupt_flag();
    let deadline = recording_deadline(time);

    let progress = ProgressBar::new_spinner();
    if let Ok(style) =
        ProgressStyle::with_template("{spinner} {elapsed_precise} {bytes} ({bytes_per_sec})")
    {
        progress.set_style(style);
    }

    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    let mut written: u64 = 0;
    while running.load(Ordering::SeqCst) {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            break;
        }
        // A zero-length read means "no data yet"; the device read is
        // internally paced, so this does not spin.
        let read = controller.read_stream(&mut buf);
        if read == 0 {
            continue;
        }
        out.write_all(&buf[..read])?;
        written += read as u64;
        progress.set_position(written);
    }
    progress.finish_and_clear();
    out.flush()?;
    Ok(written)
}

pub(crate) fn scan(channels: &Path, adapter: Option<u32>, dwell: u64) -> Result<(), CommandError> {
    let requests = load_channels(channels)?;
    let controller = TunerController::open_first_available(&DeviceConfig {
        adapter,
        frontend: 0,
    })?;
    let running = interrupt_flag();

    let progress = ProgressBar::new(requests.len() as u64);
    if let Ok(style) = ProgressStyle::with_template("{bar:40} {pos}/{len} {msg}") {
        progress.set_style(style);
    }

    for request in &requests {
        if !running.load(Ordering::SeqCst) {
            break;
        }
        progress.set_message(describe(request));

        if matches!(request, TuneRequest::File { .. }) {
            warn!("skipping file entry: {}", describe(request));
            progress.inc(1);
            continue;
        }
        if !controller.tune(request) {
            warn!("tune failed: {}", describe(request));
            progress.inc(1);
            continue;
        }

        let sections = survey_channel(&controller, &running, Duration::from_secs(dwell));
        controller.stop_tune();

        progress.println(format!(
            "{}: {} distinct SI sections",
            describe(request).bold(),
            sections.len()
        ));
        for section in &sections {
            progress.println(format!(
                "  {} (table 0x{:02x}) extension 0x{:04x} section {}",
                table_name(section.table_id),
                section.table_id,
                section.table_id_extension,
                section.section_number
            ));
        }
        progress.inc(1);
    }
    progress.finish_and_clear();
    Ok(())
}

/// Reads the stream for `dwell`, reassembling sections on the SI PIDs
/// and recording each distinct identity once.
fn survey_channel(
    controller: &TunerController,
    running: &AtomicBool,
    dwell: Duration,
) -> Vec<SiSection> {
    let mut collectors: HashMap<u16, SectionCollector> = [PID_PAT, PID_DVB_SDT, PID_ATSC_SI_BASE]
        .into_iter()
        .map(|pid| (pid, SectionCollector::new()))
        .collect();
    let mut deduper = SectionDeduper::new();
    let mut found = Vec::new();

    let deadline = Instant::now() + dwell;
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    while running.load(Ordering::SeqCst) && Instant::now() < deadline {
        let read = controller.read_stream(&mut buf);
        for chunk in buf[..read].chunks_exact(TS_PACKET_SIZE) {
            let Some(packet) = TsPacket::parse(chunk) else {
                debug!("skipping unsynchronized packet");
                continue;
            };
            let Some(collector) = collectors.get_mut(&packet.pid()) else {
                continue;
            };
            for section in collector.push(&packet) {
                if let Some(identity) = deduper.observe(&section) {
                    found.push(identity);
                }
            }
        }
    }
    found
}

pub(crate) fn list(channels: &Path) -> Result<(), CommandError> {
    let requests = load_channels(channels)?;
    for (index, request) in requests.iter().enumerate() {
        println!("{:>4}  {}", index.to_string().cyan(), describe(request));
    }
    Ok(())
}
