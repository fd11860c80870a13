use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_num::maybe_hex;

#[derive(Debug, Parser)]
#[clap(name = "rectune")]
#[clap(about = "rectune tunes ATSC and DVB-S/S2 tuner devices and records the transport stream. ", long_about = None)]
#[clap(version)]
pub(crate) struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub(crate) enum Commands {
    /// Tune to a channel and record the transport stream.{n}
    /// The channel is selected by its index in the scan file;
    /// use the `list` subcommand to see the indices.{n}
    /// Recording continues until the duration elapses or the
    /// user stops it with Ctrl-C.
    Tune {
        /// The scan file.{n}
        /// A line-oriented list of channels; the format is described
        /// in the `channels` module documentation.
        #[clap(short, long, value_name = "FILE", required = true)]
        channels: PathBuf,

        /// Zero-based index of the scan-file entry to tune.
        #[clap(short, long, default_value = "0")]
        index: usize,

        /// The DVB adapter number.{n}
        /// If not specified, adapters are probed in order and the
        /// first usable one is taken.
        #[clap(short, long)]
        adapter: Option<u32>,

        /// Additional PIDs to deliver besides the SI baseline.{n}
        /// Decimal or hexadecimal (0x...) values, comma separated
        /// or repeated.
        #[clap(short, long, value_parser = maybe_hex::<u16>, value_delimiter = ',')]
        pids: Vec<u16>,

        /// The duration of the recording.{n}
        /// The duration is specified in seconds as a floating point
        /// number.{n}
        /// If the duration is missing, zero or negative, the recording
        /// continues until the user stops it.
        #[clap(short, long, value_name = "seconds")]
        time: Option<f64>,

        /// The location of the output.{n}
        /// If '-' is specified, the recording is redirected to
        /// stdout.
        #[clap(required = true)]
        output: Option<String>,
    },

    /// Survey the SI tables of every channel in a scan file.{n}
    /// Tunes each channel in turn, dwells on it, and reports the
    /// distinct SI sections observed on the PAT, SDT and ATSC
    /// base PIDs.
    Scan {
        /// The scan file.
        #[clap(short, long, value_name = "FILE", required = true)]
        channels: PathBuf,

        /// The DVB adapter number.{n}
        /// If not specified, adapters are probed in order and the
        /// first usable one is taken.
        #[clap(short, long)]
        adapter: Option<u32>,

        /// Dwell time per channel in seconds.
        #[clap(long, default_value = "5")]
        dwell: u64,
    },

    /// List the channels described by a scan file.
    List {
        /// The scan file.
        #[clap(short, long, value_name = "FILE", required = true)]
        channels: PathBuf,
    },
}
