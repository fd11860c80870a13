//! rectune: record ATSC and DVB-S/S2 transport streams from a tuner
//! device.

use clap::Parser;
use env_logger::Env;
use log::error;

mod commands;
mod context;

use context::{Cli, Commands};

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Tune {
            channels,
            index,
            adapter,
            pids,
            time,
            output,
        } => {
            let output = output.unwrap_or_else(|| "-".to_owned());
            commands::tune(&channels, index, adapter, &pids, time, &output)
        }
        Commands::Scan {
            channels,
            adapter,
            dwell,
        } => commands::scan(&channels, adapter, dwell),
        Commands::List { channels } => commands::list(&channels),
    };

    if let Err(err) = result {
        error!("{err}");
        std::process::exit(1);
    }
}
