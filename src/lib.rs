use std::env;
use std::path::PathBuf;
use clap::Parser;
use crate::error::AppRunError;
use crate::monitor::{run_dump, run_monitor};

pub mod device;
pub mod error;
pub mod config;
pub mod monitor;

/// Battery monitor for wireless earphones, fed by their BLE advertisements.
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(version, about)]
pub struct Args {
    /// Config file to use instead of the default location
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Assign a model to a registered device and save the config, e.g. `--set-model <PATH>=0E20`
    #[arg(long = "set-model", value_name = "PATH=MODEL")]
    pub set_model: Vec<String>,

    /// Scan once and log every accessory advertisement in range, then exit
    #[arg(long)]
    pub dump: bool,

    /// Log debug messages
    #[arg(short, long)]
    pub verbose: bool,
}

pub fn init_logging(verbose: bool) {
    let level = if verbose { log::LevelFilter::Debug } else { log::LevelFilter::Info };

    let mut dispatch = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{} {} {}] {}",
                humantime::format_rfc3339(std::time::SystemTime::now()),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(level)
        // btleplug is very chatty on debug
        .level_for("btleplug", log::LevelFilter::Warn)
        .chain(std::io::stderr());

    if let Ok(log_file) = env::var("LOG_FILE") {
        match fern::log_file(&log_file) {
            Ok(file) => dispatch = dispatch.chain(file),
            Err(err) => eprintln!("Failed to open LOG_FILE {}: {}", log_file, err),
        }
    }

    if let Err(err) = dispatch.apply() {
        eprintln!("Failed to initialize logger: {}", err);
    }
}

pub fn run(args: Args) -> Result<(), AppRunError> {
    // the monitor is cooperative: one thread, every wait is an await
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    if args.dump {
        runtime.block_on(run_dump(args))
    } else {
        runtime.block_on(run_monitor(args))
    }
}
