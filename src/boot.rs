use anyhow::Result;
use chrono::Local;
use log::LevelFilter;
use std::{io, io::Write, sync::Arc};

use clap::ArgMatches;
use env_logger::{Builder, Target};

use crate::{
    cli::CliOptions,
    core::AppConfig,
    i18n,
    protocol::{LoopbackTransport, NativeTransport, SerialTransport},
};

/// Logger setup shared by every entrypoint.
///
/// Diagnostics go to the file named by `SERTERM_LOG_FILE` so they never end
/// up on the TUI screen; debug builds pick a timestamped file by default.
pub fn init_common() {
    let log_file = std::env::var("SERTERM_LOG_FILE").ok().or_else(|| {
        #[cfg(debug_assertions)]
        {
            Some(format!("./log_{}.log", Local::now().format("%Y%m%d%H%M%S")))
        }
        #[cfg(not(debug_assertions))]
        {
            None
        }
    });

    if let Some(path) = log_file {
        if let Err(err) = init_file_logger(&path) {
            eprintln!("Failed to initialize file logger at '{path}': {err}");
            env_logger::init();
        }
    } else {
        env_logger::init();
    }
}

fn init_file_logger(path: &str) -> io::Result<()> {
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;

    let mut builder = Builder::new();
    builder
        .format(|buf, record| {
            writeln!(
                buf,
                "{}:{} {} [{}] - {}",
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                Local::now().format("%Y-%m-%dT%H:%M:%S%.3f"),
                record.level(),
                record.args()
            )
        })
        .target(Target::Pipe(Box::new(file)))
        .filter_level(LevelFilter::Debug)
        .parse_default_env()
        .init();

    log::info!("File logger initialized at {path}");

    Ok(())
}

pub fn build_transport(loopback: bool, config: &AppConfig) -> Arc<dyn SerialTransport> {
    if loopback {
        log::info!("using the loopback demo device");
        Arc::new(LoopbackTransport::demo())
    } else {
        Arc::new(NativeTransport::new(
            config.read_timeout(),
            config.hotplug_interval(),
        ))
    }
}

/// Everything after argument parsing: config, locale, then the chosen mode.
pub fn run(matches: &ArgMatches) -> Result<()> {
    init_common();

    let options = CliOptions::from_matches(matches)?;
    let mut config = AppConfig::load(options.config.as_deref())?;
    config.apply(&options.overrides());
    i18n::init_i18n(config.language);

    let transport = build_transport(options.loopback, &config);
    if options.list_ports {
        return crate::cli::list_ports(transport, options.json);
    }
    crate::tui::start(&config, transport, options.port)
}
