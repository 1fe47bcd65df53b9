use anyhow::{Context, Result};
use clap::{builder::PossibleValuesParser, Arg, ArgAction, ArgMatches, Command};
use std::{path::PathBuf, str::FromStr, sync::Arc};

use crate::{
    core::{view::port_label, Overrides},
    i18n::{self, Locale},
    protocol::{PortInfo, SerialTransport},
};

pub fn build_command() -> Command {
    Command::new("serterm")
        .about("Terminal for talking to serial devices")
        .version(env!("CARGO_PKG_VERSION"))
        .arg(
            Arg::new("port")
                .long("port")
                .short('p')
                .value_name("NAME")
                .help("Select this port once the list is loaded"),
        )
        .arg(
            Arg::new("baud")
                .long("baud")
                .short('b')
                .value_name("RATE")
                .value_parser(clap::value_parser!(u32).range(1..))
                .help("Initial baud rate"),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .value_name("FILE")
                .value_parser(clap::value_parser!(PathBuf))
                .help("Configuration file (default: ./serterm.toml if present)"),
        )
        .arg(
            Arg::new("lang")
                .long("lang")
                .value_name("LOCALE")
                .value_parser(PossibleValuesParser::new(["ru_ru", "en_us"]))
                .help("Interface language"),
        )
        .arg(
            Arg::new("loopback")
                .long("loopback")
                .help("Use an in-memory echo device instead of real hardware")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("list-ports")
                .long("list-ports")
                .short('l')
                .help("Print the available ports and exit")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .help("With --list-ports, print JSON")
                .requires("list-ports")
                .action(ArgAction::SetTrue),
        )
}

/// Parse command line arguments
pub fn parse_args() -> ArgMatches {
    build_command().get_matches()
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CliOptions {
    pub port: Option<String>,
    pub baud: Option<u32>,
    pub config: Option<PathBuf>,
    pub lang: Option<Locale>,
    pub loopback: bool,
    pub list_ports: bool,
    pub json: bool,
}

impl CliOptions {
    pub fn from_matches(matches: &ArgMatches) -> Result<Self> {
        let lang = matches
            .get_one::<String>("lang")
            .map(|s| Locale::from_str(s).with_context(|| format!("unknown locale {s}")))
            .transpose()?;
        Ok(Self {
            port: matches.get_one::<String>("port").cloned(),
            baud: matches.get_one::<u32>("baud").copied(),
            config: matches.get_one::<PathBuf>("config").cloned(),
            lang,
            loopback: matches.get_flag("loopback"),
            list_ports: matches.get_flag("list-ports"),
            json: matches.get_flag("json"),
        })
    }

    pub fn overrides(&self) -> Overrides {
        Overrides {
            language: self.lang,
            baud: self.baud,
        }
    }
}

/// `--list-ports`: print what the transport knows about and exit.
pub fn list_ports(transport: Arc<dyn SerialTransport>, json: bool) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start tokio runtime")?;
    let ports: Vec<PortInfo> = runtime
        .block_on(transport.list_ports())
        .context("failed to list ports")?
        .iter()
        .map(|p| p.info())
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&ports)?);
        return Ok(());
    }

    let lang = i18n::lang();
    if ports.is_empty() {
        println!("{}", lang.no_devices);
    }
    for port in &ports {
        println!("{}\t{}", port.path, port_label(lang, port));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<CliOptions> {
        let matches = build_command().try_get_matches_from(args)?;
        CliOptions::from_matches(&matches)
    }

    #[test]
    fn defaults_leave_everything_to_the_config() {
        let options = parse(&["serterm"]).expect("parse");
        assert_eq!(options, CliOptions::default());
        assert_eq!(options.overrides(), Overrides::default());
    }

    #[test]
    fn all_flags() {
        let options = parse(&[
            "serterm",
            "--port",
            "/dev/ttyACM0",
            "--baud",
            "115200",
            "--lang",
            "en_us",
            "--loopback",
        ])
        .expect("parse");
        assert_eq!(options.port.as_deref(), Some("/dev/ttyACM0"));
        assert_eq!(options.baud, Some(115200));
        assert_eq!(options.lang, Some(Locale::EnUs));
        assert!(options.loopback);
    }

    #[test]
    fn json_requires_list_ports() {
        assert!(parse(&["serterm", "--json"]).is_err());
        assert!(parse(&["serterm", "--list-ports", "--json"]).is_ok());
    }

    #[test]
    fn unknown_locale_and_zero_baud_are_rejected() {
        assert!(parse(&["serterm", "--lang", "de_de"]).is_err());
        assert!(parse(&["serterm", "--baud", "0"]).is_err());
    }
}
