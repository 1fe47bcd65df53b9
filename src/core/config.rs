//! Application configuration.
//!
//! Values come from an optional TOML file and are then overridden by CLI
//! flags. A missing default file is not an error; an explicitly named one is.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{
    i18n::Locale,
    protocol::{LineEnding, VendorFilter},
};

pub const DEFAULT_CONFIG_FILE: &str = "serterm.toml";

/// Lower bounds for the native polling intervals.
pub const MIN_HOTPLUG_INTERVAL_MS: u64 = 100;
pub const MIN_READ_TIMEOUT_MS: u64 = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// `None` means "detect from the environment".
    pub language: Option<Locale>,
    pub baud_rates: Vec<u32>,
    pub default_baud: u32,
    pub line_ending: LineEnding,
    pub vendor_filters: Vec<VendorFilter>,
    pub hotplug_interval_ms: u64,
    pub read_timeout_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            language: None,
            baud_rates: vec![9600, 19200, 38400, 57600, 115200],
            default_baud: 9600,
            line_ending: LineEnding::Lf,
            vendor_filters: default_vendor_filters(),
            hotplug_interval_ms: 1000,
            read_timeout_ms: 100,
        }
    }
}

/// Arduino, FTDI and Prolific adapters.
pub fn default_vendor_filters() -> Vec<VendorFilter> {
    vec![
        VendorFilter::new(0x2341, "Arduino"),
        VendorFilter::new(0x0403, "FTDI"),
        VendorFilter::new(0x067b, "Prolific"),
    ]
}

/// Values given on the command line; each one wins over the file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overrides {
    pub language: Option<Locale>,
    pub baud: Option<u32>,
}

impl AppConfig {
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(content).context("invalid configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path`, or `./serterm.toml` when it exists, or the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path: PathBuf = match path {
            Some(path) => path.to_path_buf(),
            None => {
                let fallback = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !fallback.exists() {
                    log::debug!("no {DEFAULT_CONFIG_FILE}, using defaults");
                    return Ok(Self::default());
                }
                fallback
            }
        };
        let content = fs::read_to_string(&path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config = Self::from_toml(&content)
            .with_context(|| format!("failed to load config file {}", path.display()))?;
        log::info!("loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn apply(&mut self, overrides: &Overrides) {
        if let Some(language) = overrides.language {
            self.language = Some(language);
        }
        if let Some(baud) = overrides.baud {
            self.default_baud = baud;
            if !self.baud_rates.contains(&baud) {
                self.baud_rates.push(baud);
                self.baud_rates.sort_unstable();
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if self.baud_rates.is_empty() {
            bail!("baud_rates must not be empty");
        }
        if self.baud_rates.contains(&0) || self.default_baud == 0 {
            bail!("baud rates must be positive");
        }
        if !self.baud_rates.contains(&self.default_baud) {
            bail!(
                "default_baud {} is not one of baud_rates {:?}",
                self.default_baud,
                self.baud_rates
            );
        }
        if self.hotplug_interval_ms < MIN_HOTPLUG_INTERVAL_MS {
            bail!(
                "hotplug_interval_ms must be at least {MIN_HOTPLUG_INTERVAL_MS}, got {}",
                self.hotplug_interval_ms
            );
        }
        if self.read_timeout_ms < MIN_READ_TIMEOUT_MS {
            bail!(
                "read_timeout_ms must be at least {MIN_READ_TIMEOUT_MS}, got {}",
                self.read_timeout_ms
            );
        }
        Ok(())
    }

    /// Index of the default baud rate in `baud_rates`.
    pub fn default_baud_index(&self) -> usize {
        self.baud_rates
            .iter()
            .position(|&b| b == self.default_baud)
            .unwrap_or(0)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn hotplug_interval(&self) -> Duration {
        Duration::from_millis(self.hotplug_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = AppConfig::from_toml("").expect("empty config");
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.default_baud, 9600);
        assert_eq!(config.vendor_filters.len(), 3);
    }

    #[test]
    fn file_values_are_read() {
        let config = AppConfig::from_toml(
            r#"
language = "en_us"
baud_rates = [9600, 115200]
default_baud = 115200
line_ending = "crlf"
vendor_filters = [{ vendor_id = 0x1a86, label = "CH340" }]
"#,
        )
        .expect("valid config");
        assert_eq!(config.language, Some(Locale::EnUs));
        assert_eq!(config.line_ending, LineEnding::CrLf);
        assert_eq!(config.default_baud_index(), 1);
        assert_eq!(config.vendor_filters, vec![VendorFilter::new(0x1a86, "CH340")]);
    }

    #[test]
    fn default_baud_must_be_listed() {
        let err = AppConfig::from_toml("baud_rates = [9600]\ndefault_baud = 57600")
            .expect_err("inconsistent baud");
        assert!(format!("{err:#}").contains("default_baud"));
    }

    #[test]
    fn zero_intervals_are_rejected() {
        let err = AppConfig::from_toml("hotplug_interval_ms = 0").expect_err("zero interval");
        assert!(format!("{err:#}").contains("hotplug_interval_ms"));
        let err = AppConfig::from_toml("read_timeout_ms = 0").expect_err("zero timeout");
        assert!(format!("{err:#}").contains("read_timeout_ms"));
        assert!(AppConfig::from_toml("read_timeout_ms = 10\nhotplug_interval_ms = 100").is_ok());
    }

    #[test]
    fn cli_baud_overrides_and_is_added_to_the_list() {
        let mut config = AppConfig::default();
        config.apply(&Overrides {
            language: Some(Locale::RuRu),
            baud: Some(250000),
        });
        assert_eq!(config.default_baud, 250000);
        assert_eq!(config.baud_rates.last(), Some(&250000));
        assert_eq!(config.language, Some(Locale::RuRu));
    }

    #[test]
    fn named_missing_file_is_an_error() {
        assert!(AppConfig::load(Some(Path::new("/nonexistent/serterm.toml"))).is_err());
    }
}
