//! Gateway configuration.
//!
//! Settings come from a `KEY=VALUE` file (`config.ini` by default). When the
//! file does not exist, the same keys are looked up in the environment
//! instead. Keys that are not set keep their defaults.
//!
//! ```text
//! # config.ini
//! BIND_ADDRESS=0.0.0.0
//! HTTP_LISTEN_PORT=16180
//! FLEX_DEVICE=/dev/ttyACM0
//! FLEX_POWER=10
//! ```

use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use flexgate_at_protocol::{MAX_POWER, MIN_POWER};
use flexgate_device::is_supported_baud_rate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Configuration file read when none is given on the command line.
pub const DEFAULT_CONFIG_FILE: &str = "config.ini";

/// Keys consulted in the environment when the file is absent.
pub const ENV_KEYS: &[&str] = &[
    "BIND_ADDRESS",
    "SERIAL_LISTEN_PORT",
    "HTTP_LISTEN_PORT",
    "HTTP_AUTH_CREDENTIALS",
    "FLEX_DEVICE",
    "FLEX_BAUDRATE",
    "FLEX_POWER",
    "DEFAULT_FREQUENCY",
    "METRICS_ADDRESS",
];

/// Configuration errors. All of them stop the gateway at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file exists but could not be read.
    #[error("Failed to read configuration file {}: {source}", path.display())]
    Read {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        source: io::Error,
    },

    /// A value could not be parsed for its key.
    #[error("Invalid value for {key}: '{value}'")]
    InvalidValue {
        /// Configuration key.
        key: String,
        /// Raw value.
        value: String,
    },

    /// `FLEX_POWER` outside 2-20.
    #[error("Invalid FLEX_POWER: {0} (must be 2-20)")]
    PowerOutOfRange(u8),

    /// `FLEX_BAUDRATE` not in the supported set.
    #[error("Unsupported FLEX_BAUDRATE: {0}")]
    UnsupportedBaudRate(u32),

    /// Both listen ports are zero.
    #[error("Both SERIAL_LISTEN_PORT and HTTP_LISTEN_PORT are disabled (set to 0); at least one port must be enabled")]
    NoListeners,
}

/// Gateway settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", default)]
pub struct GatewayConfig {
    /// Address both listeners bind to.
    pub bind_address: String,
    /// Raw TCP port; 0 disables the listener.
    pub serial_listen_port: u16,
    /// HTTP port; 0 disables the listener.
    pub http_listen_port: u16,
    /// Credential file for HTTP basic auth.
    pub http_auth_credentials: PathBuf,
    /// Serial device of the transmitter.
    pub flex_device: String,
    /// Serial baud rate.
    pub flex_baudrate: u32,
    /// Transmit power level.
    pub flex_power: u8,
    /// Frequency in Hz used when a request does not name one.
    pub default_frequency: u64,
    /// Prometheus listen address (requires the `prometheus` feature).
    pub metrics_address: Option<SocketAddr>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        GatewayConfig {
            bind_address: "127.0.0.1".to_string(),
            serial_listen_port: 16175,
            http_listen_port: 16180,
            http_auth_credentials: PathBuf::from("passwords"),
            flex_device: "/dev/ttyUSB0".to_string(),
            flex_baudrate: 115_200,
            flex_power: 2,
            default_frequency: 916_000_000,
            metrics_address: None,
        }
    }
}

impl GatewayConfig {
    /// Load from `path`, or from the environment if `path` does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(text) => {
                debug!("Configuration loaded from {}", path.display());
                Self::from_ini_str(&text)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(
                    "{} not found, using environment variables",
                    path.display()
                );
                Self::from_lookup(|key| std::env::var(key).ok())
            }
            Err(source) => Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Parse `KEY=VALUE` lines. Blank lines, `#` comments, and lines without
    /// `=` are skipped; keys and values are trimmed, values also lose trailing
    /// commas.
    pub fn from_ini_str(text: &str) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        for line in text.lines() {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            config.set(trim_value(key), trim_value(value))?;
        }
        Ok(config)
    }

    /// Build from a key lookup, typically the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        for key in ENV_KEYS {
            if let Some(value) = lookup(key) {
                config.set(key, trim_value(&value))?;
            }
        }
        Ok(config)
    }

    /// Apply one setting. Unknown keys are ignored; the legacy `TTGO_DEVICE`,
    /// `TTGO_BAUDRATE`, and `TTGO_POWER` keys alias their `FLEX_` forms.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        match key {
            "BIND_ADDRESS" => self.bind_address = value.to_string(),
            "SERIAL_LISTEN_PORT" => self.serial_listen_port = parse(key, value)?,
            "HTTP_LISTEN_PORT" => self.http_listen_port = parse(key, value)?,
            "HTTP_AUTH_CREDENTIALS" => self.http_auth_credentials = PathBuf::from(value),
            "FLEX_DEVICE" | "TTGO_DEVICE" => self.flex_device = value.to_string(),
            "FLEX_BAUDRATE" | "TTGO_BAUDRATE" => self.flex_baudrate = parse(key, value)?,
            "FLEX_POWER" | "TTGO_POWER" => self.flex_power = parse(key, value)?,
            "DEFAULT_FREQUENCY" => self.default_frequency = parse(key, value)?,
            "METRICS_ADDRESS" if value.is_empty() => self.metrics_address = None,
            "METRICS_ADDRESS" => self.metrics_address = Some(parse(key, value)?),
            _ => debug!("Ignoring unknown configuration key '{}'", key),
        }
        Ok(())
    }

    /// Check ranges and cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_POWER..=MAX_POWER).contains(&self.flex_power) {
            return Err(ConfigError::PowerOutOfRange(self.flex_power));
        }
        if !is_supported_baud_rate(self.flex_baudrate) {
            return Err(ConfigError::UnsupportedBaudRate(self.flex_baudrate));
        }
        if !self.serial_enabled() && !self.http_enabled() {
            return Err(ConfigError::NoListeners);
        }
        Ok(())
    }

    /// Whether the raw TCP listener is enabled.
    pub fn serial_enabled(&self) -> bool {
        self.serial_listen_port != 0
    }

    /// Whether the HTTP listener is enabled.
    pub fn http_enabled(&self) -> bool {
        self.http_listen_port != 0
    }

    /// `host:port` for one of the listeners.
    pub fn listen_addr(&self, port: u16) -> String {
        format!("{}:{}", self.bind_address, port)
    }
}

fn trim_value(raw: &str) -> &str {
    raw.trim_start()
        .trim_end_matches(|c: char| c.is_whitespace() || c == ',')
}

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}
