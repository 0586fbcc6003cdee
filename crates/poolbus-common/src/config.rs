//! ---
//! pb_section: "01-core-functionality"
//! pb_subsection: "module"
//! pb_type: "source"
//! pb_scope: "code"
//! pb_description: "Configuration model and loader for the bus runtime."
//! pb_version: "v0.0.0-prealpha"
//! pb_owner: "tbd"
//! ---
use std::collections::HashSet;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use indexmap::IndexMap;
use poolbus_proto::CHLORINATOR_ADDRESS;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds, DurationSeconds};
use tracing::debug;

use crate::logging::LogFormat;

fn default_bus_id() -> u8 {
    0x22
}

fn default_ack_timeout() -> Duration {
    Duration::from_millis(1000)
}

fn default_max_retries() -> u8 {
    3
}

fn default_idle_backoff() -> Duration {
    Duration::from_millis(300)
}

fn default_reconnect_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_serial_port() -> String {
    "/dev/ttyUSB0".to_owned()
}

fn default_baud_rate() -> u32 {
    9600
}

fn default_logging_directory() -> PathBuf {
    PathBuf::from("target/logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::Pretty
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_metrics_listen() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 9898))
}

/// Primary configuration object for the bus daemon.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub bus: BusConfig,
    #[serde(default)]
    pub link: LinkConfig,
    #[serde(default)]
    pub devices: IndexMap<String, DeviceConfig>,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Metadata describing where an [`AppConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedAppConfig {
    pub config: AppConfig,
    pub source: PathBuf,
}

impl AppConfig {
    pub const ENV_CONFIG_PATH: &str = "POOLBUS_CONFIG";

    /// Load configuration from disk, respecting the `POOLBUS_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        Ok(Self::load_with_source(candidates)?.config)
    }

    /// Load configuration from disk together with the effective source path.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedAppConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(&path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        for candidate in candidates {
            let path = candidate.as_ref();
            if path.exists() {
                let config = Self::from_path(path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path.to_path_buf(),
                });
            }
        }

        Err(anyhow!(
            "no configuration files found. inspected: {}",
            candidates
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }

    fn from_path(path: &Path) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        let config = toml::from_str::<AppConfig>(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        self.bus.validate()?;
        self.link.validate()?;

        let mut addresses = HashSet::new();
        let mut controllers = 0usize;
        let mut chlorinators = 0usize;
        for (name, device) in &self.devices {
            if !addresses.insert(device.address) {
                return Err(anyhow!(
                    "device '{}' reuses bus address 0x{:02X}",
                    name,
                    device.address
                ));
            }
            match device.kind {
                DeviceKind::Controller => controllers += 1,
                DeviceKind::Chlorinator => {
                    chlorinators += 1;
                    if device.address != CHLORINATOR_ADDRESS {
                        return Err(anyhow!(
                            "chlorinator '{}' must use address 0x{:02X}",
                            name,
                            CHLORINATOR_ADDRESS
                        ));
                    }
                }
                DeviceKind::Pump | DeviceKind::Chemistry => {}
            }
        }
        if controllers > 1 {
            return Err(anyhow!("at most one controller may be configured"));
        }
        if chlorinators > 1 {
            return Err(anyhow!("at most one chlorinator may be configured"));
        }
        Ok(())
    }

    /// Find the configured controller, if any.
    pub fn controller(&self) -> Option<(&str, &DeviceConfig)> {
        self.devices
            .iter()
            .find(|(_, device)| device.kind == DeviceKind::Controller)
            .map(|(name, device)| (name.as_str(), device))
    }
}

impl std::str::FromStr for AppConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

/// Timing and identity of this node on the bus.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    /// Source address stamped into outbound primary messages.
    #[serde(default = "default_bus_id")]
    pub id: u8,
    #[serde(rename = "ack_timeout_ms", default = "default_ack_timeout")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub ack_timeout: Duration,
    /// Retransmissions after the first attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u8,
    #[serde(rename = "idle_backoff_ms", default = "default_idle_backoff")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub idle_backoff: Duration,
    #[serde(default = "default_reconnect_interval")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub reconnect_interval: Duration,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            id: default_bus_id(),
            ack_timeout: default_ack_timeout(),
            max_retries: default_max_retries(),
            idle_backoff: default_idle_backoff(),
            reconnect_interval: default_reconnect_interval(),
        }
    }
}

impl BusConfig {
    pub fn validate(&self) -> Result<()> {
        if self.ack_timeout.is_zero() {
            return Err(anyhow!("bus.ack_timeout_ms must be greater than zero"));
        }
        if self.reconnect_interval.is_zero() {
            return Err(anyhow!("bus.reconnect_interval must be greater than zero"));
        }
        Ok(())
    }
}

/// Physical link carrying the bus bytes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum LinkConfig {
    Serial {
        #[serde(default = "default_serial_port")]
        port: String,
        #[serde(default = "default_baud_rate")]
        baud_rate: u32,
    },
    Tcp {
        host: String,
        tcp_port: u16,
    },
}

impl Default for LinkConfig {
    fn default() -> Self {
        LinkConfig::Serial {
            port: default_serial_port(),
            baud_rate: default_baud_rate(),
        }
    }
}

impl LinkConfig {
    pub fn validate(&self) -> Result<()> {
        match self {
            LinkConfig::Serial { port, baud_rate } => {
                if port.trim().is_empty() {
                    return Err(anyhow!("link.port must name a serial device"));
                }
                if *baud_rate == 0 {
                    return Err(anyhow!("link.baud_rate must be greater than zero"));
                }
            }
            LinkConfig::Tcp { host, .. } => {
                if host.trim().is_empty() {
                    return Err(anyhow!("link.host must not be empty"));
                }
            }
        }
        Ok(())
    }

    /// Human readable endpoint used in logs.
    pub fn endpoint(&self) -> String {
        match self {
            LinkConfig::Serial { port, baud_rate } => format!("{}@{}", port, baud_rate),
            LinkConfig::Tcp { host, tcp_port } => format!("{}:{}", host, tcp_port),
        }
    }
}

/// Equipment family a configured device belongs to.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Controller,
    Pump,
    Chlorinator,
    Chemistry,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceConfig {
    pub kind: DeviceKind,
    pub address: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
    /// Base level for every target not covered by a bus directive.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log each decoded frame and every parser rejection.
    #[serde(default)]
    pub bus_trace: bool,
    /// Write the rolling JSON file next to stdout.
    #[serde(default = "default_true")]
    pub file: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
            file_prefix: None,
            level: default_log_level(),
            bus_trace: false,
            file: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_listen")]
    pub listen: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen: default_metrics_listen(),
        }
    }
}
