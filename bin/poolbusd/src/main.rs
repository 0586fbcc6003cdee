//! ---
//! pb_section: "01-core-functionality"
//! pb_subsection: "binary"
//! pb_type: "source"
//! pb_scope: "code"
//! pb_description: "Binary entrypoint for the poolbus daemon."
//! pb_version: "v0.0.0-prealpha"
//! pb_owner: "tbd"
//! ---
mod decode;
mod metrics;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use poolbus_bus::{
    link_from_config, BusController, ConnectionState, ControllerDevice, DeviceSet,
    DiscoveryListener, Link,
};
use poolbus_common::{init_tracing, AppConfig, LoadedAppConfig};
use poolbus_proto::{parse_hex, ControllerCommands, RawMessage};
use prometheus::Registry;
use tokio::signal;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::metrics::{spawn_http_server, DaemonMetrics, SharedRegistry};

const SERVICE: &str = "poolbusd";
const DEFAULT_POLL_SECS: u64 = 60;
const STATUS_WAIT: Duration = Duration::from_secs(5);

#[derive(Debug, Parser)]
#[command(author, version, about = "Pool equipment bus daemon", long_about = None)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Connect to the bus and poll configured devices")]
    Run {
        #[arg(
            long,
            value_name = "SECONDS",
            default_value_t = DEFAULT_POLL_SECS,
            help = "Interval between device status polls"
        )]
        poll_interval: u64,
    },
    #[command(about = "Decode a hex capture into one JSON line per message")]
    Decode {
        #[arg(
            value_name = "HEX",
            conflicts_with = "file",
            required_unless_present = "file",
            help = "Hex bytes, whitespace allowed"
        )]
        hex: Option<String>,
        #[arg(long, value_name = "PATH", help = "Read the hex capture from a file")]
        file: Option<PathBuf>,
    },
    #[command(about = "Send one command to the controller and wait for its reply")]
    Send {
        #[command(subcommand)]
        command: SendCommand,
    },
    #[command(about = "Validate and print the effective configuration")]
    CheckConfig,
}

#[derive(Debug, Clone, Copy, Subcommand)]
enum SendCommand {
    #[command(about = "Switch a circuit on or off")]
    Circuit {
        #[arg(value_name = "CIRCUIT")]
        circuit: u8,
        #[arg(value_enum)]
        state: Switch,
    },
    #[command(about = "Request a status broadcast")]
    Status,
    #[command(about = "Request light groups and positions")]
    LightGroups,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Switch {
    On,
    Off,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Run {
        poll_interval: DEFAULT_POLL_SECS,
    });

    match command {
        Commands::Decode { hex, file } => decode_command(hex.as_deref(), file.as_deref()),
        Commands::CheckConfig => {
            let loaded = load_config(cli.config.as_deref())?;
            println!("# source: {}", loaded.source.display());
            print!(
                "{}",
                toml::to_string_pretty(&loaded.config).context("failed to render configuration")?
            );
            Ok(())
        }
        Commands::Send { command } => {
            let config = load_config(cli.config.as_deref())?.config;
            init_tracing(SERVICE, &config.logging)?;
            send_command(config, command).await
        }
        Commands::Run { poll_interval } => {
            let loaded = load_config(cli.config.as_deref())?;
            init_tracing(SERVICE, &loaded.config.logging)?;
            info!(config_path = %loaded.source.display(), "configuration loaded");
            run_daemon(loaded.config, Duration::from_secs(poll_interval.max(1))).await
        }
    }
}

fn load_config(explicit: Option<&Path>) -> Result<LoadedAppConfig> {
    let mut candidates = Vec::new();
    if let Some(path) = explicit {
        candidates.push(path.to_path_buf());
    }
    candidates.push(PathBuf::from("poolbus.toml"));
    candidates.push(PathBuf::from("/etc/poolbus/poolbus.toml"));
    AppConfig::load_with_source(&candidates)
}

fn decode_command(hex: Option<&str>, file: Option<&Path>) -> Result<()> {
    let text = match (hex, file) {
        (Some(hex), _) => hex.to_owned(),
        (None, Some(path)) => std::fs::read_to_string(path)
            .with_context(|| format!("unable to read capture {}", path.display()))?,
        (None, None) => anyhow::bail!("either HEX or --file is required"),
    };
    let bytes = parse_hex(&text).context("capture is not valid hex")?;
    let decoded = decode::decode_stream(&bytes);
    for message in &decoded.messages {
        println!("{}", serde_json::to_string(message)?);
    }
    if decoded.rejected > 0 {
        eprintln!("{} malformed message(s) skipped", decoded.rejected);
    }
    Ok(())
}

async fn send_command(config: AppConfig, command: SendCommand) -> Result<()> {
    let (name, device) = config
        .controller()
        .context("no controller configured; add a [devices] entry with kind = \"controller\"")?;
    info!(device = %name, address = device.address, ?command, "sending controller command");
    let address = device.address;
    let link = link_from_config(&config.link);
    let bus = BusController::new(config.bus.clone());
    let controller = Arc::new(ControllerDevice::new(address));
    bus.register_device(address, controller.clone())?;

    let response = tokio::task::spawn_blocking(move || -> Result<Option<RawMessage>> {
        bus.connect(link.as_ref())?;
        // the controller's preamble is learned from its periodic status broadcast
        let deadline = Instant::now() + STATUS_WAIT;
        while controller.last_status().is_none() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(50));
        }
        if controller.last_status().is_none() {
            warn!("no status broadcast heard; using the default preamble");
        }
        let result = match command {
            SendCommand::Circuit { circuit, state } => {
                controller.execute(&bus, |c| c.circuit_switch(circuit, state == Switch::On))
            }
            SendCommand::Status => controller.execute(&bus, ControllerCommands::status_request),
            SendCommand::LightGroups => {
                controller.execute(&bus, ControllerCommands::light_groups)
            }
        };
        bus.disconnect();
        Ok(result?)
    })
    .await
    .context("send task failed")??;

    match response {
        Some(message) => println!("{}", serde_json::to_string(&decode::describe(&message))?),
        None => println!("sent"),
    }
    Ok(())
}

/// Logs devices that talk on the bus without a configuration entry.
struct ConfigHint;

impl ConfigHint {
    fn hint(kind: &str, address: u8) {
        info!(
            address = format_args!("0x{address:02X}"),
            kind,
            "unconfigured device heard; add a [devices] entry to manage it"
        );
    }
}

impl DiscoveryListener for ConfigHint {
    fn on_unregistered_controller(&self, address: u8) {
        Self::hint("controller", address);
    }

    fn on_unregistered_pump(&self, address: u8) {
        Self::hint("pump", address);
    }

    fn on_unregistered_chemistry_monitor(&self, address: u8) {
        Self::hint("chemistry", address);
    }

    fn on_unregistered_chlorinator(&self, address: u8) {
        Self::hint("chlorinator", address);
    }
}

async fn run_daemon(config: AppConfig, poll_interval: Duration) -> Result<()> {
    let registry: SharedRegistry = Arc::new(Registry::new());
    let daemon_metrics = DaemonMetrics::new(&registry)?;
    daemon_metrics.inc_start();

    let bus = BusController::with_discovery(config.bus.clone(), Arc::new(ConfigHint));
    bus.metrics()
        .register(&registry)
        .context("failed to register bus metrics")?;
    let devices = Arc::new(DeviceSet::register_from_config(&bus, &config)?);
    if devices.is_empty() {
        warn!("no devices configured; traffic will only be monitored");
    }
    let link: Arc<dyn Link> = Arc::from(link_from_config(&config.link));

    let metrics_server = if config.metrics.enabled {
        info!(address = %config.metrics.listen, "metrics exporter enabled");
        Some(spawn_http_server(registry.clone(), config.metrics.listen)?)
    } else {
        info!("metrics exporter disabled by configuration");
        None
    };

    let (stop_tx, stop_rx) = watch::channel(false);
    let supervisor = tokio::spawn(supervise(
        bus.clone(),
        Arc::clone(&link),
        devices,
        Schedule {
            reconnect: config.bus.reconnect_interval,
            poll: poll_interval,
        },
        daemon_metrics,
        stop_rx,
    ));

    info!(link = %link.name(), "daemon running; waiting for termination signal");
    signal::ctrl_c().await?;
    info!("ctrl-c received; shutting down");
    let _ = stop_tx.send(true);
    supervisor.await.context("supervisor task failed")?;
    tokio::task::spawn_blocking(move || bus.disconnect())
        .await
        .context("disconnect task failed")?;

    if let Some(server) = metrics_server {
        server.shutdown().await?;
    }
    Ok(())
}

#[derive(Debug, Clone, Copy)]
struct Schedule {
    reconnect: Duration,
    poll: Duration,
}

/// Keeps the link up and polls devices until `stop` flips.
async fn supervise(
    bus: BusController,
    link: Arc<dyn Link>,
    devices: Arc<DeviceSet>,
    schedule: Schedule,
    metrics: DaemonMetrics,
    mut stop: watch::Receiver<bool>,
) {
    let mut reconnect = tokio::time::interval(schedule.reconnect);
    let mut poll = tokio::time::interval(schedule.poll);
    reconnect.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut refreshed = false;
    let mut config_error_reported = false;

    loop {
        tokio::select! {
            _ = stop.changed() => return,
            _ = reconnect.tick() => match bus.state() {
                ConnectionState::Init | ConnectionState::Disconnected => {
                    let connect_bus = bus.clone();
                    let connect_link = Arc::clone(&link);
                    match tokio::task::spawn_blocking(move || connect_bus.connect(connect_link.as_ref())).await {
                        Ok(Ok(())) => {
                            metrics.inc_connect();
                            refreshed = false;
                        }
                        Ok(Err(err)) => warn!(link = %link.name(), error = %err, "connect failed; will retry"),
                        Err(err) => error!(error = %err, "connect task failed"),
                    }
                }
                ConnectionState::ConfigError => {
                    if !config_error_reported {
                        error!(link = %link.name(), "link cannot be opened as configured; not retrying");
                        config_error_reported = true;
                    }
                }
                ConnectionState::Connecting | ConnectionState::Connected => {}
            },
            _ = poll.tick() => {
                if bus.state() != ConnectionState::Connected {
                    continue;
                }
                let poll_bus = bus.clone();
                let poll_devices = Arc::clone(&devices);
                let refresh = !refreshed;
                match tokio::task::spawn_blocking(move || poll_once(&poll_bus, &poll_devices, refresh)).await {
                    Ok(report) => {
                        refreshed |= report.refreshed;
                        metrics.add_poll_failures(report.failures);
                    }
                    Err(err) => error!(error = %err, "poll task failed"),
                }
            }
        }
    }
}

#[derive(Debug, Default)]
struct PollReport {
    refreshed: bool,
    failures: usize,
}

/// One polling round. Runs on a blocking thread since every request waits for its reply.
fn poll_once(bus: &BusController, devices: &DeviceSet, refresh: bool) -> PollReport {
    let mut report = PollReport::default();

    if let Some((name, controller)) = &devices.controller {
        if bus.is_address_online(controller.address()) {
            if refresh {
                match controller.refresh(bus) {
                    Ok(()) => {
                        info!(device = %name, "controller configuration read");
                        report.refreshed = true;
                    }
                    Err(err) => {
                        warn!(device = %name, error = %err, "controller refresh failed");
                        report.failures += 1;
                    }
                }
            }
            if let Err(err) = controller.request_status(bus) {
                warn!(device = %name, error = %err, "controller poll failed");
                report.failures += 1;
            }
        }
    }

    if bus.other_master_active() {
        debug!("controller is driving the bus; pumps are not polled");
    } else {
        for (name, pump) in &devices.pumps {
            if let Err(err) = pump.request_status(bus) {
                warn!(device = %name, error = %err, "pump poll failed");
                report.failures += 1;
            }
        }
    }
    report
}
