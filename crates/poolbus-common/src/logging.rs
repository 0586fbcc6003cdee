//! ---
//! pb_section: "01-core-functionality"
//! pb_subsection: "module"
//! pb_type: "source"
//! pb_scope: "code"
//! pb_description: "Tracing subscriber setup for the bus runtime."
//! pb_version: "v0.0.0-prealpha"
//! pb_owner: "tbd"
//! ---
use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::daily;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LoggingConfig;

const LOG_ENV: &str = "POOLBUS_LOG";

/// Crates that log bus traffic. A lossy line produces a steady stream of parser
/// rejections, so these stay quieter than the base level unless asked.
const BUS_TARGETS: [(&str, &str); 2] = [("poolbus_proto", "warn"), ("poolbus_bus", "info")];

static GUARDS: OnceCell<Vec<WorkerGuard>> = OnceCell::new();

/// Available log formats for the daemon.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    StructuredJson,
    #[default]
    Pretty,
}

/// Filter directives derived from `[logging]`: the base level followed by one
/// directive per bus crate.
///
/// `bus_trace` lifts both bus crates to `trace`, which logs each decoded frame
/// and each rejected candidate.
pub fn default_directives(config: &LoggingConfig) -> String {
    let mut directives = config.level.trim().to_string();
    if directives.is_empty() {
        directives.push_str("info");
    }
    for (target, level) in BUS_TARGETS {
        let level = if config.bus_trace { "trace" } else { level };
        directives.push_str(&format!(",{target}={level}"));
    }
    directives
}

/// `POOLBUS_LOG`, then `RUST_LOG`, then [`default_directives`].
fn build_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    let fallback = default_directives(config);
    let from_env = std::env::var(LOG_ENV)
        .ok()
        .map(|directive| (LOG_ENV, directive))
        .or_else(|| std::env::var(EnvFilter::DEFAULT_ENV).ok().map(|d| (EnvFilter::DEFAULT_ENV, d)));
    if let Some((source, directive)) = from_env {
        match EnvFilter::try_new(&directive) {
            Ok(filter) => return Ok(filter),
            Err(err) => eprintln!("invalid {source} directive ({err}); using {fallback}"),
        }
    }
    EnvFilter::try_new(&fallback).with_context(|| format!("invalid [logging] level {:?}", config.level))
}

/// Initialize the tracing subscriber for `service_name`.
///
/// Stdout receives the configured format. When `file` is set a daily rolling
/// JSON file named after `file_prefix` (or the service) is written to
/// `directory`. Later calls in the same process are no-ops.
pub fn init_tracing(service_name: &str, config: &LoggingConfig) -> Result<()> {
    let filter = build_filter(config)?;
    let mut guards = Vec::with_capacity(2);

    let (stdout_writer, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());
    guards.push(stdout_guard);
    let stdout_layer = match config.format {
        LogFormat::StructuredJson => fmt::layer()
            .with_target(false)
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .json()
            .with_writer(stdout_writer)
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .with_target(true)
            .with_thread_names(true)
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .with_writer(stdout_writer)
            .boxed(),
    };

    let file_layer = if config.file {
        std::fs::create_dir_all(&config.directory).with_context(|| {
            format!("failed to create log directory {}", config.directory.display())
        })?;
        let prefix = config.file_prefix.as_deref().unwrap_or(service_name);
        let (file_writer, file_guard) =
            tracing_appender::non_blocking(daily(&config.directory, format!("{prefix}.log")));
        guards.push(file_guard);
        Some(
            fmt::layer()
                .with_target(true)
                .with_timer(fmt::time::UtcTime::rfc_3339())
                .json()
                .with_writer(file_writer)
                .boxed(),
        )
    } else {
        None
    };

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .is_ok();
    if installed {
        let _ = GUARDS.set(guards);
        info!(
            service = %service_name,
            file = config.file,
            log_dir = %config.directory.display(),
            format = ?config.format,
            bus_trace = config.bus_trace,
            "tracing initialised"
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_creates_log_directory_and_tolerates_reinit() {
        let dir = tempfile::tempdir().expect("temp dir");
        let config = LoggingConfig {
            directory: dir.path().join("logs"),
            format: LogFormat::StructuredJson,
            file_prefix: Some("unit".into()),
            ..LoggingConfig::default()
        };
        init_tracing("poolbus-test", &config).expect("first init");
        init_tracing("poolbus-test", &config).expect("second init is a no-op");
        assert!(config.directory.is_dir());
    }

    #[test]
    fn bus_crates_get_their_own_directives() {
        let config = LoggingConfig::default();
        assert_eq!(
            default_directives(&config),
            "info,poolbus_proto=warn,poolbus_bus=info"
        );
        assert!(EnvFilter::try_new(default_directives(&config)).is_ok());

        let config = LoggingConfig {
            level: "debug".into(),
            bus_trace: true,
            ..LoggingConfig::default()
        };
        assert_eq!(
            default_directives(&config),
            "debug,poolbus_proto=trace,poolbus_bus=trace"
        );
    }

    #[test]
    fn blank_level_falls_back_to_info() {
        let config = LoggingConfig {
            level: "  ".into(),
            ..LoggingConfig::default()
        };
        assert!(default_directives(&config).starts_with("info,"));
    }

    #[test]
    fn logging_section_parses_new_fields() {
        let parsed: LoggingConfig =
            toml::from_str("format = \"structured-json\"\nbus_trace = true\nfile = false")
                .expect("parses");
        assert_eq!(parsed.format, LogFormat::StructuredJson);
        assert!(parsed.bus_trace);
        assert!(!parsed.file);
        assert_eq!(parsed.level, "info");
    }
}
