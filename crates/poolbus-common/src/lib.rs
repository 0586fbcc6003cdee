//! ---
//! pb_section: "01-core-functionality"
//! pb_subsection: "module"
//! pb_type: "source"
//! pb_scope: "code"
//! pb_description: "Shared primitives and utilities for the bus runtime."
//! pb_version: "v0.0.0-prealpha"
//! pb_owner: "tbd"
//! ---
//! Shared primitives for the poolbus workspace.
//! This crate exposes configuration loading and logging setup consumed by
//! the bus library and the daemon. Bus addresses fixed by the framing come
//! from `poolbus_proto`.

pub mod config;
pub mod logging;

pub use config::{
    AppConfig, BusConfig, DeviceConfig, DeviceKind, LinkConfig, LoadedAppConfig, LoggingConfig,
    MetricsConfig,
};
pub use logging::{init_tracing, LogFormat};
