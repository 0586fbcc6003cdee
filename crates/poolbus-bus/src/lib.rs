//! ---
//! pb_section: "02-messaging-ipc-data-model"
//! pb_subsection: "module"
//! pb_type: "source"
//! pb_scope: "code"
//! pb_description: "Bus controller, byte links, registry and device handlers."
//! pb_version: "v0.0.0-prealpha"
//! pb_owner: "tbd"
//! ---
//! Half-duplex bus runtime.
//!
//! A [`BusController`] owns one outbound sink and one reader thread. The
//! reader turns link bytes into messages, the controller routes each message
//! to the handler registered for its source address and wakes any caller
//! waiting on a matching response.
#![warn(missing_docs)]

pub mod ack;
pub mod controller;
pub mod devices;
pub mod discovery;
pub mod io;
pub mod link;
pub mod metrics;
pub mod reader;
pub mod registry;

use poolbus_proto::ProtocolError;

/// Shared result type for bus operations.
pub type Result<T> = std::result::Result<T, BusError>;

/// Errors surfaced by the bus runtime.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    /// A handler is already registered for the address.
    #[error("bus address 0x{0:02X} already has a handler")]
    AddressInUse(u8),
    /// A singleton role is already taken by another address.
    #[error("{role} role already held by address 0x{address:02X}")]
    RoleTaken {
        /// Role that may only be registered once.
        role: registry::DeviceRole,
        /// Address currently holding the role.
        address: u8,
    },
    /// No matching response after every attempt.
    #[error("no response 0x{action:02X} after {attempts} attempt(s)")]
    ResponseTimeout {
        /// Awaited response action.
        action: u8,
        /// Number of transmissions made.
        attempts: u32,
    },
    /// The byte source reported end of input or the link was torn down.
    #[error("byte stream closed")]
    StreamClosed,
    /// Operation requires a connected link.
    #[error("bus is not connected")]
    NotConnected,
    /// Another bus master is active, so direct equipment commands are refused.
    #[error("a controller is managing the bus")]
    OtherMaster,
    /// Link level I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// Codec failure while building or decoding a message.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

pub use ack::AckOutcome;
pub use controller::{BusController, ConnectionState};
pub use devices::{ChemistryDevice, ChlorinatorDevice, ControllerDevice, DeviceSet, PumpDevice};
pub use discovery::{DeviceCategory, DiscoveryListener, NoopDiscovery};
pub use io::{ByteSink, ByteSource, ReadOutcome, ReaderSource, WriterSink};
pub use link::{link_from_config, Link, MemoryLink, SerialLink, TcpLink};
pub use metrics::{BusMetrics, BusMetricsSnapshot};
pub use reader::FrameReader;
pub use registry::{DeviceHandler, DeviceRegistry, DeviceRole};
