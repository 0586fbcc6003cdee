//! ---
//! pb_section: "02-messaging-ipc-data-model"
//! pb_subsection: "module"
//! pb_type: "source"
//! pb_scope: "code"
//! pb_description: "Frame parser and message codec for the equipment bus."
//! pb_version: "v0.0.0-prealpha"
//! pb_owner: "tbd"
//! ---
//! Two framings share the wire. Primary messages start with `FF .. 00 FF A5`
//! and carry a self-declared length with a 16-bit checksum; secondary
//! messages start with `10 02`, take their length from the action code and
//! end in `10 03` after an 8-bit checksum.
#![warn(missing_docs)]

pub mod actions;
pub mod commands;
pub mod message;
pub mod parser;
pub mod views;

/// Shared result type for codec operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Decode, validation and encode failures.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProtocolError {
    /// A start marker, preamble byte or trailer did not match the framing.
    #[error("framing error: {0}")]
    Framing(&'static str),
    /// Transmitted checksum disagrees with the computed sum.
    #[error("checksum mismatch: computed {computed:#06x}, transmitted {transmitted:#06x}")]
    Checksum {
        /// Sum over the delimited region.
        computed: u16,
        /// Value carried on the wire.
        transmitted: u16,
    },
    /// Declared length exceeds what the framing allows.
    #[error("declared length {declared} exceeds maximum {max}")]
    LengthExceeded {
        /// Length found in the header.
        declared: usize,
        /// Upper bound for the framing.
        max: usize,
    },
    /// Buffer length inconsistent with the header or the action table.
    #[error("length mismatch: expected {expected} bytes, found {actual}")]
    Length {
        /// Length implied by the header or table.
        expected: usize,
        /// Length actually present.
        actual: usize,
    },
    /// Secondary action code without a length table entry.
    #[error("unknown secondary action 0x{0:02X}")]
    UnknownAction(u8),
    /// A view was built from a message of a different shape.
    #[error("{view} view cannot decode action 0x{action:02X} with {length} data bytes")]
    ShapeMismatch {
        /// Name of the view.
        view: &'static str,
        /// Action code of the offending message.
        action: u8,
        /// Data length of the offending message.
        length: usize,
    },
    /// Data byte accessed past the declared length.
    #[error("data index {index} out of range for {len} data bytes")]
    DataIndex {
        /// Requested offset.
        index: usize,
        /// Number of data bytes.
        len: usize,
    },
    /// Command argument outside the range the equipment accepts.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// Hex dump could not be decoded.
    #[error("invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),
}

pub use commands::{ChlorinatorCommands, Command, ControllerCommands, LightMode, PumpCommands};
pub use message::{checksum, parse_hex, FrameKind, RawMessage, CHLORINATOR_ADDRESS};
pub use parser::FrameParser;
pub use views::{
    ChemistryView, ChlorinatorView, CircuitNameView, ClockView, HeatMode, HeatSetpointView,
    PumpStatusView, SalinityStatus, ScheduleEntry, ScheduleKind, ScheduleView, StatusView,
};
