//! ---
//! pb_section: "02-messaging-ipc-data-model"
//! pb_subsection: "module"
//! pb_type: "source"
//! pb_scope: "code"
//! pb_description: "Typed read-only views over raw bus messages."
//! pb_version: "v0.0.0-prealpha"
//! pb_owner: "tbd"
//! ---
//! Typed read-only projections over [`RawMessage`] data bytes.
//!
//! Each view checks framing, action and data length on construction and
//! fails with [`ProtocolError::ShapeMismatch`] otherwise, so accessors can
//! index the data directly.

use std::ops::RangeInclusive;

use crate::message::{FrameKind, RawMessage};
use crate::{ProtocolError, Result};

mod chemistry;
mod chlorinator;
mod controller;
mod pump;
mod schedule;

pub use chemistry::ChemistryView;
pub use chlorinator::{ChlorinatorView, SalinityStatus};
pub use controller::{
    circuit_function, circuit_name, CircuitNameView, ClockView, HeatMode, HeatSetpointView,
    StatusView,
};
pub use pump::PumpStatusView;
pub use schedule::{ScheduleEntry, ScheduleKind, ScheduleView};

fn expect_shape<'a>(
    msg: &'a RawMessage,
    view: &'static str,
    kind: FrameKind,
    action: u8,
    lengths: RangeInclusive<usize>,
) -> Result<&'a [u8]> {
    if msg.kind() != kind || msg.action() != action || !lengths.contains(&msg.data_len()) {
        return Err(ProtocolError::ShapeMismatch {
            view,
            action: msg.action(),
            length: msg.data_len(),
        });
    }
    Ok(msg.data())
}

fn word(data: &[u8], index: usize) -> u16 {
    u16::from_be_bytes([data[index], data[index + 1]])
}
