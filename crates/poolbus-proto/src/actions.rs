//! ---
//! pb_section: "02-messaging-ipc-data-model"
//! pb_subsection: "module"
//! pb_type: "source"
//! pb_scope: "code"
//! pb_description: "Action codes seen on the equipment bus."
//! pb_version: "v0.0.0-prealpha"
//! pb_owner: "tbd"
//! ---
//! Action codes. Primary codes are shared by controllers and pumps, so the
//! same value can mean different things depending on the talker.

/// Generic acknowledgement from a controller.
pub const ACK: u8 = 0x01;
/// Pump: set speed or run a program.
pub const PUMP_SPEED: u8 = 0x01;
/// Controller status broadcast and request.
pub const STATUS: u8 = 0x02;
/// Pump: remote/local control.
pub const PUMP_REMOTE: u8 = 0x04;
/// Controller clock report.
pub const CLOCK: u8 = 0x05;
/// Pump: power on/off.
pub const PUMP_POWER: u8 = 0x06;
/// Pump status report and request.
pub const PUMP_STATUS: u8 = 0x07;
/// Controller heat set points report.
pub const HEAT: u8 = 0x08;
/// Controller circuit name report.
pub const CIRCUIT_NAME: u8 = 0x0B;
/// Controller schedule report.
pub const SCHEDULE: u8 = 0x11;
/// Chemistry monitor report.
pub const CHEMISTRY: u8 = 0x12;
/// Light group and position report.
pub const LIGHT_GROUPS: u8 = 0x27;
/// Light mode change.
pub const LIGHT_MODE: u8 = 0x60;
/// Set clock.
pub const SET_CLOCK: u8 = 0x85;
/// Circuit on/off.
pub const CIRCUIT_SWITCH: u8 = 0x86;
/// Set heat set points and modes.
pub const SET_HEAT: u8 = 0x88;
/// Write a schedule slot.
pub const SET_SCHEDULE: u8 = 0x91;
/// Request the clock.
pub const GET_CLOCK: u8 = 0xC5;
/// Request heat set points.
pub const GET_HEAT: u8 = 0xC8;
/// Request a circuit name.
pub const GET_CIRCUIT_NAME: u8 = 0xCB;
/// Request a schedule slot.
pub const GET_SCHEDULE: u8 = 0xD1;
/// Request light groups and positions.
pub const GET_LIGHT_GROUPS: u8 = 0xE7;
/// Request the software version.
pub const GET_SW_VERSION: u8 = 0xD9;
/// Software version report.
pub const SW_VERSION: u8 = 0xFC;

/// Secondary framing (chlorinator) action codes.
pub mod chlorinator {
    /// Status request from the controller.
    pub const GET_STATUS: u8 = 0x00;
    /// Reply to [`GET_STATUS`].
    pub const STATUS: u8 = 0x01;
    /// Version and model name report.
    pub const VERSION: u8 = 0x03;
    /// Set output percent.
    pub const SET_OUTPUT: u8 = 0x11;
    /// Salinity and status report.
    pub const SALINITY: u8 = 0x12;
    /// Version request.
    pub const GET_VERSION: u8 = 0x14;
}
