//! ---
//! pb_section: "02-messaging-ipc-data-model"
//! pb_subsection: "module"
//! pb_type: "source"
//! pb_scope: "code"
//! pb_description: "Builders for outbound controller, pump and chlorinator requests."
//! pb_version: "v0.0.0-prealpha"
//! pb_owner: "tbd"
//! ---
//! Outbound requests.
//!
//! Builders leave the source byte at 0; the bus stamps its own id before
//! transmitting. Each [`Command`] carries the action code of the reply that
//! completes it so callers can hand it straight to the bus.

use strum::{Display, EnumString, FromRepr};

use crate::actions::{self, chlorinator};
use crate::message::RawMessage;
use crate::views::{HeatMode, ScheduleEntry};
use crate::{ProtocolError, Result};

/// Preamble used by most controllers until one is learned from a status broadcast.
pub const DEFAULT_CONTROLLER_PREAMBLE: u8 = 0x01;
/// Preamble byte used for pump traffic.
pub const PUMP_PREAMBLE: u8 = 0x00;
/// Destination of chlorinator requests.
pub const CHLORINATOR_DEST: u8 = 0x50;

const PUMP_MIN_RPM: u16 = 400;
const PUMP_MAX_RPM: u16 = 3450;
const HEAT_MIN_SETPOINT: u8 = 50;
const HEAT_MAX_SETPOINT: u8 = 105;

/// A request and the reply action that completes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Message to transmit.
    pub message: RawMessage,
    /// Action of the correlated reply, `None` for fire-and-forget.
    pub response: Option<u8>,
}

impl Command {
    fn expecting(message: RawMessage, response: u8) -> Self {
        Self {
            message,
            response: Some(response),
        }
    }
}

/// IntelliBrite style light show selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, FromRepr)]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
#[repr(u8)]
#[allow(missing_docs)]
pub enum LightMode {
    Off = 0,
    On = 1,
    ColorSync = 128,
    ColorSwim = 144,
    ColorSet = 160,
    Party = 177,
    Romance = 178,
    Caribbean = 179,
    American = 180,
    Sunset = 181,
    Royal = 182,
    Blue = 193,
    Green = 194,
    Red = 195,
    White = 196,
    Magenta = 197,
}

fn check_range<T>(name: &str, value: T, range: std::ops::RangeInclusive<T>) -> Result<()>
where
    T: PartialOrd + std::fmt::Display,
{
    if range.contains(&value) {
        Ok(())
    } else {
        Err(ProtocolError::InvalidArgument(format!(
            "{name} {value} outside {}..={}",
            range.start(),
            range.end()
        )))
    }
}

/// Requests addressed to an automation controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerCommands {
    /// Controller bus address.
    pub address: u8,
    /// Preamble byte the controller uses.
    pub preamble: u8,
}

impl ControllerCommands {
    /// Commands for the controller at `address` using the default preamble.
    pub fn new(address: u8) -> Self {
        Self {
            address,
            preamble: DEFAULT_CONTROLLER_PREAMBLE,
        }
    }

    fn build(&self, action: u8, data: &[u8]) -> Result<RawMessage> {
        RawMessage::primary(self.preamble, self.address, 0, action, data)
    }

    /// Switch a circuit on or off.
    pub fn circuit_switch(&self, circuit: u8, on: bool) -> Result<Command> {
        let message = self.build(actions::CIRCUIT_SWITCH, &[circuit, u8::from(on)])?;
        Ok(Command::expecting(message, actions::ACK))
    }

    /// Ask for a status broadcast.
    pub fn status_request(&self) -> Result<Command> {
        let message = self.build(actions::STATUS, &[0])?;
        Ok(Command::expecting(message, actions::STATUS))
    }

    /// Ask for the clock.
    pub fn get_clock(&self) -> Result<Command> {
        let message = self.build(actions::GET_CLOCK, &[0])?;
        Ok(Command::expecting(message, actions::CLOCK))
    }

    /// Set the clock. `day_of_week` is 1..=7 and `year` is two digits.
    pub fn set_clock(
        &self,
        hour: u8,
        minute: u8,
        day_of_week: u8,
        day: u8,
        month: u8,
        year: u8,
    ) -> Result<Command> {
        check_range("hour", hour, 0..=23)?;
        check_range("minute", minute, 0..=59)?;
        check_range("day of week", day_of_week, 1..=7)?;
        check_range("day", day, 1..=31)?;
        check_range("month", month, 1..=12)?;
        check_range("year", year, 0..=99)?;
        let message = self.build(
            actions::SET_CLOCK,
            &[hour, minute, day_of_week, day, month, year, 0, 0],
        )?;
        Ok(Command::expecting(message, actions::ACK))
    }

    /// Ask for heat set points.
    pub fn get_heat(&self) -> Result<Command> {
        let message = self.build(actions::GET_HEAT, &[0])?;
        Ok(Command::expecting(message, actions::HEAT))
    }

    /// Set both set points and heating sources.
    pub fn set_heat(
        &self,
        pool_setpoint: u8,
        spa_setpoint: u8,
        pool_mode: HeatMode,
        spa_mode: HeatMode,
    ) -> Result<Command> {
        check_range("pool set point", pool_setpoint, HEAT_MIN_SETPOINT..=HEAT_MAX_SETPOINT)?;
        check_range("spa set point", spa_setpoint, HEAT_MIN_SETPOINT..=HEAT_MAX_SETPOINT)?;
        let modes = (spa_mode.bits() << 2) | pool_mode.bits();
        let message = self.build(actions::SET_HEAT, &[pool_setpoint, spa_setpoint, modes, 0])?;
        Ok(Command::expecting(message, actions::ACK))
    }

    /// Select a light show.
    pub fn light_mode(&self, mode: LightMode) -> Result<Command> {
        let message = self.build(actions::LIGHT_MODE, &[mode as u8, 0])?;
        Ok(Command::expecting(message, actions::ACK))
    }

    /// Ask for a circuit's name and function.
    pub fn circuit_name(&self, circuit: u8) -> Result<Command> {
        let message = self.build(actions::GET_CIRCUIT_NAME, &[circuit])?;
        Ok(Command::expecting(message, actions::CIRCUIT_NAME))
    }

    /// Ask for a schedule slot.
    pub fn get_schedule(&self, id: u8) -> Result<Command> {
        let message = self.build(actions::GET_SCHEDULE, &[id])?;
        Ok(Command::expecting(message, actions::SCHEDULE))
    }

    /// Store a schedule slot.
    pub fn set_schedule(&self, entry: &ScheduleEntry) -> Result<Command> {
        let message = self.build(actions::SET_SCHEDULE, &entry.to_data())?;
        Ok(Command::expecting(message, actions::ACK))
    }

    /// Ask for the light group assignments and positions.
    pub fn light_groups(&self) -> Result<Command> {
        let message = self.build(actions::GET_LIGHT_GROUPS, &[0])?;
        Ok(Command::expecting(message, actions::LIGHT_GROUPS))
    }

    /// Ask for the firmware version.
    pub fn sw_version(&self) -> Result<Command> {
        let message = self.build(actions::GET_SW_VERSION, &[0])?;
        Ok(Command::expecting(message, actions::SW_VERSION))
    }
}

/// Requests addressed to a variable-speed pump. Pumps echo the request action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PumpCommands {
    /// Pump bus address.
    pub address: u8,
}

impl PumpCommands {
    /// Commands for the pump at `address`.
    pub fn new(address: u8) -> Self {
        Self { address }
    }

    fn echoed(&self, action: u8, data: &[u8]) -> Result<Command> {
        let message = RawMessage::primary(PUMP_PREAMBLE, self.address, 0, action, data)?;
        Ok(Command::expecting(message, action))
    }

    /// Ask for a status report.
    pub fn status(&self) -> Result<Command> {
        self.echoed(actions::PUMP_STATUS, &[])
    }

    /// Take (`true`) or release remote control of the pump panel.
    pub fn remote(&self, remote: bool) -> Result<Command> {
        self.echoed(actions::PUMP_REMOTE, &[if remote { 0xFF } else { 0x00 }])
    }

    /// Start or stop the motor.
    pub fn power(&self, on: bool) -> Result<Command> {
        self.echoed(actions::PUMP_POWER, &[if on { 0x0A } else { 0x04 }])
    }

    /// Run at a fixed speed.
    pub fn rpm(&self, rpm: u16) -> Result<Command> {
        check_range("rpm", rpm, PUMP_MIN_RPM..=PUMP_MAX_RPM)?;
        let [hi, lo] = rpm.to_be_bytes();
        self.echoed(actions::PUMP_SPEED, &[0x02, 0xC4, hi, lo])
    }

    /// Run a stored program, 1..=4.
    pub fn program(&self, program: u8) -> Result<Command> {
        check_range("program", program, 1..=4)?;
        self.echoed(actions::PUMP_SPEED, &[0x03, 0x21, 0x00, program << 3])
    }
}

/// Requests addressed to the salt chlorinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChlorinatorCommands;

impl ChlorinatorCommands {
    /// Set generation percentage; the cell answers with a salinity report.
    pub fn set_output(&self, percent: u8) -> Result<Command> {
        check_range("output percent", percent, 0..=100)?;
        let message = RawMessage::secondary(CHLORINATOR_DEST, chlorinator::SET_OUTPUT, &[percent])?;
        Ok(Command::expecting(message, chlorinator::SALINITY))
    }

    /// Ask for the firmware version and model name.
    pub fn get_version(&self) -> Result<Command> {
        let message = RawMessage::secondary(CHLORINATOR_DEST, chlorinator::GET_VERSION, &[0])?;
        Ok(Command::expecting(message, chlorinator::VERSION))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::parse_hex;

    #[test]
    fn circuit_switch_wire_form() {
        let cmd = ControllerCommands { address: 0x10, preamble: 0x10 }
            .circuit_switch(0x0B, true)
            .expect("valid");
        assert_eq!(cmd.response, Some(actions::ACK));
        assert_eq!(
            cmd.message.with_source(0x22).to_wire(),
            parse_hex("FF 00 FF A5 10 10 22 86 02 0B 01 01 7B").expect("hex")
        );
    }

    #[test]
    fn schedule_write_bytes() {
        let entry = ScheduleEntry {
            id: 1,
            circuit: 4,
            start_hour: 5,
            start_minute: 15,
            end_hour: 10,
            end_minute: 30,
            days: 0x07,
        };
        let cmd = ControllerCommands { address: 0x10, preamble: 0x00 }
            .set_schedule(&entry)
            .expect("valid");
        assert_eq!(
            cmd.message.as_bytes(),
            parse_hex("A5 00 10 00 91 07 01 04 05 0F 0A 1E 07").expect("hex").as_slice()
        );
    }

    #[test]
    fn requests_expect_their_reports() {
        let ctl = ControllerCommands::new(0x10);
        assert_eq!(ctl.status_request().expect("valid").response, Some(actions::STATUS));
        assert_eq!(ctl.get_clock().expect("valid").response, Some(actions::CLOCK));
        assert_eq!(ctl.get_heat().expect("valid").response, Some(actions::HEAT));
        assert_eq!(ctl.circuit_name(3).expect("valid").response, Some(actions::CIRCUIT_NAME));
        assert_eq!(ctl.get_schedule(2).expect("valid").response, Some(actions::SCHEDULE));
        assert_eq!(ctl.sw_version().expect("valid").response, Some(actions::SW_VERSION));
        assert_eq!(ctl.light_groups().expect("valid").response, Some(actions::LIGHT_GROUPS));
        assert_eq!(ctl.status_request().expect("valid").message.preamble(), Some(0x01));
    }

    #[test]
    fn light_groups_request_bytes() {
        let cmd = ControllerCommands { address: 0x10, preamble: 0x10 }
            .light_groups()
            .expect("valid");
        assert_eq!(
            cmd.message.to_wire(),
            parse_hex("FF 00 FF A5 10 10 00 E7 01 00 01 AD").expect("hex")
        );
    }

    #[test]
    fn set_clock_validates_fields() {
        let ctl = ControllerCommands::new(0x10);
        let cmd = ctl.set_clock(13, 5, 3, 19, 10, 26).expect("valid");
        assert_eq!(cmd.message.data(), &[13, 5, 3, 19, 10, 26, 0, 0]);
        assert!(ctl.set_clock(24, 0, 1, 1, 1, 0).is_err());
        assert!(ctl.set_clock(0, 60, 1, 1, 1, 0).is_err());
        assert!(ctl.set_clock(0, 0, 0, 1, 1, 0).is_err());
        assert!(ctl.set_clock(0, 0, 1, 32, 1, 0).is_err());
        assert!(ctl.set_clock(0, 0, 1, 1, 13, 0).is_err());
        assert!(ctl.set_clock(0, 0, 1, 1, 1, 100).is_err());
    }

    #[test]
    fn set_heat_packs_modes() {
        let ctl = ControllerCommands::new(0x10);
        let cmd = ctl
            .set_heat(82, 100, HeatMode::Solar, HeatMode::Heater)
            .expect("valid");
        assert_eq!(cmd.message.data(), &[82, 100, 0x07, 0]);
        assert!(matches!(
            ctl.set_heat(49, 100, HeatMode::None, HeatMode::None),
            Err(ProtocolError::InvalidArgument(_))
        ));
        assert!(ctl.set_heat(80, 106, HeatMode::None, HeatMode::None).is_err());
    }

    #[test]
    fn light_modes() {
        let cmd = ControllerCommands::new(0x10)
            .light_mode(LightMode::Caribbean)
            .expect("valid");
        assert_eq!(cmd.message.data(), &[179, 0]);
        assert_eq!(LightMode::from_repr(196), Some(LightMode::White));
        assert_eq!("colorswim".parse::<LightMode>(), Ok(LightMode::ColorSwim));
        assert_eq!(LightMode::ColorSync.to_string(), "COLORSYNC");
        assert_eq!(LightMode::from_repr(2), None);
    }

    #[test]
    fn pump_requests() {
        let pump = PumpCommands::new(0x60);
        let status = pump.status().expect("valid");
        assert_eq!(status.response, Some(actions::PUMP_STATUS));
        assert_eq!(
            status.message.with_source(0x10).to_wire(),
            parse_hex("FF 00 FF A5 00 60 10 07 00 01 1C").expect("hex")
        );
        assert_eq!(pump.remote(true).expect("valid").message.data(), &[0xFF]);
        assert_eq!(pump.power(false).expect("valid").message.data(), &[0x04]);
        assert_eq!(
            pump.rpm(2220).expect("valid").message.data(),
            &[0x02, 0xC4, 0x08, 0xAC]
        );
        assert_eq!(
            pump.program(2).expect("valid").message.data(),
            &[0x03, 0x21, 0x00, 0x10]
        );
        assert!(pump.rpm(399).is_err());
        assert!(pump.rpm(3451).is_err());
        assert!(pump.program(5).is_err());
    }

    #[test]
    fn chlorinator_requests() {
        let cmd = ChlorinatorCommands.set_output(80).expect("valid");
        assert_eq!(
            cmd.message.to_wire(),
            parse_hex("10 02 50 11 50 C3 10 03").expect("hex")
        );
        assert_eq!(cmd.response, Some(chlorinator::SALINITY));
        assert!(ChlorinatorCommands.set_output(101).is_err());
        assert_eq!(
            ChlorinatorCommands.get_version().expect("valid").message.to_wire(),
            parse_hex("10 02 50 14 00 76 10 03").expect("hex")
        );
    }
}
