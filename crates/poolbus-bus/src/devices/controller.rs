//! ---
//! pb_section: "02-messaging-ipc-data-model"
//! pb_subsection: "module"
//! pb_type: "source"
//! pb_scope: "code"
//! pb_description: "Automation controller handler."
//! pb_version: "v0.0.0-prealpha"
//! pb_owner: "tbd"
//! ---
use std::collections::BTreeMap;

use parking_lot::Mutex;
use poolbus_proto::actions;
use poolbus_proto::commands::DEFAULT_CONTROLLER_PREAMBLE;
use poolbus_proto::{
    CircuitNameView, ClockView, Command, ControllerCommands, FrameKind, HeatMode,
    HeatSetpointView, LightMode, RawMessage, ScheduleEntry, ScheduleView, StatusView,
};
use tracing::{debug, info, trace};

use crate::controller::BusController;
use crate::registry::{DeviceHandler, DeviceRole};
use crate::Result;

/// Schedule slots a controller exposes.
pub const SCHEDULE_SLOTS: u8 = 9;
/// Circuits queried for names.
pub const CIRCUITS: u8 = 8;

/// Name and function a controller reported for one circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitInfo {
    /// Display name, when the index is known.
    pub name: Option<&'static str>,
    /// Function, when the index is known.
    pub function: Option<&'static str>,
}

#[derive(Debug, Default)]
struct ControllerState {
    preamble: Option<u8>,
    status: Option<RawMessage>,
    heat: Option<RawMessage>,
    clock: Option<RawMessage>,
    version: Option<RawMessage>,
    light_groups: Option<RawMessage>,
    schedules: BTreeMap<u8, ScheduleEntry>,
    circuits: BTreeMap<u8, CircuitInfo>,
}

/// Handler for the automation controller that normally drives the bus.
#[derive(Debug)]
pub struct ControllerDevice {
    address: u8,
    state: Mutex<ControllerState>,
}

impl ControllerDevice {
    /// Handler for the controller at `address`.
    pub fn new(address: u8) -> Self {
        Self {
            address,
            state: Mutex::new(ControllerState::default()),
        }
    }

    /// Bus address served.
    pub fn address(&self) -> u8 {
        self.address
    }

    /// Preamble learned from status broadcasts, or the default.
    pub fn preamble(&self) -> u8 {
        self.state.lock().preamble.unwrap_or(DEFAULT_CONTROLLER_PREAMBLE)
    }

    /// Command builders using the learned preamble.
    pub fn commands(&self) -> ControllerCommands {
        ControllerCommands {
            address: self.address,
            preamble: self.preamble(),
        }
    }

    /// Latest status broadcast.
    pub fn last_status(&self) -> Option<RawMessage> {
        self.state.lock().status.clone()
    }

    /// Latest heat report.
    pub fn last_heat(&self) -> Option<RawMessage> {
        self.state.lock().heat.clone()
    }

    /// Latest clock report.
    pub fn last_clock(&self) -> Option<RawMessage> {
        self.state.lock().clock.clone()
    }

    /// Latest software version report.
    pub fn last_version(&self) -> Option<RawMessage> {
        self.state.lock().version.clone()
    }

    /// Latest light group report.
    pub fn last_light_groups(&self) -> Option<RawMessage> {
        self.state.lock().light_groups.clone()
    }

    /// Schedule slot `id` as last reported.
    pub fn schedule(&self, id: u8) -> Option<ScheduleEntry> {
        self.state.lock().schedules.get(&id).copied()
    }

    /// Every reported schedule slot, by id.
    pub fn schedules(&self) -> Vec<ScheduleEntry> {
        self.state.lock().schedules.values().copied().collect()
    }

    /// Name and function of `circuit` as last reported.
    pub fn circuit(&self, circuit: u8) -> Option<CircuitInfo> {
        self.state.lock().circuits.get(&circuit).copied()
    }

    /// Build a command with the learned preamble and send it with acknowledgement.
    pub fn execute<F>(&self, bus: &BusController, build: F) -> Result<Option<RawMessage>>
    where
        F: FnOnce(&ControllerCommands) -> poolbus_proto::Result<Command>,
    {
        let command = build(&self.commands())?;
        bus.send(&command)
    }

    /// Switch `circuit` on or off.
    pub fn set_circuit(&self, bus: &BusController, circuit: u8, on: bool) -> Result<()> {
        self.execute(bus, |c| c.circuit_switch(circuit, on))?;
        info!(circuit, on, "circuit switched");
        Ok(())
    }

    /// Ask for a status broadcast; the reply updates [`Self::last_status`].
    pub fn request_status(&self, bus: &BusController) -> Result<()> {
        self.execute(bus, ControllerCommands::status_request).map(drop)
    }

    /// Ask for the clock.
    pub fn request_clock(&self, bus: &BusController) -> Result<()> {
        self.execute(bus, ControllerCommands::get_clock).map(drop)
    }

    /// Ask for heat set points.
    pub fn request_heat(&self, bus: &BusController) -> Result<()> {
        self.execute(bus, ControllerCommands::get_heat).map(drop)
    }

    /// Change set points and heating sources, then refresh the heat report.
    pub fn set_heat(
        &self,
        bus: &BusController,
        pool_setpoint: u8,
        spa_setpoint: u8,
        pool_mode: HeatMode,
        spa_mode: HeatMode,
    ) -> Result<()> {
        self.execute(bus, |c| {
            c.set_heat(pool_setpoint, spa_setpoint, pool_mode, spa_mode)
        })?;
        self.request_heat(bus)
    }

    /// Select a light show.
    pub fn set_light_mode(&self, bus: &BusController, mode: LightMode) -> Result<()> {
        self.execute(bus, |c| c.light_mode(mode)).map(drop)
    }

    /// Ask for the software version.
    pub fn request_version(&self, bus: &BusController) -> Result<()> {
        self.execute(bus, ControllerCommands::sw_version).map(drop)
    }

    /// Ask for light group assignments and positions.
    pub fn request_light_groups(&self, bus: &BusController) -> Result<()> {
        self.execute(bus, ControllerCommands::light_groups).map(drop)
    }

    /// Ask for the name of each circuit in `1..=CIRCUITS`.
    pub fn request_circuit_names(&self, bus: &BusController) -> Result<()> {
        for circuit in 1..=CIRCUITS {
            self.execute(bus, |c| c.circuit_name(circuit))?;
        }
        Ok(())
    }

    /// Ask for schedule slot `id`.
    pub fn request_schedule(&self, bus: &BusController, id: u8) -> Result<()> {
        self.execute(bus, |c| c.get_schedule(id)).map(drop)
    }

    /// Ask for every schedule slot.
    pub fn request_schedules(&self, bus: &BusController) -> Result<()> {
        for id in 1..=SCHEDULE_SLOTS {
            self.request_schedule(bus, id)?;
        }
        Ok(())
    }

    /// Store `entry` and read the slot back.
    pub fn write_schedule(&self, bus: &BusController, entry: &ScheduleEntry) -> Result<()> {
        self.execute(bus, |c| c.set_schedule(entry))?;
        self.request_schedule(bus, entry.id)
    }

    /// Version, heat, circuit names and schedules, in that order.
    pub fn refresh(&self, bus: &BusController) -> Result<()> {
        self.request_version(bus)?;
        self.request_heat(bus)?;
        self.request_circuit_names(bus)?;
        self.request_schedules(bus)
    }

    fn on_status(&self, message: &RawMessage) {
        let view = match StatusView::new(message) {
            Ok(view) => view,
            Err(err) => {
                debug!(error = %err, "ignoring malformed status");
                return;
            }
        };
        debug!(
            time = format_args!("{:02}:{:02}", view.hour(), view.minute()),
            pool = view.pool(),
            spa = view.spa(),
            pool_temp = view.pool_temp(),
            spa_temp = view.spa_temp(),
            air_temp = view.air_temp(),
            service_mode = view.service_mode(),
            "controller status"
        );
        let mut state = self.state.lock();
        if let Some(preamble) = message.preamble() {
            if state.preamble != Some(preamble) {
                debug!(preamble = format_args!("0x{preamble:02X}"), "controller preamble learned");
                state.preamble = Some(preamble);
            }
        }
        state.status = Some(message.clone());
    }

    fn on_heat(&self, message: &RawMessage) {
        match HeatSetpointView::new(message) {
            Ok(view) => {
                debug!(
                    pool_setpoint = view.pool_setpoint(),
                    spa_setpoint = view.spa_setpoint(),
                    pool_mode = %view.pool_heat_mode(),
                    spa_mode = %view.spa_heat_mode(),
                    "heat set points"
                );
                self.state.lock().heat = Some(message.clone());
            }
            Err(err) => debug!(error = %err, "ignoring malformed heat report"),
        }
    }

    fn on_clock(&self, message: &RawMessage) {
        match ClockView::new(message) {
            Ok(view) => {
                debug!(
                    time = format_args!("{:02}:{:02}", view.hour(), view.minute()),
                    date = format_args!("{:02}/{:02}/{:02}", view.month(), view.day(), view.year()),
                    "controller clock"
                );
                self.state.lock().clock = Some(message.clone());
            }
            Err(err) => debug!(error = %err, "ignoring malformed clock report"),
        }
    }

    fn on_circuit_name(&self, message: &RawMessage) {
        match CircuitNameView::new(message) {
            Ok(view) => {
                let info = CircuitInfo {
                    name: view.name(),
                    function: view.function(),
                };
                debug!(circuit = view.circuit(), name = ?info.name, function = ?info.function, "circuit name");
                self.state.lock().circuits.insert(view.circuit(), info);
            }
            Err(err) => debug!(error = %err, "ignoring malformed circuit name"),
        }
    }

    fn on_schedule(&self, message: &RawMessage) {
        match ScheduleView::new(message) {
            Ok(view) => {
                let entry = view.entry();
                debug!(id = entry.id, schedule = %entry, "schedule");
                self.state.lock().schedules.insert(entry.id, entry);
            }
            Err(err) => debug!(error = %err, "ignoring malformed schedule"),
        }
    }
}

impl DeviceHandler for ControllerDevice {
    fn role(&self) -> DeviceRole {
        DeviceRole::Controller
    }

    fn handle(&self, message: &RawMessage) {
        if message.kind() != FrameKind::Primary {
            return;
        }
        match message.action() {
            actions::ACK if message.data_len() == 1 => {
                debug!(acknowledged = format_args!("0x{:02X}", message.data()[0]), "controller ack");
            }
            actions::STATUS => self.on_status(message),
            actions::CLOCK => self.on_clock(message),
            actions::HEAT => self.on_heat(message),
            actions::CIRCUIT_NAME => self.on_circuit_name(message),
            actions::SCHEDULE => self.on_schedule(message),
            actions::LIGHT_GROUPS => {
                debug!(message = %message, "controller light groups");
                self.state.lock().light_groups = Some(message.clone());
            }
            actions::SW_VERSION => {
                debug!(message = %message, "controller software version");
                self.state.lock().version = Some(message.clone());
            }
            other => trace!(action = format_args!("0x{other:02X}"), "controller traffic"),
        }
    }

    fn service_mode(&self) -> bool {
        self.state
            .lock()
            .status
            .as_ref()
            .and_then(|status| StatusView::new(status).ok())
            .is_some_and(|view| view.service_mode())
    }
}
