//! ---
//! pb_section: "02-messaging-ipc-data-model"
//! pb_subsection: "module"
//! pb_type: "source"
//! pb_scope: "code"
//! pb_description: "Variable-speed pump handler."
//! pb_version: "v0.0.0-prealpha"
//! pb_owner: "tbd"
//! ---
use parking_lot::Mutex;
use poolbus_proto::actions;
use poolbus_proto::{Command, FrameKind, PumpCommands, PumpStatusView, RawMessage};
use tracing::{debug, info, trace};

use crate::controller::BusController;
use crate::registry::{DeviceHandler, DeviceRole};
use crate::{BusError, Result};

/// Handler for a variable-speed pump.
///
/// Every request first takes remote control of the pump panel and ends with
/// a status request, so [`PumpDevice::last_status`] reflects the outcome.
#[derive(Debug)]
pub struct PumpDevice {
    address: u8,
    status: Mutex<Option<RawMessage>>,
}

impl PumpDevice {
    /// Handler for the pump at `address`.
    pub fn new(address: u8) -> Self {
        Self {
            address,
            status: Mutex::new(None),
        }
    }

    /// Bus address served.
    pub fn address(&self) -> u8 {
        self.address
    }

    /// Latest status report.
    pub fn last_status(&self) -> Option<RawMessage> {
        self.status.lock().clone()
    }

    fn commands(&self) -> PumpCommands {
        PumpCommands::new(self.address)
    }

    fn run(&self, bus: &BusController, steps: &[Command]) -> Result<()> {
        if bus.other_master_active() {
            info!(address = self.address, "controller owns the bus, pump command refused");
            return Err(BusError::OtherMaster);
        }
        bus.send(&self.commands().remote(true)?)?;
        for step in steps {
            bus.send(step)?;
        }
        bus.send(&self.commands().status()?)?;
        Ok(())
    }

    /// Refresh [`Self::last_status`].
    pub fn request_status(&self, bus: &BusController) -> Result<()> {
        self.run(bus, &[])
    }

    /// Start or stop the motor.
    pub fn set_power(&self, bus: &BusController, on: bool) -> Result<()> {
        self.run(bus, &[self.commands().power(on)?])
    }

    /// Run at `rpm`, 400..=3450.
    pub fn set_rpm(&self, bus: &BusController, rpm: u16) -> Result<()> {
        let commands = self.commands();
        self.run(bus, &[commands.rpm(rpm)?, commands.power(true)?])
    }

    /// Run stored program 1..=4.
    pub fn run_program(&self, bus: &BusController, program: u8) -> Result<()> {
        let commands = self.commands();
        self.run(bus, &[commands.program(program)?, commands.power(true)?])
    }

    /// Hand the pump panel back to local control.
    pub fn release(&self, bus: &BusController) -> Result<()> {
        if bus.other_master_active() {
            return Err(BusError::OtherMaster);
        }
        bus.send(&self.commands().remote(false)?).map(drop)
    }
}

impl DeviceHandler for PumpDevice {
    fn role(&self) -> DeviceRole {
        DeviceRole::Pump
    }

    fn handle(&self, message: &RawMessage) {
        if message.kind() != FrameKind::Primary {
            return;
        }
        match message.action() {
            actions::PUMP_STATUS if message.data_len() == 0 => {
                trace!(address = self.address, "pump status request");
            }
            actions::PUMP_STATUS => match PumpStatusView::new(message) {
                Ok(view) => {
                    debug!(
                        address = self.address,
                        running = view.running(),
                        watts = view.watts(),
                        rpm = view.rpm(),
                        gpm = view.gpm(),
                        error = view.error(),
                        "pump status"
                    );
                    *self.status.lock() = Some(message.clone());
                }
                Err(err) => debug!(error = %err, "ignoring malformed pump status"),
            },
            actions::PUMP_REMOTE => {
                let remote = message.data().first() == Some(&0xFF);
                debug!(address = self.address, remote, "pump panel control");
            }
            actions::PUMP_POWER | actions::PUMP_SPEED => {
                debug!(address = self.address, message = %message, "pump command echoed");
            }
            other => trace!(action = format_args!("0x{other:02X}"), "pump traffic"),
        }
    }
}
