//! ---
//! pb_section: "02-messaging-ipc-data-model"
//! pb_subsection: "module"
//! pb_type: "source"
//! pb_scope: "code"
//! pb_description: "Device handlers for controllers, pumps, chlorinators and chemistry monitors."
//! pb_version: "v0.0.0-prealpha"
//! pb_owner: "tbd"
//! ---
//! Concrete [`DeviceHandler`](crate::DeviceHandler) implementations.
//!
//! Each handler keeps the latest report of every kind it understands.
//! Request methods take the bus explicitly; the reply reaches the handler
//! through dispatch before the request returns.

use std::sync::Arc;

use poolbus_common::{AppConfig, DeviceKind};
use tracing::info;

use crate::controller::BusController;
use crate::Result;

mod chemistry;
mod chlorinator;
mod controller;
mod pump;

pub use chemistry::ChemistryDevice;
pub use chlorinator::{ChlorinatorDevice, ChlorinatorState};
pub use controller::{CircuitInfo, ControllerDevice, CIRCUITS, SCHEDULE_SLOTS};
pub use pump::PumpDevice;

/// Handlers created from configuration, by configured name.
#[derive(Default)]
pub struct DeviceSet {
    /// The controller, when one is configured.
    pub controller: Option<(String, Arc<ControllerDevice>)>,
    /// Configured pumps.
    pub pumps: Vec<(String, Arc<PumpDevice>)>,
    /// The chlorinator, when one is configured.
    pub chlorinator: Option<(String, Arc<ChlorinatorDevice>)>,
    /// Configured chemistry monitors.
    pub chemistry: Vec<(String, Arc<ChemistryDevice>)>,
}

impl DeviceSet {
    /// Create and register one handler per configured device.
    pub fn register_from_config(bus: &BusController, config: &AppConfig) -> Result<Self> {
        let mut set = DeviceSet::default();
        for (name, device) in &config.devices {
            match device.kind {
                DeviceKind::Controller => {
                    let handler = Arc::new(ControllerDevice::new(device.address));
                    bus.register_device(device.address, handler.clone())?;
                    set.controller = Some((name.clone(), handler));
                }
                DeviceKind::Pump => {
                    let handler = Arc::new(PumpDevice::new(device.address));
                    bus.register_device(device.address, handler.clone())?;
                    set.pumps.push((name.clone(), handler));
                }
                DeviceKind::Chlorinator => {
                    let handler = Arc::new(ChlorinatorDevice::new());
                    bus.register_device(device.address, handler.clone())?;
                    set.chlorinator = Some((name.clone(), handler));
                }
                DeviceKind::Chemistry => {
                    let handler = Arc::new(ChemistryDevice::new(device.address));
                    bus.register_device(device.address, handler.clone())?;
                    set.chemistry.push((name.clone(), handler));
                }
            }
            info!(device = %name, kind = ?device.kind, address = device.address, "device configured");
        }
        Ok(set)
    }

    /// Number of handlers in the set.
    pub fn len(&self) -> usize {
        usize::from(self.controller.is_some())
            + self.pumps.len()
            + usize::from(self.chlorinator.is_some())
            + self.chemistry.len()
    }

    /// True when no device is configured.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::DeviceRole;
    use poolbus_common::BusConfig;
    use poolbus_proto::RawMessage;

    #[test]
    fn registers_configured_devices() {
        let config: AppConfig = r#"
[devices.pool]
kind = "controller"
address = 0x10

[devices.filter]
kind = "pump"
address = 0x60

[devices.salt]
kind = "chlorinator"
address = 0

[devices.chem]
kind = "chemistry"
address = 0x90
"#
        .parse()
        .expect("config");
        let bus = BusController::new(BusConfig::default());
        let set = DeviceSet::register_from_config(&bus, &config).expect("register");
        assert_eq!(set.len(), 4);
        assert_eq!(set.pumps[0].0, "filter");

        let status = RawMessage::primary(0x00, 0x10, 0x60, 0x07, &[0x0A; 15]).expect("valid");
        bus.dispatch(&status);
        assert!(bus.is_online(DeviceRole::Pump));
        assert!(set.pumps[0].1.last_status().is_some());
    }
}
