//! ---
//! pb_section: "02-messaging-ipc-data-model"
//! pb_subsection: "module"
//! pb_type: "source"
//! pb_scope: "code"
//! pb_description: "Chemistry monitor handler."
//! pb_version: "v0.0.0-prealpha"
//! pb_owner: "tbd"
//! ---
use parking_lot::Mutex;
use poolbus_proto::actions;
use poolbus_proto::{ChemistryView, RawMessage};
use tracing::{debug, trace};

use crate::registry::{DeviceHandler, DeviceRole};

/// Handler for a chemistry monitor. Listen-only.
#[derive(Debug)]
pub struct ChemistryDevice {
    address: u8,
    report: Mutex<Option<RawMessage>>,
}

impl ChemistryDevice {
    /// Handler for the monitor at `address`.
    pub fn new(address: u8) -> Self {
        Self {
            address,
            report: Mutex::new(None),
        }
    }

    /// Bus address served.
    pub fn address(&self) -> u8 {
        self.address
    }

    /// Latest chemistry report.
    pub fn last_report(&self) -> Option<RawMessage> {
        self.report.lock().clone()
    }
}

impl DeviceHandler for ChemistryDevice {
    fn role(&self) -> DeviceRole {
        DeviceRole::ChemistryMonitor
    }

    fn handle(&self, message: &RawMessage) {
        if message.action() != actions::CHEMISTRY {
            trace!(action = format_args!("0x{:02X}", message.action()), "chemistry traffic");
            return;
        }
        match ChemistryView::new(message) {
            Ok(view) => {
                debug!(
                    address = self.address,
                    ph = view.ph(),
                    orp = view.orp(),
                    ph_setpoint = view.ph_setpoint(),
                    orp_setpoint = view.orp_setpoint(),
                    flow_alarm = view.water_flow_alarm(),
                    "chemistry report"
                );
                *self.report.lock() = Some(message.clone());
            }
            Err(err) => debug!(error = %err, "ignoring malformed chemistry report"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_latest_report() {
        let device = ChemistryDevice::new(0x90);
        let mut data = [0u8; 41];
        data[0..2].copy_from_slice(&[0x02, 0xE3]);
        let report = RawMessage::primary(0x10, 0x0F, 0x90, actions::CHEMISTRY, &data).expect("valid");
        device.handle(&report);
        let kept = device.last_report().expect("kept");
        assert!((ChemistryView::new(&kept).expect("view").ph() - 7.39).abs() < 1e-9);

        let short = RawMessage::primary(0x10, 0x0F, 0x90, actions::CHEMISTRY, &[0; 3]).expect("valid");
        device.handle(&short);
        assert_eq!(device.last_report(), Some(report));
    }
}
