//! ---
//! pb_section: "02-messaging-ipc-data-model"
//! pb_subsection: "module"
//! pb_type: "source"
//! pb_scope: "code"
//! pb_description: "Salt chlorinator handler."
//! pb_version: "v0.0.0-prealpha"
//! pb_owner: "tbd"
//! ---
use parking_lot::Mutex;
use poolbus_proto::{ChlorinatorCommands, ChlorinatorView, FrameKind, RawMessage, SalinityStatus};
use tracing::{debug, trace, warn};

use crate::controller::BusController;
use crate::registry::{DeviceHandler, DeviceRole};
use crate::Result;

/// What the chlorinator and its master last said.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChlorinatorState {
    /// Output percentage last requested on the bus.
    pub output: Option<u8>,
    /// Salt level in parts per million.
    pub salinity: Option<u16>,
    /// Cell condition reported with the salt level.
    pub status: Option<SalinityStatus>,
    /// Firmware version.
    pub version: Option<u8>,
    /// Model name.
    pub name: Option<String>,
    /// Bytes of the last status reply.
    pub status_reply: Option<[u8; 2]>,
}

/// Handler for the salt chlorinator, the only talker on the secondary framing.
#[derive(Debug, Default)]
pub struct ChlorinatorDevice {
    state: Mutex<ChlorinatorState>,
}

impl ChlorinatorDevice {
    /// Handler with nothing heard yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the current state.
    pub fn state(&self) -> ChlorinatorState {
        self.state.lock().clone()
    }

    /// Set generation to `percent`; the salinity reply updates [`Self::state`].
    pub fn set_output(&self, bus: &BusController, percent: u8) -> Result<()> {
        bus.send(&ChlorinatorCommands.set_output(percent)?)?;
        self.state.lock().output = Some(percent);
        Ok(())
    }

    /// Ask for firmware version and model name.
    pub fn request_version(&self, bus: &BusController) -> Result<()> {
        bus.send(&ChlorinatorCommands.get_version()?).map(drop)
    }
}

impl DeviceHandler for ChlorinatorDevice {
    fn role(&self) -> DeviceRole {
        DeviceRole::Chlorinator
    }

    fn handle(&self, message: &RawMessage) {
        if message.kind() != FrameKind::Secondary {
            return;
        }
        let view = match ChlorinatorView::new(message) {
            Ok(view) => view,
            Err(err) => {
                debug!(error = %err, "ignoring chlorinator message");
                return;
            }
        };
        let mut state = self.state.lock();
        match view {
            ChlorinatorView::StatusRequest | ChlorinatorView::VersionRequest => {
                trace!(message = %message, "chlorinator request");
            }
            ChlorinatorView::StatusReply { raw } => {
                debug!(reply = ?raw, "chlorinator answered status request");
                state.status_reply = Some(raw);
            }
            ChlorinatorView::SetOutput { percent } => {
                debug!(percent, "chlorinator output requested");
                state.output = Some(percent);
            }
            ChlorinatorView::Salinity { ppm, status } => {
                if status.ok() {
                    debug!(ppm, "chlorinator salinity");
                } else {
                    warn!(ppm, %status, "chlorinator fault");
                }
                state.salinity = Some(ppm);
                state.status = Some(status);
            }
            ChlorinatorView::Version { version, name } => {
                debug!(version, name = %name, "chlorinator version");
                state.version = Some(version);
                state.name = Some(name);
            }
        }
    }
}
