//! ---
//! pb_section: "02-messaging-ipc-data-model"
//! pb_subsection: "module"
//! pb_type: "source"
//! pb_scope: "code"
//! pb_description: "Classification of unregistered bus addresses and discovery callbacks."
//! pb_version: "v0.0.0-prealpha"
//! pb_owner: "tbd"
//! ---
use poolbus_proto::FrameKind;
use strum::Display;

/// What an unregistered source address most likely is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum DeviceCategory {
    /// `0x10..=0x1F`.
    Controller,
    /// `0x20..=0x2F`, wall panels and remotes; never offered for discovery.
    ControlPanel,
    /// `0x60..=0x6F`.
    Pump,
    /// `0x90..=0x9F`.
    ChemistryMonitor,
    /// Any secondary-framed talker.
    Chlorinator,
    /// Outside every known range.
    Unknown,
}

impl DeviceCategory {
    /// Classify by framing and source address.
    pub fn classify(kind: FrameKind, address: u8) -> Self {
        if kind == FrameKind::Secondary {
            return DeviceCategory::Chlorinator;
        }
        match address >> 4 {
            0x1 => DeviceCategory::Controller,
            0x2 => DeviceCategory::ControlPanel,
            0x6 => DeviceCategory::Pump,
            0x9 => DeviceCategory::ChemistryMonitor,
            _ => DeviceCategory::Unknown,
        }
    }
}

/// Notified the first time an unregistered device is heard in a session.
///
/// Callbacks run on the reader thread.
pub trait DiscoveryListener: Send + Sync {
    /// A controller spoke while no controller was online.
    fn on_unregistered_controller(&self, _address: u8) {}
    /// A pump spoke.
    fn on_unregistered_pump(&self, _address: u8) {}
    /// A chemistry monitor spoke.
    fn on_unregistered_chemistry_monitor(&self, _address: u8) {}
    /// A chlorinator spoke.
    fn on_unregistered_chlorinator(&self, _address: u8) {}
}

/// Listener that ignores every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopDiscovery;

impl DiscoveryListener for NoopDiscovery {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_ranges() {
        assert_eq!(
            DeviceCategory::classify(FrameKind::Primary, 0x10),
            DeviceCategory::Controller
        );
        assert_eq!(
            DeviceCategory::classify(FrameKind::Primary, 0x22),
            DeviceCategory::ControlPanel
        );
        assert_eq!(
            DeviceCategory::classify(FrameKind::Primary, 0x6F),
            DeviceCategory::Pump
        );
        assert_eq!(
            DeviceCategory::classify(FrameKind::Primary, 0x90),
            DeviceCategory::ChemistryMonitor
        );
        assert_eq!(
            DeviceCategory::classify(FrameKind::Primary, 0x00),
            DeviceCategory::Unknown
        );
        assert_eq!(
            DeviceCategory::classify(FrameKind::Secondary, 0x00),
            DeviceCategory::Chlorinator
        );
        assert_eq!(DeviceCategory::ChemistryMonitor.to_string(), "chemistry_monitor");
    }
}
