//! ---
//! pb_section: "02-messaging-ipc-data-model"
//! pb_subsection: "module"
//! pb_type: "source"
//! pb_scope: "code"
//! pb_description: "Salt chlorinator views over secondary messages."
//! pb_version: "v0.0.0-prealpha"
//! pb_owner: "tbd"
//! ---
use std::fmt;

use super::expect_shape;
use crate::actions::chlorinator;
use crate::message::{secondary_data_len, FrameKind, RawMessage};
use crate::{ProtocolError, Result};

const PPM_PER_UNIT: u16 = 50;
const NAME_LEN: usize = 16;

/// Decoded chlorinator message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChlorinatorView {
    /// Status request sent by a controller.
    StatusRequest,
    /// Chlorinator answer to a status request; the two bytes are kept as sent.
    StatusReply {
        /// Data bytes of the reply.
        raw: [u8; 2],
    },
    /// Version request sent by a controller.
    VersionRequest,
    /// Requested output percentage.
    SetOutput {
        /// Generation percentage, 0..=100.
        percent: u8,
    },
    /// Salinity and cell status reply.
    Salinity {
        /// Salt level in parts per million.
        ppm: u16,
        /// Cell condition flags.
        status: SalinityStatus,
    },
    /// Firmware version and model name.
    Version {
        /// Firmware version.
        version: u8,
        /// Model name with trailing padding removed.
        name: String,
    },
}

impl ChlorinatorView {
    /// Interpret a secondary message.
    pub fn new(msg: &RawMessage) -> Result<Self> {
        if msg.kind() != FrameKind::Secondary {
            return Err(ProtocolError::ShapeMismatch {
                view: "chlorinator",
                action: msg.action(),
                length: msg.data_len(),
            });
        }
        let action = msg.action();
        let len = secondary_data_len(action).ok_or(ProtocolError::UnknownAction(action))?;
        let data = expect_shape(msg, "chlorinator", FrameKind::Secondary, action, len..=len)?;
        let view = match action {
            chlorinator::GET_STATUS => ChlorinatorView::StatusRequest,
            chlorinator::STATUS => ChlorinatorView::StatusReply {
                raw: [data[0], data[1]],
            },
            chlorinator::GET_VERSION => ChlorinatorView::VersionRequest,
            chlorinator::SET_OUTPUT => ChlorinatorView::SetOutput { percent: data[0] },
            chlorinator::SALINITY => ChlorinatorView::Salinity {
                ppm: u16::from(data[0]) * PPM_PER_UNIT,
                status: SalinityStatus(data[1]),
            },
            chlorinator::VERSION => {
                let name = String::from_utf8_lossy(&data[1..1 + NAME_LEN]);
                ChlorinatorView::Version {
                    version: data[0],
                    name: name.trim_end_matches(['\0', ' ']).to_string(),
                }
            }
            other => return Err(ProtocolError::UnknownAction(other)),
        };
        Ok(view)
    }
}

/// Status byte of a salinity reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SalinityStatus(pub u8);

impl SalinityStatus {
    const FLAGS: [(u8, &'static str); 7] = [
        (0x01, "low flow"),
        (0x02, "low salt"),
        (0x04, "very low salt"),
        (0x08, "high current"),
        (0x10, "clean cell"),
        (0x20, "low voltage"),
        (0x40, "low water temperature"),
    ];

    /// No fault reported. `0x80` is an informational bit and still counts as healthy.
    pub fn ok(&self) -> bool {
        self.0 == 0 || self.0 == 0x80
    }

    /// Insufficient flow through the cell.
    pub fn low_flow(&self) -> bool {
        self.0 & 0x01 != 0
    }

    /// Salt below the working range.
    pub fn low_salt(&self) -> bool {
        self.0 & 0x02 != 0
    }

    /// Salt far below the working range.
    pub fn very_low_salt(&self) -> bool {
        self.0 & 0x04 != 0
    }

    /// Cell drawing too much current.
    pub fn high_current(&self) -> bool {
        self.0 & 0x08 != 0
    }

    /// Cell needs cleaning.
    pub fn clean_cell(&self) -> bool {
        self.0 & 0x10 != 0
    }

    /// Supply voltage low.
    pub fn low_voltage(&self) -> bool {
        self.0 & 0x20 != 0
    }

    /// Water too cold for generation.
    pub fn low_water_temp(&self) -> bool {
        self.0 & 0x40 != 0
    }
}

impl fmt::Display for SalinityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ok() {
            return f.write_str("ok");
        }
        let mut first = true;
        for (mask, label) in Self::FLAGS {
            if self.0 & mask != 0 {
                if !first {
                    f.write_str(", ")?;
                }
                f.write_str(label)?;
                first = false;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::parse_hex;

    fn view(hex: &str) -> ChlorinatorView {
        let wire = parse_hex(hex).expect("hex");
        let msg = RawMessage::from_wire(&wire).expect("valid message");
        ChlorinatorView::new(&msg).expect("chlorinator view")
    }

    #[test]
    fn set_output_percent() {
        assert_eq!(
            view("10 02 50 11 50 C3 10 03"),
            ChlorinatorView::SetOutput { percent: 80 }
        );
    }

    #[test]
    fn salinity_reply() {
        let ChlorinatorView::Salinity { ppm, status } = view("10 02 00 12 67 80 0B 10 03") else {
            panic!("expected salinity");
        };
        assert_eq!(ppm, 0x67 * 50);
        assert!(status.ok());
        assert_eq!(status.to_string(), "ok");

        let ChlorinatorView::Salinity { ppm, status } = view("10 02 00 12 4C 81 F1 10 03") else {
            panic!("expected salinity");
        };
        assert_eq!(ppm, 3800);
        assert!(!status.ok());
        assert!(status.low_flow());
        assert!(!status.low_salt());
        assert_eq!(status.to_string(), "low flow");
    }

    #[test]
    fn version_reply() {
        let mut wire = parse_hex("10 02 00 03 00").expect("hex");
        wire.extend_from_slice(b"Intellichlor--40");
        wire.extend_from_slice(&[0xBC, 0x10, 0x03]);
        let msg = RawMessage::from_wire(&wire).expect("valid message");
        assert_eq!(
            ChlorinatorView::new(&msg).expect("view"),
            ChlorinatorView::Version {
                version: 0,
                name: "Intellichlor--40".to_string()
            }
        );
    }

    #[test]
    fn requests() {
        assert_eq!(view("10 02 50 00 00 62 10 03"), ChlorinatorView::StatusRequest);
        assert_eq!(view("10 02 50 14 00 76 10 03"), ChlorinatorView::VersionRequest);
    }

    #[test]
    fn status_reply_carries_two_bytes() {
        assert_eq!(
            view("10 02 00 01 4C 80 DF 10 03"),
            ChlorinatorView::StatusReply { raw: [0x4C, 0x80] }
        );
    }

    #[test]
    fn rejects_primary_message() {
        let msg = RawMessage::primary(0, 0x10, 0x00, 0x11, &[0x50]).expect("valid");
        assert!(matches!(
            ChlorinatorView::new(&msg),
            Err(ProtocolError::ShapeMismatch { view: "chlorinator", .. })
        ));
    }

    #[test]
    fn combined_fault_flags() {
        let status = SalinityStatus(0x12);
        assert!(status.low_salt());
        assert!(status.clean_cell());
        assert_eq!(status.to_string(), "low salt, clean cell");
    }
}
