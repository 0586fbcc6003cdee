//! ---
//! pb_section: "02-messaging-ipc-data-model"
//! pb_subsection: "module"
//! pb_type: "source"
//! pb_scope: "code"
//! pb_description: "Variable-speed pump status view."
//! pb_version: "v0.0.0-prealpha"
//! pb_owner: "tbd"
//! ---
use super::{expect_shape, word};
use crate::actions;
use crate::message::{FrameKind, RawMessage};
use crate::Result;

const PUMP_STATUS_LEN: usize = 15;
const RUNNING: u8 = 0x0A;

/// Pump status report (action 0x07, 15 data bytes).
#[derive(Debug, Clone, Copy)]
pub struct PumpStatusView<'a> {
    data: &'a [u8],
}

impl<'a> PumpStatusView<'a> {
    /// Interpret `msg` as a pump status report.
    pub fn new(msg: &'a RawMessage) -> Result<Self> {
        let data = expect_shape(
            msg,
            "pump status",
            FrameKind::Primary,
            actions::PUMP_STATUS,
            PUMP_STATUS_LEN..=PUMP_STATUS_LEN,
        )?;
        Ok(Self { data })
    }

    /// Motor running.
    pub fn running(&self) -> bool {
        self.data[0] == RUNNING
    }

    /// Raw operating mode.
    pub fn mode(&self) -> u8 {
        self.data[1]
    }

    /// Raw drive state.
    pub fn drive_state(&self) -> u8 {
        self.data[2]
    }

    /// Power draw in watts.
    pub fn watts(&self) -> u16 {
        word(self.data, 3)
    }

    /// Motor speed.
    pub fn rpm(&self) -> u16 {
        word(self.data, 5)
    }

    /// Flow in gallons per minute.
    pub fn gpm(&self) -> u8 {
        self.data[7]
    }

    /// Pressure curve.
    pub fn ppc(&self) -> u8 {
        self.data[8]
    }

    /// Error code, 0 when healthy.
    pub fn error(&self) -> u8 {
        self.data[9]
    }

    /// Remaining timer minutes.
    pub fn timer(&self) -> u8 {
        self.data[10]
    }

    /// Pump clock hour.
    pub fn hour(&self) -> u8 {
        self.data[13]
    }

    /// Pump clock minute.
    pub fn minute(&self) -> u8 {
        self.data[14]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::parse_hex;
    use crate::ProtocolError;

    #[test]
    fn decodes_running_pump() {
        let wire = parse_hex(
            "FF 00 FF A5 00 10 60 07 0F 0A 06 02 02 4A 08 AC 12 00 00 00 0A 00 0F 22 02 8A",
        )
        .expect("hex");
        let msg = RawMessage::from_wire(&wire).expect("valid message");
        let pump = PumpStatusView::new(&msg).expect("pump view");
        assert!(pump.running());
        assert_eq!(pump.mode(), 6);
        assert_eq!(pump.drive_state(), 2);
        assert_eq!(pump.watts(), 586);
        assert_eq!(pump.rpm(), 2220);
        assert_eq!(pump.gpm(), 18);
        assert_eq!(pump.ppc(), 0);
        assert_eq!(pump.error(), 0);
        assert_eq!(pump.timer(), 0);
        assert_eq!((pump.hour(), pump.minute()), (15, 34));
    }

    #[test]
    fn stopped_pump() {
        let mut data = [0u8; 15];
        data[0] = 0x04;
        let msg = RawMessage::primary(0, 0x10, 0x60, actions::PUMP_STATUS, &data).expect("valid");
        assert!(!PumpStatusView::new(&msg).expect("pump view").running());
    }

    #[test]
    fn rejects_status_request_echo() {
        let msg = RawMessage::primary(0, 0x60, 0x10, actions::PUMP_STATUS, &[]).expect("valid");
        assert!(matches!(
            PumpStatusView::new(&msg),
            Err(ProtocolError::ShapeMismatch { length: 0, .. })
        ));
    }
}
