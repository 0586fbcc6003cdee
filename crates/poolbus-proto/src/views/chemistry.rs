//! ---
//! pb_section: "02-messaging-ipc-data-model"
//! pb_subsection: "module"
//! pb_type: "source"
//! pb_scope: "code"
//! pb_description: "Chemistry monitor report view."
//! pb_version: "v0.0.0-prealpha"
//! pb_owner: "tbd"
//! ---
use super::{expect_shape, word};
use crate::actions;
use crate::message::{FrameKind, RawMessage};
use crate::Result;

const CHEMISTRY_LEN: usize = 41;

const PH_READING: usize = 0;
const ORP_READING: usize = 2;
const PH_SETPOINT: usize = 4;
const ORP_SETPOINT: usize = 6;
const TANK1: usize = 20;
const TANK2: usize = 21;
const CALCIUM_HARDNESS: usize = 23;
const CYA: usize = 27;
const TOTAL_ALKALINITY: usize = 28;
const WATER_FLOW: usize = 30;
const MODE1: usize = 34;
const MODE2: usize = 35;

/// Chemistry monitor report (action 0x12, 41 data bytes).
#[derive(Debug, Clone, Copy)]
pub struct ChemistryView<'a> {
    data: &'a [u8],
}

impl<'a> ChemistryView<'a> {
    /// Interpret `msg` as a chemistry report.
    pub fn new(msg: &'a RawMessage) -> Result<Self> {
        let data = expect_shape(
            msg,
            "chemistry",
            FrameKind::Primary,
            actions::CHEMISTRY,
            CHEMISTRY_LEN..=CHEMISTRY_LEN,
        )?;
        Ok(Self { data })
    }

    /// Measured pH.
    pub fn ph(&self) -> f64 {
        f64::from(word(self.data, PH_READING)) / 100.0
    }

    /// Measured oxidation reduction potential in millivolts.
    pub fn orp(&self) -> u16 {
        word(self.data, ORP_READING)
    }

    /// Target pH.
    pub fn ph_setpoint(&self) -> f64 {
        f64::from(word(self.data, PH_SETPOINT)) / 100.0
    }

    /// Target oxidation reduction potential.
    pub fn orp_setpoint(&self) -> u16 {
        word(self.data, ORP_SETPOINT)
    }

    /// Acid tank level.
    pub fn tank1(&self) -> u8 {
        self.data[TANK1]
    }

    /// Chlorine tank level.
    pub fn tank2(&self) -> u8 {
        self.data[TANK2]
    }

    /// Calcium hardness in ppm.
    pub fn calcium_hardness(&self) -> u16 {
        word(self.data, CALCIUM_HARDNESS)
    }

    /// Cyanuric acid in ppm.
    pub fn cya(&self) -> u8 {
        self.data[CYA]
    }

    /// Total alkalinity in ppm.
    pub fn total_alkalinity(&self) -> u8 {
        self.data[TOTAL_ALKALINITY]
    }

    /// No flow through the sensor cell.
    pub fn water_flow_alarm(&self) -> bool {
        self.data[WATER_FLOW] != 0
    }

    /// First raw mode byte.
    pub fn mode1(&self) -> u8 {
        self.data[MODE1]
    }

    /// Second raw mode byte.
    pub fn mode2(&self) -> u8 {
        self.data[MODE2]
    }
}
