//! ---
//! pb_section: "02-messaging-ipc-data-model"
//! pb_subsection: "module"
//! pb_type: "source"
//! pb_scope: "code"
//! pb_description: "Controller status, heat, clock and circuit-name views."
//! pb_version: "v0.0.0-prealpha"
//! pb_owner: "tbd"
//! ---
use strum::{Display, EnumString};

use super::expect_shape;
use crate::actions;
use crate::message::{FrameKind, RawMessage};
use crate::Result;

const STATUS_LEN: usize = 29;
const HEAT_LEN: usize = 13;
const CLOCK_LEN: usize = 8;

// status offsets
const HOUR: usize = 0;
const MINUTE: usize = 1;
const EQUIP1: usize = 2;
const EQUIP2: usize = 3;
const FLAGS: usize = 9;
const HEAT_ACTIVE: usize = 10;
const POOL_TEMP: usize = 14;
const SPA_TEMP: usize = 15;
const AIR_TEMP: usize = 18;
const SOLAR_TEMP: usize = 19;

const CELSIUS: u8 = 0x04;
const SERVICE_MODE: u8 = 0x01;
const HEATER_ACTIVE: u8 = 0x0C;
const SOLAR_ACTIVE: u8 = 0x30;

/// (byte offset, mask) of aux1..aux7.
const AUX_MASKS: [(usize, u8); 7] = [
    (EQUIP1, 0x02),
    (EQUIP1, 0x04),
    (EQUIP1, 0x08),
    (EQUIP1, 0x10),
    (EQUIP1, 0x40),
    (EQUIP1, 0x80),
    (EQUIP2, 0x01),
];

/// Controller status broadcast (action 0x02, 29 data bytes).
#[derive(Debug, Clone, Copy)]
pub struct StatusView<'a> {
    data: &'a [u8],
}

impl<'a> StatusView<'a> {
    /// Interpret `msg` as a status broadcast.
    pub fn new(msg: &'a RawMessage) -> Result<Self> {
        let data = expect_shape(
            msg,
            "status",
            FrameKind::Primary,
            actions::STATUS,
            STATUS_LEN..=STATUS_LEN,
        )?;
        Ok(Self { data })
    }

    /// Controller clock hour.
    pub fn hour(&self) -> u8 {
        self.data[HOUR]
    }

    /// Controller clock minute.
    pub fn minute(&self) -> u8 {
        self.data[MINUTE]
    }

    /// Pool circuit running.
    pub fn pool(&self) -> bool {
        self.data[EQUIP1] & 0x20 != 0
    }

    /// Spa circuit running.
    pub fn spa(&self) -> bool {
        self.data[EQUIP1] & 0x01 != 0
    }

    /// Auxiliary circuit `n` (1..=7) running; `None` for other numbers.
    pub fn aux(&self, n: u8) -> Option<bool> {
        let (offset, mask) = AUX_MASKS.get(usize::from(n).checked_sub(1)?)?;
        Some(self.data[*offset] & mask != 0)
    }

    /// Temperatures are reported in Celsius rather than Fahrenheit.
    pub fn celsius(&self) -> bool {
        self.data[FLAGS] & CELSIUS != 0
    }

    /// Controller is in service mode and ignores remote commands.
    pub fn service_mode(&self) -> bool {
        self.data[FLAGS] & SERVICE_MODE != 0
    }

    /// Gas heater firing.
    pub fn heater_on(&self) -> bool {
        self.data[HEAT_ACTIVE] & HEATER_ACTIVE != 0
    }

    /// Solar heating active.
    pub fn solar_on(&self) -> bool {
        self.data[HEAT_ACTIVE] & SOLAR_ACTIVE != 0
    }

    /// Pool water temperature.
    pub fn pool_temp(&self) -> u8 {
        self.data[POOL_TEMP]
    }

    /// Spa water temperature.
    pub fn spa_temp(&self) -> u8 {
        self.data[SPA_TEMP]
    }

    /// Air temperature.
    pub fn air_temp(&self) -> u8 {
        self.data[AIR_TEMP]
    }

    /// Solar collector temperature.
    pub fn solar_temp(&self) -> u8 {
        self.data[SOLAR_TEMP]
    }
}

/// Heating source selection for a body of water.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum HeatMode {
    /// Heating off.
    None,
    /// Gas heater.
    Heater,
    /// Solar first, heater as backup.
    SolarPreferred,
    /// Solar only.
    Solar,
}

impl HeatMode {
    /// Decode the two-bit field used on the wire.
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => HeatMode::None,
            1 => HeatMode::Heater,
            2 => HeatMode::SolarPreferred,
            _ => HeatMode::Solar,
        }
    }

    /// Two-bit wire value.
    pub fn bits(self) -> u8 {
        match self {
            HeatMode::None => 0,
            HeatMode::Heater => 1,
            HeatMode::SolarPreferred => 2,
            HeatMode::Solar => 3,
        }
    }
}

/// Heat set points and modes (action 0x08, 13 data bytes).
#[derive(Debug, Clone, Copy)]
pub struct HeatSetpointView<'a> {
    data: &'a [u8],
}

impl<'a> HeatSetpointView<'a> {
    /// Interpret `msg` as a heat report.
    pub fn new(msg: &'a RawMessage) -> Result<Self> {
        let data = expect_shape(
            msg,
            "heat set point",
            FrameKind::Primary,
            actions::HEAT,
            HEAT_LEN..=HEAT_LEN,
        )?;
        Ok(Self { data })
    }

    /// Pool water temperature.
    pub fn pool_temp(&self) -> u8 {
        self.data[0]
    }

    /// Spa water temperature.
    pub fn spa_temp(&self) -> u8 {
        self.data[1]
    }

    /// Air temperature.
    pub fn air_temp(&self) -> u8 {
        self.data[2]
    }

    /// Pool set point.
    pub fn pool_setpoint(&self) -> u8 {
        self.data[3]
    }

    /// Spa set point.
    pub fn spa_setpoint(&self) -> u8 {
        self.data[4]
    }

    /// Pool heating source.
    pub fn pool_heat_mode(&self) -> HeatMode {
        HeatMode::from_bits(self.data[5])
    }

    /// Spa heating source.
    pub fn spa_heat_mode(&self) -> HeatMode {
        HeatMode::from_bits(self.data[5] >> 2)
    }
}

/// Controller clock report (action 0x05, 8 data bytes).
#[derive(Debug, Clone, Copy)]
pub struct ClockView<'a> {
    data: &'a [u8],
}

impl<'a> ClockView<'a> {
    /// Interpret `msg` as a clock report.
    pub fn new(msg: &'a RawMessage) -> Result<Self> {
        let data = expect_shape(
            msg,
            "clock",
            FrameKind::Primary,
            actions::CLOCK,
            CLOCK_LEN..=CLOCK_LEN,
        )?;
        Ok(Self { data })
    }

    /// Hour, 0..=23.
    pub fn hour(&self) -> u8 {
        self.data[0]
    }

    /// Minute, 0..=59.
    pub fn minute(&self) -> u8 {
        self.data[1]
    }

    /// Day of week as a single-bit mask, Sunday = 0x01.
    pub fn day_of_week(&self) -> u8 {
        self.data[2]
    }

    /// Day of month.
    pub fn day(&self) -> u8 {
        self.data[3]
    }

    /// Month, 1..=12.
    pub fn month(&self) -> u8 {
        self.data[4]
    }

    /// Two-digit year.
    pub fn year(&self) -> u8 {
        self.data[5]
    }
}

/// Circuit name and function report (action 0x0B).
#[derive(Debug, Clone, Copy)]
pub struct CircuitNameView<'a> {
    data: &'a [u8],
}

impl<'a> CircuitNameView<'a> {
    /// Interpret `msg` as a circuit name report.
    pub fn new(msg: &'a RawMessage) -> Result<Self> {
        let data = expect_shape(
            msg,
            "circuit name",
            FrameKind::Primary,
            actions::CIRCUIT_NAME,
            3..=crate::message::PRIMARY_MAX_DATA,
        )?;
        Ok(Self { data })
    }

    /// Circuit number.
    pub fn circuit(&self) -> u8 {
        self.data[0]
    }

    /// Function assigned to the circuit.
    pub fn function(&self) -> Option<&'static str> {
        circuit_function(self.data[1])
    }

    /// Name assigned to the circuit.
    pub fn name(&self) -> Option<&'static str> {
        circuit_name(self.data[2])
    }
}

/// Circuit function label for a function index.
pub fn circuit_function(index: u8) -> Option<&'static str> {
    CIRCUIT_FUNCTIONS
        .iter()
        .find(|(idx, _)| *idx == index)
        .map(|(_, label)| *label)
}

/// Circuit name label for a name index.
pub fn circuit_name(index: u8) -> Option<&'static str> {
    match index {
        0..=101 => CIRCUIT_NAMES.get(usize::from(index)).copied(),
        200..=209 => USER_NAMES.get(usize::from(index - 200)).copied(),
        _ => None,
    }
}

const CIRCUIT_FUNCTIONS: [(u8, &str); 18] = [
    (0, "GENERIC"),
    (1, "SPA"),
    (2, "POOL"),
    (5, "MASTER CLEANER"),
    (7, "LIGHT"),
    (9, "SAM LIGHT"),
    (10, "SAL LIGHT"),
    (11, "PHOTON GEN"),
    (12, "COLOR WHEEL"),
    (13, "VALVES"),
    (14, "SPILLWAY"),
    (15, "FLOOR CLEANER"),
    (16, "INTELLIBRITE"),
    (17, "MAGICSTREAM"),
    (19, "NOT USED"),
    (64, "FREEZE PROTECTION ON"),
    (66, "FREEZE PROTECTION ON"),
    (72, "FREEZE PROTECTION ON"),
];

const USER_NAMES: [&str; 10] = [
    "USERNAME-01",
    "USERNAME-02",
    "USERNAME-03",
    "USERNAME-04",
    "USERNAME-05",
    "USERNAME-06",
    "USERNAME-07",
    "USERNAME-08",
    "USERNAME-09",
    "USERNAME-10",
];

const CIRCUIT_NAMES: [&str; 102] = [
    "NOT USED",
    "AERATOR",
    "AIR BLOWER",
    "AUX 1",
    "AUX 2",
    "AUX 3",
    "AUX 4",
    "AUX 5",
    "AUX 6",
    "AUX 7",
    "AUX 8",
    "AUX 9",
    "AUX 10",
    "BACKWASH",
    "BACK LIGHT",
    "BBQ LIGHT",
    "BEACH LIGHT",
    "BOOSTER PUMP",
    "BUG LIGHT",
    "CABANA LTS",
    "CHEM. FEEDER",
    "CHLORINATOR",
    "CLEANER",
    "COLOR WHEEL",
    "DECK LIGHT",
    "DRAIN LINE",
    "DRIVE LIGHT",
    "EDGE PUMP",
    "ENTRY LIGHT",
    "FAN",
    "FIBER OPTIC",
    "FIBER WORKS",
    "FILL LINE",
    "FLOOR CLNR",
    "FOGGER",
    "FOUNTAIN",
    "FOUNTAIN 1",
    "FOUNTAIN 2",
    "FOUNTAIN 3",
    "FOUNTAINS",
    "FRONT LIGHT",
    "GARDEN LTS",
    "GAZEBO LTS",
    "HIGH SPEED",
    "HI-TEMP",
    "HOUSE LIGHT",
    "JETS",
    "LIGHTS",
    "LOW SPEED",
    "LO-TEMP",
    "MALIBU LTS",
    "MIST",
    "MUSIC",
    "NOT USED",
    "OZONATOR",
    "PATH LIGHTS",
    "PATIO LTS",
    "PERIMETER L",
    "PG2000",
    "POND LIGHT",
    "POOL PUMP",
    "POOL",
    "POOL HIGH",
    "POOL LIGHT",
    "POOL LOW",
    "SAM",
    "POOL SAM 1",
    "POOL SAM 2",
    "POOL SAM 3",
    "SECURITY LT",
    "SLIDE",
    "SOLAR",
    "SPA",
    "SPA HIGH",
    "SPA LIGHT",
    "SPA LOW",
    "SPA SAL",
    "SPA SAM",
    "SPA WTRFLL",
    "SPILLWAY",
    "SPRINKLERS",
    "STREAM",
    "STATUE LT",
    "SWIM JETS",
    "WTR FEATURE",
    "WTR FEAT LT",
    "WATERFALL",
    "WATERFALL 1",
    "WATERFALL 2",
    "WATERFALL 3",
    "WHIRLPOOL",
    "WTRFL LGHT",
    "YARD LIGHT",
    "AUX EXTRA",
    "FEATURE 1",
    "FEATURE 2",
    "FEATURE 3",
    "FEATURE 4",
    "FEATURE 5",
    "FEATURE 6",
    "FEATURE 7",
    "FEATURE 8",
];
