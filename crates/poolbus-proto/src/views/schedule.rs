//! ---
//! pb_section: "02-messaging-ipc-data-model"
//! pb_subsection: "module"
//! pb_type: "source"
//! pb_scope: "code"
//! pb_description: "Controller schedule slot view and text form."
//! pb_version: "v0.0.0-prealpha"
//! pb_owner: "tbd"
//! ---
//! Schedule slots.
//!
//! Text form: `KIND,circuit,HH:MM,HH:MM,DAYS` where `DAYS` lists the active
//! weekdays as letters from `SMTWRFY` (Sunday first, Saturday as `Y`).

use std::fmt;
use std::str::FromStr;

use strum::{Display, EnumString};

use super::expect_shape;
use crate::actions;
use crate::message::{FrameKind, RawMessage};
use crate::{ProtocolError, Result};

const SCHEDULE_LEN: usize = 7;
const DAY_LETTERS: &str = "SMTWRFY";
const EGG_TIMER_HOUR: u8 = 25;
const ONCE_ONLY_HOUR: u8 = 26;
const MAX_CIRCUIT: u8 = 8;

/// How a schedule slot runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum ScheduleKind {
    /// Slot unused.
    None,
    /// Start and end time on the selected days.
    Normal,
    /// Runs for a fixed duration after the circuit is switched on.
    EggTimer,
    /// Runs once and clears itself.
    OnceOnly,
}

/// Owned copy of a schedule slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ScheduleEntry {
    /// Slot number.
    pub id: u8,
    /// Circuit controlled by the slot; 0 when unused.
    pub circuit: u8,
    /// Start hour, or 25 for an egg timer.
    pub start_hour: u8,
    /// Start minute.
    pub start_minute: u8,
    /// End hour, or 26 for a one-shot slot. Egg timers store the duration here.
    pub end_hour: u8,
    /// End minute.
    pub end_minute: u8,
    /// Weekday bit mask, Sunday in bit 6 down to Saturday in bit 0.
    pub days: u8,
}

impl ScheduleEntry {
    /// Classify the slot from its hour markers and circuit.
    pub fn kind(&self) -> ScheduleKind {
        if self.start_hour == EGG_TIMER_HOUR || self.end_hour == EGG_TIMER_HOUR {
            ScheduleKind::EggTimer
        } else if self.end_hour == ONCE_ONLY_HOUR {
            ScheduleKind::OnceOnly
        } else if self.circuit == 0 {
            ScheduleKind::None
        } else {
            ScheduleKind::Normal
        }
    }

    /// Start as minutes past midnight.
    pub fn start_minutes(&self) -> u16 {
        u16::from(self.start_hour) * 60 + u16::from(self.start_minute)
    }

    /// End as minutes past midnight, or the duration for egg timers.
    pub fn end_minutes(&self) -> u16 {
        u16::from(self.end_hour) * 60 + u16::from(self.end_minute)
    }

    /// Same slot stored under another id.
    pub fn with_id(mut self, id: u8) -> Self {
        self.id = id;
        self
    }

    /// Data bytes of a schedule write.
    pub fn to_data(&self) -> [u8; SCHEDULE_LEN] {
        [
            self.id,
            self.circuit,
            self.start_hour,
            self.start_minute,
            self.end_hour,
            self.end_minute,
            self.days,
        ]
    }
}

impl fmt::Display for ScheduleEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{:02}:{:02},{:02}:{:02},",
            self.kind(),
            self.circuit,
            self.start_hour,
            self.start_minute,
            self.end_hour,
            self.end_minute
        )?;
        for (idx, letter) in DAY_LETTERS.chars().enumerate() {
            if self.days & (0x40 >> idx) != 0 {
                write!(f, "{letter}")?;
            }
        }
        Ok(())
    }
}

impl FromStr for ScheduleEntry {
    type Err = ProtocolError;

    /// Parse the text form. The slot id is left at 0; see [`ScheduleEntry::with_id`].
    fn from_str(text: &str) -> Result<Self> {
        let invalid = |reason: &str| ProtocolError::InvalidArgument(format!("schedule `{text}`: {reason}"));
        let upper = text.trim().to_ascii_uppercase();
        let fields: Vec<&str> = upper.split(',').collect();
        if fields.len() != 5 {
            return Err(invalid("expected KIND,circuit,HH:MM,HH:MM,DAYS"));
        }
        let kind = ScheduleKind::from_str(fields[0]).map_err(|_| invalid("unknown kind"))?;
        if kind == ScheduleKind::None {
            return Ok(Self::default());
        }

        let number = |field: &str| field.parse::<u8>().map_err(|_| invalid("bad number"));
        let time = |field: &str| -> Result<(u8, u8)> {
            let (hour, minute) = field.split_once(':').ok_or_else(|| invalid("bad time"))?;
            Ok((number(hour)?, number(minute)?))
        };

        let circuit = number(fields[1])?;
        let (start_hour, start_minute) = time(fields[2])?;
        let (end_hour, end_minute) = time(fields[3])?;
        let mut days = 0u8;
        for letter in fields[4].chars() {
            let idx = DAY_LETTERS.find(letter).ok_or_else(|| invalid("bad day letter"))?;
            days |= 0x40 >> idx;
        }

        if kind == ScheduleKind::Normal {
            if circuit > MAX_CIRCUIT {
                return Err(invalid("circuit out of range"));
            }
            if !(1..=24).contains(&start_hour) || !(1..=24).contains(&end_hour) {
                return Err(invalid("hour out of range"));
            }
            if start_minute > 59 || end_minute > 59 {
                return Err(invalid("minute out of range"));
            }
            if days == 0 {
                return Err(invalid("no days selected"));
            }
        }

        Ok(Self {
            id: 0,
            circuit,
            start_hour,
            start_minute,
            end_hour,
            end_minute,
            days,
        })
    }
}

/// Schedule slot report (action 0x11, 7 data bytes).
#[derive(Debug, Clone, Copy)]
pub struct ScheduleView<'a> {
    data: &'a [u8],
}

impl<'a> ScheduleView<'a> {
    /// Interpret `msg` as a schedule report.
    pub fn new(msg: &'a RawMessage) -> Result<Self> {
        let data = expect_shape(
            msg,
            "schedule",
            FrameKind::Primary,
            actions::SCHEDULE,
            SCHEDULE_LEN..=SCHEDULE_LEN,
        )?;
        Ok(Self { data })
    }

    /// Slot number.
    pub fn id(&self) -> u8 {
        self.data[0]
    }

    /// Controlled circuit.
    pub fn circuit(&self) -> u8 {
        self.data[1]
    }

    /// Slot classification.
    pub fn kind(&self) -> ScheduleKind {
        self.entry().kind()
    }

    /// Weekday bit mask.
    pub fn days(&self) -> u8 {
        self.data[6]
    }

    /// Owned copy of the slot.
    pub fn entry(&self) -> ScheduleEntry {
        ScheduleEntry {
            id: self.data[0],
            circuit: self.data[1],
            start_hour: self.data[2],
            start_minute: self.data[3],
            end_hour: self.data[4],
            end_minute: self.data[5],
            days: self.data[6],
        }
    }
}
