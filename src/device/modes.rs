//! Operating modes understood by MirAIe air conditioners.
//!
//! Each mode maps to the code the cloud expects on the wire. Power and swing codes are
//! numeric; HVAC and fan codes are short lowercase words.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerMode {
    On,
    Off,
}

impl PowerMode {
    pub fn code(self) -> u8 {
        match self {
            PowerMode::On => 1,
            PowerMode::Off => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HvacMode {
    Auto,
    Cool,
    Dry,
    Fan,
}

impl HvacMode {
    pub fn code(self) -> &'static str {
        match self {
            HvacMode::Auto => "auto",
            HvacMode::Cool => "cool",
            HvacMode::Dry => "dry",
            HvacMode::Fan => "fan",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FanMode {
    Auto,
    Quiet,
    Low,
    Medium,
    High,
}

impl FanMode {
    pub fn code(self) -> &'static str {
        match self {
            FanMode::Auto => "auto",
            FanMode::Quiet => "quiet",
            FanMode::Low => "low",
            FanMode::Medium => "medium",
            FanMode::High => "high",
        }
    }
}

/// Comfort presets. Exactly one is active at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresetMode {
    None,
    Eco,
    Boost,
}

/// Vertical louver position. `On` keeps the louver sweeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwingMode {
    On,
    One,
    Two,
    Three,
    Four,
    Five,
}

impl SwingMode {
    pub fn code(self) -> u8 {
        match self {
            SwingMode::On => 0,
            SwingMode::One => 1,
            SwingMode::Two => 2,
            SwingMode::Three => 3,
            SwingMode::Four => 4,
            SwingMode::Five => 5,
        }
    }
}

macro_rules! display_code {
    ($($mode:ty),*) => {
        $(
            impl fmt::Display for $mode {
                fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                    write!(f, "{}", self.code())
                }
            }
        )*
    };
}

display_code!(PowerMode, HvacMode, FanMode, SwingMode);
