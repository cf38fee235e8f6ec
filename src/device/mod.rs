//! Device-side vocabulary: the modes an air conditioner accepts and the commands built
//! from them.

pub mod modes;

pub use modes::{FanMode, HvacMode, PowerMode, PresetMode, SwingMode};

/// A single control command addressed to one air conditioner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    Power(PowerMode),
    /// Target temperature in degrees Celsius.
    Temperature(f32),
    HvacMode(HvacMode),
    FanMode(FanMode),
    PresetMode(PresetMode),
    SwingMode(SwingMode),
}
