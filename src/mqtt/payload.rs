//! Control payloads for MirAIe devices.
//!
//! Every payload starts from the same envelope (`ki`, `cnt`, `sid`) followed by the
//! command fields. Keys keep insertion order, so the serialized JSON always lists the
//! envelope first.

use serde_json::{json, Map, Value};

use crate::device::{Command, FanMode, HvacMode, PowerMode, PresetMode, SwingMode};

/// Ordered key-value document exchanged with the broker.
pub type Payload = Map<String, Value>;

/// Temperature applied together with the eco preset.
pub const ECO_TEMPERATURE: f64 = 26.0;

pub fn build_base_payload() -> Payload {
    let mut payload = Map::new();
    payload.insert("ki".into(), json!(1));
    payload.insert("cnt".into(), json!("an"));
    payload.insert("sid".into(), json!("1"));
    payload
}

pub fn build_power_payload(power: PowerMode) -> Payload {
    let mut payload = build_base_payload();
    payload.insert("ps".into(), Value::String(power.code().to_string()));
    payload
}

pub fn build_temperature_payload(temperature: f32) -> Payload {
    let mut payload = build_base_payload();
    payload.insert("actmp".into(), Value::String(format_temperature(temperature)));
    payload
}

pub fn build_hvac_mode_payload(mode: HvacMode) -> Payload {
    let mut payload = build_base_payload();
    payload.insert("acmd".into(), Value::String(mode.code().to_string()));
    payload
}

pub fn build_fan_mode_payload(mode: FanMode) -> Payload {
    let mut payload = build_base_payload();
    payload.insert("acfs".into(), Value::String(mode.code().to_string()));
    payload
}

pub fn build_preset_mode_payload(mode: PresetMode) -> Payload {
    let mut payload = build_base_payload();
    let (eco, powerful) = match mode {
        PresetMode::None => ("off", "off"),
        PresetMode::Eco => ("on", "off"),
        PresetMode::Boost => ("off", "on"),
    };
    payload.insert("acem".into(), json!(eco));
    payload.insert("acpm".into(), json!(powerful));
    if mode == PresetMode::Eco {
        payload.insert("actmp".into(), json!(ECO_TEMPERATURE));
    }
    payload
}

/// Swing codes travel as numbers, unlike the other mode codes.
pub fn build_swing_mode_payload(mode: SwingMode) -> Payload {
    let mut payload = build_base_payload();
    payload.insert("acvs".into(), json!(mode.code()));
    payload
}

pub fn build_payload(command: &Command) -> Payload {
    match *command {
        Command::Power(mode) => build_power_payload(mode),
        Command::Temperature(value) => build_temperature_payload(value),
        Command::HvacMode(mode) => build_hvac_mode_payload(mode),
        Command::FanMode(mode) => build_fan_mode_payload(mode),
        Command::PresetMode(mode) => build_preset_mode_payload(mode),
        Command::SwingMode(mode) => build_swing_mode_payload(mode),
    }
}

// Whole degrees keep one decimal place ("24.0"); anything else uses the shortest float text.
fn format_temperature(temperature: f32) -> String {
    if temperature.is_finite() && temperature.fract() == 0.0 {
        format!("{:.1}", temperature)
    } else {
        temperature.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_commands() -> Vec<Command> {
        vec![
            Command::Power(PowerMode::On),
            Command::Power(PowerMode::Off),
            Command::Temperature(24.0),
            Command::HvacMode(HvacMode::Cool),
            Command::FanMode(FanMode::High),
            Command::PresetMode(PresetMode::None),
            Command::PresetMode(PresetMode::Eco),
            Command::PresetMode(PresetMode::Boost),
            Command::SwingMode(SwingMode::Two),
        ]
    }

    #[test]
    fn test_every_payload_carries_the_envelope_first() {
        for command in all_commands() {
            let payload = build_payload(&command);
            assert_eq!(payload.get("ki"), Some(&json!(1)), "{:?}", command);
            assert_eq!(payload.get("cnt"), Some(&json!("an")), "{:?}", command);
            assert_eq!(payload.get("sid"), Some(&json!("1")), "{:?}", command);
            let leading: Vec<&str> = payload.keys().take(3).map(String::as_str).collect();
            assert_eq!(leading, ["ki", "cnt", "sid"]);
        }
    }

    #[test]
    fn test_power_on_serializes_exactly() {
        let payload = build_power_payload(PowerMode::On);
        assert_eq!(
            serde_json::to_string(&payload).unwrap(),
            r#"{"ki":1,"cnt":"an","sid":"1","ps":"1"}"#
        );
    }

    #[test]
    fn test_temperature_is_sent_as_text() {
        assert_eq!(build_temperature_payload(24.0)["actmp"], json!("24.0"));
        assert_eq!(build_temperature_payload(22.5)["actmp"], json!("22.5"));
    }

    #[test]
    fn test_mode_codes_are_stringified() {
        assert_eq!(build_hvac_mode_payload(HvacMode::Dry)["acmd"], json!("dry"));
        assert_eq!(build_fan_mode_payload(FanMode::Low)["acfs"], json!("low"));
    }

    #[test]
    fn test_swing_code_stays_numeric() {
        assert_eq!(build_swing_mode_payload(SwingMode::Four)["acvs"], json!(4));
    }

    #[test]
    fn test_preset_none() {
        let payload = build_preset_mode_payload(PresetMode::None);
        assert_eq!(payload["acem"], json!("off"));
        assert_eq!(payload["acpm"], json!("off"));
        assert!(!payload.contains_key("actmp"));
        assert_eq!(payload.len(), 5);
    }

    #[test]
    fn test_preset_eco_sets_temperature() {
        let payload = build_preset_mode_payload(PresetMode::Eco);
        assert_eq!(payload["acem"], json!("on"));
        assert_eq!(payload["acpm"], json!("off"));
        assert_eq!(payload["actmp"], json!(26.0));
        assert_eq!(payload.len(), 6);
    }

    #[test]
    fn test_preset_boost() {
        let payload = build_preset_mode_payload(PresetMode::Boost);
        assert_eq!(payload["acem"], json!("off"));
        assert_eq!(payload["acpm"], json!("on"));
        assert!(!payload.contains_key("actmp"));
        assert_eq!(payload.len(), 5);
    }
}
