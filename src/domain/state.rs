//! Light state and command model.
//!
//! `DeviceState` is the validated, cached representation of a bulb.
//! `RawState` is its lenient wire-side mirror: every field optional, wide
//! integer types, so missing or out-of-range input degrades to defaults
//! instead of failing validation.

use serde::{Deserialize, Serialize};

/// Default color tuple `(r, g, b, white)` reported by the firmware at boot.
pub const DEFAULT_COLOR: [u8; 4] = [2, 7, 8, 0];

/// Bulb operating mode. The daemon reports either a numeric mode id or a
/// named mode string, so both are accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Mode {
    Number(i64),
    Text(String),
}

impl Default for Mode {
    fn default() -> Self {
        Mode::Number(0)
    }
}

/// Last known, validated state of a single bulb.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceState {
    pub on: bool,
    /// Percent, always within `0..=100`.
    pub brightness: u8,
    /// `(r, g, b, white)`.
    pub color: [u8; 4],
    /// Color temperature.
    pub ct: u16,
    pub mode: Mode,
}

impl Default for DeviceState {
    fn default() -> Self {
        Self {
            on: false,
            brightness: 0,
            color: DEFAULT_COLOR,
            ct: 0,
            mode: Mode::default(),
        }
    }
}

impl DeviceState {
    /// Validate a wire-side state. Out-of-range or missing fields fall back
    /// to their defaults; in-range values pass through exactly.
    pub fn from_raw(raw: RawState) -> Self {
        let defaults = DeviceState::default();

        let brightness = match raw.brightness {
            Some(b) if (0..=100).contains(&b) => b as u8,
            _ => defaults.brightness,
        };

        let color = raw
            .color
            .as_deref()
            .and_then(valid_color)
            .unwrap_or(defaults.color);

        let ct = match raw.ct {
            Some(ct) if (0..=i64::from(u16::MAX)).contains(&ct) => ct as u16,
            _ => defaults.ct,
        };

        Self {
            on: raw.on.unwrap_or(defaults.on),
            brightness,
            color,
            ct,
            mode: raw.mode.unwrap_or(defaults.mode),
        }
    }
}

/// A color is only accepted as a 4-element sequence of byte-range numbers.
fn valid_color(values: &[i64]) -> Option<[u8; 4]> {
    if values.len() != 4 {
        return None;
    }
    let mut color = [0u8; 4];
    for (slot, value) in color.iter_mut().zip(values) {
        *slot = u8::try_from(*value).ok()?;
    }
    Some(color)
}

/// Unvalidated state as it appears on the wire (JSON envelope or a decoded
/// notification frame).
///
/// Lenient in presence, not in type: a missing field is `None` and falls
/// back during validation, but a wrong-typed field fails deserialization of
/// the whole envelope, which the transports then drop as unparseable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawState {
    #[serde(default)]
    pub on: Option<bool>,
    #[serde(default)]
    pub brightness: Option<i64>,
    #[serde(default)]
    pub color: Option<Vec<i64>>,
    #[serde(default)]
    pub ct: Option<i64>,
    #[serde(default)]
    pub mode: Option<Mode>,
}

/// Logical operation requested by an accessory handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandType {
    #[serde(rename = "on")]
    SetOn,
    #[serde(rename = "brightness")]
    SetBrightness,
    #[serde(rename = "color")]
    SetColor,
    #[serde(rename = "state")]
    GetState,
}

impl CommandType {
    /// Wire name, also used as the throttle key component.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SetOn => "on",
            Self::SetBrightness => "brightness",
            Self::SetColor => "color",
            Self::GetState => "state",
        }
    }
}

/// Argument carried by a command, constrained by the command type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommandPayload {
    Bool(bool),
    Number(i64),
    Numbers(Vec<i64>),
    Text(String),
}

/// One command, constructed per call, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    #[serde(rename = "type")]
    pub kind: CommandType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<CommandPayload>,
}

impl Command {
    pub fn new(kind: CommandType, payload: Option<CommandPayload>) -> Self {
        Self { kind, payload }
    }
}

/// JSON envelope multiplexing all bulbs over one remote transport.
/// Outbound messages carry `command`, inbound messages carry `state`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub uuid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<Command>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<RawState>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn brightness_in_range_passes_through() {
        for b in [0i64, 1, 42, 100] {
            let state = DeviceState::from_raw(RawState {
                brightness: Some(b),
                ..Default::default()
            });
            assert_eq!(state.brightness, b as u8);
        }
    }

    #[test]
    fn brightness_out_of_range_falls_back() {
        for b in [-1i64, 101, 255, i64::MAX, i64::MIN] {
            let state = DeviceState::from_raw(RawState {
                brightness: Some(b),
                ..Default::default()
            });
            assert_eq!(state.brightness, 0, "brightness {b} should fall back");
        }
    }

    #[test]
    fn missing_brightness_falls_back() {
        let state = DeviceState::from_raw(RawState::default());
        assert_eq!(state.brightness, 0);
    }

    #[test]
    fn valid_color_passes_through() {
        let state = DeviceState::from_raw(RawState {
            color: Some(vec![255, 0, 128, 1]),
            ..Default::default()
        });
        assert_eq!(state.color, [255, 0, 128, 1]);
    }

    #[test]
    fn malformed_color_falls_back() {
        let cases: Vec<Option<Vec<i64>>> = vec![
            None,
            Some(vec![]),
            Some(vec![1, 2, 3]),
            Some(vec![1, 2, 3, 4, 5]),
            Some(vec![1, 2, 3, 256]),
            Some(vec![-1, 2, 3, 4]),
        ];
        for color in cases {
            let state = DeviceState::from_raw(RawState {
                color: color.clone(),
                ..Default::default()
            });
            assert_eq!(state.color, DEFAULT_COLOR, "color {color:?} should fall back");
        }
    }

    #[test]
    fn mode_accepts_number_or_string() {
        let numeric: RawState = serde_json::from_str(r#"{"mode": 3}"#).unwrap();
        assert_eq!(numeric.mode, Some(Mode::Number(3)));

        let named: RawState = serde_json::from_str(r#"{"mode": "flow"}"#).unwrap();
        assert_eq!(named.mode, Some(Mode::Text("flow".to_string())));
    }

    #[test]
    fn default_state_matches_documented_values() {
        let state = DeviceState::default();
        assert!(!state.on);
        assert_eq!(state.brightness, 0);
        assert_eq!(state.color, [2, 7, 8, 0]);
        assert_eq!(state.ct, 0);
        assert_eq!(state.mode, Mode::Number(0));
    }

    #[test]
    fn command_type_wire_names() {
        assert_eq!(
            serde_json::to_string(&CommandType::SetBrightness).unwrap(),
            r#""brightness""#
        );
        assert_eq!(serde_json::to_string(&CommandType::GetState).unwrap(), r#""state""#);
    }
}
