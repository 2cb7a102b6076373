//! Wire Protocol Codec
//!
//! Pure, stateless translation between [`Command`]s and the two wire shapes:
//! 3-byte GATT control frames for the direct BLE link, and JSON envelopes for
//! the remote daemon transports. Also decodes the 8-byte state notification
//! frames pushed by the bulb firmware.

use crate::domain::state::{Command, CommandPayload, CommandType, Message, RawState};
use crate::error::DecodeError;
use tracing::{debug, trace};

/// Bulb control GATT service UUID.
pub const SERVICE_UUID: &str = "0000fe87-0000-1000-8000-00805f9b34fb";

/// Control characteristic UUID - where command frames are written.
pub const CONTROL_CHAR_UUID: &str = "aa7d3f34-2d4f-41e0-807f-52fbf8cf7443";

/// Notify characteristic UUID - where state frames arrive.
pub const NOTIFY_CHAR_UUID: &str = "8f65073d-9f57-4aaa-afea-397d19d5bbeb";

/// Fixed control-point address leading every outbound frame, independent of
/// the command.
pub const CONTROL_HANDLE: u8 = 0x43;

/// Handle byte marking an unsolicited state push in inbound frames.
/// Informational only - parsing does not depend on it.
pub const STATE_HANDLE: u8 = 0x45;

/// Firmware opcodes carried in the second byte of a control frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    On,
    Brightness,
    State,
    Flicker,
}

impl Opcode {
    pub fn byte(&self) -> u8 {
        match self {
            Self::On => 0x40,
            Self::Brightness => 0x42,
            Self::State => 0x44,
            Self::Flicker => 0x67,
        }
    }
}

/// Encode a command as a `[handle, opcode, value]` control frame.
///
/// Returns `None` for commands the binary protocol cannot express
/// (color is only settable through the remote daemon); the caller logs and
/// drops those. Never fails for well-typed input.
pub fn encode_frame(command: &Command) -> Option<[u8; 3]> {
    let (opcode, value) = match command.kind {
        CommandType::SetOn => (Opcode::On, if payload_truthy(command) { 1 } else { 2 }),
        CommandType::SetBrightness => (Opcode::Brightness, payload_byte(command)),
        CommandType::GetState => (Opcode::State, 0),
        CommandType::SetColor => return None,
    };
    Some([CONTROL_HANDLE, opcode.byte(), value])
}

/// The identify blink frame. Not reachable through the accessory command set;
/// sent directly by the bridge's identify path.
pub fn flicker_frame() -> [u8; 3] {
    [CONTROL_HANDLE, Opcode::Flicker.byte(), 2]
}

fn payload_truthy(command: &Command) -> bool {
    match command.payload {
        Some(CommandPayload::Bool(b)) => b,
        Some(CommandPayload::Number(n)) => n != 0,
        _ => false,
    }
}

fn payload_byte(command: &Command) -> u8 {
    match command.payload {
        Some(CommandPayload::Number(n)) => n.clamp(0, 255) as u8,
        _ => 0,
    }
}

/// Decode an inbound notification frame.
///
/// # Frame layout (8 bytes)
///
/// ```text
/// [0] : unused
/// [1] : state handle (0x45 marks an unsolicited push)
/// [2] : on (1 = on)
/// [3] : brightness (raw, validated by the cache)
/// [4] : r
/// [5] : g
/// [6] : b
/// [7] : white
/// ```
pub fn decode_state_frame(bytes: &[u8]) -> Result<RawState, DecodeError> {
    if bytes.len() < 8 {
        return Err(DecodeError::Truncated(bytes.len()));
    }

    trace!("state frame: {:02X?}", bytes);
    if bytes[1] == STATE_HANDLE {
        debug!("got state notification");
    }

    Ok(RawState {
        on: Some(bytes[2] == 1),
        brightness: Some(i64::from(bytes[3])),
        color: Some(vec![
            i64::from(bytes[4]),
            i64::from(bytes[5]),
            i64::from(bytes[6]),
            i64::from(bytes[7]),
        ]),
        ct: None,
        mode: None,
    })
}

/// Encode an outbound envelope: `{ "uuid": ..., "command": ... }`.
pub fn encode_envelope(uuid: &str, command: &Command) -> Result<String, serde_json::Error> {
    serde_json::to_string(&Message {
        uuid: uuid.to_string(),
        command: Some(command.clone()),
        state: None,
    })
}

/// Decode an inbound envelope. Callers drop messages without a `uuid`+`state`
/// pair; a parse failure here is never fatal.
pub fn decode_envelope(text: &str) -> Result<Message, DecodeError> {
    Ok(serde_json::from_str(text)?)
}
