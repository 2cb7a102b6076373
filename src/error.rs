//! Error taxonomy for the link engine.
//!
//! All of these are recovered or logged inside the core; none of them
//! propagate to accessory handlers (command submission is fire-and-forget).

use thiserror::Error;

/// Failures on a link session or transport.
#[derive(Error, Debug)]
pub enum LinkError {
    /// Connect or write failed because the link is down. Recovered locally
    /// by the session's retry policy.
    #[error("transport unavailable: {0}")]
    Transport(String),

    /// A BLE command was abandoned after exhausting both its write budget
    /// and the bounded reconnect attempts.
    #[error("retry budget exhausted for device {device}")]
    RetryExhausted { device: String },
}

/// Malformed inbound payload. Always non-fatal: the message is logged and
/// dropped, the state cache is left untouched.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("state frame too short: {0} bytes")]
    Truncated(usize),

    #[error("invalid envelope: {0}")]
    Json(#[from] serde_json::Error),
}
