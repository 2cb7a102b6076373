//! Infrastructure Module
//!
//! Everything that touches the outside world: the wire codec, the link
//! sessions (direct BLE and remote daemon transports), and logging setup.
//!
//! ## Modules
//!
//! - [`codec`] - control frames, state frames, and JSON envelopes
//! - [`ble`] - GATT capability trait, per-bulb sessions, scan utility
//! - [`net`] - shared WebSocket / Redis pub/sub transports
//! - [`logging`] - tracing initialization

pub mod ble;
pub mod codec;
pub mod logging;
pub mod net;
