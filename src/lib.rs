//! lightlink
//!
//! Device link synchronization engine for BLE light bulbs: turns an
//! intermittent, low-level transport (a GATT link, or a socket to an
//! external daemon) into a reliable, throttled, multiplexed command/state
//! channel for accessory handlers.
//!
//! Accessory handler -> [`LightBridge`] -> throttle -> codec -> link
//! session -> wire; inbound frames flow back through the codec into the
//! [`StateCache`], which fans validated state out to registered handlers.
//!
//! ```rust,ignore
//! use lightlink::{LightBridge, StateCache, CommandPayload, CommandType};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let cache = Arc::new(StateCache::new());
//! let transport = lightlink::infrastructure::net::ws::WsTransport::spawn(
//!     &settings.websocket,
//!     Arc::clone(&cache),
//! )?;
//! let bridge = LightBridge::with_remote(cache, Duration::from_millis(200), transport);
//!
//! bridge.register_state_handler("F8:24:41:00:11:22", Arc::new(|state| {
//!     println!("brightness is now {}", state.brightness);
//! }));
//! bridge
//!     .send_command("F8:24:41:00:11:22", CommandType::SetOn, Some(CommandPayload::Bool(true)))
//!     .await;
//! ```

pub mod bridge;
pub mod cache;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod throttle;

pub use bridge::LightBridge;
pub use cache::{StateCache, StateHandler};
pub use domain::settings::{Settings, SettingsService, TransportKind};
pub use domain::state::{Command, CommandPayload, CommandType, DeviceState, Mode, RawState};
pub use error::{DecodeError, LinkError};
pub use infrastructure::ble::{BleLinkConfig, GattLink};
pub use throttle::ThrottleGate;
