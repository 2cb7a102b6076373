//! Direct BLE Link
//!
//! The core never talks to a BLE stack directly. [`GattLink`] is the
//! capability set it needs from one: connect to a device by address, write
//! the control characteristic, subscribe to the notify characteristic.
//! Embedders supply an implementation; [`session::BleSession`] owns its
//! lifecycle.
//!
//! ## Modules
//!
//! - [`session`] - connection lifecycle, retry policy, notification pump
//! - [`scanner`] - shell-exec discovery utility (not used by the core)

pub mod scanner;
pub mod session;

use crate::domain::settings::BleSettings;
use crate::error::LinkError;
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;

/// Capability set required from a BLE backend for one bulb.
///
/// `connect` must acquire a fresh GATT handle on every call: a handle that
/// saw a fatal disconnect is never reused.
#[async_trait]
pub trait GattLink: Send + Sync {
    async fn connect(&self) -> Result<(), LinkError>;

    async fn disconnect(&self) -> Result<(), LinkError>;

    fn is_connected(&self) -> bool;

    /// Write one 3-byte frame to the control characteristic.
    async fn write_control(&self, frame: [u8; 3]) -> Result<(), LinkError>;

    /// Subscribe to the notify characteristic. Raw frames are delivered on
    /// the returned channel until the link drops or notifications stop.
    async fn start_notifications(&self) -> Result<mpsc::UnboundedReceiver<Vec<u8>>, LinkError>;

    async fn stop_notifications(&self) -> Result<(), LinkError>;
}

/// Retry policy knobs for one BLE session.
#[derive(Debug, Clone)]
pub struct BleLinkConfig {
    /// Connect attempts per reconnect cycle.
    pub connect_retries: u32,
    /// Fixed delay between connect attempts.
    pub connect_delay: Duration,
    /// Write attempts per command before it is abandoned.
    pub write_retries: u32,
    /// Poll interval while waiting out a reconnect another command started.
    pub reconnect_poll: Duration,
}

impl Default for BleLinkConfig {
    fn default() -> Self {
        Self {
            connect_retries: 10,
            connect_delay: Duration::from_millis(100),
            write_retries: 2,
            reconnect_poll: Duration::from_millis(50),
        }
    }
}

impl From<&BleSettings> for BleLinkConfig {
    fn from(settings: &BleSettings) -> Self {
        Self {
            connect_retries: settings.connect_retries,
            connect_delay: Duration::from_millis(settings.connect_delay_ms),
            write_retries: settings.write_retries,
            ..Self::default()
        }
    }
}
