//! Link Registry and Command Dispatcher
//!
//! [`LightBridge`] is the entry point accessory handlers talk to: submit a
//! command (fire-and-forget), read the cached state, register a callback for
//! state changes. It wires the throttle gate and codec in front of the link
//! strategy chosen at construction - per-device BLE sessions, or one shared
//! remote transport multiplexing every bulb by uuid.

use crate::cache::{StateCache, StateHandler};
use crate::domain::state::{Command, CommandPayload, CommandType, DeviceState};
use crate::infrastructure::ble::session::BleSession;
use crate::infrastructure::ble::{BleLinkConfig, GattLink};
use crate::infrastructure::codec;
use crate::infrastructure::net::RemoteTransport;
use crate::throttle::ThrottleGate;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, error, warn};

enum LinkStrategy {
    /// One session per bulb, created when the device is registered.
    Ble {
        sessions: RwLock<HashMap<String, Arc<BleSession>>>,
        config: BleLinkConfig,
    },
    /// One shared transport for every bulb.
    Remote(Arc<dyn RemoteTransport>),
}

pub struct LightBridge {
    cache: Arc<StateCache>,
    throttle: ThrottleGate,
    link: LinkStrategy,
    handlers: Arc<RwLock<HashMap<String, StateHandler>>>,
}

impl LightBridge {
    /// Bridge running direct BLE sessions. Devices are attached afterwards
    /// with [`add_ble_device`](Self::add_ble_device).
    pub fn with_ble(
        cache: Arc<StateCache>,
        throttle_window: Duration,
        config: BleLinkConfig,
    ) -> Self {
        Self {
            cache,
            throttle: ThrottleGate::new(throttle_window),
            link: LinkStrategy::Ble {
                sessions: RwLock::new(HashMap::new()),
                config,
            },
            handlers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Bridge running against a shared remote transport.
    pub fn with_remote(
        cache: Arc<StateCache>,
        throttle_window: Duration,
        transport: Arc<dyn RemoteTransport>,
    ) -> Self {
        Self {
            cache,
            throttle: ThrottleGate::new(throttle_window),
            link: LinkStrategy::Remote(transport),
            handlers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn cache(&self) -> &Arc<StateCache> {
        &self.cache
    }

    /// Attach a bulb to the BLE strategy and bring its session up. The
    /// initial connect is bounded; a device that stays unreachable is
    /// retried when its first command arrives.
    pub async fn add_ble_device(&self, device_id: &str, link: Arc<dyn GattLink>) {
        let LinkStrategy::Ble { sessions, config } = &self.link else {
            warn!(device = %device_id, "BLE device registered on a remote-transport bridge, ignored");
            return;
        };

        let session = Arc::new(BleSession::new(
            device_id,
            link,
            Arc::clone(&self.cache),
            config.clone(),
        ));
        session.start().await;
        sessions
            .write()
            .unwrap()
            .insert(device_id.to_string(), session);
    }

    /// Latest validated state for a device; defaults if never observed.
    pub fn get_cached_state(&self, device_id: &str) -> DeviceState {
        self.cache.get(device_id)
    }

    /// Register the state-changed callback for a device. Idempotent: the
    /// last registration wins; the new handler is immediately handed the
    /// current cached value.
    pub fn register_state_handler(&self, device_id: &str, handler: StateHandler) {
        let replaced = self
            .handlers
            .write()
            .unwrap()
            .insert(device_id.to_string(), Arc::clone(&handler))
            .is_some();

        if replaced {
            debug!(device = %device_id, "state handler replaced");
            // Already forwarding from the cache; replay the snapshot to the
            // new handler directly.
            handler(&self.cache.get(device_id));
            return;
        }

        // First registration: forward cache updates through the registry so
        // a later re-registration takes over without resubscribing.
        let handlers = Arc::clone(&self.handlers);
        let device = device_id.to_string();
        self.cache.subscribe(
            device_id,
            Arc::new(move |state| {
                let handler = handlers.read().unwrap().get(&device).cloned();
                if let Some(handler) = handler {
                    handler(state);
                }
            }),
        );
    }

    /// Validate, throttle, encode, and forward a command. Fire-and-forget:
    /// a dropped or abandoned command is only visible in the logs.
    pub async fn send_command(
        &self,
        device_id: &str,
        kind: CommandType,
        payload: Option<CommandPayload>,
    ) {
        let command = Command::new(kind, payload);
        if !self.throttle.admit(&throttle_key(device_id, &command)) {
            return;
        }

        debug!(
            device = %device_id,
            command = kind.as_str(),
            payload = ?command.payload,
            "dispatching command"
        );

        match &self.link {
            LinkStrategy::Ble { sessions, .. } => {
                let session = sessions.read().unwrap().get(device_id).cloned();
                match session {
                    Some(session) => session.send(&command).await,
                    None => warn!(device = %device_id, "no session for device, command dropped"),
                }
            }
            LinkStrategy::Remote(transport) => match codec::encode_envelope(device_id, &command)
            {
                Ok(json) => transport.publish(json).await,
                Err(e) => error!(device = %device_id, error = %e, "failed to encode envelope"),
            },
        }
    }

    /// Blink the bulb so it can be picked out physically. Only the direct
    /// BLE protocol has a flicker opcode.
    pub async fn identify(&self, device_id: &str) {
        match &self.link {
            LinkStrategy::Ble { sessions, .. } => {
                let session = sessions.read().unwrap().get(device_id).cloned();
                if let Some(session) = session {
                    session.write_frame(codec::flicker_frame(), "flicker").await;
                }
            }
            LinkStrategy::Remote(_) => {
                debug!(device = %device_id, "identify not supported over remote transport");
            }
        }
    }

    /// Tear down every session. BLE sessions run their ordered cleanup;
    /// remote transports cancel their background tasks.
    pub async fn shutdown(&self) {
        match &self.link {
            LinkStrategy::Ble { sessions, .. } => {
                let all: Vec<_> = sessions.read().unwrap().values().cloned().collect();
                for session in all {
                    session.shutdown().await;
                }
            }
            LinkStrategy::Remote(transport) => transport.shutdown(),
        }
    }
}

/// Throttle key: device + operation + serialized arguments. Two bulbs never
/// throttle each other.
fn throttle_key(device_id: &str, command: &Command) -> String {
    let payload = command
        .payload
        .as_ref()
        .and_then(|p| serde_json::to_string(p).ok())
        .unwrap_or_default();
    format!("{device_id}-{}-{payload}", command.kind.as_str())
}
