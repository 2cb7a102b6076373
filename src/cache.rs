//! State Cache
//!
//! One latest-value slot per device, with replay-latest-then-live
//! subscriptions: a new subscriber is handed the current snapshot
//! immediately, then every subsequent update, so nothing is missed between
//! snapshot and subscription.
//!
//! Writes follow single-writer discipline: only the link session that owns a
//! device calls [`StateCache::set`] for it. Subscribers are invoked
//! synchronously in the writer's context.

use crate::domain::state::{DeviceState, RawState};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use tracing::debug;

/// Callback invoked with every validated state that arrives for a device.
pub type StateHandler = Arc<dyn Fn(&DeviceState) + Send + Sync>;

struct Slot {
    current: Mutex<DeviceState>,
    subscribers: Mutex<Vec<StateHandler>>,
}

impl Slot {
    fn new() -> Self {
        Self {
            current: Mutex::new(DeviceState::default()),
            subscribers: Mutex::new(Vec::new()),
        }
    }
}

/// Latest-value store for every registered device.
#[derive(Default)]
pub struct StateCache {
    slots: RwLock<HashMap<String, Arc<Slot>>>,
}

impl StateCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, device_id: &str) -> Arc<Slot> {
        if let Some(slot) = self.slots.read().unwrap().get(device_id) {
            return Arc::clone(slot);
        }
        let mut slots = self.slots.write().unwrap();
        Arc::clone(
            slots
                .entry(device_id.to_string())
                .or_insert_with(|| Arc::new(Slot::new())),
        )
    }

    /// Current snapshot for a device. Never blocks on I/O and always
    /// succeeds; an unobserved device yields the documented defaults.
    pub fn get(&self, device_id: &str) -> DeviceState {
        match self.slots.read().unwrap().get(device_id) {
            Some(slot) => slot.current.lock().unwrap().clone(),
            None => DeviceState::default(),
        }
    }

    /// Validate and store an inbound state, then publish it synchronously to
    /// every subscriber for the device.
    pub fn set(&self, device_id: &str, candidate: RawState) {
        let state = DeviceState::from_raw(candidate);
        debug!(device = %device_id, ?state, "state updated");

        let slot = self.slot(device_id);
        *slot.current.lock().unwrap() = state.clone();

        let subscribers: Vec<StateHandler> = slot.subscribers.lock().unwrap().clone();
        for handler in subscribers {
            handler(&state);
        }
    }

    /// Register a subscriber for a device. The handler is invoked once with
    /// the current cached value before this call returns, then again for
    /// every later update.
    pub fn subscribe(&self, device_id: &str, handler: StateHandler) {
        let slot = self.slot(device_id);
        let snapshot = {
            let mut subscribers = slot.subscribers.lock().unwrap();
            subscribers.push(Arc::clone(&handler));
            slot.current.lock().unwrap().clone()
        };
        handler(&snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn unknown_device_yields_defaults() {
        let cache = StateCache::new();
        assert_eq!(cache.get("nope"), DeviceState::default());
    }

    #[test]
    fn set_validates_before_storing() {
        let cache = StateCache::new();
        cache.set(
            "dev",
            RawState {
                on: Some(true),
                brightness: Some(400),
                color: Some(vec![1, 2, 3]),
                ..Default::default()
            },
        );

        let state = cache.get("dev");
        assert!(state.on);
        assert_eq!(state.brightness, 0, "out-of-range brightness falls back");
        assert_eq!(state.color, [2, 7, 8, 0], "short color tuple falls back");
    }

    #[test]
    fn subscribe_replays_latest_value() {
        let cache = StateCache::new();
        cache.set(
            "dev",
            RawState {
                brightness: Some(55),
                ..Default::default()
            },
        );

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        cache.subscribe(
            "dev",
            Arc::new(move |state: &DeviceState| {
                sink.lock().unwrap().push(state.brightness);
            }),
        );

        // Replay happens even though no notification ever arrives afterwards.
        assert_eq!(*seen.lock().unwrap(), vec![55]);
    }

    #[test]
    fn subscribers_see_every_update_in_order() {
        let cache = StateCache::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        cache.subscribe(
            "dev",
            Arc::new(move |state: &DeviceState| {
                sink.lock().unwrap().push(state.brightness);
            }),
        );

        for b in [10i64, 20, 30] {
            cache.set(
                "dev",
                RawState {
                    brightness: Some(b),
                    ..Default::default()
                },
            );
        }

        assert_eq!(*seen.lock().unwrap(), vec![0, 10, 20, 30]);
    }

    #[test]
    fn updates_do_not_cross_devices() {
        let cache = StateCache::new();
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        cache.subscribe(
            "a",
            Arc::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        cache.set("b", RawState::default());
        // Only the replay delivery for "a".
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
