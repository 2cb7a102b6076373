//! Throttle Gate
//!
//! Coalesces bursts of identical commands: the first call for a key inside
//! the window goes through, later calls with the same key are dropped until
//! the window elapses. Dropped calls are not queued or replayed.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::debug;

/// Expired entries are swept once the table grows past this many keys, which
/// keeps the steady-state size bounded without a background timer.
const SWEEP_THRESHOLD: usize = 256;

pub struct ThrottleGate {
    window: Duration,
    last_invocation: Mutex<HashMap<String, Instant>>,
}

impl ThrottleGate {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_invocation: Mutex::new(HashMap::new()),
        }
    }

    /// Whether a call for `key` may execute now. Admitting records the
    /// timestamp; denial leaves the recorded timestamp untouched.
    pub fn admit(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut table = self.last_invocation.lock().unwrap();

        if table.len() > SWEEP_THRESHOLD {
            let window = self.window;
            table.retain(|_, last| now.duration_since(*last) < window);
        }

        if let Some(last) = table.get(key) {
            if now.duration_since(*last) < self.window {
                debug!(%key, "throttled");
                return false;
            }
        }
        table.insert(key.to_string(), now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_call_is_admitted_duplicates_are_dropped() {
        let gate = ThrottleGate::new(Duration::from_millis(200));
        assert!(gate.admit("on-true"));
        assert!(!gate.admit("on-true"));
        assert!(!gate.admit("on-true"));
    }

    #[test]
    fn distinct_keys_do_not_interfere() {
        let gate = ThrottleGate::new(Duration::from_millis(200));
        assert!(gate.admit("on-true"));
        assert!(gate.admit("on-false"));
        assert!(gate.admit("brightness-42"));
    }

    #[test]
    fn key_is_admitted_again_after_the_window() {
        let gate = ThrottleGate::new(Duration::from_millis(30));
        assert!(gate.admit("on-true"));
        assert!(!gate.admit("on-true"));
        std::thread::sleep(Duration::from_millis(40));
        assert!(gate.admit("on-true"));
    }

    #[test]
    fn expired_entries_are_swept() {
        let gate = ThrottleGate::new(Duration::from_millis(100));
        for i in 0..300 {
            assert!(gate.admit(&format!("key-{i}")));
        }
        std::thread::sleep(Duration::from_millis(150));
        // Everything is expired; the next admit past the threshold sweeps.
        assert!(gate.admit("fresh"));
        assert!(gate.last_invocation.lock().unwrap().len() <= 2);
    }
}
