//! Remote Transport Sessions
//!
//! One shared connection to an external daemon multiplexes every bulb,
//! tagged by device uuid in the JSON envelope. Two strategies implement
//! [`RemoteTransport`]: a persistent WebSocket ([`ws`]) and Redis pub/sub
//! channels ([`pubsub`]). Both retry forever with the same capped
//! exponential backoff.

pub mod pubsub;
pub mod ws;

use crate::cache::StateCache;
use crate::infrastructure::codec;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, error};

/// Upper bound on the reconnect backoff, in seconds.
pub const MAX_DELAY_SECS: u64 = 30;

/// Shared daemon connection used by the dispatcher for every device.
#[async_trait]
pub trait RemoteTransport: Send + Sync {
    /// Queue one outbound envelope. Fire-and-forget: delivery failures are
    /// logged, never returned.
    async fn publish(&self, payload: String);

    /// Tear down the background connection tasks.
    fn shutdown(&self);
}

/// Backoff before reconnect attempt number `attempt` (zero-based):
/// `min(2^attempt, 30)` seconds.
pub fn reconnect_delay(attempt: u32) -> Duration {
    Duration::from_secs(2u64.saturating_pow(attempt).min(MAX_DELAY_SECS))
}

/// Reconnect delay progression shared by both transport loops. Doubles on
/// every failed cycle; `reset` is called after a successful open so the
/// next drop starts over at one second.
#[derive(Debug, Default)]
pub struct Backoff {
    attempt: u32,
}

impl Backoff {
    /// Delay to wait before the next attempt; advances the progression.
    pub fn next_delay(&mut self) -> Duration {
        let delay = reconnect_delay(self.attempt);
        self.attempt = self.attempt.saturating_add(1);
        delay
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

/// Decode an inbound envelope and apply its state to the cache. Malformed
/// or incomplete messages are logged and dropped; the cache is untouched.
pub(crate) fn handle_inbound(text: &str, cache: &StateCache) {
    match codec::decode_envelope(text) {
        Ok(message) => match message.state {
            Some(state) if !message.uuid.is_empty() => {
                debug!(device = %message.uuid, "received state");
                cache.set(&message.uuid, state);
            }
            _ => debug!("envelope without uuid/state, ignored"),
        },
        Err(e) => error!(error = %e, "error processing message"),
    }
}
