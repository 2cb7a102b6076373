//! Direct BLE Session
//!
//! Owns one bulb's GATT link: bounded connect retry with a fixed short
//! delay, a per-command write budget, and the notification pump that feeds
//! decoded state frames into the cache.
//!
//! Failures never surface to the accessory layer. A command either reaches
//! the wire or is logged and dropped once its retry budget runs out -
//! responsiveness of the accessory framework wins over delivery guarantees.

use crate::cache::StateCache;
use crate::domain::state::Command;
use crate::error::LinkError;
use crate::infrastructure::ble::{BleLinkConfig, GattLink};
use crate::infrastructure::codec;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

pub struct BleSession {
    device_id: String,
    link: Arc<dyn GattLink>,
    cache: Arc<StateCache>,
    config: BleLinkConfig,
    /// Set while a reconnect cycle is underway so that concurrent commands
    /// wait it out instead of racing to connect a second time.
    reconnecting: AtomicBool,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl BleSession {
    pub fn new(
        device_id: impl Into<String>,
        link: Arc<dyn GattLink>,
        cache: Arc<StateCache>,
        config: BleLinkConfig,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            link,
            cache,
            config,
            reconnecting: AtomicBool::new(false),
            pump: Mutex::new(None),
        }
    }

    /// Initial connect and notification subscription. Giving up here is not
    /// fatal: the next command triggers a fresh reconnect cycle.
    pub async fn start(&self) {
        if self.connect_with_retry().await {
            self.arm_notifications().await;
        }
    }

    /// Bounded connect loop. Returns whether the link came up. No background
    /// retry continues after this returns false.
    async fn connect_with_retry(&self) -> bool {
        for attempt in 1..=self.config.connect_retries {
            debug!(device = %self.device_id, attempt, "connect attempt");
            match self.link.connect().await {
                Ok(()) => {
                    info!(device = %self.device_id, "connected");
                    return true;
                }
                Err(e) => {
                    debug!(device = %self.device_id, error = %e, "failed to connect");
                    sleep(self.config.connect_delay).await;
                }
            }
        }
        error!(
            device = %self.device_id,
            retries = self.config.connect_retries,
            "failed to connect, giving up until the next command"
        );
        false
    }

    /// Subscribe to the notify characteristic and (re)start the pump that
    /// feeds decoded frames into the cache. Called after every successful
    /// connect - the subscription does not survive a link drop.
    async fn arm_notifications(&self) {
        let rx = match self.link.start_notifications().await {
            Ok(rx) => rx,
            Err(e) => {
                warn!(device = %self.device_id, error = %e, "could not enable notifications");
                return;
            }
        };

        let cache = Arc::clone(&self.cache);
        let device = self.device_id.clone();
        let handle = tokio::spawn(async move {
            let mut rx = rx;
            while let Some(frame) = rx.recv().await {
                match codec::decode_state_frame(&frame) {
                    Ok(raw) => cache.set(&device, raw),
                    Err(e) => {
                        debug!(device = %device, error = %e, "dropping malformed state frame");
                    }
                }
            }
        });

        if let Some(old) = self.pump.lock().await.replace(handle) {
            old.abort();
        }
    }

    /// Run one reconnect cycle, or wait out the one already in progress.
    async fn reconnect(&self) {
        if self.reconnecting.swap(true, Ordering::SeqCst) {
            debug!(device = %self.device_id, "reconnect already underway, waiting");
            while self.reconnecting.load(Ordering::SeqCst) {
                sleep(self.config.reconnect_poll).await;
            }
            return;
        }

        if self.connect_with_retry().await {
            self.arm_notifications().await;
        }
        self.reconnecting.store(false, Ordering::SeqCst);
    }

    /// Encode and write a command. Commands without a binary encoding are
    /// logged and dropped.
    pub async fn send(&self, command: &Command) {
        debug!(
            device = %self.device_id,
            command = command.kind.as_str(),
            payload = ?command.payload,
            "sending command"
        );
        match codec::encode_frame(command) {
            Some(frame) => self.write_frame(frame, command.kind.as_str()).await,
            None => {
                warn!(
                    device = %self.device_id,
                    command = command.kind.as_str(),
                    "no binary encoding for command, dropped"
                );
            }
        }
    }

    /// Write one frame, burning the write budget on failures. Each failed
    /// write runs a full bounded reconnect before the next attempt.
    pub async fn write_frame(&self, frame: [u8; 3], what: &str) {
        // A link known to be down gets a reconnect up front rather than a
        // doomed first write against the budget.
        if !self.link.is_connected() {
            debug!(device = %self.device_id, "link is down, reconnecting before write");
            self.reconnect().await;
        }

        let mut budget = self.config.write_retries;
        while budget > 0 {
            match self.link.write_control(frame).await {
                Ok(()) => return,
                Err(e) => error!(device = %self.device_id, error = %e, "disconnected"),
            }
            error!(device = %self.device_id, "reconnecting");
            self.reconnect().await;
            budget -= 1;
        }

        let abandoned = LinkError::RetryExhausted {
            device: self.device_id.clone(),
        };
        error!(device = %self.device_id, command = what, "{abandoned}, command dropped");
    }

    /// Ordered teardown: stop notifications, kill the pump, disconnect.
    /// Every step runs even if an earlier one fails.
    pub async fn shutdown(&self) {
        if let Err(e) = self.link.stop_notifications().await {
            warn!(device = %self.device_id, error = %e, "stop notifications failed");
        }
        if let Some(handle) = self.pump.lock().await.take() {
            handle.abort();
        }
        if let Err(e) = self.link.disconnect().await {
            warn!(device = %self.device_id, error = %e, "disconnect failed");
        }
        info!(device = %self.device_id, "session closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::state::{CommandPayload, CommandType};
    use std::sync::atomic::AtomicU32;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;
    use tokio::sync::mpsc;

    /// GATT link that fails the first `connect_failures` connects and the
    /// first `write_failures` writes, then succeeds.
    struct FlakyLink {
        connect_failures: AtomicU32,
        write_failures: AtomicU32,
        connects: AtomicU32,
        writes: StdMutex<Vec<[u8; 3]>>,
        connected: AtomicBool,
    }

    impl FlakyLink {
        fn new(connect_failures: u32, write_failures: u32) -> Self {
            Self {
                connect_failures: AtomicU32::new(connect_failures),
                write_failures: AtomicU32::new(write_failures),
                connects: AtomicU32::new(0),
                writes: StdMutex::new(Vec::new()),
                connected: AtomicBool::new(false),
            }
        }

        fn take_budget(counter: &AtomicU32) -> bool {
            counter
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| v.checked_sub(1))
                .is_ok()
        }
    }

    #[async_trait::async_trait]
    impl GattLink for FlakyLink {
        async fn connect(&self) -> Result<(), LinkError> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            if Self::take_budget(&self.connect_failures) {
                return Err(LinkError::Transport("connect refused".into()));
            }
            self.connected.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn disconnect(&self) -> Result<(), LinkError> {
            self.connected.store(false, Ordering::SeqCst);
            Ok(())
        }

        fn is_connected(&self) -> bool {
            self.connected.load(Ordering::SeqCst)
        }

        async fn write_control(&self, frame: [u8; 3]) -> Result<(), LinkError> {
            if !self.is_connected() {
                return Err(LinkError::Transport("not connected".into()));
            }
            if Self::take_budget(&self.write_failures) {
                return Err(LinkError::Transport("link dropped".into()));
            }
            self.writes.lock().unwrap().push(frame);
            Ok(())
        }

        async fn start_notifications(
            &self,
        ) -> Result<mpsc::UnboundedReceiver<Vec<u8>>, LinkError> {
            let (_tx, rx) = mpsc::unbounded_channel();
            Ok(rx)
        }

        async fn stop_notifications(&self) -> Result<(), LinkError> {
            Ok(())
        }
    }

    fn quick_config() -> BleLinkConfig {
        BleLinkConfig {
            connect_retries: 3,
            connect_delay: Duration::from_millis(1),
            write_retries: 2,
            reconnect_poll: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn write_recovers_after_reconnect() {
        let link = Arc::new(FlakyLink::new(0, 1));
        let session = BleSession::new(
            "dev",
            Arc::clone(&link) as Arc<dyn GattLink>,
            Arc::new(StateCache::new()),
            quick_config(),
        );
        session.start().await;

        let cmd = Command::new(CommandType::SetOn, Some(CommandPayload::Bool(true)));
        session.send(&cmd).await;

        assert_eq!(*link.writes.lock().unwrap(), vec![[0x43, 0x40, 0x01]]);
    }

    #[tokio::test]
    async fn command_is_abandoned_after_budget_runs_out() {
        // Every write fails; the command must be dropped without panicking
        // and without surfacing an error.
        let link = Arc::new(FlakyLink::new(0, u32::MAX));
        let session = BleSession::new(
            "dev",
            Arc::clone(&link) as Arc<dyn GattLink>,
            Arc::new(StateCache::new()),
            quick_config(),
        );
        session.start().await;

        let cmd = Command::new(CommandType::GetState, None);
        session.send(&cmd).await;

        assert!(link.writes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn connect_attempts_are_bounded() {
        let link = Arc::new(FlakyLink::new(u32::MAX, 0));
        let session = BleSession::new(
            "dev",
            Arc::clone(&link) as Arc<dyn GattLink>,
            Arc::new(StateCache::new()),
            quick_config(),
        );
        session.start().await;

        // Exactly the configured cap, then no background retry.
        assert_eq!(link.connects.load(Ordering::SeqCst), 3);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(link.connects.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn known_drop_reconnects_before_the_first_write() {
        let link = Arc::new(FlakyLink::new(0, 0));
        let mut config = quick_config();
        // One write attempt only: a doomed write against a down link would
        // exhaust the budget before any reconnect.
        config.write_retries = 1;
        let session = BleSession::new(
            "dev",
            Arc::clone(&link) as Arc<dyn GattLink>,
            Arc::new(StateCache::new()),
            config,
        );
        session.start().await;
        link.connected.store(false, Ordering::SeqCst);

        let cmd = Command::new(CommandType::SetOn, Some(CommandPayload::Bool(true)));
        session.send(&cmd).await;

        assert_eq!(*link.writes.lock().unwrap(), vec![[0x43, 0x40, 0x01]]);
        assert!(link.is_connected());
    }

    #[tokio::test]
    async fn color_command_is_dropped_without_touching_the_link() {
        let link = Arc::new(FlakyLink::new(0, 0));
        let session = BleSession::new(
            "dev",
            Arc::clone(&link) as Arc<dyn GattLink>,
            Arc::new(StateCache::new()),
            quick_config(),
        );
        session.start().await;

        let cmd = Command::new(
            CommandType::SetColor,
            Some(CommandPayload::Numbers(vec![255, 0, 0, 0])),
        );
        session.send(&cmd).await;

        assert!(link.writes.lock().unwrap().is_empty());
    }
}
