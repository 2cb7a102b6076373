//! Redis Pub/Sub Transport Session
//!
//! Publishes command envelopes on `<namespace>:control` and consumes state
//! envelopes from `<namespace>:state`. The subscriber runs as a background
//! task with the shared capped backoff; the publish connection is opened
//! lazily and thrown away after the first error, to be reopened on the next
//! command.

use crate::cache::StateCache;
use crate::domain::settings::PubSubSettings;
use crate::error::LinkError;
use crate::infrastructure::net::{handle_inbound, Backoff, RemoteTransport};
use async_trait::async_trait;
use futures_util::StreamExt;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub struct PubSubTransport {
    client: redis::Client,
    control_channel: String,
    publish_conn: Mutex<Option<MultiplexedConnection>>,
    cancel: CancellationToken,
}

impl PubSubTransport {
    /// Spawn the subscriber loop and prepare the publisher.
    pub fn spawn(
        settings: &PubSubSettings,
        cache: Arc<StateCache>,
    ) -> Result<Arc<Self>, LinkError> {
        let url = format!("redis://{}:{}/", settings.host, settings.port);
        let client =
            redis::Client::open(url).map_err(|e| LinkError::Transport(e.to_string()))?;

        let state_channel = format!("{}:state", settings.namespace);
        let cancel = CancellationToken::new();

        let task_client = client.clone();
        let task_cancel = cancel.clone();
        tokio::spawn(async move {
            subscribe_loop(task_client, state_channel, cache, task_cancel).await;
        });

        Ok(Arc::new(Self {
            client,
            control_channel: format!("{}:control", settings.namespace),
            publish_conn: Mutex::new(None),
            cancel,
        }))
    }
}

#[async_trait]
impl RemoteTransport for PubSubTransport {
    async fn publish(&self, payload: String) {
        let mut guard = self.publish_conn.lock().await;

        if guard.is_none() {
            match self.client.get_multiplexed_async_connection().await {
                Ok(conn) => *guard = Some(conn),
                Err(e) => {
                    error!(error = %e, "error publishing message");
                    return;
                }
            }
        }

        if let Some(conn) = guard.as_mut() {
            let result: redis::RedisResult<i64> =
                conn.publish(&self.control_channel, &payload).await;
            match result {
                Ok(_) => debug!(message = %payload, "published message"),
                Err(e) => {
                    error!(error = %e, "error publishing message");
                    // Stale connection; reopen on the next publish.
                    *guard = None;
                }
            }
        }
    }

    fn shutdown(&self) {
        self.cancel.cancel();
        info!("pub/sub connections closed");
    }
}

/// Subscriber loop: subscribe to the state channel, feed every payload into
/// the cache, reconnect with backoff when the connection drops.
async fn subscribe_loop(
    client: redis::Client,
    state_channel: String,
    cache: Arc<StateCache>,
    cancel: CancellationToken,
) {
    let mut backoff = Backoff::default();

    loop {
        if cancel.is_cancelled() {
            break;
        }

        match client.get_async_pubsub().await {
            Ok(mut pubsub) => match pubsub.subscribe(&state_channel).await {
                Ok(()) => {
                    info!(channel = %state_channel, "subscribed");
                    backoff.reset();
                    let cancelled = consume(&mut pubsub, &cache, &cancel).await;
                    if cancelled {
                        let _ = pubsub.unsubscribe(&state_channel).await;
                        break;
                    }
                    warn!(channel = %state_channel, "subscription lost");
                }
                Err(e) => error!(channel = %state_channel, error = %e, "error subscribing"),
            },
            Err(e) => warn!(error = %e, "redis connection failed"),
        }

        let delay = backoff.next_delay();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    debug!("pub/sub loop exiting");
}

/// Consume messages until the stream ends or shutdown is requested.
/// Returns true when stopped by cancellation.
async fn consume(
    pubsub: &mut redis::aio::PubSub,
    cache: &StateCache,
    cancel: &CancellationToken,
) -> bool {
    let mut stream = pubsub.on_message();
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return true,
            message = stream.next() => {
                match message {
                    Some(msg) => match msg.get_payload::<String>() {
                        Ok(text) => {
                            debug!(channel = %msg.get_channel_name(), "received message");
                            handle_inbound(&text, cache);
                        }
                        Err(e) => error!(error = %e, "error processing message"),
                    },
                    None => return false,
                }
            }
        }
    }
}
