//! WebSocket Transport Session
//!
//! Maintains one persistent connection to the daemon's WebSocket endpoint.
//! Reconnects forever with capped exponential backoff; the attempt counter
//! resets on every successful open. A single writer task owns the sink, so
//! outbound writes are serialized by construction. Messages submitted while
//! the link is down are dropped and logged, matching the fire-and-forget
//! contract - they are not queued for replay.

use crate::cache::StateCache;
use crate::domain::settings::WebsocketSettings;
use crate::error::LinkError;
use crate::infrastructure::net::{handle_inbound, Backoff, RemoteTransport};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

const OUTBOUND_QUEUE: usize = 64;

pub struct WsTransport {
    out_tx: mpsc::Sender<String>,
    cancel: CancellationToken,
}

impl WsTransport {
    /// Spawn the connection loop against `ws://host:port`.
    pub fn spawn(
        settings: &WebsocketSettings,
        cache: Arc<StateCache>,
    ) -> Result<Arc<Self>, LinkError> {
        let url = Url::parse(&format!("ws://{}:{}", settings.host, settings.port))
            .map_err(|e| LinkError::Transport(e.to_string()))?;

        let (out_tx, out_rx) = mpsc::channel(OUTBOUND_QUEUE);
        let cancel = CancellationToken::new();

        let task_cancel = cancel.clone();
        tokio::spawn(async move {
            ws_loop(url, out_rx, cache, task_cancel).await;
        });

        Ok(Arc::new(Self { out_tx, cancel }))
    }
}

#[async_trait]
impl RemoteTransport for WsTransport {
    async fn publish(&self, payload: String) {
        if self.out_tx.send(payload).await.is_err() {
            error!("websocket task is gone, message dropped");
        }
    }

    fn shutdown(&self) {
        self.cancel.cancel();
        info!("websocket connection was closed");
    }
}

/// Main loop: connect, run until the stream ends, back off, repeat.
async fn ws_loop(
    url: Url,
    mut out_rx: mpsc::Receiver<String>,
    cache: Arc<StateCache>,
    cancel: CancellationToken,
) {
    let mut backoff = Backoff::default();

    loop {
        if cancel.is_cancelled() {
            break;
        }

        match tokio_tungstenite::connect_async(url.as_str()).await {
            Ok((stream, _response)) => {
                info!(url = %url, "connected to the WebSocket server");
                backoff.reset();
                run_connection(stream, &mut out_rx, &cache, &cancel).await;
                if cancel.is_cancelled() {
                    break;
                }
            }
            Err(e) => warn!(url = %url, error = %e, "connect failed"),
        }

        let delay = backoff.next_delay();
        warn!(
            delay_secs = delay.as_secs(),
            "connection closed, trying to reconnect"
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = drop_outbound_for(&mut out_rx, delay) => {}
        }
    }

    debug!("websocket loop exiting");
}

/// Backoff wait that also drains the outbound queue: commands submitted
/// while the link is down are dropped, not deferred.
async fn drop_outbound_for(out_rx: &mut mpsc::Receiver<String>, delay: Duration) {
    let deadline = tokio::time::sleep(delay);
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            _ = &mut deadline => return,
            message = out_rx.recv() => match message {
                Some(_) => error!("WebSocket connection is not open, message dropped"),
                None => {
                    (&mut deadline).await;
                    return;
                }
            }
        }
    }
}

/// Drive one open connection: forward outbound envelopes to the sink,
/// decode inbound text frames into the cache. Returns when the stream ends;
/// read errors are logged and end the stream - reconnect is driven from one
/// place only.
async fn run_connection(
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    out_rx: &mut mpsc::Receiver<String>,
    cache: &StateCache,
    cancel: &CancellationToken,
) {
    let (mut sink, mut read) = stream.split();
    let mut out_closed = false;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                let _ = sink.close().await;
                return;
            }
            outbound = out_rx.recv(), if !out_closed => {
                match outbound {
                    Some(text) => {
                        debug!(message = %text, "sending message");
                        if let Err(e) = sink.send(WsMessage::Text(text.into())).await {
                            error!(error = %e, "write failed");
                            return;
                        }
                    }
                    None => out_closed = true,
                }
            }
            frame = read.next() => {
                match frame {
                    Some(Ok(WsMessage::Text(text))) => handle_inbound(text.as_str(), cache),
                    Some(Ok(WsMessage::Close(_))) => {
                        info!("WebSocket close frame received");
                        return;
                    }
                    Some(Ok(_)) => {
                        // Binary, Ping, Pong - ignore
                    }
                    Some(Err(e)) => {
                        error!(error = %e, "websocket error");
                        return;
                    }
                    None => {
                        info!("WebSocket stream ended");
                        return;
                    }
                }
            }
        }
    }
}
