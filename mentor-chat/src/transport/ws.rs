use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsFrame};
use tracing::{debug, error, info, warn};

use super::frames::RelayFrame;
use super::{Bindings, EventReceiver, Transport, TransportEvent};
use crate::config::ChatConfig;
use crate::error::{ChatError, ChatResult};

const AUTH_TIMEOUT: Duration = Duration::from_secs(10);
const PREVIEW_CHARS: usize = 100;

/// Internal message type for the write channel
enum WriteMessage {
    Data(String),
    Close,
}

type WriteSlot = Arc<StdMutex<Option<mpsc::UnboundedSender<WriteMessage>>>>;

fn lock<T>(mutex: &StdMutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// WebSocket transport to the mentor relay.
///
/// `connect` spawns a connection task that authenticates, replays every
/// subscription on each (re)connect and reconnects after `reconnect_delay`
/// until `disconnect` is called.
pub struct WsTransport {
    server_url: String,
    access_token: Option<String>,
    reconnect_delay: Duration,
    write_tx: WriteSlot,
    connected: Arc<AtomicBool>,
    subscriptions: Arc<StdMutex<Vec<String>>>,
    bindings: Bindings,
    shutdown_tx: Option<broadcast::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl WsTransport {
    pub fn new(config: &ChatConfig) -> Self {
        Self {
            server_url: config.relay_url.clone(),
            access_token: config.access_token.clone(),
            reconnect_delay: config.reconnect_delay,
            write_tx: Arc::new(StdMutex::new(None)),
            connected: Arc::new(AtomicBool::new(false)),
            subscriptions: Arc::new(StdMutex::new(Vec::new())),
            bindings: Bindings::default(),
            shutdown_tx: None,
            task: None,
        }
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    /// Authenticated with the relay right now
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn send_frame(&self, frame: &RelayFrame) -> ChatResult<()> {
        let json = serde_json::to_string(frame)?;
        debug!(preview = %preview(&json), "Sending frame to relay");

        let guard = lock(&self.write_tx);
        match guard.as_ref() {
            Some(tx) => tx
                .send(WriteMessage::Data(json))
                .map_err(|e| ChatError::Transient(format!("Failed to send to relay: {}", e))),
            None => {
                warn!("Cannot send frame: not connected to relay");
                Err(ChatError::Transient("Not connected to relay".to_string()))
            }
        }
    }
}

impl Transport for WsTransport {
    fn connect(&mut self, user_id: &str) -> ChatResult<EventReceiver> {
        if self.task.is_some() {
            self.disconnect();
        }

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| ChatError::Internal("WsTransport needs a tokio runtime".to_string()))?;

        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let link = Link {
            server_url: self.server_url.clone(),
            user_id: user_id.to_string(),
            access_token: self.access_token.clone(),
            reconnect_delay: self.reconnect_delay,
            write_tx: self.write_tx.clone(),
            connected: self.connected.clone(),
            subscriptions: self.subscriptions.clone(),
            bindings: self.bindings.clone(),
            inbox: inbox_tx,
        };

        self.task = Some(runtime.spawn(link.run(shutdown_rx)));
        self.shutdown_tx = Some(shutdown_tx);
        Ok(inbox_rx)
    }

    fn subscribe(&mut self, channel: &str) -> ChatResult<()> {
        let mut subscriptions = lock(&self.subscriptions);
        if subscriptions.iter().any(|c| c == channel) {
            return Ok(());
        }
        subscriptions.push(channel.to_string());

        // Not yet connected: the connection task replays the list
        if lock(&self.write_tx).is_some() {
            self.send_frame(&RelayFrame::Subscribe {
                channel: channel.to_string(),
            })?;
        }
        Ok(())
    }

    fn bind(&mut self, channel: &str, event: &str) {
        if !self.bindings.bind(channel, event) {
            debug!(channel, event, "Event already bound");
        }
    }

    fn trigger(&self, channel: &str, event: &str, data: serde_json::Value) -> ChatResult<()> {
        self.send_frame(&RelayFrame::Trigger {
            channel: channel.to_string(),
            event: event.to_string(),
            data,
        })
    }

    fn disconnect(&mut self) {
        let Some(shutdown_tx) = self.shutdown_tx.take() else {
            return;
        };
        info!("Initiating graceful disconnect");
        // Signal shutdown to stop reconnection loop
        let _ = shutdown_tx.send(());
        if let Some(tx) = lock(&self.write_tx).as_ref() {
            let _ = tx.send(WriteMessage::Close);
        }
        self.task = None;
        lock(&self.subscriptions).clear();
        self.bindings.clear();
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Leading characters of a frame for logging, cut on a char boundary
fn preview(json: &str) -> &str {
    json.char_indices()
        .nth(PREVIEW_CHARS)
        .map_or(json, |(i, _)| &json[..i])
}

/// State owned by the spawned connection task
struct Link {
    server_url: String,
    user_id: String,
    access_token: Option<String>,
    reconnect_delay: Duration,
    write_tx: WriteSlot,
    connected: Arc<AtomicBool>,
    subscriptions: Arc<StdMutex<Vec<String>>>,
    bindings: Bindings,
    inbox: mpsc::UnboundedSender<TransportEvent>,
}

impl Link {
    async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        loop {
            // Check for shutdown before attempting connection
            if shutdown_rx.try_recv().is_ok() {
                info!("Shutdown signal received, stopping reconnection");
                break;
            }

            info!(url = %self.server_url, "Connecting to relay");

            match connect_async(self.server_url.as_str()).await {
                Ok((ws_stream, _)) => {
                    let (mut ws_write, mut ws_read) = ws_stream.split();

                    let connect = RelayFrame::Connect {
                        user_id: self.user_id.clone(),
                        token: self.access_token.clone(),
                    };
                    let sent = match serde_json::to_string(&connect) {
                        Ok(json) => ws_write.send(WsFrame::Text(json.into())).await.is_ok(),
                        Err(_) => false,
                    };
                    if !sent {
                        error!("Failed to send connect frame");
                    } else if self.await_auth(&mut ws_read).await {
                        let (tx, mut rx) = mpsc::unbounded_channel::<WriteMessage>();
                        self.install_writer(tx);
                        self.connected.store(true, Ordering::SeqCst);

                        let mut should_reconnect = true;
                        loop {
                            tokio::select! {
                                _ = shutdown_rx.recv() => {
                                    info!("Shutdown signal received, closing connection gracefully");
                                    if let Err(e) = ws_write.send(WsFrame::Close(None)).await {
                                        warn!(error = %e, "Failed to send close frame");
                                    }
                                    should_reconnect = false;
                                    break;
                                }
                                Some(msg) = rx.recv() => {
                                    match msg {
                                        WriteMessage::Data(data) => {
                                            if ws_write.send(WsFrame::Text(data.into())).await.is_err() {
                                                error!("Failed to send frame to relay");
                                                break;
                                            }
                                        }
                                        WriteMessage::Close => {
                                            info!("Close requested, sending close frame");
                                            if let Err(e) = ws_write.send(WsFrame::Close(None)).await {
                                                warn!(error = %e, "Failed to send close frame");
                                            }
                                            should_reconnect = false;
                                            break;
                                        }
                                    }
                                }
                                msg = ws_read.next() => {
                                    match msg {
                                        Some(Ok(WsFrame::Text(text))) => {
                                            if !self.forward(&text) {
                                                info!("Event queue dropped, closing connection");
                                                let _ = ws_write.send(WsFrame::Close(None)).await;
                                                should_reconnect = false;
                                                break;
                                            }
                                        }
                                        Some(Ok(WsFrame::Close(_))) | None => {
                                            info!("Relay closed connection");
                                            break;
                                        }
                                        Some(Err(e)) => {
                                            error!(error = %e, "WebSocket error");
                                            break;
                                        }
                                        _ => {}
                                    }
                                }
                            }
                        }

                        *lock(&self.write_tx) = None;
                        self.connected.store(false, Ordering::SeqCst);
                        info!("Disconnected from relay");

                        if !should_reconnect {
                            break;
                        }
                    }
                }
                Err(e) => {
                    error!(error = %e, url = %self.server_url, "Failed to connect to relay");
                }
            }

            debug!(delay_ms = self.reconnect_delay.as_millis() as u64, "Reconnecting");
            tokio::select! {
                _ = tokio::time::sleep(self.reconnect_delay) => {}
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received, stopping reconnection");
                    break;
                }
            }
        }
    }

    async fn await_auth<S>(&self, ws_read: &mut S) -> bool
    where
        S: futures_util::Stream<Item = Result<WsFrame, tokio_tungstenite::tungstenite::Error>>
            + Unpin,
    {
        let response = match tokio::time::timeout(AUTH_TIMEOUT, ws_read.next()).await {
            Ok(Some(Ok(WsFrame::Text(text)))) => text,
            Ok(_) => {
                error!("Relay closed connection during authentication");
                return false;
            }
            Err(_) => {
                error!("Timed out waiting for auth response");
                return false;
            }
        };

        match serde_json::from_str::<RelayFrame>(&response) {
            Ok(RelayFrame::AuthResponse { success: true, message }) => {
                info!("Authenticated with relay: {}", message);
                true
            }
            Ok(RelayFrame::AuthResponse { message, .. }) => {
                error!("Authentication failed: {}", message);
                false
            }
            _ => {
                warn!("Unexpected response during auth");
                false
            }
        }
    }

    /// Publish the writer and replay subscriptions under one lock so a
    /// concurrent `subscribe` is sent exactly once
    fn install_writer(&self, tx: mpsc::UnboundedSender<WriteMessage>) {
        let subscriptions = lock(&self.subscriptions);
        for channel in subscriptions.iter() {
            let frame = RelayFrame::Subscribe {
                channel: channel.clone(),
            };
            if let Ok(json) = serde_json::to_string(&frame) {
                let _ = tx.send(WriteMessage::Data(json));
            }
        }
        *lock(&self.write_tx) = Some(tx);
    }

    /// Returns false once the consumer has dropped the event queue
    fn forward(&self, text: &str) -> bool {
        let frame = match serde_json::from_str::<RelayFrame>(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "Invalid frame from relay");
                return true;
            }
        };

        match frame {
            RelayFrame::SubscriptionError { channel, message } => {
                warn!(channel = %channel, "Subscription refused: {}", message);
                true
            }
            RelayFrame::Error { message } => {
                warn!("Relay error: {}", message);
                true
            }
            frame => match frame.into_transport_event() {
                Some(event) if self.bindings.allows(&event) => self.inbox.send(event).is_ok(),
                Some(event) => {
                    debug!(channel = event.channel(), event = event.name(), "Dropping unbound event");
                    !self.inbox.is_closed()
                }
                None => !self.inbox.is_closed(),
            },
        }
    }
}
