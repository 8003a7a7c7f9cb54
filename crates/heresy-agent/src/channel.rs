//! Reconnecting WebSocket channel to the controller
//!
//! The channel owns exactly one outbound connection at a time. A supervisor
//! task walks the `Connecting -> Open -> Closed` cycle in a plain loop and,
//! while reconnect is enabled, starts the next attempt as soon as the
//! previous connection is gone. There is no backoff and no attempt limit;
//! the loop only ends on [`Channel::shutdown`] or when the channel is dropped.

use crate::error::ChannelError;
use futures::{SinkExt, StreamExt};
use heresy_proto::{decode, encode, Message};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Channel configuration
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Controller address, e.g. `ws://127.0.0.1:1337`
    pub url: String,
    /// Reconnect immediately whenever the connection closes
    pub reconnect: bool,
    /// Capacity of the inbound message queue
    pub inbound_capacity: usize,
}

impl ChannelConfig {
    /// Configuration with reconnect enabled
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reconnect: true,
            inbound_capacity: 64,
        }
    }

    /// Enable or disable reconnect-on-close
    pub fn reconnect(mut self, reconnect: bool) -> Self {
        self.reconnect = reconnect;
        self
    }
}

/// Lifecycle state of the current connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// Handshake in progress
    Connecting,
    /// Connected; sends are transmitted
    Open,
    /// No connection; sends are dropped
    Closed,
}

#[derive(Debug)]
struct Shared {
    url: String,
    state: watch::Sender<ChannelState>,
    attempts: AtomicU64,
    /// Writer queue of the connection that is currently open
    outbound: Mutex<Option<mpsc::UnboundedSender<String>>>,
}

impl Shared {
    fn set_outbound(&self, tx: Option<mpsc::UnboundedSender<String>>) {
        let mut slot = self.outbound.lock().unwrap_or_else(|e| e.into_inner());
        *slot = tx;
    }

    fn send(&self, message: &Message) {
        if *self.state.borrow() != ChannelState::Open {
            debug!("Channel not open, dropping {} message", message.kind());
            return;
        }

        let text = match encode(message) {
            Ok(text) => text,
            Err(e) => {
                warn!("Failed to encode outbound message: {}", e);
                return;
            }
        };

        let slot = self.outbound.lock().unwrap_or_else(|e| e.into_inner());
        match slot.as_ref() {
            Some(tx) if tx.send(text).is_ok() => {}
            _ => debug!("Connection went away, dropping {} message", message.kind()),
        }
    }
}

/// Cloneable fire-and-forget sender for a [`Channel`]
#[derive(Debug, Clone)]
pub struct ChannelSender {
    shared: Arc<Shared>,
}

impl ChannelSender {
    /// Send a message if the channel is open; otherwise drop it silently
    pub fn send(&self, message: Message) {
        self.shared.send(&message);
    }
}

/// Agent-side channel to the controller
pub struct Channel {
    shared: Arc<Shared>,
    inbound: mpsc::Receiver<Message>,
    shutdown_tx: watch::Sender<bool>,
    supervisor: Option<JoinHandle<()>>,
}

impl Channel {
    /// Start connecting to the controller
    ///
    /// Returns immediately; the first connection attempt runs in the
    /// background. Must be called from within a tokio runtime.
    pub fn connect(config: ChannelConfig) -> Self {
        let (state_tx, _) = watch::channel(ChannelState::Connecting);
        let shared = Arc::new(Shared {
            url: config.url.clone(),
            state: state_tx,
            attempts: AtomicU64::new(0),
            outbound: Mutex::new(None),
        });
        let (inbound_tx, inbound) = mpsc::channel(config.inbound_capacity.max(1));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let supervisor = tokio::spawn(supervise(config, Arc::clone(&shared), inbound_tx, shutdown_rx));

        Self {
            shared,
            inbound,
            shutdown_tx,
            supervisor: Some(supervisor),
        }
    }

    /// Controller address this channel connects to
    pub fn url(&self) -> &str {
        &self.shared.url
    }

    /// Send a message if the channel is open; otherwise drop it silently
    pub fn send(&self, message: Message) {
        self.shared.send(&message);
    }

    /// A cloneable handle for sending from elsewhere
    pub fn sender(&self) -> ChannelSender {
        ChannelSender {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Receive the next decoded inbound message
    ///
    /// Returns `None` once the channel has shut down for good.
    pub async fn recv(&mut self) -> Option<Message> {
        self.inbound.recv().await
    }

    /// Current connection state
    pub fn state(&self) -> ChannelState {
        *self.shared.state.borrow()
    }

    /// Watch connection state changes
    pub fn state_changes(&self) -> watch::Receiver<ChannelState> {
        self.shared.state.subscribe()
    }

    /// Number of connection attempts made so far
    pub fn connect_attempts(&self) -> u64 {
        self.shared.attempts.load(Ordering::SeqCst)
    }

    /// Close the connection and stop reconnecting
    pub async fn shutdown(&mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self.supervisor.take() {
            if let Err(e) = handle.await {
                warn!("Channel supervisor ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}

/// Connect, serve, and reconnect until shut down
async fn supervise(
    config: ChannelConfig,
    shared: Arc<Shared>,
    inbound_tx: mpsc::Sender<Message>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        shared.state.send_replace(ChannelState::Connecting);
        let attempt = shared.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(url = %config.url, attempt, "Connecting to controller");

        let connected = tokio::select! {
            result = connect_async(config.url.as_str()) => result,
            _ = shutdown_rx.changed() => break,
        };

        match connected {
            Ok((ws, _)) => {
                info!(url = %config.url, "Channel open");
                let (tx, rx) = mpsc::unbounded_channel();
                shared.set_outbound(Some(tx));
                shared.state.send_replace(ChannelState::Open);

                let reason = serve(ws, rx, &inbound_tx, &mut shutdown_rx).await;

                shared.set_outbound(None);
                shared.state.send_replace(ChannelState::Closed);
                match reason {
                    ChannelError::Shutdown => break,
                    other => info!(url = %config.url, "Channel closed: {}", other),
                }
            }
            Err(e) => {
                shared.state.send_replace(ChannelState::Closed);
                warn!(url = %config.url, "Channel error: {}", ChannelError::from(e));
            }
        }

        if !config.reconnect {
            break;
        }
        tokio::task::yield_now().await;
    }

    shared.set_outbound(None);
    shared.state.send_replace(ChannelState::Closed);
    debug!(url = %config.url, "Channel supervisor stopped");
}

/// Pump one open connection until it closes
async fn serve(
    ws: WsStream,
    mut outbound: mpsc::UnboundedReceiver<String>,
    inbound_tx: &mpsc::Sender<Message>,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> ChannelError {
    let (mut sink, mut stream) = ws.split();

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                let _ = sink.send(WsMessage::Close(None)).await;
                return ChannelError::Shutdown;
            }

            Some(text) = outbound.recv() => {
                if let Err(e) = sink.send(WsMessage::text(text)).await {
                    return ChannelError::Transport(e);
                }
            }

            frame = stream.next() => {
                let text = match frame {
                    Some(Ok(WsMessage::Text(text))) => text.as_str().to_owned(),
                    Some(Ok(WsMessage::Binary(data))) => match std::str::from_utf8(&data) {
                        Ok(text) => text.to_owned(),
                        Err(e) => {
                            warn!("Discarding non UTF-8 binary frame: {}", e);
                            continue;
                        }
                    },
                    Some(Ok(WsMessage::Close(frame))) => {
                        return ChannelError::Closed(frame.map(|f| format!("{} - {}", f.code, f.reason)));
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => return ChannelError::Transport(e),
                    None => return ChannelError::Closed(None),
                };

                match decode(&text) {
                    Ok(message) => {
                        debug!("Received {} message", message.kind());
                        if inbound_tx.send(message).await.is_err() {
                            debug!("Inbound receiver dropped, discarding message");
                        }
                    }
                    Err(e) => warn!("Discarding inbound frame: {}", e),
                }
            }
        }
    }
}
