//! WebSocket server relaying operator commands to agents
//!
//! Each accepted connection gets its own task pumping a writer queue and
//! the socket's inbound frames. The operator console starts reading once
//! the first agent has connected and keeps running independently of the
//! connections that come and go afterwards.

use crate::console::run_console;
use crate::registry::{ConnectionRegistry, Outbound};
use crate::Result;
use futures::{SinkExt, StreamExt};
use heresy_proto::{decode, Message};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::io::AsyncBufRead;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

type ConsoleReader = Box<dyn AsyncBufRead + Send + Unpin>;

/// Message received from an agent
#[derive(Debug, Clone)]
pub struct InboundEvent {
    /// Connection the message arrived on
    pub connection: Uuid,
    /// The decoded message
    pub message: Message,
}

/// What the server did with an inbound message
#[derive(Debug, Clone, PartialEq)]
pub enum InboundOutcome {
    /// An `eval_response` was logged
    EvalResponse(Value),
    /// A `log` line forwarded by the agent was logged
    Log(Value),
    /// A message with no controller-side handler; carries its type
    Unhandled(String),
}

/// Broadcast server for agent connections
pub struct BroadcastServer {
    registry: ConnectionRegistry,
    events: broadcast::Sender<InboundEvent>,
    console: Mutex<Option<ConsoleReader>>,
}

impl BroadcastServer {
    /// Create a server without an operator console
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            registry: ConnectionRegistry::new(),
            events,
            console: Mutex::new(None),
        }
    }

    /// Attach the reader operator lines are taken from
    pub fn with_console(self, reader: impl AsyncBufRead + Send + Unpin + 'static) -> Self {
        *self.console.lock().unwrap_or_else(|e| e.into_inner()) = Some(Box::new(reader));
        self
    }

    /// Bind a listener and start accepting connections in the background
    ///
    /// Returns the bound address and the accept loop's handle.
    pub async fn bind(self: Arc<Self>, addr: impl ToSocketAddrs) -> Result<(SocketAddr, JoinHandle<()>)> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        info!("Heresy server listening on {}", local_addr);

        let handle = tokio::spawn(self.accept_loop(listener));
        Ok((local_addr, handle))
    }

    /// Send `message` to every connected agent
    pub async fn broadcast(&self, message: &Message) -> Result<usize> {
        self.registry.broadcast(message).await
    }

    /// Subscribe to messages arriving from agents
    pub fn subscribe(&self) -> broadcast::Receiver<InboundEvent> {
        self.events.subscribe()
    }

    /// Connected agents
    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    async fn accept_loop(self: Arc<Self>, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    let server = Arc::clone(&self);
                    tokio::spawn(server.handle_connection(stream, peer));
                }
                Err(e) => error!("Failed to accept connection: {}", e),
            }
        }
    }

    async fn handle_connection(self: Arc<Self>, stream: TcpStream, peer: SocketAddr) {
        let ws = match accept_async(stream).await {
            Ok(ws) => ws,
            Err(e) => {
                warn!(%peer, "WebSocket handshake failed: {}", e);
                return;
            }
        };

        let (tx, mut outbound) = mpsc::unbounded_channel();
        let id = self.registry.register(tx, Some(peer)).await;
        self.start_console();

        let (mut sink, mut stream) = ws.split();
        loop {
            tokio::select! {
                next = outbound.recv() => match next {
                    Some(Outbound::Text(text)) => {
                        if let Err(e) = sink.send(WsMessage::text(text)).await {
                            warn!(%id, "Send failed: {}", e);
                            break;
                        }
                    }
                    Some(Outbound::Close) | None => {
                        let _ = sink.send(WsMessage::Close(None)).await;
                        break;
                    }
                },

                frame = stream.next() => match frame {
                    Some(Ok(WsMessage::Text(text))) => {
                        self.handle_inbound(id, text.as_str());
                    }
                    Some(Ok(WsMessage::Binary(data))) => match std::str::from_utf8(&data) {
                        Ok(text) => {
                            self.handle_inbound(id, text);
                        }
                        Err(e) => warn!(%id, "Discarding non UTF-8 binary frame: {}", e),
                    },
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(%id, "Connection error: {}", e);
                        break;
                    }
                },
            }
        }

        self.registry.remove(id).await;
    }

    /// Start the console loop if a reader is attached and it has not started yet
    fn start_console(self: &Arc<Self>) {
        let reader = self.console.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(reader) = reader {
            debug!("Starting operator console");
            tokio::spawn(run_console(reader, Arc::clone(self)));
        }
    }

    /// Decode, log and publish one frame received from an agent
    ///
    /// Malformed frames are logged and dropped; the connection stays open.
    pub fn handle_inbound(&self, connection: Uuid, text: &str) -> Option<InboundOutcome> {
        let message = match decode(text) {
            Ok(message) => message,
            Err(e) => {
                warn!(%connection, "Failed to parse agent message: {}", e);
                return None;
            }
        };

        let outcome = match &message {
            Message::EvalResponse(payload) => {
                info!("Eval response: {}", display(payload));
                InboundOutcome::EvalResponse(payload.clone())
            }
            Message::Log(payload) => {
                info!("Agent: {}", display(payload));
                InboundOutcome::Log(payload.clone())
            }
            other => {
                warn!(%connection, "Unhandled message type: {}", other.kind());
                InboundOutcome::Unhandled(other.kind().to_string())
            }
        };

        // No subscribers is the normal case outside of tests.
        let _ = self.events.send(InboundEvent { connection, message });
        Some(outcome)
    }
}

impl Default for BroadcastServer {
    fn default() -> Self {
        Self::new()
    }
}

fn display(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
