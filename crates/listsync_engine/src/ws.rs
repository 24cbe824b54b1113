//! Websocket transport with automatic reconnection.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::transport::{AckCallback, ConnectionStatus, InboundHub, SyncTransport};
use futures::{SinkExt, StreamExt};
use listsync_protocol::{ClientFrame, Inbound, Outbound, ServerFrame};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;
type QueuedSend = (Outbound, Option<AckCallback>);

/// Connection lifecycle of a [`WsTransport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportState {
    /// No connection; a retry may be scheduled.
    #[default]
    Disconnected,
    /// A connection attempt is in progress.
    Connecting,
    /// The socket is open.
    Connected,
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TransportState::Disconnected => "disconnected",
            TransportState::Connecting => "connecting",
            TransportState::Connected => "connected",
        })
    }
}

struct Shared {
    state: RwLock<TransportState>,
    status: watch::Sender<ConnectionStatus>,
    inbound: InboundHub,
    dropped: AtomicU64,
}

impl Shared {
    fn set_state(&self, state: TransportState) {
        *self.state.write() = state;
        let connected = state == TransportState::Connected;
        self.status
            .send_modify(|status| *status = status.transition(connected));
    }
}

/// A [`SyncTransport`] over a websocket.
///
/// A background task connects, reconnects with backoff after any failure,
/// and bounds each attempt by the configured connect timeout. Receipt
/// callbacks still waiting when a connection drops are discarded.
///
/// Must be created inside a Tokio runtime.
pub struct WsTransport {
    shared: Arc<Shared>,
    outbound: mpsc::UnboundedSender<QueuedSend>,
    task: JoinHandle<()>,
}

impl fmt::Debug for WsTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WsTransport")
            .field("state", &self.transport_state())
            .finish_non_exhaustive()
    }
}

impl WsTransport {
    /// Starts connecting to `config.server_url`.
    pub fn connect(config: &SyncConfig) -> Self {
        let (status, _) = watch::channel(ConnectionStatus::default());
        let shared = Arc::new(Shared {
            state: RwLock::new(TransportState::Disconnected),
            status,
            inbound: InboundHub::default(),
            dropped: AtomicU64::new(0),
        });
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(connection_loop(config.clone(), shared.clone(), outbound_rx));

        Self {
            shared,
            outbound,
            task,
        }
    }

    /// Returns the current connection lifecycle state.
    pub fn transport_state(&self) -> TransportState {
        *self.shared.state.read()
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl SyncTransport for WsTransport {
    fn connection_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.shared.status.subscribe()
    }

    fn subscribe_inbound(&self) -> mpsc::UnboundedReceiver<Inbound> {
        self.shared.inbound.subscribe()
    }

    fn send(&self, message: Outbound, on_ack: Option<AckCallback>) -> SyncResult<()> {
        if self.transport_state() != TransportState::Connected {
            return Err(SyncError::NotConnected);
        }
        self.outbound
            .send((message, on_ack))
            .map_err(|_| SyncError::transport_fatal("connection task stopped"))
    }

    fn dropped_messages(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }
}

async fn connection_loop(
    config: SyncConfig,
    shared: Arc<Shared>,
    mut outbound: mpsc::UnboundedReceiver<QueuedSend>,
) {
    let mut failures = 0u32;

    loop {
        shared.set_state(TransportState::Connecting);
        debug!(url = %config.server_url, attempt = failures + 1, "connecting");

        match tokio::time::timeout(config.connect_timeout, connect_async(config.server_url.as_str()))
            .await
        {
            Ok(Ok((socket, _))) => {
                failures = 0;
                let stale = std::iter::from_fn(|| outbound.try_recv().ok()).count();
                if stale > 0 {
                    debug!(stale, "discarding sends queued for a previous connection");
                }

                shared.set_state(TransportState::Connected);
                info!(url = %config.server_url, "connected");
                let reason = run_connection(socket, &shared, &mut outbound).await;
                shared.set_state(TransportState::Disconnected);
                warn!(%reason, "connection lost");
            }
            Ok(Err(e)) => {
                shared.set_state(TransportState::Disconnected);
                warn!(error = %e, "connection attempt failed");
            }
            Err(_) => {
                shared.set_state(TransportState::Disconnected);
                warn!(timeout = ?config.connect_timeout, "connection attempt timed out");
            }
        }

        failures = failures.saturating_add(1);
        if config.retry.exhausted(failures) {
            warn!(attempts = failures, "giving up reconnecting");
            return;
        }
        tokio::time::sleep(config.retry.delay_for_attempt(failures)).await;
    }
}

/// Pumps one connection until it fails. Returns why it ended.
async fn run_connection(
    socket: Socket,
    shared: &Shared,
    outbound: &mut mpsc::UnboundedReceiver<QueuedSend>,
) -> String {
    let (mut sink, mut stream) = socket.split();
    let mut awaiting: HashMap<u64, AckCallback> = HashMap::new();
    let mut next_ack_id = 1u64;

    loop {
        tokio::select! {
            queued = outbound.recv() => {
                let Some((message, on_ack)) = queued else {
                    return "transport dropped".to_string();
                };
                let frame = match on_ack {
                    Some(callback) => {
                        let id = next_ack_id;
                        next_ack_id += 1;
                        awaiting.insert(id, callback);
                        ClientFrame::with_ack(message, id)
                    }
                    None => ClientFrame::new(message),
                };
                let text = match frame.encode() {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(error = %e, "could not encode outbound frame");
                        continue;
                    }
                };
                if let Err(e) = sink.send(Message::Text(text.into())).await {
                    return format!("send failed: {e}");
                }
            }
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => match ServerFrame::decode(text.as_str()) {
                    Ok(ServerFrame::Message(message)) => {
                        debug!(channel = %message.channel(), "inbound message");
                        shared.inbound.publish(message);
                    }
                    Ok(ServerFrame::Ack(id)) => match awaiting.remove(&id) {
                        Some(callback) => callback(),
                        None => debug!(ack_id = id, "ack for unknown frame"),
                    },
                    Err(e) => {
                        shared.dropped.fetch_add(1, Ordering::Relaxed);
                        warn!(error = %e, "dropping undecodable inbound frame");
                    }
                },
                Some(Ok(Message::Ping(data))) => {
                    if let Err(e) = sink.send(Message::Pong(data)).await {
                        return format!("pong failed: {e}");
                    }
                }
                Some(Ok(Message::Close(_))) | None => return "closed by server".to_string(),
                Some(Ok(_)) => {}
                Some(Err(e)) => return e.to_string(),
            }
        }
    }
}
