//! Transport layer abstraction for sync operations.

use crate::error::{SyncError, SyncResult};
use listsync_protocol::{AppEvent, Inbound, Outbound, ServerFrame};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

/// One-shot receipt callback passed to [`SyncTransport::send`].
///
/// Invoked at most once, and never if the connection drops first.
pub type AckCallback = Box<dyn FnOnce() + Send + 'static>;

/// Connectivity as published by a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConnectionStatus {
    /// Whether a connection is currently open.
    pub connected: bool,
    /// Counts connections established so far. A new value means a new
    /// connection even if the drop before it was never observed.
    pub session: u64,
}

impl ConnectionStatus {
    /// Returns the status after moving to `connected`.
    #[must_use]
    pub fn transition(self, connected: bool) -> Self {
        Self {
            connected,
            session: if connected && !self.connected {
                self.session + 1
            } else {
                self.session
            },
        }
    }
}

/// A long-lived, reconnecting channel to the sync server.
///
/// The transport drives its own connection lifecycle; the engine only
/// observes it.
pub trait SyncTransport: Send + Sync + 'static {
    /// Latest-value stream of connectivity. New receivers see the
    /// current value immediately.
    fn connection_status(&self) -> watch::Receiver<ConnectionStatus>;

    /// Opens a new stream of decoded inbound messages.
    fn subscribe_inbound(&self) -> mpsc::UnboundedReceiver<Inbound>;

    /// Sends `message`, asking for a receipt if `on_ack` is given.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotConnected`] if there is no connection.
    fn send(&self, message: Outbound, on_ack: Option<AckCallback>) -> SyncResult<()>;

    /// Number of inbound frames dropped because they could not be decoded.
    fn dropped_messages(&self) -> u64;
}

/// Fan-out of inbound messages to every live subscriber.
#[derive(Debug, Default)]
pub(crate) struct InboundHub {
    subscribers: Mutex<Vec<mpsc::UnboundedSender<Inbound>>>,
}

impl InboundHub {
    pub(crate) fn subscribe(&self) -> mpsc::UnboundedReceiver<Inbound> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(tx);
        rx
    }

    pub(crate) fn publish(&self, message: Inbound) {
        self.subscribers
            .lock()
            .retain(|tx| tx.send(message.clone()).is_ok());
    }
}

struct MockInner {
    status: watch::Sender<ConnectionStatus>,
    inbound: InboundHub,
    sent: Mutex<Vec<Outbound>>,
    acks: Mutex<Vec<AckCallback>>,
    dropped: AtomicU64,
}

/// A scriptable in-process transport for testing.
///
/// Records every send, holds receipt callbacks until the test fires them,
/// and lets the test flip connectivity and inject inbound traffic. Clones
/// share state.
#[derive(Clone)]
pub struct MockTransport {
    inner: Arc<MockInner>,
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("status", &*self.inner.status.borrow())
            .field("sent", &self.inner.sent.lock().len())
            .field("pending_acks", &self.inner.acks.lock().len())
            .finish()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    /// Creates a disconnected mock transport.
    pub fn new() -> Self {
        let (status, _) = watch::channel(ConnectionStatus::default());
        Self {
            inner: Arc::new(MockInner {
                status,
                inbound: InboundHub::default(),
                sent: Mutex::new(Vec::new()),
                acks: Mutex::new(Vec::new()),
                dropped: AtomicU64::new(0),
            }),
        }
    }

    /// Sets the connected state.
    ///
    /// Held receipt callbacks survive a disconnect so tests can deliver
    /// late acknowledgments; use [`MockTransport::drop_pending_acks`] to
    /// lose them instead.
    pub fn set_connected(&self, connected: bool) {
        self.inner
            .status
            .send_modify(|status| *status = status.transition(connected));
    }

    /// Returns the connected state.
    pub fn is_connected(&self) -> bool {
        self.inner.status.borrow().connected
    }

    /// Delivers a decoded inbound message.
    pub fn deliver(&self, message: Inbound) {
        self.inner.inbound.publish(message);
    }

    /// Delivers an `app-event` message.
    pub fn deliver_event(&self, event: AppEvent) {
        self.deliver(Inbound::App(event));
    }

    /// Delivers a raw wire frame, decoding it the way a real connection
    /// would. Returns false if the frame was dropped.
    pub fn deliver_raw(&self, text: &str) -> bool {
        match ServerFrame::decode(text) {
            Ok(ServerFrame::Message(message)) => {
                self.deliver(message);
                true
            }
            Ok(ServerFrame::Ack(id)) => {
                debug!(ack_id = id, "mock transport ignores raw ack frames");
                true
            }
            Err(e) => {
                self.inner.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, "dropping undecodable inbound frame");
                false
            }
        }
    }

    /// Returns every message sent so far.
    pub fn sent(&self) -> Vec<Outbound> {
        self.inner.sent.lock().clone()
    }

    /// Returns the domain events sent so far.
    pub fn sent_events(&self) -> Vec<AppEvent> {
        self.inner
            .sent
            .lock()
            .iter()
            .filter_map(|m| match m {
                Outbound::App(event) => Some(event.clone()),
                Outbound::Auth(_) => None,
            })
            .collect()
    }

    /// Forgets recorded sends.
    pub fn clear_sent(&self) {
        self.inner.sent.lock().clear();
    }

    /// Number of receipt callbacks not yet fired.
    pub fn pending_acks(&self) -> usize {
        self.inner.acks.lock().len()
    }

    /// Fires the oldest held receipt. Returns false if none is held.
    pub fn ack_next(&self) -> bool {
        let callback = {
            let mut acks = self.inner.acks.lock();
            if acks.is_empty() {
                None
            } else {
                Some(acks.remove(0))
            }
        };
        match callback {
            Some(callback) => {
                callback();
                true
            }
            None => false,
        }
    }

    /// Fires every held receipt in send order and returns how many.
    pub fn ack_all(&self) -> usize {
        let callbacks: Vec<AckCallback> = self.inner.acks.lock().drain(..).collect();
        let count = callbacks.len();
        for callback in callbacks {
            callback();
        }
        count
    }

    /// Discards held receipts without firing them.
    pub fn drop_pending_acks(&self) -> usize {
        self.inner.acks.lock().drain(..).count()
    }
}

impl SyncTransport for MockTransport {
    fn connection_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.inner.status.subscribe()
    }

    fn subscribe_inbound(&self) -> mpsc::UnboundedReceiver<Inbound> {
        self.inner.inbound.subscribe()
    }

    fn send(&self, message: Outbound, on_ack: Option<AckCallback>) -> SyncResult<()> {
        if !self.is_connected() {
            return Err(SyncError::NotConnected);
        }
        self.inner.sent.lock().push(message);
        if let Some(callback) = on_ack {
            self.inner.acks.lock().push(callback);
        }
        Ok(())
    }

    fn dropped_messages(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }
}
