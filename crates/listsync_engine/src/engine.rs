//! The sync engine actor.
//!
//! All log and state mutation happens on one task. Handle commands,
//! connectivity changes, inbound messages and transport receipts are
//! funneled into it through channels and processed one at a time.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::state::{LoginState, PublishedState, SyncStats, SyncStatus};
use crate::transport::{AckCallback, ConnectionStatus, SyncTransport};
use listsync_log::{EventLog, Source, StoredEvent, Timestamp};
use listsync_protocol::{
    fold, fold_all, AppEvent, AuthRequest, AuthResponse, Inbound, Outbound, ShoppingList,
};
use parking_lot::RwLock;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

enum Command {
    Dispatch {
        event: AppEvent,
        reply: oneshot::Sender<SyncResult<()>>,
    },
    Auth {
        request: AuthRequest,
        reply: oneshot::Sender<SyncResult<()>>,
    },
    Settle(oneshot::Sender<()>),
    Shutdown,
}

/// Cloneable handle to a running [`SyncEngine`].
#[derive(Clone)]
pub struct SyncHandle {
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<PublishedState>,
    stats: Arc<RwLock<SyncStats>>,
    transport: Arc<dyn SyncTransport>,
}

impl std::fmt::Debug for SyncHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncHandle")
            .field("state", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}

impl SyncHandle {
    /// Applies a locally issued event.
    ///
    /// The event is persisted as `Local`, folded into the published state
    /// and, when the engine is past `Offline`, sent to the server.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidCommand`] for snapshots, which only the
    /// server may issue, and [`SyncError::Storage`] if the event could not
    /// be persisted; in that case nothing was applied or sent.
    pub async fn dispatch(&self, event: AppEvent) -> SyncResult<()> {
        if event.is_snapshot() {
            return Err(SyncError::InvalidCommand(
                "lists.init can only come from the server".into(),
            ));
        }
        let (reply, response) = oneshot::channel();
        self.request(Command::Dispatch { event, reply }).await?;
        response.await.map_err(|_| SyncError::EngineStopped)?
    }

    /// Asks the server to mail a login code to `email`.
    pub async fn email_login(&self, email: impl Into<String>) -> SyncResult<()> {
        self.auth(AuthRequest::EmailLogin {
            email: email.into(),
        })
        .await
    }

    /// Exchanges a mailed code for a session.
    pub async fn code_login(
        &self,
        email: impl Into<String>,
        code: impl Into<String>,
    ) -> SyncResult<()> {
        self.auth(AuthRequest::EmailCodeValidation {
            email: email.into(),
            code: code.into(),
        })
        .await
    }

    async fn auth(&self, request: AuthRequest) -> SyncResult<()> {
        let (reply, response) = oneshot::channel();
        self.request(Command::Auth { request, reply }).await?;
        response.await.map_err(|_| SyncError::EngineStopped)?
    }

    /// Waits until the engine has processed everything queued before this
    /// call.
    pub async fn settle(&self) -> SyncResult<()> {
        let (reply, response) = oneshot::channel();
        self.request(Command::Settle(reply)).await?;
        response.await.map_err(|_| SyncError::EngineStopped)
    }

    /// Stops the engine after the commands already queued.
    pub async fn shutdown(&self) -> SyncResult<()> {
        self.request(Command::Shutdown).await
    }

    /// Returns the latest published state.
    pub fn state(&self) -> PublishedState {
        self.state.borrow().clone()
    }

    /// Returns a receiver that sees every published state change.
    pub fn subscribe(&self) -> watch::Receiver<PublishedState> {
        self.state.clone()
    }

    /// Waits until the published state satisfies `predicate`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Timeout`] if `timeout` elapses first and
    /// [`SyncError::EngineStopped`] if the engine exits.
    pub async fn wait_for<F>(&self, timeout: Duration, mut predicate: F) -> SyncResult<PublishedState>
    where
        F: FnMut(&PublishedState) -> bool,
    {
        let mut state = self.state.clone();
        let outcome = match tokio::time::timeout(timeout, state.wait_for(|s| predicate(s))).await
        {
            Ok(Ok(current)) => Ok(current.clone()),
            Ok(Err(_)) => Err(SyncError::EngineStopped),
            Err(_) => Err(SyncError::Timeout),
        };
        outcome
    }

    /// Returns the current stats.
    pub fn stats(&self) -> SyncStats {
        let mut stats = self.stats.read().clone();
        stats.decode_drops = self.transport.dropped_messages();
        stats
    }

    async fn request(&self, command: Command) -> SyncResult<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| SyncError::EngineStopped)
    }
}

/// The sync engine owns the event log, the derived list state and the sync
/// status machine.
///
/// Construct it with [`SyncEngine::new`], then drive it with
/// [`SyncEngine::run`] or [`SyncEngine::spawn`].
pub struct SyncEngine<T: SyncTransport> {
    core: EngineCore<T>,
    commands: mpsc::Receiver<Command>,
    acks: mpsc::UnboundedReceiver<Timestamp>,
}

struct EngineCore<T: SyncTransport> {
    transport: Arc<T>,
    log: EventLog,
    lists: Vec<ShoppingList>,
    status: SyncStatus,
    connected: bool,
    /// Transport session the engine last saw connect.
    session: u64,
    login: LoginState,
    session_token: Option<String>,
    /// Token-login already sent on this connection.
    announced: bool,
    in_flight: BTreeSet<Timestamp>,
    stats: Arc<RwLock<SyncStats>>,
    state_tx: watch::Sender<PublishedState>,
    acks_tx: mpsc::UnboundedSender<Timestamp>,
}

impl<T: SyncTransport> SyncEngine<T> {
    /// Creates an engine over `log`, rebuilding and publishing state from
    /// it before any connection exists.
    pub fn new(config: SyncConfig, log: EventLog, transport: T) -> (Self, SyncHandle) {
        let transport = Arc::new(transport);
        let lists = log.rebuild_state();
        let initial = PublishedState {
            lists: lists.clone(),
            pending: log.pending_count(),
            ..PublishedState::default()
        };
        info!(
            records = log.len(),
            pending = log.pending().len(),
            lists = lists.len(),
            "sync engine restored state from log"
        );

        let (state_tx, state_rx) = watch::channel(initial);
        let (commands_tx, commands) = mpsc::channel(config.mailbox_capacity.max(1));
        let (acks_tx, acks) = mpsc::unbounded_channel();
        let stats = Arc::new(RwLock::new(SyncStats::default()));

        let handle = SyncHandle {
            commands: commands_tx,
            state: state_rx,
            stats: stats.clone(),
            transport: transport.clone(),
        };
        let core = EngineCore {
            transport,
            log,
            lists,
            status: SyncStatus::Offline,
            connected: false,
            session: 0,
            login: LoginState::LoggedOut,
            session_token: config.session_token,
            announced: false,
            in_flight: BTreeSet::new(),
            stats,
            state_tx,
            acks_tx,
        };

        (
            Self {
                core,
                commands,
                acks,
            },
            handle,
        )
    }

    /// Runs the engine on a new Tokio task.
    pub fn spawn(self) -> JoinHandle<SyncResult<()>> {
        tokio::spawn(self.run())
    }

    /// Processes events until shutdown, until every handle is dropped, or
    /// until the log and engine state can no longer be trusted.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvariantViolation`] if the log contradicts the
    /// engine's bookkeeping.
    pub async fn run(self) -> SyncResult<()> {
        let SyncEngine {
            mut core,
            mut commands,
            mut acks,
        } = self;

        let mut status_rx = Some(core.transport.connection_status());
        let mut inbound_rx = Some(core.transport.subscribe_inbound());
        if let Some(rx) = status_rx.as_mut() {
            let status = *rx.borrow_and_update();
            core.on_connection_changed(status);
        }

        let result = loop {
            tokio::select! {
                biased;

                status = next_status(&mut status_rx) => match status {
                    Some(status) => core.on_connection_changed(status),
                    None => {
                        warn!("transport connection stream closed");
                        status_rx = None;
                        core.go_offline();
                        core.publish();
                    }
                },
                inbound = next_inbound(&mut inbound_rx) => match inbound {
                    Some(message) => core.on_inbound(message),
                    None => {
                        warn!("transport inbound stream closed");
                        inbound_rx = None;
                    }
                },
                Some(timestamp) = acks.recv() => {
                    if let Err(e) = core.on_ack(timestamp) {
                        break Err(e);
                    }
                }
                command = commands.recv() => match command {
                    Some(Command::Shutdown) | None => break Ok(()),
                    Some(command) => core.on_command(command),
                },
            }
        };

        match &result {
            Ok(()) => info!("sync engine stopped"),
            Err(e) => error!(error = %e, "sync engine halted"),
        }
        result
    }
}

async fn next_status(
    rx: &mut Option<watch::Receiver<ConnectionStatus>>,
) -> Option<ConnectionStatus> {
    match rx {
        Some(rx) => match rx.changed().await {
            Ok(()) => Some(*rx.borrow_and_update()),
            Err(_) => None,
        },
        None => std::future::pending().await,
    }
}

async fn next_inbound(rx: &mut Option<mpsc::UnboundedReceiver<Inbound>>) -> Option<Inbound> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

impl<T: SyncTransport> EngineCore<T> {
    fn on_command(&mut self, command: Command) {
        match command {
            Command::Dispatch { event, reply } => {
                let result = self.dispatch(event);
                let _ = reply.send(result);
            }
            Command::Auth { request, reply } => {
                let result = self.send_auth(request);
                let _ = reply.send(result);
            }
            Command::Settle(reply) => {
                let _ = reply.send(());
            }
            Command::Shutdown => {}
        }
    }

    fn dispatch(&mut self, event: AppEvent) -> SyncResult<()> {
        if event.is_snapshot() {
            return Err(SyncError::InvalidCommand(
                "lists.init can only come from the server".into(),
            ));
        }

        let record = self.log.record(event, Source::Local).map_err(|e| {
            error!(error = %e, "could not persist local event");
            self.stats.write().last_error = Some(e.to_string());
            SyncError::from(e)
        })?;
        self.stats.write().events_dispatched += 1;
        debug!(
            timestamp = %record.timestamp,
            action = record.event.action(),
            status = %self.status,
            "dispatched local event"
        );

        if self.status.sends_immediately() {
            self.send_record(&record);
        }
        self.lists = fold(std::mem::take(&mut self.lists), &record.event);
        self.publish();
        Ok(())
    }

    fn send_auth(&mut self, request: AuthRequest) -> SyncResult<()> {
        if !self.connected {
            return Err(SyncError::NotConnected);
        }
        self.transport.send(Outbound::Auth(request), None)?;
        self.login = LoginState::LoggingIn;
        self.publish();
        Ok(())
    }

    /// Sends a local record and tracks it until its receipt arrives.
    fn send_record(&mut self, record: &StoredEvent) {
        let acks = self.acks_tx.clone();
        let timestamp = record.timestamp;
        let on_ack: AckCallback = Box::new(move || {
            let _ = acks.send(timestamp);
        });

        match self
            .transport
            .send(Outbound::App(record.event.clone()), Some(on_ack))
        {
            Ok(()) => {
                self.in_flight.insert(timestamp);
                self.stats.write().events_sent += 1;
            }
            Err(e) => {
                debug!(%timestamp, error = %e, "send failed; record stays queued");
            }
        }
    }

    fn on_connection_changed(&mut self, status: ConnectionStatus) {
        if status.connected {
            if self.connected && status.session == self.session {
                return;
            }
            if self.connected {
                // Dropped and reconnected between two observations.
                info!(session = status.session, "transport reconnected");
                self.go_offline();
            }
            info!(session = status.session, "transport connected; waiting for snapshot");
            self.session = status.session;
            self.connected = true;
        } else {
            self.go_offline();
        }
        self.publish();
    }

    /// Forgets everything tied to the current connection.
    fn go_offline(&mut self) {
        if self.connected {
            info!(previous = %self.status, in_flight = self.in_flight.len(), "transport disconnected");
        }
        self.connected = false;
        self.status = SyncStatus::Offline;
        self.announced = false;
        self.in_flight.clear();
        self.login = LoginState::LoggedOut;
    }

    fn on_inbound(&mut self, message: Inbound) {
        match message {
            Inbound::App(AppEvent::ListsInit { lists }) => self.on_snapshot(lists),
            Inbound::App(event) => self.on_remote_event(event),
            Inbound::Auth(response) => self.on_auth_response(response),
        }
    }

    fn on_snapshot(&mut self, snapshot: Vec<ShoppingList>) {
        if let Err(e) = self.store_snapshot(&snapshot) {
            error!(error = %e, "could not persist snapshot; restoring state from log");
            self.stats.write().last_error = Some(e.to_string());
            self.lists = self.log.rebuild_state();
            self.publish();
            return;
        }

        let pending = self.log.pending();
        self.lists = fold_all(snapshot, pending.iter().map(|r| &r.event));
        self.stats.write().snapshots_applied += 1;

        if self.status == SyncStatus::Offline {
            info!(pending = pending.len(), "snapshot received; sending stored events");
            self.status = SyncStatus::SendingStoredEvents;
            self.in_flight.clear();
            for record in &pending {
                self.send_record(record);
            }
            if self.in_flight.is_empty() && pending.is_empty() {
                self.go_online();
            }
        } else {
            debug!(status = %self.status, "snapshot applied without resend");
        }
        self.publish();
    }

    fn store_snapshot(&mut self, snapshot: &[ShoppingList]) -> SyncResult<()> {
        let purged = self
            .log
            .delete_all_matching(|r| r.source == Source::Remote || r.event.is_snapshot())?;
        debug!(purged, "purged records superseded by snapshot");
        self.log.record(
            AppEvent::ListsInit {
                lists: snapshot.to_vec(),
            },
            Source::Remote,
        )?;
        Ok(())
    }

    fn on_remote_event(&mut self, event: AppEvent) {
        match self.log.record(event, Source::Remote) {
            Ok(record) => {
                debug!(action = record.event.action(), "applied remote event");
                self.lists = fold(std::mem::take(&mut self.lists), &record.event);
                self.stats.write().remote_events_applied += 1;
                self.publish();
            }
            Err(e) => {
                error!(error = %e, "could not persist remote event; dropping it");
                self.stats.write().last_error = Some(e.to_string());
            }
        }
    }

    fn on_auth_response(&mut self, response: AuthResponse) {
        match response {
            AuthResponse::Challenge => {
                if self.announced {
                    debug!("repeated challenge on this connection ignored");
                    return;
                }
                let Some(token) = self.session_token.clone() else {
                    debug!("challenge received without a session token");
                    return;
                };
                match self.transport.send(
                    Outbound::Auth(AuthRequest::TokenLogin {
                        session_token: token,
                    }),
                    None,
                ) {
                    Ok(()) => {
                        self.announced = true;
                        self.login = LoginState::LoggingIn;
                        info!("announced session on new connection");
                    }
                    Err(e) => warn!(error = %e, "could not announce session"),
                }
            }
            AuthResponse::EmailLoginResponse { success } => {
                info!(success, "email login response");
                if !success {
                    self.login = LoginState::LoggedOut;
                }
            }
            AuthResponse::EmailCodeResponse {
                success,
                session_token,
            } => {
                info!(success, "email code response");
                if success {
                    if let Some(token) = session_token {
                        self.session_token = Some(token);
                    }
                    self.login = LoginState::LoggedIn;
                } else {
                    self.login = LoginState::LoggedOut;
                }
            }
            AuthResponse::TokenLoginResponse { success } => {
                if success {
                    info!("session accepted");
                    self.login = LoginState::LoggedIn;
                } else {
                    warn!("session token rejected");
                    self.session_token = None;
                    self.login = LoginState::LoggedOut;
                }
            }
        }
        self.publish();
    }

    fn on_ack(&mut self, timestamp: Timestamp) -> SyncResult<()> {
        let matching = self
            .log
            .query_matching(|r| r.timestamp == timestamp && r.source == Source::Local)
            .len();

        match matching {
            0 => {
                warn!(%timestamp, "late acknowledgment; record already retired");
                self.stats.write().late_acks += 1;
            }
            1 => match self.log.mark_acknowledged(timestamp) {
                Ok(_) => {
                    debug!(%timestamp, "record acknowledged");
                    self.stats.write().events_acked += 1;
                }
                Err(e) => {
                    error!(%timestamp, error = %e, "could not retire acknowledged record");
                    self.stats.write().last_error = Some(e.to_string());
                }
            },
            n => {
                return Err(SyncError::InvariantViolation(format!(
                    "{n} local records share timestamp {timestamp}"
                )));
            }
        }

        self.in_flight.remove(&timestamp);
        if self.status == SyncStatus::SendingStoredEvents && self.in_flight.is_empty() {
            self.go_online();
            self.publish();
        }
        Ok(())
    }

    fn go_online(&mut self) {
        info!("outbox drained; online");
        self.status = SyncStatus::Online;
    }

    fn publish(&self) {
        let next = PublishedState {
            lists: self.lists.clone(),
            status: self.status,
            connected: self.connected,
            login: self.login,
            pending: self.log.pending_count(),
        };
        self.state_tx.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }
}
