//! LiveChannel: connection driver, subscriptions, and event dispatch.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};

use crate::{
    domain::{
        ChannelEvent, ConnectionState, ConnectionStatus, Effect, LiveEvent, ReconnectPolicy,
        RoomId,
    },
    error::ClientError,
    infrastructure::dto::websocket::SubscriptionMessage,
    session::SessionManager,
};

use super::{
    connector::{EventConnector, LiveConnection},
    handlers::EventHandlers,
};

/// How long `disconnect` waits for the driver to close the socket before aborting it
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Why the channel is being torn down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The session ended; subscriptions are forgotten
    Logout,
    /// The consumer went away for now; subscriptions survive for the next connect
    Unmount,
}

/// Persistent connection to the event source.
///
/// Owned by the client context and shared by reference (clones share the same
/// channel). Only the channel mutates its subscription set.
#[derive(Clone)]
pub struct LiveChannel {
    inner: Arc<Inner>,
}

struct Inner {
    connector: Arc<dyn EventConnector>,
    session: SessionManager,
    handlers: EventHandlers,
    shared: Mutex<Shared>,
    status_tx: watch::Sender<ConnectionStatus>,
}

struct Shared {
    conn: ConnectionState,
    /// Bumped whenever a driver is replaced or stopped; stale drivers compare
    /// against it and leave the state alone.
    generation: u64,
    /// Outbound frames for the current connection, set only while connected
    outbound: Option<mpsc::UnboundedSender<String>>,
    driver: Option<Driver>,
    /// Token given to the last `connect`, used when the session has none and
    /// its epoch is still `fallback_epoch`
    fallback_token: Option<String>,
    fallback_epoch: u64,
    last_error: Option<ClientError>,
}

struct Driver {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

enum PumpExit {
    Shutdown,
    Lost(ClientError),
    SessionEnded,
}

impl LiveChannel {
    pub fn new(
        connector: Arc<dyn EventConnector>,
        session: SessionManager,
        handlers: EventHandlers,
    ) -> Self {
        Self::with_policy(connector, session, handlers, ReconnectPolicy::default())
    }

    pub fn with_policy(
        connector: Arc<dyn EventConnector>,
        session: SessionManager,
        handlers: EventHandlers,
        policy: ReconnectPolicy,
    ) -> Self {
        let (status_tx, _) = watch::channel(ConnectionStatus::Disconnected);
        Self {
            inner: Arc::new(Inner {
                connector,
                session,
                handlers,
                shared: Mutex::new(Shared {
                    conn: ConnectionState::new(policy),
                    generation: 0,
                    outbound: None,
                    driver: None,
                    fallback_token: None,
                    fallback_epoch: 0,
                    last_error: None,
                }),
                status_tx,
            }),
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.inner.lock().conn.status
    }

    /// Receiver that observes every status change
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.inner.status_tx.subscribe()
    }

    /// Snapshot of the connection state
    pub fn state(&self) -> ConnectionState {
        self.inner.lock().conn.clone()
    }

    /// Recorded subscriptions, in order
    pub fn subscriptions(&self) -> Vec<RoomId> {
        self.inner.lock().conn.subscriptions.iter().cloned().collect()
    }

    /// Last connectivity error, cleared on the next successful handshake
    pub fn last_error(&self) -> Option<ClientError> {
        self.inner.lock().last_error.clone()
    }

    /// Wait until the channel reports `status`
    pub async fn wait_for_status(&self, status: ConnectionStatus) {
        let mut rx = self.watch_status();
        // the sender lives in `inner`, which we hold, so this cannot fail
        let _ = rx.wait_for(|current| *current == status).await;
    }

    /// Start connecting with `token`.
    ///
    /// A missing or empty token fails immediately with
    /// [`ClientError::MissingToken`] and nothing is attempted. While connecting
    /// or connected this is a no-op; from `Reconnecting` or `Exhausted` the
    /// attempt counter is reset and a fresh connection is started.
    pub fn connect(&self, token: Option<&str>) -> Result<(), ClientError> {
        let token = token
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or(ClientError::MissingToken)?;
        let session_epoch = self.inner.session.epoch();

        let previous = {
            let mut shared = self.inner.lock();
            match shared.conn.apply(ChannelEvent::Connect) {
                Effect::OpenHandshake => {}
                _ => {
                    tracing::debug!("connect ignored while {}", shared.conn.status);
                    return Ok(());
                }
            }

            shared.fallback_token = Some(token.to_string());
            shared.fallback_epoch = session_epoch;
            shared.outbound = None;
            shared.generation += 1;
            let generation = shared.generation;
            let previous = shared.driver.take();

            let (shutdown, shutdown_rx) = watch::channel(false);
            let task = tokio::spawn(run_driver(Arc::clone(&self.inner), generation, shutdown_rx));
            shared.driver = Some(Driver { shutdown, task });
            self.inner.publish(&shared);
            tracing::info!("Live channel connecting (generation {})", generation);
            previous
        };

        if let Some(previous) = previous {
            previous.shutdown.send_replace(true);
            previous.task.abort();
        }
        Ok(())
    }

    /// Record `room`; sent right away when connected, otherwise on the next connect.
    ///
    /// From `Disconnected` or `Exhausted` this starts connecting with the
    /// session's token; while connecting the replay covers it.
    pub fn subscribe(&self, room: RoomId) {
        let status = {
            let mut shared = self.inner.lock();
            if !shared.conn.add_subscription(room.clone()) {
                tracing::debug!("Already subscribed to {}", room);
                return;
            }
            tracing::debug!("Subscribed to {}", room);
            if shared.conn.status == ConnectionStatus::Connected {
                shared.send(SubscriptionMessage::subscribe(room));
            }
            shared.conn.status
        };
        self.connect_if_idle(status);
    }

    /// Forget `room`; mirrors [`LiveChannel::subscribe`]
    pub fn unsubscribe(&self, room: &RoomId) {
        let status = {
            let mut shared = self.inner.lock();
            if !shared.conn.remove_subscription(room) {
                tracing::debug!("Not subscribed to {}", room);
                return;
            }
            tracing::debug!("Unsubscribed from {}", room);
            if shared.conn.status == ConnectionStatus::Connected {
                shared.send(SubscriptionMessage::unsubscribe(room.clone()));
            }
            shared.conn.status
        };
        self.connect_if_idle(status);
    }

    /// Tear the channel down.
    ///
    /// Cancels any pending reconnect timer and closes the connection. Only a
    /// [`DisconnectReason::Logout`] clears the subscriptions.
    pub async fn disconnect(&self, reason: DisconnectReason) {
        let driver = {
            let mut shared = self.inner.lock();
            shared.conn.apply(ChannelEvent::Disconnect);
            shared.generation += 1;
            shared.outbound = None;
            if reason == DisconnectReason::Logout {
                shared.conn.subscriptions.clear();
                shared.fallback_token = None;
                shared.last_error = None;
            }
            self.inner.publish(&shared);
            shared.driver.take()
        };
        tracing::info!("Live channel disconnected ({:?})", reason);

        if let Some(Driver { shutdown, mut task }) = driver {
            shutdown.send_replace(true);
            if tokio::time::timeout(CLOSE_GRACE, &mut task).await.is_err() {
                tracing::debug!("Live channel driver did not stop in time, aborting");
                task.abort();
            }
        }
    }

    fn connect_if_idle(&self, status: ConnectionStatus) {
        if !matches!(
            status,
            ConnectionStatus::Disconnected | ConnectionStatus::Exhausted
        ) {
            return;
        }
        let token = self.inner.session.get_token();
        if let Err(e) = self.connect(token.as_deref()) {
            tracing::warn!("Cannot start live channel: {}", e);
        }
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, shared: &Shared) {
        self.status_tx.send_replace(shared.conn.status);
    }

    /// Token for the next handshake: the session's current token, else the
    /// last one given to `connect` as long as the session has not changed since
    fn handshake_token(&self, generation: u64) -> Option<String> {
        if let Some(token) = self.session.get_token() {
            return Some(token);
        }
        let epoch = self.session.epoch();
        let shared = self.lock();
        if shared.generation != generation || shared.fallback_epoch != epoch {
            return None;
        }
        shared.fallback_token.clone()
    }

    /// The session ended under this driver: stop and forget its rooms
    fn end_session(&self, generation: u64) {
        let mut shared = self.lock();
        if shared.generation != generation {
            return;
        }
        shared.conn.apply(ChannelEvent::Disconnect);
        shared.conn.subscriptions.clear();
        shared.generation += 1;
        shared.outbound = None;
        shared.fallback_token = None;
        shared.driver = None;
        shared.last_error = Some(ClientError::AuthInvalid("session ended".to_string()));
        self.publish(&shared);
    }

    /// Apply `event` if `generation` is still current
    fn transition(&self, generation: u64, event: ChannelEvent) -> Option<Effect> {
        let mut shared = self.lock();
        if shared.generation != generation {
            return None;
        }
        let effect = shared.conn.apply(event);
        if let Effect::GiveUp { attempts } = effect {
            shared.last_error = Some(ClientError::ConnectionExhausted { attempts });
        }
        self.publish(&shared);
        Some(effect)
    }

    /// Mark the handshake done; returns the rooms to replay
    fn on_connected(
        &self,
        generation: u64,
        outbound: mpsc::UnboundedSender<String>,
    ) -> Option<Vec<RoomId>> {
        let mut shared = self.lock();
        if shared.generation != generation {
            return None;
        }
        if shared.conn.apply(ChannelEvent::HandshakeSucceeded) != Effect::ReplaySubscriptions {
            return None;
        }
        shared.outbound = Some(outbound);
        shared.last_error = None;
        self.publish(&shared);
        Some(shared.conn.subscriptions.iter().cloned().collect())
    }

    fn on_transport_lost(&self, generation: u64, error: ClientError) -> Option<Effect> {
        {
            let mut shared = self.lock();
            if shared.generation != generation {
                return None;
            }
            shared.outbound = None;
            shared.last_error = Some(error);
        }
        self.transition(generation, ChannelEvent::TransportLost)
    }

    fn dispatch(&self, text: &str) {
        match serde_json::from_str::<LiveEvent>(text) {
            Ok(event) => {
                tracing::trace!("Live event {}", event.name());
                if !self.handlers.dispatch(&event) {
                    tracing::debug!("No handler for {} event", event.name());
                }
            }
            Err(e) => tracing::warn!("Dropping unrecognized live frame ({}): {}", e, text),
        }
    }

    async fn pump(
        &self,
        mut connection: LiveConnection,
        replay: Vec<RoomId>,
        mut outbound: mpsc::UnboundedReceiver<String>,
        shutdown: &mut watch::Receiver<bool>,
        session_epoch: &mut watch::Receiver<u64>,
    ) -> PumpExit {
        for room in replay {
            let frame = match SubscriptionMessage::subscribe(room).to_json() {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::error!("Failed to encode subscription: {}", e);
                    continue;
                }
            };
            if let Err(e) = connection.sink.send_text(frame).await {
                return PumpExit::Lost(e);
            }
        }

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    connection.sink.close().await;
                    return PumpExit::Shutdown;
                }
                Ok(()) = session_epoch.changed() => {
                    if self.session.get_token().is_none() {
                        connection.sink.close().await;
                        return PumpExit::SessionEnded;
                    }
                }
                Some(frame) = outbound.recv() => {
                    if let Err(e) = connection.sink.send_text(frame).await {
                        return PumpExit::Lost(e);
                    }
                }
                frame = connection.stream.next_text() => match frame {
                    Some(Ok(text)) => self.dispatch(&text),
                    Some(Err(e)) => return PumpExit::Lost(e),
                    None => {
                        return PumpExit::Lost(ClientError::NetworkUnavailable(
                            "connection closed by server".to_string(),
                        ));
                    }
                },
            }
        }
    }
}

impl Shared {
    fn send(&self, message: SubscriptionMessage) {
        let Some(outbound) = &self.outbound else {
            return;
        };
        match message.to_json() {
            // a closed receiver means the connection just dropped; the replay covers it
            Ok(frame) => {
                let _ = outbound.send(frame);
            }
            Err(e) => tracing::error!("Failed to encode subscription: {}", e),
        }
    }
}

/// One driver per `connect`: handshake, pump, back off, repeat
async fn run_driver(inner: Arc<Inner>, generation: u64, mut shutdown: watch::Receiver<bool>) {
    let mut session_epoch = inner.session.watch_epoch();
    loop {
        let effect = match inner.handshake_token(generation) {
            None => {
                tracing::warn!("No access token for live channel handshake, stopping");
                inner.end_session(generation);
                return;
            }
            Some(token) => {
                let attempt = tokio::select! {
                    _ = shutdown.changed() => return,
                    attempt = inner.connector.connect(&token) => attempt,
                };
                match attempt {
                    Ok(connection) => {
                        let (tx, rx) = mpsc::unbounded_channel();
                        let Some(replay) = inner.on_connected(generation, tx) else {
                            return;
                        };
                        tracing::info!(
                            "Live channel connected, replaying {} subscriptions",
                            replay.len()
                        );
                        let exit = inner
                            .pump(connection, replay, rx, &mut shutdown, &mut session_epoch)
                            .await;
                        match exit {
                            PumpExit::Shutdown => return,
                            PumpExit::SessionEnded => {
                                tracing::info!("Session ended, closing live channel");
                                inner.end_session(generation);
                                return;
                            }
                            PumpExit::Lost(e) => {
                                tracing::warn!("Live channel lost: {}", e);
                                inner.on_transport_lost(generation, e)
                            }
                        }
                    }
                    Err(e) => {
                        tracing::warn!("Live channel handshake failed: {}", e);
                        {
                            let mut shared = inner.lock();
                            if shared.generation == generation {
                                shared.last_error = Some(e);
                            }
                        }
                        inner.transition(generation, ChannelEvent::HandshakeFailed)
                    }
                }
            }
        };

        match effect {
            Some(Effect::ScheduleRetry { attempt, delay }) => {
                tracing::info!(
                    "Reconnecting in {} ms (attempt {})",
                    delay.as_millis(),
                    attempt
                );
                tokio::select! {
                    _ = shutdown.changed() => return,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            Some(Effect::GiveUp { attempts }) => {
                tracing::error!(
                    "Live channel gave up after {} reconnect attempts",
                    attempts
                );
                return;
            }
            _ => return,
        }
    }
}
