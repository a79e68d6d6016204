//! Access/refresh token lifecycle.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use futures_util::future::{BoxFuture, FutureExt, Shared};
use pipedeck_shared::time::Clock;
use tokio::sync::watch;

use crate::{
    domain::{LogoutMarker, PersistedSession, TokenPair, is_expired_at},
    error::ClientError,
};

use super::{auth_api::AuthApi, store::SessionStore};

type SharedRefresh = Shared<BoxFuture<'static, Result<TokenPair, ClientError>>>;

/// Owns the token pair.
///
/// Only this type writes the pair; the gateway and the live channel read it
/// through [`SessionManager::get_token`]. Cloning is cheap and every clone
/// shares the same session.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

struct Inner {
    auth: Arc<dyn AuthApi>,
    store: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    state: Mutex<SessionState>,
    epoch_tx: watch::Sender<u64>,
}

#[derive(Default)]
struct SessionState {
    tokens: TokenPair,
    /// Bumped on every login and logout; a refresh started under an older
    /// epoch must not touch the state when it resolves.
    epoch: u64,
    in_flight: Option<SharedRefresh>,
}

impl SessionManager {
    pub fn new(
        auth: Arc<dyn AuthApi>,
        store: Arc<dyn SessionStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                auth,
                store,
                clock,
                state: Mutex::new(SessionState::default()),
                epoch_tx: watch::channel(0).0,
            }),
        }
    }

    /// Current access token, if any
    pub fn get_token(&self) -> Option<String> {
        self.inner.lock().tokens.access_token.clone()
    }

    /// Snapshot of the whole token pair
    pub fn tokens(&self) -> TokenPair {
        self.inner.lock().tokens.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.lock().tokens.is_authenticated()
    }

    /// Current session epoch
    pub fn epoch(&self) -> u64 {
        self.inner.lock().epoch
    }

    /// Receiver notified whenever the session is established, restored or cleared
    pub fn watch_epoch(&self) -> watch::Receiver<u64> {
        self.inner.epoch_tx.subscribe()
    }

    /// Whether `token` is expired now. Undecodable tokens count as expired.
    pub fn is_expired(&self, token: &str) -> bool {
        is_expired_at(token, self.inner.clock.now_secs())
    }

    /// Install a freshly issued pair (login or registration) and persist it
    pub fn set_tokens(&self, tokens: TokenPair) {
        let mut state = self.inner.lock();
        self.inner.catch_up_with_marker(&mut state);
        state.epoch += 1;
        state.in_flight = None;
        state.tokens = tokens;
        self.inner.persist(&state);
        self.inner.epoch_tx.send_replace(state.epoch);
        tracing::info!("Session established (epoch {})", state.epoch);
    }

    /// Exchange the refresh token for a new pair.
    ///
    /// Single-flight: callers arriving while an exchange is running await that
    /// same exchange, so the refresh token is redeemed once.
    ///
    /// A rejected exchange clears the session and returns
    /// [`ClientError::AuthInvalid`]. An unreachable server returns
    /// [`ClientError::NetworkUnavailable`] and leaves the session as it is.
    pub async fn refresh(&self) -> Result<TokenPair, ClientError> {
        let refresh = match self.join_or_start_refresh() {
            Ok(refresh) => refresh,
            Err(e) => {
                tracing::warn!("Cannot refresh session: {}", e);
                self.clear();
                return Err(e);
            }
        };
        refresh.await
    }

    /// Null the token pair and record a logout marker under a new epoch
    pub fn clear(&self) {
        let mut state = self.inner.lock();
        self.inner.clear_locked(&mut state);
    }

    /// Restore a persisted session at process start.
    ///
    /// A session written before the latest logout marker is discarded.
    /// Returns whether a session was restored.
    pub fn restore(&self) -> Result<bool, ClientError> {
        let marker = self.inner.store.load_marker()?;
        let persisted = self.inner.store.load_session()?;

        let marker_epoch = marker.map(|m| m.epoch).unwrap_or(0);
        let mut state = self.inner.lock();
        state.epoch = state.epoch.max(marker_epoch);

        match persisted {
            Some(session)
                if session.is_current(marker.as_ref()) && session.tokens.is_authenticated() =>
            {
                state.epoch = state.epoch.max(session.epoch);
                state.tokens = session.tokens;
                self.inner.epoch_tx.send_replace(state.epoch);
                tracing::info!("Restored session (epoch {})", state.epoch);
                Ok(true)
            }
            Some(session) => {
                tracing::info!(
                    "Discarding stale session from epoch {} (logout epoch {})",
                    session.epoch,
                    marker_epoch
                );
                drop(state);
                self.inner.store.clear_session()?;
                Ok(false)
            }
            None => Ok(false),
        }
    }

    /// Whether a logout happened within the last 30 minutes.
    ///
    /// Hosts use this to hold back automatic sign-in with remembered credentials.
    pub fn recently_logged_out(&self) -> bool {
        match self.inner.store.load_marker() {
            Ok(Some(marker)) => marker.is_fresh(self.inner.clock.now_millis()),
            Ok(None) => false,
            Err(e) => {
                tracing::warn!("Failed to read logout marker: {}", e);
                false
            }
        }
    }

    fn join_or_start_refresh(&self) -> Result<SharedRefresh, ClientError> {
        let mut state = self.inner.lock();
        if let Some(in_flight) = &state.in_flight {
            tracing::debug!("Joining in-flight token refresh");
            return Ok(in_flight.clone());
        }

        let refresh_token = state
            .tokens
            .refresh_token
            .clone()
            .ok_or_else(|| ClientError::AuthInvalid("no refresh token".to_string()))?;

        let epoch = state.epoch;
        let auth = Arc::clone(&self.inner.auth);
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let refresh = async move {
            tracing::debug!("Refreshing access token (epoch {})", epoch);
            let result = auth.refresh(&refresh_token).await;
            match weak.upgrade() {
                Some(inner) => inner.finish_refresh(epoch, result),
                None => Err(ClientError::AuthInvalid(
                    "session dropped during refresh".to_string(),
                )),
            }
        }
        .boxed()
        .shared();

        state.in_flight = Some(refresh.clone());
        Ok(refresh)
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn finish_refresh(
        &self,
        epoch: u64,
        result: Result<TokenPair, ClientError>,
    ) -> Result<TokenPair, ClientError> {
        let mut state = self.lock();
        if state.epoch != epoch {
            tracing::debug!(
                "Discarding refresh result from epoch {} (now {})",
                epoch,
                state.epoch
            );
            return Err(ClientError::AuthInvalid(
                "session ended during refresh".to_string(),
            ));
        }
        state.in_flight = None;

        match result {
            Ok(tokens) => {
                state.tokens = tokens.clone();
                self.persist(&state);
                tracing::info!("Access token refreshed");
                Ok(tokens)
            }
            Err(ClientError::NetworkUnavailable(message)) => {
                tracing::warn!("Token refresh could not reach the server: {}", message);
                Err(ClientError::NetworkUnavailable(message))
            }
            Err(e) => {
                tracing::warn!("Token refresh rejected: {}", e);
                self.clear_locked(&mut state);
                Err(match e {
                    ClientError::AuthInvalid(message) => ClientError::AuthInvalid(message),
                    other => ClientError::AuthInvalid(other.to_string()),
                })
            }
        }
    }

    /// Raise the epoch to the stored logout marker's, so a later write is
    /// never older than a logout recorded by another process.
    fn catch_up_with_marker(&self, state: &mut SessionState) {
        match self.store.load_marker() {
            Ok(Some(marker)) => state.epoch = state.epoch.max(marker.epoch),
            Ok(None) => {}
            Err(e) => tracing::warn!("Failed to read logout marker: {}", e),
        }
    }

    fn clear_locked(&self, state: &mut SessionState) {
        state.tokens = TokenPair::default();
        state.in_flight = None;
        self.catch_up_with_marker(state);
        state.epoch += 1;
        self.epoch_tx.send_replace(state.epoch);

        let marker = LogoutMarker::new(state.epoch, self.clock.now_millis());
        if let Err(e) = self.store.clear_session() {
            tracing::warn!("Failed to remove persisted session: {}", e);
        }
        if let Err(e) = self.store.save_marker(&marker) {
            tracing::warn!("Failed to write logout marker: {}", e);
        }
        tracing::info!("Session cleared (epoch {})", state.epoch);
    }

    fn persist(&self, state: &SessionState) {
        let session = PersistedSession {
            epoch: state.epoch,
            tokens: state.tokens.clone(),
        };
        if let Err(e) = self.store.save_session(&session) {
            tracing::warn!("Failed to persist session: {}", e);
        }
    }
}
