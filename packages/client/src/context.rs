//! ClientContext: owner of every client component.
//!
//! Built once from [`ClientConfig`] and shared behind an `Arc`. Consumers reach
//! the session, gateway, cache and live channel through it instead of
//! process-wide globals.

use std::sync::Arc;

use pipedeck_shared::time::{Clock, SystemClock};

use crate::{
    api::{AuthService, DashboardApi},
    cache::ResponseCache,
    config::ClientConfig,
    domain::ConnectionStatus,
    error::ClientError,
    gateway::{HttpTransport, RequestGateway},
    infrastructure::{HttpAuthApi, ReqwestTransport, WebSocketConnector},
    live::{DisconnectReason, EventConnector, EventHandlers, LiveChannel},
    session::{AuthApi, FileSessionStore, InMemorySessionStore, SessionManager, SessionStore},
};

/// What a connectivity banner needs to know
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Connectivity {
    pub network_unavailable: bool,
    pub live_status: ConnectionStatus,
}

impl Connectivity {
    pub fn is_degraded(&self) -> bool {
        self.network_unavailable
            || matches!(
                self.live_status,
                ConnectionStatus::Reconnecting | ConnectionStatus::Exhausted
            )
    }
}

pub struct ClientContext {
    config: ClientConfig,
    session: SessionManager,
    gateway: Arc<RequestGateway>,
    cache: Arc<ResponseCache>,
    live: LiveChannel,
    auth: AuthService,
}

impl ClientContext {
    /// Wire the production transports for `config`
    pub fn from_config(
        config: ClientConfig,
        handlers: EventHandlers,
    ) -> Result<Arc<Self>, ClientError> {
        config.validate()?;

        let store: Arc<dyn SessionStore> = match &config.session_file {
            Some(path) => Arc::new(FileSessionStore::new(path.clone())),
            None => Arc::new(InMemorySessionStore::new()),
        };
        let transport = Arc::new(ReqwestTransport::new(&config)?);
        let auth_api = Arc::new(HttpAuthApi::new(&config)?);
        let connector = Arc::new(WebSocketConnector::new(config.socket_url.clone()));

        Ok(Self::with_parts(
            config,
            transport,
            auth_api,
            connector,
            store,
            Arc::new(SystemClock),
            handlers,
        ))
    }

    /// Assemble a context from explicit parts
    pub fn with_parts(
        config: ClientConfig,
        transport: Arc<dyn HttpTransport>,
        auth_api: Arc<dyn AuthApi>,
        connector: Arc<dyn EventConnector>,
        store: Arc<dyn SessionStore>,
        clock: Arc<dyn Clock>,
        handlers: EventHandlers,
    ) -> Arc<Self> {
        let session = SessionManager::new(auth_api, store, clock.clone());
        let gateway = Arc::new(RequestGateway::new(transport.clone(), session.clone()));
        let cache = Arc::new(ResponseCache::new(clock));
        let live = LiveChannel::new(connector, session.clone(), handlers);
        let auth = AuthService::new(
            transport,
            gateway.clone(),
            session.clone(),
            cache.clone(),
            live.clone(),
        );

        Arc::new(Self {
            config,
            session,
            gateway,
            cache,
            live,
            auth,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    pub fn gateway(&self) -> &Arc<RequestGateway> {
        &self.gateway
    }

    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    pub fn live(&self) -> &LiveChannel {
        &self.live
    }

    pub fn auth(&self) -> &AuthService {
        &self.auth
    }

    /// Dashboard endpoints of organization `tenant`
    pub fn dashboard(&self, tenant: impl Into<String>) -> DashboardApi {
        DashboardApi::new(
            tenant,
            self.gateway.clone(),
            self.cache.clone(),
            self.config.cache_ttl_secs,
        )
    }

    pub fn connectivity(&self) -> Connectivity {
        Connectivity {
            network_unavailable: self.gateway.network_unavailable(),
            live_status: self.live.status(),
        }
    }

    /// Close the live channel, keeping the session and subscriptions for the next start
    pub async fn shutdown(&self) {
        self.live.disconnect(DisconnectReason::Unmount).await;
        let purged = self.cache.purge_expired();
        tracing::debug!("Client context shut down ({} expired cache entries purged)", purged);
    }
}

#[cfg(test)]
mod tests {
    use pipedeck_shared::time::FixedClock;

    use super::*;
    use crate::{
        domain::{RoomId, TokenPair, token::test_support::jwt_with_exp},
        gateway::MockHttpTransport,
        live::fake::FakeConnector,
        session::MockAuthApi,
    };

    const NOW_SECS: i64 = 1_700_000_000;

    fn context(transport: MockHttpTransport) -> Arc<ClientContext> {
        ClientContext::with_parts(
            ClientConfig::new("http://127.0.0.1:1", "ws://127.0.0.1:1/ws"),
            Arc::new(transport),
            Arc::new(MockAuthApi::new()),
            Arc::new(FakeConnector::new()),
            Arc::new(InMemorySessionStore::new()),
            Arc::new(FixedClock::new(NOW_SECS * 1000)),
            EventHandlers::new(),
        )
    }

    #[test]
    fn test_from_config_rejects_invalid_urls() {
        // テスト項目: 不正な URL の設定ではコンテキストを構築しない
        // given (前提条件):
        let config = ClientConfig::new("ftp://example.com", "ws://example.com/ws");

        // when (操作):
        let result = ClientContext::from_config(config, EventHandlers::new());

        // then (期待する結果):
        assert!(matches!(result, Err(ClientError::Config(_))));
    }

    #[tokio::test]
    async fn test_connectivity_reflects_network_failure() {
        // テスト項目: API に到達できない場合、接続状態のスナップショットが劣化を示す
        // given (前提条件):
        let mut transport = MockHttpTransport::new();
        transport
            .expect_execute()
            .returning(|_| Err(ClientError::NetworkUnavailable("connection refused".to_string())));
        let ctx = context(transport);

        // when (操作):
        let result = ctx.dashboard("acme").list_tasks().await;

        // then (期待する結果):
        assert!(matches!(result, Err(ClientError::NetworkUnavailable(_))));
        let connectivity = ctx.connectivity();
        assert!(connectivity.network_unavailable);
        assert!(connectivity.is_degraded());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_preserves_session_and_subscriptions() {
        // テスト項目: shutdown はライブチャンネルを閉じるが、セッションと購読は保持する
        // given (前提条件):
        let ctx = context(MockHttpTransport::new());
        ctx.session().set_tokens(TokenPair::issued(
            jwt_with_exp(NOW_SECS + 900),
            "r-1".to_string(),
        ));
        ctx.live().subscribe(RoomId::build("b-1"));
        ctx.live().wait_for_status(ConnectionStatus::Connected).await;

        // when (操作):
        ctx.shutdown().await;

        // then (期待する結果):
        assert_eq!(ctx.live().status(), ConnectionStatus::Disconnected);
        assert!(ctx.session().is_authenticated());
        assert_eq!(ctx.live().subscriptions(), vec![RoomId::build("b-1")]);
    }
}
