//! Login, registration, logout, and session restore.

use std::sync::Arc;

use serde::Serialize;

use crate::{
    cache::ResponseCache,
    domain::{ConnectionStatus, User},
    error::ClientError,
    gateway::{ApiRequest, ApiResponse, HttpTransport, LOGOUT_PATH, RequestGateway},
    infrastructure::dto::http::{AuthResponse, LoginRequest, RegisterRequest},
    live::{DisconnectReason, LiveChannel},
    session::SessionManager,
};

pub const LOGIN_PATH: &str = "/auth/login";
pub const REGISTER_PATH: &str = "/auth/register";

/// Signs users in and out, keeping session, cache, and live channel in step
pub struct AuthService {
    transport: Arc<dyn HttpTransport>,
    gateway: Arc<RequestGateway>,
    session: SessionManager,
    cache: Arc<ResponseCache>,
    live: LiveChannel,
}

impl AuthService {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        gateway: Arc<RequestGateway>,
        session: SessionManager,
        cache: Arc<ResponseCache>,
        live: LiveChannel,
    ) -> Self {
        Self {
            transport,
            gateway,
            session,
            cache,
            live,
        }
    }

    /// `POST /auth/login`; on success the tokens are installed and the live channel connects
    pub async fn login(&self, email: &str, password: &str) -> Result<User, ClientError> {
        let body = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        self.authenticate(LOGIN_PATH, &body).await
    }

    /// `POST /auth/register`; behaves like [`AuthService::login`]
    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<User, ClientError> {
        let body = RegisterRequest {
            name: name.to_string(),
            email: email.to_string(),
            password: password.to_string(),
        };
        self.authenticate(REGISTER_PATH, &body).await
    }

    /// End the session.
    ///
    /// The server call is best effort; local state is always torn down.
    pub async fn logout(&self) {
        if self.session.is_authenticated() {
            if let Err(e) = self.gateway.send(ApiRequest::post(LOGOUT_PATH)).await {
                tracing::warn!("Logout request failed, clearing local session anyway: {}", e);
            }
        }
        self.session.clear();
        self.cache.clear();
        self.live.disconnect(DisconnectReason::Logout).await;
        tracing::info!("Logged out");
    }

    /// Restore a persisted session and reconnect the live channel.
    ///
    /// Returns `false` when there was nothing current to restore.
    pub fn restore(&self) -> Result<bool, ClientError> {
        if !self.session.restore()? {
            return Ok(false);
        }
        self.connect_live();
        Ok(true)
    }

    async fn authenticate<B: Serialize>(&self, path: &str, body: &B) -> Result<User, ClientError> {
        // credentials only; never routed through the refresh path
        let request = ApiRequest::post(path).json(body)?;
        let response = self.transport.execute(&request).await?;
        let auth: AuthResponse = credential_outcome(response)?;

        // the previous identity's rooms and cached reads do not carry over
        if self.session.is_authenticated() {
            self.cache.clear();
        }
        if self.live.status() != ConnectionStatus::Disconnected {
            self.live.disconnect(DisconnectReason::Logout).await;
        }
        self.session.set_tokens(auth.tokens.into());
        tracing::info!("Signed in as {}", auth.user.email);
        self.connect_live();
        Ok(auth.user)
    }

    fn connect_live(&self) {
        let token = self.session.get_token();
        if let Err(e) = self.live.connect(token.as_deref()) {
            tracing::warn!("Live channel not started: {}", e);
        }
    }
}

fn credential_outcome(response: ApiResponse) -> Result<AuthResponse, ClientError> {
    match response.status {
        200..=299 => response.json(),
        400 | 401 | 403 => Err(ClientError::AuthInvalid(response.error_message())),
        status => Err(ClientError::Api {
            status,
            message: response.error_message(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use mockall::Sequence;
    use pipedeck_shared::time::FixedClock;

    use super::*;
    use crate::{
        domain::{RoomId, TokenPair, token::test_support::jwt_with_exp},
        gateway::{Method, MockHttpTransport},
        live::{EventHandlers, fake::FakeConnector},
        session::{InMemorySessionStore, MockAuthApi},
    };

    const NOW_SECS: i64 = 1_700_000_000;

    struct Harness {
        service: AuthService,
        session: SessionManager,
        cache: Arc<ResponseCache>,
        live: LiveChannel,
        connector: Arc<FakeConnector>,
    }

    fn harness(transport: MockHttpTransport) -> Harness {
        let transport: Arc<dyn HttpTransport> = Arc::new(transport);
        let clock = Arc::new(FixedClock::new(NOW_SECS * 1000));
        let session = SessionManager::new(
            Arc::new(MockAuthApi::new()),
            Arc::new(InMemorySessionStore::new()),
            clock.clone(),
        );
        let gateway = Arc::new(RequestGateway::new(transport.clone(), session.clone()));
        let cache = Arc::new(ResponseCache::new(clock));
        let connector = Arc::new(FakeConnector::new());
        let live = LiveChannel::new(connector.clone(), session.clone(), EventHandlers::new());
        let service = AuthService::new(
            transport,
            gateway,
            session.clone(),
            cache.clone(),
            live.clone(),
        );
        Harness {
            service,
            session,
            cache,
            live,
            connector,
        }
    }

    fn auth_body(access: &str) -> String {
        format!(
            r#"{{"user":{{"id":"u-1","email":"dev@example.com"}},"tokens":{{"accessToken":"{}","refreshToken":"r-1"}}}}"#,
            access
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_login_installs_tokens_and_connects() {
        // テスト項目: ログイン成功でトークンが設定され、ライブチャンネルが接続される
        // given (前提条件):
        let access = jwt_with_exp(NOW_SECS + 900);
        let body = auth_body(&access);
        let mut transport = MockHttpTransport::new();
        transport
            .expect_execute()
            .withf(|request: &ApiRequest| {
                request.method == Method::Post
                    && request.path == LOGIN_PATH
                    && request.bearer.is_none()
            })
            .times(1)
            .returning(move |_| Ok(ApiResponse::new(200, body.clone())));
        let h = harness(transport);

        // when (操作):
        let user = h.service.login("dev@example.com", "secret").await.unwrap();
        h.live.wait_for_status(ConnectionStatus::Connected).await;

        // then (期待する結果):
        assert_eq!(user.id, "u-1");
        assert_eq!(h.session.get_token(), Some(access.clone()));
        assert!(!h.session.is_expired(&access));
        assert_eq!(h.connector.tokens(), vec![access]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_register_installs_tokens_and_connects() {
        // テスト項目: 登録成功でトークンが設定され、ライブチャンネルが接続される
        // given (前提条件):
        let access = jwt_with_exp(NOW_SECS + 900);
        let body = auth_body(&access);
        let mut transport = MockHttpTransport::new();
        transport
            .expect_execute()
            .withf(|request: &ApiRequest| {
                request.method == Method::Post
                    && request.path == REGISTER_PATH
                    && request.bearer.is_none()
                    && request
                        .body
                        .as_ref()
                        .and_then(|body| body.get("name"))
                        .and_then(|name| name.as_str())
                        == Some("Dev")
            })
            .times(1)
            .returning(move |_| Ok(ApiResponse::new(201, body.clone())));
        let h = harness(transport);

        // when (操作):
        let user = h
            .service
            .register("Dev", "dev@example.com", "secret")
            .await
            .unwrap();
        h.live.wait_for_status(ConnectionStatus::Connected).await;

        // then (期待する結果):
        assert_eq!(user.email, "dev@example.com");
        assert_eq!(h.session.get_token(), Some(access.clone()));
        assert_eq!(h.connector.tokens(), vec![access]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_login_reconnects_with_new_identity() {
        // テスト項目: 接続中に再ログインすると、新しいトークンでハンドシェイクし直し、以前の購読とキャッシュは破棄される
        // given (前提条件):
        let first = jwt_with_exp(NOW_SECS + 900);
        let second = jwt_with_exp(NOW_SECS + 1800);
        let (first_body, second_body) = (auth_body(&first), auth_body(&second));
        let mut seq = Sequence::new();
        let mut transport = MockHttpTransport::new();
        transport
            .expect_execute()
            .times(1)
            .in_sequence(&mut seq)
            .returning(move |_| Ok(ApiResponse::new(200, first_body.clone())));
        transport
            .expect_execute()
            .times(1)
            .in_sequence(&mut seq)
            .returning(move |_| Ok(ApiResponse::new(200, second_body.clone())));
        let h = harness(transport);
        h.service.login("dev@example.com", "secret").await.unwrap();
        h.live.wait_for_status(ConnectionStatus::Connected).await;
        h.live.subscribe(RoomId::organization("acme"));
        h.cache.set("acme:tasks:all", b"[]".to_vec(), 60);

        // when (操作):
        h.service.login("ops@example.com", "secret").await.unwrap();
        h.live.wait_for_status(ConnectionStatus::Connected).await;

        // then (期待する結果):
        assert_eq!(h.connector.tokens(), vec![first, second.clone()]);
        assert_eq!(h.session.get_token(), Some(second));
        assert!(h.live.subscriptions().is_empty());
        assert!(h.cache.is_empty());
    }

    #[tokio::test]
    async fn test_login_rejected_leaves_session_empty() {
        // テスト項目: 認証情報が拒否された場合は AuthInvalid を返し、セッションは空のまま
        // given (前提条件):
        let mut transport = MockHttpTransport::new();
        transport
            .expect_execute()
            .times(1)
            .returning(|_| Ok(ApiResponse::new(401, r#"{"message":"invalid credentials"}"#)));
        let h = harness(transport);

        // when (操作):
        let result = h.service.login("dev@example.com", "wrong").await;

        // then (期待する結果):
        assert_eq!(
            result,
            Err(ClientError::AuthInvalid("invalid credentials".to_string()))
        );
        assert!(!h.session.is_authenticated());
        assert_eq!(h.live.status(), ConnectionStatus::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_logout_tears_everything_down_even_if_server_fails() {
        // テスト項目: サーバーへのログアウトが失敗しても、トークン・キャッシュ・購読はすべて破棄される
        // given (前提条件):
        let mut transport = MockHttpTransport::new();
        transport
            .expect_execute()
            .withf(|request: &ApiRequest| request.path == LOGOUT_PATH)
            .times(1)
            .returning(|_| Err(ClientError::NetworkUnavailable("offline".to_string())));
        let h = harness(transport);
        h.session.set_tokens(TokenPair::issued(
            jwt_with_exp(NOW_SECS + 900),
            "r-1".to_string(),
        ));
        h.cache.set("acme:tasks:all", b"[]".to_vec(), 60);
        h.live.subscribe(RoomId::pipeline("p-1"));
        h.live.wait_for_status(ConnectionStatus::Connected).await;

        // when (操作):
        h.service.logout().await;

        // then (期待する結果):
        assert!(!h.session.is_authenticated());
        assert!(h.cache.is_empty());
        assert!(h.live.subscriptions().is_empty());
        assert_eq!(h.live.status(), ConnectionStatus::Disconnected);
    }
}
