//! RequestGateway: every outbound API call goes through here.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::de::DeserializeOwned;

use crate::{error::ClientError, session::SessionManager};

use super::{
    request::{ApiRequest, ApiResponse},
    transport::HttpTransport,
};

const UNAUTHORIZED: u16 = 401;

/// Attaches credentials and recovers from expired access tokens.
///
/// On a 401 the gateway refreshes the session once and resends the request
/// once. A 401 on the logout endpoint is returned as is.
pub struct RequestGateway {
    transport: Arc<dyn HttpTransport>,
    session: SessionManager,
    network_unavailable: AtomicBool,
}

impl RequestGateway {
    pub fn new(transport: Arc<dyn HttpTransport>, session: SessionManager) -> Self {
        Self {
            transport,
            session,
            network_unavailable: AtomicBool::new(false),
        }
    }

    /// Whether the last round-trip failed to reach the server
    pub fn network_unavailable(&self) -> bool {
        self.network_unavailable.load(Ordering::SeqCst)
    }

    /// Send `request`, returning the successful response.
    ///
    /// # Errors
    ///
    /// * [`ClientError::AuthExpired`] - 401 on the logout endpoint
    /// * [`ClientError::AuthInvalid`] - refresh rejected, or the retry got a 401 again;
    ///   the session is cleared in both cases
    /// * [`ClientError::NetworkUnavailable`] - the server could not be reached
    /// * [`ClientError::Api`] - any other non-2xx status
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ClientError> {
        let mut request = request;
        request.bearer = self.session.get_token();
        let mut retried = false;

        loop {
            let response = self.dispatch(&request).await?;
            if response.status != UNAUTHORIZED {
                return into_result(response);
            }

            if request.is_logout() {
                tracing::debug!("401 on logout endpoint, not refreshing");
                return Err(ClientError::AuthExpired);
            }

            if retried {
                tracing::warn!(
                    "{:?} {} rejected again after token refresh",
                    request.method,
                    request.path
                );
                self.session.clear();
                return Err(ClientError::AuthInvalid(
                    "request rejected after token refresh".to_string(),
                ));
            }

            tracing::debug!(
                "{:?} {} returned 401, refreshing session",
                request.method,
                request.path
            );
            retried = true;
            let tokens = self.session.refresh().await?;
            request.bearer = tokens.access_token;
        }
    }

    /// Send `request` and decode the JSON body
    pub async fn send_json<T: DeserializeOwned>(
        &self,
        request: ApiRequest,
    ) -> Result<T, ClientError> {
        self.send(request).await?.json()
    }

    /// `GET path` and decode the JSON body
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        self.send_json(ApiRequest::get(path)).await
    }

    async fn dispatch(&self, request: &ApiRequest) -> Result<ApiResponse, ClientError> {
        match self.transport.execute(request).await {
            Ok(response) => {
                if self.network_unavailable.swap(false, Ordering::SeqCst) {
                    tracing::info!("API reachable again");
                }
                Ok(response)
            }
            Err(e @ ClientError::NetworkUnavailable(_)) => {
                if !self.network_unavailable.swap(true, Ordering::SeqCst) {
                    tracing::warn!("API unreachable: {}", e);
                }
                Err(e)
            }
            Err(e) => Err(e),
        }
    }
}

fn into_result(response: ApiResponse) -> Result<ApiResponse, ClientError> {
    if response.is_success() {
        Ok(response)
    } else {
        Err(ClientError::Api {
            status: response.status,
            message: response.error_message(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use async_trait::async_trait;
    use mockall::Sequence;
    use pipedeck_shared::time::FixedClock;

    use super::*;
    use crate::{
        domain::{TokenPair, token::test_support::jwt_with_exp},
        gateway::MockHttpTransport,
        session::{AuthApi, InMemorySessionStore, MockAuthApi},
    };

    const NOW_SECS: i64 = 1_700_000_000;

    fn old_pair() -> TokenPair {
        TokenPair::issued(jwt_with_exp(NOW_SECS - 5), "refresh-old".to_string())
    }

    fn new_pair() -> TokenPair {
        TokenPair::issued(jwt_with_exp(NOW_SECS + 900), "refresh-new".to_string())
    }

    fn session_with(auth: Arc<dyn AuthApi>) -> SessionManager {
        let session = SessionManager::new(
            auth,
            Arc::new(InMemorySessionStore::new()),
            Arc::new(FixedClock::new(NOW_SECS * 1000)),
        );
        session.set_tokens(old_pair());
        session
    }

    fn bearer_is(request: &ApiRequest, pair: &TokenPair) -> bool {
        request.bearer == pair.access_token
    }

    #[tokio::test]
    async fn test_attaches_bearer_token() {
        // テスト項目: リクエストに現在のアクセストークンが付与される
        // given (前提条件):
        let mut transport = MockHttpTransport::new();
        transport
            .expect_execute()
            .withf(|request: &ApiRequest| bearer_is(request, &old_pair()))
            .times(1)
            .returning(|_| Ok(ApiResponse::new(200, "[]")));
        let gateway = RequestGateway::new(
            Arc::new(transport),
            session_with(Arc::new(MockAuthApi::new())),
        );

        // when (操作):
        let result: Result<Vec<serde_json::Value>, _> = gateway.get_json("/notifications").await;

        // then (期待する結果):
        assert_eq!(result, Ok(vec![]));
    }

    #[tokio::test]
    async fn test_unauthorized_refreshes_and_retries_once() {
        // テスト項目: 401 を受け取るとリフレッシュを 1 回行い、新しいトークンで 1 回だけ再送する
        // given (前提条件):
        let mut seq = Sequence::new();
        let mut transport = MockHttpTransport::new();
        transport
            .expect_execute()
            .withf(|request: &ApiRequest| bearer_is(request, &old_pair()))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(ApiResponse::new(401, "")));
        transport
            .expect_execute()
            .withf(|request: &ApiRequest| bearer_is(request, &new_pair()))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(ApiResponse::new(200, r#"{"ok":true}"#)));
        let mut auth = MockAuthApi::new();
        auth.expect_refresh().times(1).returning(|_| Ok(new_pair()));
        let session = session_with(Arc::new(auth));
        let gateway = RequestGateway::new(Arc::new(transport), session.clone());

        // when (操作):
        let result = gateway.send(ApiRequest::get("/organizations/acme/tasks")).await;

        // then (期待する結果):
        assert_eq!(result.unwrap().status, 200);
        assert_eq!(session.tokens(), new_pair());
    }

    #[tokio::test]
    async fn test_logout_unauthorized_is_not_retried() {
        // テスト項目: ログアウトエンドポイントの 401 はリフレッシュも再送もしない
        // given (前提条件):
        let mut transport = MockHttpTransport::new();
        transport
            .expect_execute()
            .times(1)
            .returning(|_| Ok(ApiResponse::new(401, "")));
        let mut auth = MockAuthApi::new();
        auth.expect_refresh().times(0);
        let gateway = RequestGateway::new(Arc::new(transport), session_with(Arc::new(auth)));

        // when (操作):
        let result = gateway.send(ApiRequest::post("/auth/logout")).await;

        // then (期待する結果):
        assert_eq!(result, Err(ClientError::AuthExpired));
    }

    #[tokio::test]
    async fn test_second_unauthorized_clears_session() {
        // テスト項目: 再送後も 401 の場合はそれ以上再送せず、セッションをクリアする
        // given (前提条件):
        let mut transport = MockHttpTransport::new();
        transport
            .expect_execute()
            .times(2)
            .returning(|_| Ok(ApiResponse::new(401, "")));
        let mut auth = MockAuthApi::new();
        auth.expect_refresh().times(1).returning(|_| Ok(new_pair()));
        let session = session_with(Arc::new(auth));
        let gateway = RequestGateway::new(Arc::new(transport), session.clone());

        // when (操作):
        let result = gateway.send(ApiRequest::get("/organizations/acme/pipelines")).await;

        // then (期待する結果):
        assert!(matches!(result, Err(ClientError::AuthInvalid(_))));
        assert_eq!(session.get_token(), None);
    }

    #[tokio::test]
    async fn test_refresh_failure_is_propagated_without_retry() {
        // テスト項目: リフレッシュ失敗時は元のリクエストを再送せず、セッションがクリアされる
        // given (前提条件):
        let mut transport = MockHttpTransport::new();
        transport
            .expect_execute()
            .times(1)
            .returning(|_| Ok(ApiResponse::new(401, "")));
        let mut auth = MockAuthApi::new();
        auth.expect_refresh()
            .times(1)
            .returning(|_| Err(ClientError::AuthInvalid("refresh token expired".to_string())));
        let session = session_with(Arc::new(auth));
        let gateway = RequestGateway::new(Arc::new(transport), session.clone());

        // when (操作):
        let result = gateway.send(ApiRequest::get("/organizations/acme/builds")).await;

        // then (期待する結果):
        assert_eq!(
            result,
            Err(ClientError::AuthInvalid("refresh token expired".to_string()))
        );
        assert!(!session.is_authenticated());
    }

    #[tokio::test]
    async fn test_other_error_status_is_not_retried() {
        // テスト項目: 401 以外のエラーステータスはリフレッシュせず Api エラーになる
        // given (前提条件):
        let mut transport = MockHttpTransport::new();
        transport
            .expect_execute()
            .times(1)
            .returning(|_| Ok(ApiResponse::new(404, r#"{"message":"pipeline not found"}"#)));
        let mut auth = MockAuthApi::new();
        auth.expect_refresh().times(0);
        let gateway = RequestGateway::new(Arc::new(transport), session_with(Arc::new(auth)));

        // when (操作):
        let result = gateway.send(ApiRequest::get("/organizations/acme/pipelines/p-9")).await;

        // then (期待する結果):
        assert_eq!(
            result,
            Err(ClientError::Api {
                status: 404,
                message: "pipeline not found".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_network_flag_follows_last_round_trip() {
        // テスト項目: 通信失敗で network_unavailable が立ち、次の成功で下がる
        // given (前提条件):
        let mut seq = Sequence::new();
        let mut transport = MockHttpTransport::new();
        transport
            .expect_execute()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(ClientError::NetworkUnavailable("connection refused".to_string())));
        transport
            .expect_execute()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(ApiResponse::new(204, "")));
        let gateway = RequestGateway::new(
            Arc::new(transport),
            session_with(Arc::new(MockAuthApi::new())),
        );

        // when (操作):
        let first = gateway.send(ApiRequest::get("/notifications")).await;
        let flag_after_failure = gateway.network_unavailable();
        let second = gateway.send(ApiRequest::get("/notifications")).await;

        // then (期待する結果):
        assert!(matches!(first, Err(ClientError::NetworkUnavailable(_))));
        assert!(flag_after_failure);
        assert!(second.is_ok());
        assert!(!gateway.network_unavailable());
    }

    /// Rejects the old access token, accepts the new one
    struct TokenCheckingTransport {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl HttpTransport for TokenCheckingTransport {
        async fn execute(&self, request: &ApiRequest) -> Result<ApiResponse, ClientError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            if request.bearer == new_pair().access_token {
                Ok(ApiResponse::new(200, "{}"))
            } else {
                Ok(ApiResponse::new(401, ""))
            }
        }
    }

    struct SlowAuthApi {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl AuthApi for SlowAuthApi {
        async fn refresh(&self, _refresh_token: &str) -> Result<TokenPair, ClientError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok(new_pair())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_unauthorized_requests_refresh_once() {
        // テスト項目: 同時に 401 を受けた 5 件のリクエストでもリフレッシュ API は 1 回だけ呼ばれる
        // given (前提条件):
        let auth = Arc::new(SlowAuthApi {
            calls: AtomicUsize::new(0),
        });
        let transport = Arc::new(TokenCheckingTransport {
            calls: AtomicUsize::new(0),
        });
        let gateway = Arc::new(RequestGateway::new(transport.clone(), session_with(auth.clone())));

        // when (操作):
        let handles: Vec<_> = (0..5)
            .map(|i| {
                let gateway = gateway.clone();
                tokio::spawn(async move {
                    gateway
                        .send(ApiRequest::get(format!("/organizations/org-{}/tasks", i)))
                        .await
                })
            })
            .collect();
        let results = futures_util::future::join_all(handles).await;

        // then (期待する結果):
        assert_eq!(auth.calls.load(Ordering::SeqCst), 1);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 10);
        for result in results {
            assert_eq!(result.unwrap().unwrap().status, 200);
        }
    }
}
