//! reqwest-backed REST transport and token exchange.

use async_trait::async_trait;

use crate::{
    config::ClientConfig,
    domain::TokenPair,
    error::ClientError,
    gateway::{ApiRequest, ApiResponse, HttpTransport, Method},
    session::AuthApi,
};

use super::dto::http::{RefreshRequest, RefreshResponse};

pub const REFRESH_PATH: &str = "/auth/refresh-token";

fn build_client(config: &ClientConfig) -> Result<reqwest::Client, ClientError> {
    reqwest::Client::builder()
        .timeout(config.request_timeout())
        .build()
        .map_err(|e| ClientError::Config(format!("failed to build HTTP client: {}", e)))
}

fn network_error(e: reqwest::Error) -> ClientError {
    ClientError::NetworkUnavailable(e.to_string())
}

/// Sends [`ApiRequest`]s to `{API_BASE_URL}/api/v1`
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    api_root: String,
}

impl ReqwestTransport {
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        Ok(Self {
            client: build_client(config)?,
            api_root: config.api_root(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_root, path)
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(&self, request: &ApiRequest) -> Result<ApiResponse, ClientError> {
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        };

        let mut builder = self.client.request(method, self.url(&request.path));
        if let Some(token) = &request.bearer {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        tracing::debug!("{:?} {}", request.method, request.path);
        let response = builder.send().await.map_err(network_error)?;
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(network_error)?;
        tracing::debug!("{:?} {} -> {}", request.method, request.path, status);
        Ok(ApiResponse::new(status, body.to_vec()))
    }
}

/// Exchanges refresh tokens over plain HTTP.
///
/// Talks to the server directly; a 401 here must never trigger another refresh.
#[derive(Clone)]
pub struct HttpAuthApi {
    client: reqwest::Client,
    api_root: String,
}

impl HttpAuthApi {
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        Ok(Self {
            client: build_client(config)?,
            api_root: config.api_root(),
        })
    }
}

/// Map the refresh endpoint's answer to a token pair
fn refresh_outcome(response: ApiResponse) -> Result<TokenPair, ClientError> {
    match response.status {
        200..=299 => Ok(response.json::<RefreshResponse>()?.tokens.into()),
        400 | 401 | 403 => Err(ClientError::AuthInvalid(response.error_message())),
        status => Err(ClientError::Api {
            status,
            message: response.error_message(),
        }),
    }
}

#[async_trait]
impl AuthApi for HttpAuthApi {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, ClientError> {
        let body = RefreshRequest {
            refresh_token: refresh_token.to_string(),
        };
        let response = self
            .client
            .post(format!("{}{}", self.api_root, REFRESH_PATH))
            .json(&body)
            .send()
            .await
            .map_err(network_error)?;
        let status = response.status().as_u16();
        let bytes = response.bytes().await.map_err(network_error)?;
        refresh_outcome(ApiResponse::new(status, bytes.to_vec()))
    }
}
