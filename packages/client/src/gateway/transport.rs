//! HTTP transport abstraction.

use async_trait::async_trait;

use crate::error::ClientError;

use super::request::{ApiRequest, ApiResponse};

/// Sends one request and returns the raw response.
///
/// Implementations report unreachable servers as
/// [`ClientError::NetworkUnavailable`]; every HTTP status, 401 included, comes
/// back as an `Ok(ApiResponse)`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn execute(&self, request: &ApiRequest) -> Result<ApiResponse, ClientError>;
}
