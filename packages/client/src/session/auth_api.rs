//! Token exchange with the authentication API.

use async_trait::async_trait;

use crate::{domain::TokenPair, error::ClientError};

/// Exchanges a refresh token for a new token pair.
///
/// Kept apart from the request gateway: the exchange itself must never go
/// through the 401-refresh-retry path.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AuthApi: Send + Sync {
    /// `POST /auth/refresh-token` with `{ refreshToken }`.
    ///
    /// Rejections are reported as [`ClientError::AuthInvalid`], unreachable
    /// servers as [`ClientError::NetworkUnavailable`].
    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, ClientError>;
}
