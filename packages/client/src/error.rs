//! Error types for the Pipedeck client.

use thiserror::Error;

/// Client-side errors.
///
/// Payloads are plain strings so the error can be cloned and shared between
/// every caller awaiting the same refresh.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// Access token rejected, refresh not attempted yet
    #[error("Access token expired")]
    AuthExpired,

    /// Refresh failed or the retried request was rejected again
    #[error("Session is no longer valid: {0}")]
    AuthInvalid(String),

    /// The request could not reach the server
    #[error("Network unavailable: {0}")]
    NetworkUnavailable(String),

    /// Live channel gave up after the maximum number of reconnect attempts
    #[error("Live channel gave up after {attempts} reconnect attempts")]
    ConnectionExhausted { attempts: u32 },

    /// `connect` was called without an access token
    #[error("No access token available")]
    MissingToken,

    /// Live channel handshake was refused or timed out
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// Non-success HTTP status other than a recoverable 401
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    /// Response body could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// Session persistence failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ClientError {
    /// Whether the error means the user has to sign in again
    pub fn requires_reauthentication(&self) -> bool {
        matches!(self, ClientError::AuthInvalid(_))
    }

    /// Whether the error is a connectivity problem rather than a failed action
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            ClientError::NetworkUnavailable(_) | ClientError::ConnectionExhausted { .. }
        )
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(e: serde_json::Error) -> Self {
        ClientError::Decode(e.to_string())
    }
}
