//! Client configuration.
//!
//! Every value can be given on the command line or through the environment,
//! so the same struct serves the CLI host and embedding applications.

use std::path::PathBuf;
use std::time::Duration;

use clap::Args;

use crate::error::ClientError;

/// Default TTL for cached list endpoints
pub const DEFAULT_CACHE_TTL_SECS: u64 = 60;

/// Prefix of every REST endpoint
pub const API_PREFIX: &str = "/api/v1";

/// Connection settings for the REST API and the live channel
#[derive(Args, Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the REST API (without the /api/v1 prefix)
    #[arg(long, env = "API_BASE_URL", default_value = "http://127.0.0.1:8080")]
    pub api_base_url: String,

    /// WebSocket URL of the live event channel
    #[arg(long, env = "SOCKET_URL", default_value = "ws://127.0.0.1:8080/ws")]
    pub socket_url: String,

    /// TTL in seconds for cached list endpoints
    #[arg(long, env = "PIPEDECK_CACHE_TTL_SECS", default_value_t = DEFAULT_CACHE_TTL_SECS)]
    pub cache_ttl_secs: u64,

    /// File used to persist the session between runs (in-memory when omitted)
    #[arg(long, env = "PIPEDECK_SESSION_FILE")]
    pub session_file: Option<PathBuf>,

    /// Request timeout in seconds for REST calls
    #[arg(long, env = "PIPEDECK_REQUEST_TIMEOUT_SECS", default_value_t = 30)]
    pub request_timeout_secs: u64,
}

impl ClientConfig {
    /// Build a configuration pointing at the given origins with defaults elsewhere
    pub fn new(api_base_url: impl Into<String>, socket_url: impl Into<String>) -> Self {
        Self {
            api_base_url: api_base_url.into(),
            socket_url: socket_url.into(),
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
            session_file: None,
            request_timeout_secs: 30,
        }
    }

    /// Check that both origins use the schemes the transports understand
    pub fn validate(&self) -> Result<(), ClientError> {
        if !(self.api_base_url.starts_with("http://") || self.api_base_url.starts_with("https://"))
        {
            return Err(ClientError::Config(format!(
                "API_BASE_URL must be an http(s) URL, got '{}'",
                self.api_base_url
            )));
        }
        if !(self.socket_url.starts_with("ws://") || self.socket_url.starts_with("wss://")) {
            return Err(ClientError::Config(format!(
                "SOCKET_URL must be a ws(s) URL, got '{}'",
                self.socket_url
            )));
        }
        Ok(())
    }

    /// REST root including the version prefix, without a trailing slash
    pub fn api_root(&self) -> String {
        format!("{}{}", self.api_base_url.trim_end_matches('/'), API_PREFIX)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
