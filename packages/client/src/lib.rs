//! Session and live-update client for the Pipedeck CI/CD dashboard.
//!
//! This library keeps an authenticated session alive (access/refresh tokens with
//! transparent re-authentication), maintains a WebSocket live channel with room
//! subscriptions and reconnection, and caches expensive list endpoints.

// layers
pub mod api;
pub mod cache;
pub mod domain;
pub mod gateway;
pub mod infrastructure;
pub mod live;
pub mod session;

// wiring
pub mod config;
pub mod context;
pub mod error;
pub mod formatter;

pub use context::ClientContext;
pub use error::ClientError;
