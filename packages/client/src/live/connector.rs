//! Transport seam of the live channel.
//!
//! The channel only sees text frames; opening the socket and completing the
//! auth handshake is the connector's job.

use async_trait::async_trait;

use crate::error::ClientError;

/// Outbound half of an established connection
#[async_trait]
pub trait FrameSink: Send {
    async fn send_text(&mut self, text: String) -> Result<(), ClientError>;

    /// Close the connection gracefully
    async fn close(&mut self);
}

/// Inbound half of an established connection
#[async_trait]
pub trait FrameStream: Send {
    /// Next text frame; `None` once the connection is closed
    async fn next_text(&mut self) -> Option<Result<String, ClientError>>;
}

/// A connection that has completed the handshake
pub struct LiveConnection {
    pub sink: Box<dyn FrameSink>,
    pub stream: Box<dyn FrameStream>,
}

/// Opens authenticated connections to the event source
#[async_trait]
pub trait EventConnector: Send + Sync {
    /// Connect and authenticate with `token`.
    ///
    /// Returns only after the server has accepted the credential.
    async fn connect(&self, token: &str) -> Result<LiveConnection, ClientError>;
}
