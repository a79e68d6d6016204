//! tokio-tungstenite connector for the live channel.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async, tungstenite::protocol::Message,
};

use crate::{
    error::ClientError,
    live::{EventConnector, FrameSink, FrameStream, LiveConnection},
};

use super::dto::websocket::{AuthMessage, parse_handshake_reply};

pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens the socket at `SOCKET_URL` and authenticates with an `auth` frame
pub struct WebSocketConnector {
    url: String,
    handshake_timeout: Duration,
}

impl WebSocketConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    async fn handshake(&self, token: &str) -> Result<LiveConnection, ClientError> {
        let (ws_stream, _response) = connect_async(self.url.as_str())
            .await
            .map_err(|e| ClientError::NetworkUnavailable(e.to_string()))?;
        let (mut write, mut read) = ws_stream.split();

        let auth = serde_json::to_string(&AuthMessage::new(token))?;
        write
            .send(Message::Text(auth.into()))
            .await
            .map_err(|e| ClientError::NetworkUnavailable(e.to_string()))?;

        // the first text frame answers the auth message
        loop {
            match read.next().await {
                Some(Ok(Message::Text(text))) => {
                    parse_handshake_reply(text.as_str())?;
                    break;
                }
                Some(Ok(Message::Close(_))) | None => {
                    return Err(ClientError::Handshake(
                        "connection closed during handshake".to_string(),
                    ));
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(ClientError::NetworkUnavailable(e.to_string())),
            }
        }

        Ok(LiveConnection {
            sink: Box::new(WsSink { write }),
            stream: Box::new(WsStream { read }),
        })
    }
}

#[async_trait]
impl EventConnector for WebSocketConnector {
    async fn connect(&self, token: &str) -> Result<LiveConnection, ClientError> {
        tracing::debug!("Opening live channel at {}", self.url);
        match tokio::time::timeout(self.handshake_timeout, self.handshake(token)).await {
            Ok(result) => result,
            Err(_) => Err(ClientError::Handshake(format!(
                "no reply within {} ms",
                self.handshake_timeout.as_millis()
            ))),
        }
    }
}

struct WsSink {
    write: SplitSink<Socket, Message>,
}

#[async_trait]
impl FrameSink for WsSink {
    async fn send_text(&mut self, text: String) -> Result<(), ClientError> {
        self.write
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| ClientError::NetworkUnavailable(e.to_string()))
    }

    async fn close(&mut self) {
        if let Err(e) = self.write.send(Message::Close(None)).await {
            tracing::debug!("Failed to send close frame: {}", e);
        }
    }
}

struct WsStream {
    read: SplitStream<Socket>,
}

#[async_trait]
impl FrameStream for WsStream {
    async fn next_text(&mut self) -> Option<Result<String, ClientError>> {
        loop {
            match self.read.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text.as_str().to_string())),
                Ok(Message::Binary(data)) => {
                    tracing::debug!("Ignoring binary frame ({} bytes)", data.len());
                }
                Ok(Message::Close(_)) => {
                    tracing::info!("Server closed the live channel");
                    return None;
                }
                Ok(_) => {}
                Err(e) => return Some(Err(ClientError::NetworkUnavailable(e.to_string()))),
            }
        }
    }
}
