//! In-process connector for live channel tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::error::ClientError;

use super::connector::{EventConnector, FrameSink, FrameStream, LiveConnection};

/// Result of one scripted handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Accept,
    Reject,
}

/// Connector whose handshakes follow a script (accepting once it runs out).
///
/// Every accepted connection hands its server side to the test through
/// [`FakeConnector::next_server`].
pub struct FakeConnector {
    state: Mutex<FakeState>,
    servers_tx: mpsc::UnboundedSender<ServerHandle>,
    servers_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<ServerHandle>>,
}

#[derive(Default)]
struct FakeState {
    script: VecDeque<Outcome>,
    tokens: Vec<String>,
    attempts: Vec<Instant>,
}

/// Server end of an accepted connection; dropping it closes the connection
pub struct ServerHandle {
    inbound: mpsc::UnboundedReceiver<String>,
    outbound: mpsc::UnboundedSender<String>,
}

impl ServerHandle {
    /// Next frame the client sent, `None` once the client closed
    pub async fn recv(&mut self) -> Option<String> {
        self.inbound.recv().await
    }

    /// Deliver a frame to the client
    pub fn push(&self, frame: impl Into<String>) {
        let _ = self.outbound.send(frame.into());
    }
}

impl FakeConnector {
    pub fn new() -> Self {
        let (servers_tx, servers_rx) = mpsc::unbounded_channel();
        Self {
            state: Mutex::new(FakeState::default()),
            servers_tx,
            servers_rx: tokio::sync::Mutex::new(servers_rx),
        }
    }

    pub fn script(&self, outcomes: impl IntoIterator<Item = Outcome>) {
        self.state.lock().unwrap().script.extend(outcomes);
    }

    pub fn connect_count(&self) -> usize {
        self.state.lock().unwrap().attempts.len()
    }

    /// Tokens presented, one per handshake
    pub fn tokens(&self) -> Vec<String> {
        self.state.lock().unwrap().tokens.clone()
    }

    /// When each handshake started
    pub fn attempt_times(&self) -> Vec<Instant> {
        self.state.lock().unwrap().attempts.clone()
    }

    /// Server side of the next accepted connection
    pub async fn next_server(&self) -> ServerHandle {
        self.servers_rx
            .lock()
            .await
            .recv()
            .await
            .expect("connector dropped")
    }
}

#[async_trait]
impl EventConnector for FakeConnector {
    async fn connect(&self, token: &str) -> Result<LiveConnection, ClientError> {
        let outcome = {
            let mut state = self.state.lock().unwrap();
            state.tokens.push(token.to_string());
            state.attempts.push(Instant::now());
            state.script.pop_front().unwrap_or(Outcome::Accept)
        };

        match outcome {
            Outcome::Reject => Err(ClientError::Handshake("rejected".to_string())),
            Outcome::Accept => {
                let (client_tx, inbound) = mpsc::unbounded_channel();
                let (outbound, client_rx) = mpsc::unbounded_channel();
                let _ = self.servers_tx.send(ServerHandle { inbound, outbound });
                Ok(LiveConnection {
                    sink: Box::new(FakeSink {
                        tx: Some(client_tx),
                    }),
                    stream: Box::new(FakeStream { rx: client_rx }),
                })
            }
        }
    }
}

struct FakeSink {
    tx: Option<mpsc::UnboundedSender<String>>,
}

#[async_trait]
impl FrameSink for FakeSink {
    async fn send_text(&mut self, text: String) -> Result<(), ClientError> {
        match &self.tx {
            Some(tx) => tx
                .send(text)
                .map_err(|_| ClientError::NetworkUnavailable("peer gone".to_string())),
            None => Err(ClientError::NetworkUnavailable("sink closed".to_string())),
        }
    }

    async fn close(&mut self) {
        self.tx = None;
    }
}

struct FakeStream {
    rx: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
impl FrameStream for FakeStream {
    async fn next_text(&mut self) -> Option<Result<String, ClientError>> {
        self.rx.recv().await.map(Ok)
    }
}
