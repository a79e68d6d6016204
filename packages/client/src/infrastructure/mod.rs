//! Concrete transports: reqwest for the REST API, tokio-tungstenite for the live channel.

pub mod dto;
pub mod http;
pub mod websocket;

pub use http::{HttpAuthApi, ReqwestTransport};
pub use websocket::WebSocketConnector;
