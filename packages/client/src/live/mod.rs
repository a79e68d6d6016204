//! Live channel: one persistent WebSocket connection with room subscriptions.

mod channel;
mod connector;
mod handlers;

pub use channel::{DisconnectReason, LiveChannel};
pub use connector::{EventConnector, FrameSink, FrameStream, LiveConnection};
pub use handlers::EventHandlers;

#[cfg(test)]
pub(crate) mod fake;
