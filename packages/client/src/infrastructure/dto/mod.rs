//! Data Transfer Objects (DTOs) for the client.
//!
//! DTOs are organized by protocol:
//! - `websocket`: live channel frames
//! - `http`: REST request and response bodies

pub mod http;
pub mod websocket;
