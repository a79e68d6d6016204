//! Outbound REST calls: credentials, the 401-refresh-retry path, and transport.

mod request;
mod request_gateway;
mod transport;

pub use request::{ApiRequest, ApiResponse, LOGOUT_PATH, Method};
pub use request_gateway::RequestGateway;
#[cfg(test)]
pub use transport::MockHttpTransport;
pub use transport::HttpTransport;
