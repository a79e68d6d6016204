//! Session management: the token pair, its refresh, and its persistence.

mod auth_api;
mod manager;
mod store;

pub use auth_api::AuthApi;
#[cfg(test)]
pub use auth_api::MockAuthApi;
pub use manager::SessionManager;
pub use store::{FileSessionStore, InMemorySessionStore, SessionStore};
