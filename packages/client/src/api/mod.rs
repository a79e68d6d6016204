//! Dashboard-facing operations built on the session, gateway, cache, and live channel.

mod auth;
mod dashboard;

pub use auth::AuthService;
pub use dashboard::{
    BUILDS, DashboardApi, NOTIFICATIONS, ORGANIZATIONS, PIPELINES, TASKS,
};
