//! Domain types of the session and live-update layer.
//!
//! Everything here is pure: no I/O, no timers. Time is passed in explicitly so
//! the rules can be tested without a runtime.

pub mod connection;
pub mod event;
pub mod model;
pub mod room;
pub mod session_epoch;
pub mod token;

pub use connection::{
    ChannelEvent, ConnectionState, ConnectionStatus, Effect, ReconnectPolicy,
};
pub use event::{BuildUpdate, LiveEvent, NotificationEvent, PipelineUpdate, SystemEvent};
pub use model::{Build, Notification, Organization, Pipeline, Task, TaskDraft, TaskPatch, User};
pub use room::{RoomId, RoomKind};
pub use session_epoch::{LOGOUT_MARKER_TTL, LogoutMarker, PersistedSession};
pub use token::{TokenPair, decode_expiry, is_expired_at};
