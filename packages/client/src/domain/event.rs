//! Server-pushed live events.
//!
//! Inbound frames look like `{ "event": "<name>", "data": { ... } }`.

use serde::{Deserialize, Serialize};

use super::room::RoomId;

/// Build status changed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildUpdate {
    pub build_id: String,
    pub pipeline_id: String,
    #[serde(default)]
    pub organization_id: Option<String>,
    pub status: String,
    #[serde(default)]
    pub number: Option<u64>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

/// Pipeline status changed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineUpdate {
    pub pipeline_id: String,
    #[serde(default)]
    pub organization_id: Option<String>,
    pub status: String,
    #[serde(default)]
    pub updated_at: Option<String>,
}

/// Notification created for the current user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationEvent {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Broadcast to every connected client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemEvent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub message: String,
}

/// One inbound event; each variant is routed to exactly one handler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum LiveEvent {
    Notification(NotificationEvent),
    BuildUpdate(BuildUpdate),
    PipelineUpdate(PipelineUpdate),
    SystemEvent(SystemEvent),
}

impl LiveEvent {
    /// Wire name of the event
    pub fn name(&self) -> &'static str {
        match self {
            LiveEvent::Notification(_) => "notification",
            LiveEvent::BuildUpdate(_) => "build_update",
            LiveEvent::PipelineUpdate(_) => "pipeline_update",
            LiveEvent::SystemEvent(_) => "system_event",
        }
    }

    /// Room the event belongs to, if it is room-scoped
    pub fn room(&self) -> Option<RoomId> {
        match self {
            LiveEvent::BuildUpdate(update) => Some(RoomId::build(update.build_id.clone())),
            LiveEvent::PipelineUpdate(update) => {
                Some(RoomId::pipeline(update.pipeline_id.clone()))
            }
            LiveEvent::Notification(_) | LiveEvent::SystemEvent(_) => None,
        }
    }
}
