//! Live channel frames.

use serde::{Deserialize, Serialize};

use crate::{domain::RoomId, error::ClientError};

/// Sent right after the socket opens
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthMessage {
    pub r#type: AuthMessageType,
    pub token: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMessageType {
    Auth,
}

impl AuthMessage {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            r#type: AuthMessageType::Auth,
            token: token.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionType {
    Subscribe,
    Unsubscribe,
}

/// `{ "type": "subscribe"|"unsubscribe", "room": { "kind", "id" } }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionMessage {
    pub r#type: SubscriptionType,
    pub room: RoomId,
}

impl SubscriptionMessage {
    pub fn subscribe(room: RoomId) -> Self {
        Self {
            r#type: SubscriptionType::Subscribe,
            room,
        }
    }

    pub fn unsubscribe(room: RoomId) -> Self {
        Self {
            r#type: SubscriptionType::Unsubscribe,
            room,
        }
    }

    pub fn to_json(&self) -> Result<String, ClientError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Server answer to [`AuthMessage`]: `connected` on success, `auth_error` otherwise
pub fn parse_handshake_reply(text: &str) -> Result<(), ClientError> {
    let value: serde_json::Value = serde_json::from_str(text)?;
    match value.get("event").and_then(|e| e.as_str()) {
        Some("connected") => Ok(()),
        Some("auth_error") | Some("error") => {
            let message = value
                .get("data")
                .and_then(|d| d.get("message"))
                .and_then(|m| m.as_str())
                .unwrap_or("credential rejected");
            Err(ClientError::Handshake(message.to_string()))
        }
        _ => Err(ClientError::Handshake(format!(
            "unexpected handshake reply: {}",
            text
        ))),
    }
}
