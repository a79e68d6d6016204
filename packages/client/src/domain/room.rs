//! Live channel rooms.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ClientError;

/// Kind of resource a room follows
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomKind {
    Pipeline,
    Build,
    Organization,
}

impl RoomKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoomKind::Pipeline => "pipeline",
            RoomKind::Build => "build",
            RoomKind::Organization => "organization",
        }
    }
}

/// A subscription topic on the live channel
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RoomId {
    pub kind: RoomKind,
    pub id: String,
}

impl RoomId {
    pub fn new(kind: RoomKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }

    pub fn pipeline(id: impl Into<String>) -> Self {
        Self::new(RoomKind::Pipeline, id)
    }

    pub fn build(id: impl Into<String>) -> Self {
        Self::new(RoomKind::Build, id)
    }

    pub fn organization(id: impl Into<String>) -> Self {
        Self::new(RoomKind::Organization, id)
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.as_str(), self.id)
    }
}

/// Parses `kind:id`, e.g. `pipeline:42`
impl FromStr for RoomId {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, id) = s
            .split_once(':')
            .ok_or_else(|| ClientError::Config(format!("room '{}' must look like kind:id", s)))?;
        let kind = match kind {
            "pipeline" => RoomKind::Pipeline,
            "build" => RoomKind::Build,
            "organization" | "org" => RoomKind::Organization,
            other => {
                return Err(ClientError::Config(format!("unknown room kind '{}'", other)));
            }
        };
        if id.is_empty() {
            return Err(ClientError::Config(format!("room '{}' has an empty id", s)));
        }
        Ok(RoomId::new(kind, id))
    }
}
