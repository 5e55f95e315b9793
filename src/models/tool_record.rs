use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::user::UserId;

/// Persisted configuration of one tool for one user.
///
/// At most one record exists per `(owner_id, tool_name)`; the store's
/// conflict key enforces it. The payload is opaque to everything but the
/// tool that wrote it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolRecord {
    pub owner_id: UserId,
    pub tool_name: String,
    pub payload: Value,
    pub updated_at: DateTime<Utc>,
}

impl ToolRecord {
    /// Creates a record stamped with the current time.
    pub fn new(owner_id: UserId, tool_name: impl Into<String>, payload: Value) -> Self {
        Self {
            owner_id,
            tool_name: tool_name.into(),
            payload,
            updated_at: Utc::now(),
        }
    }
}

/// Kind of row change carried by a realtime notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// Realtime notification describing a change to a tool record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    #[serde(default)]
    pub old: Option<ToolRecord>,
    #[serde(default)]
    pub new: Option<ToolRecord>,
}

impl ChangeEvent {
    /// Builds the event for an upsert, given the row it replaced (if any).
    pub fn from_upsert(old: Option<ToolRecord>, new: ToolRecord) -> Self {
        let kind = if old.is_some() {
            ChangeKind::Update
        } else {
            ChangeKind::Insert
        };
        Self {
            kind,
            old,
            new: Some(new),
        }
    }

    /// Owner of the changed row.
    pub fn owner_id(&self) -> Option<&UserId> {
        self.new
            .as_ref()
            .or(self.old.as_ref())
            .map(|record| &record.owner_id)
    }
}
