//! Change-feed events for the `sessions` table.
//!
//! The database trigger only announces which row changed (`{type, id}`);
//! `pg_notify` payloads are capped at 8000 bytes, so the row itself is
//! re-read by the listener and delivered as a [`ChangeEvent`].

use serde::Deserialize;

use crate::models::session::SessionRow;
use crate::types::SessionId;

/// One change delivered to the live view.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent {
    Insert(SessionRow),
    Update(SessionRow),
    Delete(SessionId),
    /// A notification whose kind this service does not handle.
    Unrecognized { kind: String },
}

impl ChangeEvent {
    pub fn kind(&self) -> &str {
        match self {
            ChangeEvent::Insert(_) => "INSERT",
            ChangeEvent::Update(_) => "UPDATE",
            ChangeEvent::Delete(_) => "DELETE",
            ChangeEvent::Unrecognized { kind } => kind.as_str(),
        }
    }

    pub fn session_id(&self) -> Option<SessionId> {
        match self {
            ChangeEvent::Insert(row) | ChangeEvent::Update(row) => Some(row.id),
            ChangeEvent::Delete(id) => Some(*id),
            ChangeEvent::Unrecognized { .. } => None,
        }
    }

    /// Event for a written row once it has been re-read.
    pub fn written(change: RowChange, row: SessionRow) -> Self {
        match change {
            RowChange::Insert => ChangeEvent::Insert(row),
            RowChange::Update => ChangeEvent::Update(row),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowChange {
    Insert,
    Update,
}

/// A decoded trigger notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeNotice {
    /// The row must be re-read to build the event.
    Written { change: RowChange, id: SessionId },
    Deleted(SessionId),
    Unrecognized { kind: String },
}

impl ChangeNotice {
    /// Decodes a JSON notification payload of the form
    /// `{"type": "INSERT" | "UPDATE" | "DELETE", "id": "..."}`.
    pub fn from_payload(payload: &str) -> Result<Self, ChangeEventError> {
        let envelope: NoticeEnvelope = serde_json::from_str(payload)
            .map_err(|err| ChangeEventError::Decode(err.to_string()))?;

        let kind = envelope.kind.to_ascii_uppercase();
        let change = match kind.as_str() {
            "INSERT" => RowChange::Insert,
            "UPDATE" => RowChange::Update,
            "DELETE" => {
                let id = envelope.id.ok_or(ChangeEventError::MissingId("DELETE"))?;
                return Ok(ChangeNotice::Deleted(id));
            }
            _ => {
                return Ok(ChangeNotice::Unrecognized {
                    kind: envelope.kind,
                })
            }
        };
        let id = envelope.id.ok_or(match change {
            RowChange::Insert => ChangeEventError::MissingId("INSERT"),
            RowChange::Update => ChangeEventError::MissingId("UPDATE"),
        })?;
        Ok(ChangeNotice::Written { change, id })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChangeEventError {
    #[error("undecodable change payload: {0}")]
    Decode(String),
    #[error("{0} notification without a session id")]
    MissingId(&'static str),
}

#[derive(Debug, Deserialize)]
struct NoticeEnvelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    id: Option<SessionId>,
}
