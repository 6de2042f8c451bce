//! Mentoring session records.
//!
//! Sessions reach the service in two ways: the bulk query and the change
//! feed. Both deliver the same flat [`SessionRow`] shape and both go through
//! [`Session::from_row`], so a freshly loaded entry and an incrementally
//! patched one never differ in shape.

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use sqlx::FromRow;
use std::{fmt, str::FromStr};
use utoipa::ToSchema;

use crate::types::{MentorId, SessionId, UserId};

/// Duration applied when a record carries no positive duration.
pub const DEFAULT_DURATION_MINUTES: u32 = 60;
/// Mentor name shown when the mentor reference cannot be resolved.
pub const UNKNOWN_MENTOR_NAME: &str = "Unknown";
pub const ALL_STUDENTS_LABEL: &str = "All Students";
pub const NO_STUDENT_LABEL: &str = "No Student Assigned";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Pending,
    Scheduled,
    Completed,
    Cancelled,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Pending => "pending",
            SessionStatus::Scheduled => "scheduled",
            SessionStatus::Completed => "completed",
            SessionStatus::Cancelled => "cancelled",
        }
    }
}

impl Default for SessionStatus {
    fn default() -> Self {
        SessionStatus::Scheduled
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = NormalizeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(SessionStatus::Pending),
            "scheduled" => Ok(SessionStatus::Scheduled),
            "completed" => Ok(SessionStatus::Completed),
            "cancelled" => Ok(SessionStatus::Cancelled),
            other => Err(NormalizeError::UnknownStatus(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NormalizeError {
    #[error("unknown session status `{0}`")]
    UnknownStatus(String),
}

/// Weak reference to the mentor running a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct MentorRef {
    pub id: Option<MentorId>,
    pub name: String,
    pub expertise: String,
}

/// Reference to the single student a session is booked for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct StudentRef {
    pub id: UserId,
    /// Resolved from the user directory when the record was loaded.
    pub display_name: Option<String>,
}

/// A normalized session held by the live view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub topic: String,
    pub mentor: MentorRef,
    pub student: Option<StudentRef>,
    pub for_all_students: bool,
    /// `None` when the stored start time is absent or unparsable.
    pub scheduled_at: Option<DateTime<Utc>>,
    pub duration_minutes: u32,
    pub join_link: Option<String>,
    pub status: SessionStatus,
    pub notes: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Session {
    /// Normalizes a raw row: resolves the mentor reference, aliases the join
    /// link, and defaults the duration.
    pub fn from_row(row: SessionRow) -> Result<Self, NormalizeError> {
        let status = match row.status.as_deref() {
            Some(raw) => raw.parse()?,
            None => SessionStatus::default(),
        };

        let mentor = MentorRef {
            id: row.mentor_id,
            name: non_blank(row.mentor_name).unwrap_or_else(|| UNKNOWN_MENTOR_NAME.to_string()),
            expertise: row.mentor_expertise.unwrap_or_default(),
        };

        let student = row.student_id.map(|id| StudentRef {
            id,
            display_name: non_blank(row.student_name),
        });

        let duration_minutes = row
            .duration
            .and_then(|minutes| u32::try_from(minutes).ok())
            .filter(|minutes| *minutes > 0)
            .unwrap_or(DEFAULT_DURATION_MINUTES);

        Ok(Session {
            id: row.id,
            topic: row.topic.unwrap_or_default(),
            mentor,
            student,
            for_all_students: row.for_all_students.unwrap_or(false),
            scheduled_at: row.session_datetime,
            duration_minutes,
            join_link: non_blank(row.session_link),
            status,
            notes: row.notes,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }

    /// End of the joinable window, or `None` without a valid start time or
    /// when the end falls outside the representable range.
    pub fn window_end(&self) -> Option<DateTime<Utc>> {
        self.scheduled_at.and_then(|start| {
            start.checked_add_signed(Duration::minutes(i64::from(self.duration_minutes)))
        })
    }

    /// Full record used for a replace-style write; every field is echoed.
    pub fn to_write(&self) -> SessionWrite {
        SessionWrite {
            topic: self.topic.clone(),
            mentor_id: self.mentor.id,
            scheduled_at: self.scheduled_at,
            duration_minutes: self.duration_minutes,
            join_link: self.join_link.clone(),
            status: self.status,
            student_id: self.student.as_ref().map(|student| student.id),
            for_all_students: self.for_all_students,
            notes: self.notes.clone(),
        }
    }

    pub fn student_label(&self) -> &str {
        if self.for_all_students {
            return ALL_STUDENTS_LABEL;
        }
        self.student
            .as_ref()
            .and_then(|student| student.display_name.as_deref())
            .unwrap_or(NO_STUDENT_LABEL)
    }
}

/// Flat row shape shared by the bulk query and change-feed payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct SessionRow {
    pub id: SessionId,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub mentor_id: Option<MentorId>,
    #[serde(default)]
    pub mentor_name: Option<String>,
    #[serde(default)]
    pub mentor_expertise: Option<String>,
    #[serde(default)]
    pub student_id: Option<UserId>,
    #[serde(default)]
    pub student_name: Option<String>,
    #[serde(default)]
    pub for_all_students: Option<bool>,
    #[serde(default, deserialize_with = "lenient_datetime")]
    pub session_datetime: Option<DateTime<Utc>>,
    #[serde(default)]
    pub duration: Option<i32>,
    #[serde(default)]
    pub session_link: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default, deserialize_with = "lenient_datetime")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_datetime")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl SessionRow {
    /// Minimal row with only the identifier set; handy for building fixtures.
    pub fn bare(id: SessionId) -> Self {
        Self {
            id,
            topic: None,
            mentor_id: None,
            mentor_name: None,
            mentor_expertise: None,
            student_id: None,
            student_name: None,
            for_all_students: None,
            session_datetime: None,
            duration: None,
            session_link: None,
            status: None,
            notes: None,
            created_at: None,
            updated_at: None,
        }
    }
}

/// Full record written on insert and update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionWrite {
    pub topic: String,
    pub mentor_id: Option<MentorId>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub duration_minutes: u32,
    pub join_link: Option<String>,
    pub status: SessionStatus,
    pub student_id: Option<UserId>,
    pub for_all_students: bool,
    pub notes: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Accepts RFC 3339 strings and zone-less ISO timestamps (read as UTC);
/// anything else becomes `None` instead of failing the whole record.
fn lenient_datetime<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(raw)) => parse_timestamp(&raw),
        _ => None,
    })
}

pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    // Postgres renders timestamptz in JSON with a short "+00" offset.
    if let Ok(parsed) = DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f%#z") {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}
