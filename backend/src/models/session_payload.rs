//! Admin create/update payload and the API views of a session.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::models::session::{
    MentorRef, Session, SessionStatus, SessionWrite, DEFAULT_DURATION_MINUTES,
};
use crate::services::session_status::{BoardEntry, SessionAction};
use crate::types::{MentorId, SessionId, UserId};
use crate::utils::time::{date_label, time_label};
use crate::validation::rules;

/// Body of `POST /api/admin/sessions` and `PUT /api/admin/sessions/{id}`.
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[validate(schema(function = "rules::validate_session_audience"))]
pub struct SessionPayload {
    #[validate(custom(function = "rules::validate_topic"))]
    pub topic: String,
    #[validate(required(message = "Mentor is required"))]
    pub mentor_id: Option<MentorId>,
    #[validate(
        required(message = "Session date and time are required"),
        custom(function = "rules::validate_scheduled_at")
    )]
    pub scheduled_at: Option<DateTime<Utc>>,
    /// Minutes; defaults to 60.
    #[validate(range(min = 15, max = 1440))]
    pub duration_minutes: Option<u32>,
    #[validate(custom(function = "rules::validate_join_link"))]
    pub join_link: Option<String>,
    /// Defaults to `scheduled`.
    #[serde(default)]
    pub status: Option<SessionStatus>,
    pub student_id: Option<UserId>,
    #[serde(default)]
    pub for_all_students: bool,
    pub notes: Option<String>,
}

impl SessionPayload {
    /// Full record for the backend. Sessions open to everyone carry no
    /// student.
    pub fn into_write(self) -> SessionWrite {
        let trimmed = |value: Option<String>| {
            value
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        SessionWrite {
            topic: self.topic.trim().to_string(),
            mentor_id: self.mentor_id,
            scheduled_at: self.scheduled_at,
            duration_minutes: self.duration_minutes.unwrap_or(DEFAULT_DURATION_MINUTES),
            join_link: trimmed(self.join_link),
            status: self.status.unwrap_or_default(),
            student_id: if self.for_all_students {
                None
            } else {
                self.student_id
            },
            for_all_students: self.for_all_students,
            notes: trimmed(self.notes),
        }
    }
}

/// A session as returned by the admin endpoints.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SessionResponse {
    pub id: SessionId,
    pub topic: String,
    pub mentor: MentorRef,
    pub student_id: Option<UserId>,
    /// "All Students", the student's name, or "No Student Assigned".
    pub student_label: String,
    pub for_all_students: bool,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub duration_minutes: u32,
    pub join_link: Option<String>,
    pub status: SessionStatus,
    pub notes: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<&Session> for SessionResponse {
    fn from(session: &Session) -> Self {
        Self {
            id: session.id,
            topic: session.topic.clone(),
            mentor: session.mentor.clone(),
            student_id: session.student.as_ref().map(|student| student.id),
            student_label: session.student_label().to_string(),
            for_all_students: session.for_all_students,
            scheduled_at: session.scheduled_at,
            duration_minutes: session.duration_minutes,
            join_link: session.join_link.clone(),
            status: session.status,
            notes: session.notes.clone(),
            created_at: session.created_at,
            updated_at: session.updated_at,
        }
    }
}

impl From<Session> for SessionResponse {
    fn from(session: Session) -> Self {
        Self::from(&session)
    }
}

/// One card on the student board.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SessionCard {
    pub id: SessionId,
    pub topic: String,
    pub mentor_name: String,
    pub mentor_expertise: String,
    pub scheduled_at: Option<DateTime<Utc>>,
    /// e.g. "Monday, January 1, 2024", or "Unknown Date".
    pub date_label: String,
    /// e.g. "14:30", or "Unknown Time".
    pub time_label: String,
    pub duration_minutes: u32,
    pub status: SessionStatus,
    pub action: SessionAction,
}

impl SessionCard {
    pub fn new(entry: BoardEntry, tz: &Tz) -> Self {
        let BoardEntry { session, action } = entry;
        Self {
            id: session.id,
            date_label: date_label(session.scheduled_at, tz),
            time_label: time_label(session.scheduled_at, tz),
            topic: session.topic,
            mentor_name: session.mentor.name,
            mentor_expertise: session.mentor.expertise,
            scheduled_at: session.scheduled_at,
            duration_minutes: session.duration_minutes,
            status: session.status,
            action,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn payload() -> SessionPayload {
        SessionPayload {
            topic: "  Mock interview ".into(),
            mentor_id: Some(MentorId::new()),
            scheduled_at: Some(Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap()),
            duration_minutes: None,
            join_link: Some("https://meet.example.com/abc".into()),
            status: None,
            student_id: Some(UserId::new()),
            for_all_students: false,
            notes: Some("   ".into()),
        }
    }

    #[test]
    fn valid_payload_passes() {
        assert!(payload().validate().is_ok());
    }

    #[test]
    fn missing_mentor_or_time_is_rejected() {
        let mut p = payload();
        p.mentor_id = None;
        let errors = p.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("mentor_id"));

        let mut p = payload();
        p.scheduled_at = None;
        let errors = p.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("scheduled_at"));
    }

    #[test]
    fn extended_year_start_is_rejected() {
        let json = serde_json::json!({
            "topic": "Far future",
            "mentor_id": MentorId::new().to_string(),
            "scheduled_at": "+262142-12-31T23:30:00Z",
            "for_all_students": true
        });
        let p: SessionPayload = serde_json::from_value(json).unwrap();
        assert!(p.scheduled_at.is_some());
        let errors = p.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("scheduled_at"));
    }

    #[test]
    fn short_duration_is_rejected() {
        let mut p = payload();
        p.duration_minutes = Some(10);
        let errors = p.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("duration_minutes"));
    }

    #[test]
    fn student_required_unless_open_to_all() {
        let mut p = payload();
        p.student_id = None;
        assert!(p.validate().is_err());

        p.for_all_students = true;
        assert!(p.validate().is_ok());
    }

    #[test]
    fn into_write_applies_defaults_and_clears_student_for_everyone() {
        let mut p = payload();
        p.for_all_students = true;
        let write = p.into_write();

        assert_eq!(write.topic, "Mock interview");
        assert_eq!(write.duration_minutes, DEFAULT_DURATION_MINUTES);
        assert_eq!(write.status, SessionStatus::Scheduled);
        assert_eq!(write.student_id, None);
        assert_eq!(write.notes, None);
        assert_eq!(write.join_link.as_deref(), Some("https://meet.example.com/abc"));
    }

    #[test]
    fn payload_deserializes_without_optional_fields() {
        let mentor = MentorId::new();
        let json = serde_json::json!({
            "topic": "Resume review",
            "mentor_id": mentor.to_string(),
            "scheduled_at": "2024-01-01T10:00:00Z",
            "for_all_students": true
        });
        let p: SessionPayload = serde_json::from_value(json).unwrap();
        assert_eq!(p.mentor_id, Some(mentor));
        assert_eq!(p.status, None);
        assert!(p.validate().is_ok());
    }
}
