//! Rules for the admin session form.

use chrono::{DateTime, Datelike, Utc};
use validator::ValidationError;

use crate::models::session_payload::SessionPayload;

/// Topic must contain something other than whitespace.
pub fn validate_topic(topic: &str) -> Result<(), ValidationError> {
    if topic.trim().is_empty() {
        return Err(ValidationError::new("topic_required"));
    }
    if topic.trim().chars().count() > 200 {
        return Err(ValidationError::new("topic_too_long"));
    }
    Ok(())
}

/// A join link, when filled in, must be an absolute http(s) URL.
/// Blank input means "no link".
pub fn validate_join_link(link: &str) -> Result<(), ValidationError> {
    let link = link.trim();
    if link.is_empty() {
        return Ok(());
    }
    match url::Url::parse(link) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") && parsed.has_host() => Ok(()),
        _ => Err(ValidationError::new("join_link_invalid")),
    }
}

/// Latest year a session may be scheduled in.
pub const MAX_SCHEDULE_YEAR: i32 = 9999;

/// Start time must be a four-digit year no earlier than 1970.
pub fn validate_scheduled_at(start: &DateTime<Utc>) -> Result<(), ValidationError> {
    if (1970..=MAX_SCHEDULE_YEAR).contains(&start.year()) {
        Ok(())
    } else {
        Err(ValidationError::new("scheduled_at_out_of_range"))
    }
}

/// A session is either open to all students or booked for one.
pub fn validate_session_audience(payload: &SessionPayload) -> Result<(), ValidationError> {
    if !payload.for_all_students && payload.student_id.is_none() {
        return Err(ValidationError::new("student_required"));
    }
    Ok(())
}
