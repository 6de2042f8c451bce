use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::str::FromStr;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::{
    error::AppError,
    models::{
        identity::Identity,
        session::Session,
        session_payload::{SessionPayload, SessionResponse},
    },
    services::live_sessions::FeedStatus,
    state::AppState,
    types::SessionId,
};

#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct SessionSearchQuery {
    /// Case-insensitive match on mentor name, student and topic.
    pub search: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct FeedStatusResponse {
    pub status: FeedStatus,
    /// Sessions currently held by the live view.
    pub sessions: usize,
}

fn ensure_admin(identity: &Identity) -> Result<(), AppError> {
    if identity.is_admin() {
        Ok(())
    } else {
        Err(AppError::Forbidden("Forbidden".into()))
    }
}

fn parse_session_id(raw: &str) -> Result<SessionId, AppError> {
    SessionId::from_str(raw).map_err(|_| AppError::BadRequest("Invalid session ID".into()))
}

pub(crate) fn matches_search(session: &Session, needle: &str) -> bool {
    let needle = needle.to_lowercase();
    [
        session.mentor.name.as_str(),
        session.student_label(),
        session.topic.as_str(),
    ]
    .iter()
    .any(|field| field.to_lowercase().contains(&needle))
}

pub async fn list_sessions(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Query(q): Query<SessionSearchQuery>,
) -> Result<Json<Vec<SessionResponse>>, AppError> {
    ensure_admin(&identity)?;

    let needle = q
        .search
        .as_deref()
        .map(str::trim)
        .filter(|needle| !needle.is_empty());
    let snapshot = state.live.snapshot();
    let mut sessions: Vec<&Session> = snapshot
        .iter()
        .filter(|session| needle.map_or(true, |needle| matches_search(session, needle)))
        .collect();
    sessions.sort_by_key(|session| (session.scheduled_at.is_none(), session.scheduled_at));

    Ok(Json(sessions.into_iter().map(SessionResponse::from).collect()))
}

pub async fn create_session(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(payload): Json<SessionPayload>,
) -> Result<(StatusCode, Json<SessionResponse>), AppError> {
    ensure_admin(&identity)?;
    payload.validate()?;

    let created = state.backend.insert_session(payload.into_write()).await?;
    tracing::info!(session_id = %created.id, user_id = %identity.user_id, "session created");
    Ok((StatusCode::CREATED, Json(SessionResponse::from(created))))
}

pub async fn update_session(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(session_id): Path<String>,
    Json(payload): Json<SessionPayload>,
) -> Result<Json<SessionResponse>, AppError> {
    ensure_admin(&identity)?;
    let id = parse_session_id(&session_id)?;
    payload.validate()?;

    let updated = state.backend.update_session(id, payload.into_write()).await?;
    tracing::info!(session_id = %id, user_id = %identity.user_id, "session updated");
    Ok(Json(SessionResponse::from(updated)))
}

pub async fn delete_session(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(session_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    ensure_admin(&identity)?;
    let id = parse_session_id(&session_id)?;

    state.backend.delete_session(id).await?;
    tracing::info!(session_id = %id, user_id = %identity.user_id, "session deleted");
    Ok(Json(json!({"message":"Session deleted","id": id})))
}

pub async fn feed_status(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<FeedStatusResponse>, AppError> {
    ensure_admin(&identity)?;
    Ok(Json(FeedStatusResponse {
        status: state.live.status(),
        sessions: state.live.snapshot().len(),
    }))
}

pub async fn retry_feed(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<(StatusCode, Json<FeedStatusResponse>), AppError> {
    ensure_admin(&identity)?;
    let status = state.live.status();
    if status.is_live() {
        return Err(AppError::BadRequest("Session feed is already live".into()));
    }

    state.live.request_retry();
    tracing::info!(user_id = %identity.user_id, "session feed retry requested");
    Ok((
        StatusCode::ACCEPTED,
        Json(FeedStatusResponse {
            status,
            sessions: state.live.snapshot().len(),
        }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::session::{SessionRow, ALL_STUDENTS_LABEL};

    fn session(topic: &str, mentor: &str, student: Option<&str>) -> Session {
        let mut row = SessionRow {
            topic: Some(topic.into()),
            mentor_name: Some(mentor.into()),
            status: Some("scheduled".into()),
            ..SessionRow::bare(SessionId::new())
        };
        match student {
            Some(name) => {
                row.student_id = Some(crate::types::UserId::new());
                row.student_name = Some(name.into());
            }
            None => row.for_all_students = Some(true),
        }
        Session::from_row(row).unwrap()
    }

    #[test]
    fn search_covers_mentor_student_and_topic() {
        let s = session("System Design", "Asha Rao", Some("Kai Chen"));
        assert!(matches_search(&s, "asha"));
        assert!(matches_search(&s, "KAI"));
        assert!(matches_search(&s, "design"));
        assert!(!matches_search(&s, "resume"));
    }

    #[test]
    fn search_matches_all_students_label() {
        let s = session("Career fair prep", "Asha Rao", None);
        assert_eq!(s.student_label(), ALL_STUDENTS_LABEL);
        assert!(matches_search(&s, "all students"));
    }

    #[test]
    fn invalid_session_id_is_bad_request() {
        assert!(matches!(
            parse_session_id("not-a-uuid"),
            Err(AppError::BadRequest(_))
        ));
    }
}
