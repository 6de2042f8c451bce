use axum::{
    extract::{Extension, State},
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    error::AppError,
    models::{identity::Identity, session_payload::SessionCard},
    services::{
        live_sessions::FeedStatus,
        session_status::{partition, BoardEntry},
    },
    state::AppState,
};

/// The caller's session board, evaluated at request time.
#[derive(Debug, Serialize, ToSchema)]
pub struct SessionBoardResponse {
    pub feed: FeedStatus,
    /// Earliest upcoming session.
    pub featured: Option<SessionCard>,
    pub upcoming: Vec<SessionCard>,
    pub past: Vec<SessionCard>,
}

pub async fn my_sessions(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<SessionBoardResponse>, AppError> {
    let snapshot = state.live.snapshot();
    let now = state.clock.now();
    let tz = state.config.time_zone;

    let board = partition(
        snapshot.iter().filter(|session| identity.can_see(session)),
        now,
    );
    let card = |entry: BoardEntry| SessionCard::new(entry, &tz);

    Ok(Json(SessionBoardResponse {
        feed: state.live.status(),
        featured: board.featured.map(card),
        upcoming: board.upcoming.into_iter().map(card).collect(),
        past: board.past.into_iter().map(card).collect(),
    }))
}
