//! Derives a session's display label and joinability from the wall clock.
//!
//! Nothing here is persisted; callers re-evaluate on every request or tick.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use utoipa::ToSchema;

use crate::models::session::{Session, SessionStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ToSchema)]
pub enum SessionLabel {
    InvalidDate,
    Cancelled,
    Completed,
    Pending,
    Register,
    JoinNow,
    Ended,
}

impl SessionLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionLabel::InvalidDate => "Invalid Date",
            SessionLabel::Cancelled => "Cancelled",
            SessionLabel::Completed => "Completed",
            SessionLabel::Pending => "Pending",
            SessionLabel::Register => "Register",
            SessionLabel::JoinNow => "Join Now",
            SessionLabel::Ended => "Ended",
        }
    }

    pub fn is_upcoming(&self) -> bool {
        matches!(self, SessionLabel::Register | SessionLabel::JoinNow)
    }

    pub fn is_past(&self) -> bool {
        matches!(self, SessionLabel::Ended | SessionLabel::Completed)
    }
}

impl fmt::Display for SessionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for SessionLabel {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct SessionAction {
    pub label: SessionLabel,
    pub joinable: bool,
    /// Link to open when acting on the session.
    pub link: Option<String>,
}

impl SessionAction {
    fn inert(label: SessionLabel) -> Self {
        Self {
            label,
            joinable: false,
            link: None,
        }
    }
}

/// Maps a session and the current instant to its action.
///
/// Checks run in priority order: missing start time, then the stored
/// status, then the position of `now` relative to the joinable window
/// `[scheduled_at, scheduled_at + duration]` (both ends inclusive).
///
/// A start time whose window end cannot be represented counts as invalid.
pub fn evaluate(session: &Session, now: DateTime<Utc>) -> SessionAction {
    let (Some(start), Some(end)) = (session.scheduled_at, session.window_end()) else {
        return SessionAction::inert(SessionLabel::InvalidDate);
    };

    match session.status {
        SessionStatus::Cancelled => return SessionAction::inert(SessionLabel::Cancelled),
        SessionStatus::Completed => return SessionAction::inert(SessionLabel::Completed),
        SessionStatus::Pending => return SessionAction::inert(SessionLabel::Pending),
        SessionStatus::Scheduled => {}
    }

    if now < start {
        SessionAction {
            label: SessionLabel::Register,
            joinable: true,
            link: session.join_link.clone(),
        }
    } else if now <= end {
        SessionAction {
            label: SessionLabel::JoinNow,
            joinable: session.join_link.is_some(),
            link: session.join_link.clone(),
        }
    } else {
        SessionAction::inert(SessionLabel::Ended)
    }
}

/// Whether the sweeper should promote the session to `completed`.
pub fn is_expired(session: &Session, now: DateTime<Utc>) -> bool {
    session.status == SessionStatus::Scheduled
        && session.window_end().is_some_and(|end| now > end)
}

/// A session paired with its evaluated action.
#[derive(Debug, Clone, PartialEq)]
pub struct BoardEntry {
    pub session: Session,
    pub action: SessionAction,
}

/// Sessions grouped the way the student board shows them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionBoard {
    /// Earliest upcoming session; not repeated in `upcoming`.
    pub featured: Option<BoardEntry>,
    pub upcoming: Vec<BoardEntry>,
    pub past: Vec<BoardEntry>,
}

/// Evaluates every session and splits them into featured, upcoming and past.
///
/// Entries are ordered by start time; sessions with no start time sort
/// last. Labels that are neither upcoming nor past appear nowhere.
pub fn partition<'a, I>(sessions: I, now: DateTime<Utc>) -> SessionBoard
where
    I: IntoIterator<Item = &'a Session>,
{
    let mut ordered: Vec<&Session> = sessions.into_iter().collect();
    ordered.sort_by_key(|session| (session.scheduled_at.is_none(), session.scheduled_at));

    let mut board = SessionBoard::default();
    for session in ordered {
        let action = evaluate(session, now);
        let entry = BoardEntry {
            session: session.clone(),
            action,
        };
        if entry.action.label.is_upcoming() {
            if board.featured.is_none() {
                board.featured = Some(entry);
            } else {
                board.upcoming.push(entry);
            }
        } else if entry.action.label.is_past() {
            board.past.push(entry);
        }
    }
    board
}
