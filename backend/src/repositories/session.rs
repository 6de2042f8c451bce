//! PostgreSQL implementation of [`SessionBackend`].
//!
//! Reads join the mentor and user directory so every row arrives in the
//! flat [`SessionRow`] shape. The change-feed trigger only names the changed
//! row; the listener re-reads it with the same joined select.

use async_trait::async_trait;
use futures::stream;
use sqlx::{
    postgres::{PgListener, PgNotification},
    PgPool,
};

use crate::db::connection::DbPool;
use crate::models::{
    session::{Session, SessionRow, SessionWrite},
    session_event::{ChangeEvent, ChangeNotice},
};
use crate::services::session_backend::{
    BackendError, FeedItem, SessionBackend, SessionSubscription,
};
use crate::types::SessionId;

const TABLE_NAME: &str = "sessions";
const WRITE_COLUMNS: &str = "topic, mentor_id, session_datetime, duration, session_link, status, \
     student_id, for_all_students, notes";
const SELECT_COLUMNS: &str = "s.id, s.topic, s.mentor_id, m.name AS mentor_name, \
     m.expertise AS mentor_expertise, s.student_id, u.display_name AS student_name, \
     s.for_all_students, s.session_datetime, s.duration, s.session_link, s.status, s.notes, \
     s.created_at, s.updated_at";
const JOINS: &str = "LEFT JOIN mentors m ON m.id = s.mentor_id \
     LEFT JOIN users u ON u.id = s.student_id";

#[derive(Clone)]
pub struct PgSessionBackend {
    pool: DbPool,
    feed_channel: String,
}

impl PgSessionBackend {
    pub fn new(pool: DbPool, feed_channel: impl Into<String>) -> Self {
        Self {
            pool,
            feed_channel: feed_channel.into(),
        }
    }

    /// Wraps a data-modifying statement that returns `*` so the result comes
    /// back joined like a bulk-load row.
    fn joined(statement: &str) -> String {
        format!(
            "WITH written AS ({statement}) SELECT {columns} FROM written s {joins}",
            columns = SELECT_COLUMNS,
            joins = JOINS
        )
    }

    fn normalize(row: SessionRow) -> Result<Session, BackendError> {
        let id = row.id;
        Session::from_row(row)
            .map_err(|err| BackendError::Malformed(format!("session {id}: {err}")))
    }

    fn bind_write<'q>(
        query: sqlx::query::QueryAs<'q, sqlx::Postgres, SessionRow, sqlx::postgres::PgArguments>,
        record: &'q SessionWrite,
    ) -> sqlx::query::QueryAs<'q, sqlx::Postgres, SessionRow, sqlx::postgres::PgArguments> {
        query
            .bind(&record.topic)
            .bind(record.mentor_id)
            .bind(record.scheduled_at)
            .bind(i32::try_from(record.duration_minutes).unwrap_or(i32::MAX))
            .bind(&record.join_link)
            .bind(record.status.as_str())
            .bind(record.student_id)
            .bind(record.for_all_students)
            .bind(&record.notes)
    }
}

async fn fetch_row(pool: &PgPool, id: SessionId) -> Result<Option<SessionRow>, sqlx::Error> {
    let query = format!(
        "SELECT {} FROM {} s {} WHERE s.id = $1",
        SELECT_COLUMNS, TABLE_NAME, JOINS
    );
    sqlx::query_as::<_, SessionRow>(&query)
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Turns one notification into a feed item. `None` means the row vanished
/// before it could be read; its DELETE notification follows.
async fn resolve_notification(pool: &PgPool, notification: &PgNotification) -> Option<FeedItem> {
    let notice = match ChangeNotice::from_payload(notification.payload()) {
        Ok(notice) => notice,
        Err(err) => return Some(Err(BackendError::from(err))),
    };
    match notice {
        ChangeNotice::Written { change, id } => match fetch_row(pool, id).await {
            Ok(Some(row)) => Some(Ok(ChangeEvent::written(change, row))),
            Ok(None) => {
                tracing::debug!(session_id = %id, "changed session already gone");
                None
            }
            Err(err) => Some(Err(BackendError::from(err))),
        },
        ChangeNotice::Deleted(id) => Some(Ok(ChangeEvent::Delete(id))),
        ChangeNotice::Unrecognized { kind } => Some(Ok(ChangeEvent::Unrecognized { kind })),
    }
}

#[async_trait]
impl SessionBackend for PgSessionBackend {
    async fn fetch_sessions(&self) -> Result<Vec<Session>, BackendError> {
        let query = format!(
            "SELECT {} FROM {} s {} ORDER BY s.session_datetime ASC NULLS LAST, s.created_at ASC",
            SELECT_COLUMNS, TABLE_NAME, JOINS
        );
        let rows = sqlx::query_as::<_, SessionRow>(&query)
            .fetch_all(self.pool.as_ref())
            .await?;

        let mut sessions = Vec::with_capacity(rows.len());
        for row in rows {
            match Self::normalize(row) {
                Ok(session) => sessions.push(session),
                Err(err) => tracing::warn!(error = %err, "skipping malformed session"),
            }
        }
        Ok(sessions)
    }

    async fn subscribe(&self) -> Result<SessionSubscription, BackendError> {
        let mut listener = PgListener::connect_with(self.pool.as_ref()).await?;
        listener.listen(&self.feed_channel).await?;
        tracing::debug!(channel = %self.feed_channel, "listening for session changes");

        // `try_recv` reports a lost connection as `None`; the feed ends there
        // instead of silently reconnecting past missed notifications.
        let pool = self.pool.clone();
        let events = stream::unfold(Some(listener), move |state| {
            let pool = pool.clone();
            async move {
                let mut listener = state?;
                loop {
                    let item = match listener.try_recv().await {
                        Ok(Some(notification)) => {
                            match resolve_notification(&pool, &notification).await {
                                Some(item) => item,
                                None => continue,
                            }
                        }
                        Ok(None) => {
                            return Some((
                                Err(BackendError::FeedClosed("listener connection lost".to_string())),
                                None,
                            ))
                        }
                        Err(err) => return Some((Err(BackendError::FeedClosed(err.to_string())), None)),
                    };
                    return Some((item, Some(listener)));
                }
            }
        });
        Ok(SessionSubscription::new(events))
    }

    async fn update_session(
        &self,
        id: SessionId,
        record: SessionWrite,
    ) -> Result<Session, BackendError> {
        let statement = format!(
            "UPDATE {} SET topic = $2, mentor_id = $3, session_datetime = $4, duration = $5, \
             session_link = $6, status = $7, student_id = $8, for_all_students = $9, notes = $10, \
             updated_at = NOW() WHERE id = $1 RETURNING *",
            TABLE_NAME
        );
        let query = Self::joined(&statement);
        let row = Self::bind_write(sqlx::query_as::<_, SessionRow>(&query).bind(id), &record)
            .fetch_optional(self.pool.as_ref())
            .await?
            .ok_or(BackendError::NotFound(id))?;
        Self::normalize(row)
    }

    async fn insert_session(&self, record: SessionWrite) -> Result<Session, BackendError> {
        let statement = format!(
            "INSERT INTO {} (id, {}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) RETURNING *",
            TABLE_NAME, WRITE_COLUMNS
        );
        let query = Self::joined(&statement);
        let row = Self::bind_write(
            sqlx::query_as::<_, SessionRow>(&query).bind(SessionId::new()),
            &record,
        )
        .fetch_one(self.pool.as_ref())
        .await?;
        Self::normalize(row)
    }

    async fn delete_session(&self, id: SessionId) -> Result<SessionId, BackendError> {
        let query = format!("DELETE FROM {} WHERE id = $1 RETURNING id", TABLE_NAME);
        sqlx::query_scalar::<_, SessionId>(&query)
            .bind(id)
            .fetch_optional(self.pool.as_ref())
            .await?
            .ok_or(BackendError::NotFound(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_columns_match_row_shape() {
        for column in [
            "mentor_name",
            "mentor_expertise",
            "student_name",
            "session_datetime",
            "session_link",
        ] {
            assert!(SELECT_COLUMNS.contains(column), "missing {column}");
        }
    }

    #[test]
    fn joined_statement_selects_from_written_rows() {
        let query = PgSessionBackend::joined("DELETE FROM sessions RETURNING *");
        assert!(query.starts_with("WITH written AS (DELETE FROM sessions RETURNING *)"));
        assert!(query.contains("FROM written s LEFT JOIN mentors m"));
    }
}
