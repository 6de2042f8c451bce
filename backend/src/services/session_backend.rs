//! Boundary to the backing store: bulk load, change feed, and writes.

use std::fmt;

use async_trait::async_trait;
use futures::stream::{BoxStream, Stream, StreamExt};

use crate::models::{
    session::{Session, SessionWrite},
    session_event::{ChangeEvent, ChangeEventError},
};
use crate::types::SessionId;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// Network or store failure; safe to retry.
    #[error("backend unavailable: {0}")]
    Transient(String),
    /// The acting credentials may not perform the write.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    #[error("session {0} not found")]
    NotFound(SessionId),
    /// A single notification could not be decoded; the feed itself is fine.
    #[error("malformed change event: {0}")]
    Malformed(String),
    /// The change feed stopped delivering.
    #[error("change feed closed: {0}")]
    FeedClosed(String),
}

impl BackendError {
    /// Whether the error ends the subscription it came from.
    pub fn is_feed_fatal(&self) -> bool {
        !matches!(self, BackendError::Malformed(_))
    }
}

impl From<ChangeEventError> for BackendError {
    fn from(err: ChangeEventError) -> Self {
        BackendError::Malformed(err.to_string())
    }
}

impl From<sqlx::Error> for BackendError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            // insufficient_privilege, raised by grants and row-level security
            sqlx::Error::Database(db) if db.code().as_deref() == Some("42501") => {
                BackendError::PermissionDenied(db.message().to_string())
            }
            _ => BackendError::Transient(err.to_string()),
        }
    }
}

pub type FeedItem = Result<ChangeEvent, BackendError>;

/// A live change-feed subscription.
///
/// Closing drops the underlying stream, which releases the listener
/// connection. `close` may be called any number of times.
pub struct SessionSubscription {
    events: Option<BoxStream<'static, FeedItem>>,
}

impl SessionSubscription {
    pub fn new<S>(events: S) -> Self
    where
        S: Stream<Item = FeedItem> + Send + 'static,
    {
        Self {
            events: Some(events.boxed()),
        }
    }

    /// Next event, or `None` once the feed has ended or been closed.
    pub async fn next_event(&mut self) -> Option<FeedItem> {
        let events = self.events.as_mut()?;
        let item = events.next().await;
        if item.is_none() {
            self.events = None;
        }
        item
    }

    pub fn close(&mut self) {
        if self.events.take().is_some() {
            tracing::debug!("session change feed closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.events.is_none()
    }
}

impl fmt::Debug for SessionSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionSubscription")
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Drop for SessionSubscription {
    fn drop(&mut self) {
        self.close();
    }
}

/// Operations the session core needs from the backing store.
///
/// Every record returned here has already been normalized with
/// [`Session::from_row`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionBackend: Send + Sync {
    /// Bulk load ordered by start time.
    async fn fetch_sessions(&self) -> Result<Vec<Session>, BackendError>;

    /// Opens a change feed on the sessions table.
    async fn subscribe(&self) -> Result<SessionSubscription, BackendError>;

    /// Full-record replace.
    async fn update_session(
        &self,
        id: SessionId,
        record: SessionWrite,
    ) -> Result<Session, BackendError>;

    async fn insert_session(&self, record: SessionWrite) -> Result<Session, BackendError>;

    async fn delete_session(&self, id: SessionId) -> Result<SessionId, BackendError>;
}
