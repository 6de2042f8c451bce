//! In-process [`SessionBackend`] used by tests and local tooling.
//!
//! Writes loop back to every open subscription as change events, the same
//! way the database trigger does, so the live view can be exercised end to
//! end without Postgres.

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::{Arc, Mutex, MutexGuard},
};

use async_trait::async_trait;
use chrono::Utc;
use futures::channel::mpsc;

use crate::models::{
    session::{MentorRef, Session, SessionRow, SessionWrite},
    session_event::ChangeEvent,
};
use crate::services::session_backend::{
    BackendError, FeedItem, SessionBackend, SessionSubscription,
};
use crate::types::{MentorId, SessionId, UserId};

#[derive(Default)]
struct MemoryState {
    rows: BTreeMap<SessionId, SessionRow>,
    mentors: HashMap<MentorId, MentorRef>,
    students: HashMap<UserId, String>,
    subscribers: Vec<mpsc::UnboundedSender<FeedItem>>,
    failing_updates: HashSet<SessionId>,
    fail_fetch: Option<BackendError>,
    fail_subscribe: Option<BackendError>,
    update_calls: Vec<(SessionId, SessionWrite)>,
    subscribe_calls: usize,
}

#[derive(Clone, Default)]
pub struct MemorySessionBackend {
    state: Arc<Mutex<MemoryState>>,
}

impl MemorySessionBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        // A panic while holding the lock only happens inside a failing test.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn add_mentor(&self, mentor: MentorRef) {
        if let Some(id) = mentor.id {
            self.lock().mentors.insert(id, mentor);
        }
    }

    pub fn add_student(&self, id: UserId, display_name: impl Into<String>) {
        self.lock().students.insert(id, display_name.into());
    }

    /// Stores a row without notifying subscribers.
    pub fn seed(&self, row: SessionRow) {
        self.lock().rows.insert(row.id, row);
    }

    pub fn fail_updates_for(&self, id: SessionId) {
        self.lock().failing_updates.insert(id);
    }

    pub fn clear_update_failures(&self) {
        self.lock().failing_updates.clear();
    }

    pub fn fail_fetch_with(&self, error: Option<BackendError>) {
        self.lock().fail_fetch = error;
    }

    pub fn fail_subscribe_with(&self, error: Option<BackendError>) {
        self.lock().fail_subscribe = error;
    }

    /// Every update attempted so far, including failed ones.
    pub fn update_calls(&self) -> Vec<(SessionId, SessionWrite)> {
        self.lock().update_calls.clone()
    }

    pub fn subscribe_calls(&self) -> usize {
        self.lock().subscribe_calls
    }

    /// Number of subscriptions whose receiving side is still open.
    pub fn open_subscriptions(&self) -> usize {
        let mut state = self.lock();
        state.subscribers.retain(|tx| !tx.is_closed());
        state.subscribers.len()
    }

    /// Delivers a raw feed item to every subscriber, bypassing the store.
    pub fn push(&self, item: FeedItem) {
        let mut state = self.lock();
        state
            .subscribers
            .retain(|tx| tx.unbounded_send(item.clone()).is_ok());
    }

    /// Ends every open subscription, as a dropped realtime connection would.
    pub fn disconnect_all(&self) {
        self.lock().subscribers.clear();
    }

    pub fn row(&self, id: SessionId) -> Option<SessionRow> {
        self.lock().rows.get(&id).cloned()
    }

    fn resolve(state: &MemoryState, mut row: SessionRow) -> SessionRow {
        if let Some(mentor) = row.mentor_id.and_then(|id| state.mentors.get(&id)) {
            row.mentor_name = Some(mentor.name.clone());
            row.mentor_expertise = Some(mentor.expertise.clone());
        }
        if let Some(name) = row.student_id.and_then(|id| state.students.get(&id)) {
            row.student_name = Some(name.clone());
        }
        row
    }

    fn normalize(row: SessionRow) -> Result<Session, BackendError> {
        Session::from_row(row).map_err(|err| BackendError::Malformed(err.to_string()))
    }

    fn broadcast(state: &mut MemoryState, event: ChangeEvent) {
        state
            .subscribers
            .retain(|tx| tx.unbounded_send(Ok(event.clone())).is_ok());
    }

    fn write_row(id: SessionId, record: &SessionWrite, existing: Option<&SessionRow>) -> SessionRow {
        let now = Utc::now();
        SessionRow {
            id,
            topic: Some(record.topic.clone()),
            mentor_id: record.mentor_id,
            mentor_name: None,
            mentor_expertise: None,
            student_id: record.student_id,
            student_name: None,
            for_all_students: Some(record.for_all_students),
            session_datetime: record.scheduled_at,
            duration: i32::try_from(record.duration_minutes).ok(),
            session_link: record.join_link.clone(),
            status: Some(record.status.as_str().to_string()),
            notes: record.notes.clone(),
            created_at: existing.and_then(|row| row.created_at).or(Some(now)),
            updated_at: Some(now),
        }
    }
}

#[async_trait]
impl SessionBackend for MemorySessionBackend {
    async fn fetch_sessions(&self) -> Result<Vec<Session>, BackendError> {
        let state = self.lock();
        if let Some(err) = state.fail_fetch.clone() {
            return Err(err);
        }

        let mut sessions = Vec::with_capacity(state.rows.len());
        for row in state.rows.values() {
            match Self::normalize(Self::resolve(&state, row.clone())) {
                Ok(session) => sessions.push(session),
                Err(err) => tracing::warn!(session_id = %row.id, error = %err, "skipping malformed session"),
            }
        }
        sessions.sort_by_key(|session| (session.scheduled_at.is_none(), session.scheduled_at));
        Ok(sessions)
    }

    async fn subscribe(&self) -> Result<SessionSubscription, BackendError> {
        let mut state = self.lock();
        state.subscribe_calls += 1;
        if let Some(err) = state.fail_subscribe.clone() {
            return Err(err);
        }

        let (tx, rx) = mpsc::unbounded();
        state.subscribers.push(tx);
        Ok(SessionSubscription::new(rx))
    }

    async fn update_session(
        &self,
        id: SessionId,
        record: SessionWrite,
    ) -> Result<Session, BackendError> {
        let mut state = self.lock();
        state.update_calls.push((id, record.clone()));
        if state.failing_updates.contains(&id) {
            return Err(BackendError::Transient(format!("update of {id} rejected")));
        }

        let existing = state.rows.get(&id).ok_or(BackendError::NotFound(id))?;
        let row = Self::resolve(&state, Self::write_row(id, &record, Some(existing)));
        state.rows.insert(id, row.clone());
        Self::broadcast(&mut state, ChangeEvent::Update(row.clone()));
        Self::normalize(row)
    }

    async fn insert_session(&self, record: SessionWrite) -> Result<Session, BackendError> {
        let mut state = self.lock();
        let id = SessionId::new();
        let row = Self::resolve(&state, Self::write_row(id, &record, None));
        state.rows.insert(id, row.clone());
        Self::broadcast(&mut state, ChangeEvent::Insert(row.clone()));
        Self::normalize(row)
    }

    async fn delete_session(&self, id: SessionId) -> Result<SessionId, BackendError> {
        let mut state = self.lock();
        if state.rows.remove(&id).is_none() {
            return Err(BackendError::NotFound(id));
        }
        Self::broadcast(&mut state, ChangeEvent::Delete(id));
        Ok(id)
    }
}
