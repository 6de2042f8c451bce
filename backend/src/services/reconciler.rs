//! Merges change-feed events into the held session collection.
//!
//! Delivery is at-least-once, so every operation is idempotent: a repeated
//! INSERT or UPDATE leaves the collection as a single application would,
//! and a DELETE of an absent id changes nothing.

use crate::models::{session::Session, session_event::ChangeEvent};
use crate::types::SessionId;

/// What applying one event did to the collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applied {
    Inserted(SessionId),
    Replaced(SessionId),
    Removed(SessionId),
    /// A recognized event that left the collection as it was.
    Unchanged(SessionId),
    /// The event was not applied; the reason is logged.
    Ignored,
}

impl Applied {
    /// Whether the event was one the sweeper should react to.
    pub fn is_recognized(&self) -> bool {
        !matches!(self, Applied::Ignored)
    }

    pub fn changed(&self) -> bool {
        matches!(
            self,
            Applied::Inserted(_) | Applied::Replaced(_) | Applied::Removed(_)
        )
    }
}

/// Ordered set of sessions keyed by id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionCollection {
    sessions: Vec<Session>,
}

impl SessionCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole collection with a bulk load, keeping the first
    /// occurrence of any repeated id.
    pub fn replace_all(&mut self, sessions: Vec<Session>) {
        self.sessions.clear();
        for session in sessions {
            if self.position(session.id).is_none() {
                self.sessions.push(session);
            }
        }
    }

    pub fn clear(&mut self) {
        self.sessions.clear();
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn get(&self, id: SessionId) -> Option<&Session> {
        self.sessions.iter().find(|session| session.id == id)
    }

    pub fn as_slice(&self) -> &[Session] {
        &self.sessions
    }

    fn position(&self, id: SessionId) -> Option<usize> {
        self.sessions.iter().position(|session| session.id == id)
    }

    /// Applies one change-feed event in place.
    pub fn apply(&mut self, event: ChangeEvent) -> Applied {
        match event {
            ChangeEvent::Insert(row) => {
                let id = row.id;
                if self.position(id).is_some() {
                    tracing::debug!(session_id = %id, "duplicate insert ignored");
                    return Applied::Unchanged(id);
                }
                match Session::from_row(row) {
                    Ok(session) => {
                        self.sessions.push(session);
                        Applied::Inserted(id)
                    }
                    Err(err) => {
                        tracing::warn!(session_id = %id, error = %err, "ignoring malformed insert");
                        Applied::Ignored
                    }
                }
            }
            ChangeEvent::Update(row) => {
                let id = row.id;
                let session = match Session::from_row(row) {
                    Ok(session) => session,
                    Err(err) => {
                        tracing::warn!(session_id = %id, error = %err, "ignoring malformed update");
                        return Applied::Ignored;
                    }
                };
                match self.position(id) {
                    Some(index) if self.sessions[index] == session => Applied::Unchanged(id),
                    Some(index) => {
                        self.sessions[index] = session;
                        Applied::Replaced(id)
                    }
                    None => {
                        self.sessions.push(session);
                        Applied::Inserted(id)
                    }
                }
            }
            ChangeEvent::Delete(id) => match self.position(id) {
                Some(index) => {
                    self.sessions.remove(index);
                    Applied::Removed(id)
                }
                None => Applied::Unchanged(id),
            },
            ChangeEvent::Unrecognized { kind } => {
                tracing::warn!(kind = %kind, "ignoring unrecognized change event");
                Applied::Ignored
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::session::SessionRow;
    use chrono::{TimeZone, Utc};

    fn row(id: SessionId, topic: &str) -> SessionRow {
        SessionRow {
            topic: Some(topic.into()),
            session_datetime: Some(Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap()),
            duration: Some(60),
            status: Some("scheduled".into()),
            ..SessionRow::bare(id)
        }
    }

    #[test]
    fn duplicate_insert_keeps_one_entry() {
        let id = SessionId::new();
        let mut collection = SessionCollection::new();

        assert_eq!(collection.apply(ChangeEvent::Insert(row(id, "a"))), Applied::Inserted(id));
        assert_eq!(collection.apply(ChangeEvent::Insert(row(id, "b"))), Applied::Unchanged(id));

        assert_eq!(collection.len(), 1);
        assert_eq!(collection.get(id).unwrap().topic, "a");
    }

    #[test]
    fn update_replaces_existing_entry() {
        let id = SessionId::new();
        let mut collection = SessionCollection::new();
        collection.replace_all(vec![Session::from_row(row(id, "Resume review")).unwrap()]);

        let applied = collection.apply(ChangeEvent::Update(row(id, "Portfolio review")));

        assert_eq!(applied, Applied::Replaced(id));
        assert_eq!(collection.len(), 1);
        assert_eq!(collection.get(id).unwrap().topic, "Portfolio review");
    }

    #[test]
    fn update_of_unknown_id_inserts() {
        let id = SessionId::new();
        let mut collection = SessionCollection::new();
        assert_eq!(collection.apply(ChangeEvent::Update(row(id, "a"))), Applied::Inserted(id));
        assert_eq!(collection.len(), 1);
    }

    #[test]
    fn repeated_update_equals_single_update() {
        let id = SessionId::new();
        let mut once = SessionCollection::new();
        once.replace_all(vec![Session::from_row(row(id, "old")).unwrap()]);
        let mut twice = once.clone();

        once.apply(ChangeEvent::Update(row(id, "new")));
        twice.apply(ChangeEvent::Update(row(id, "new")));
        let second = twice.apply(ChangeEvent::Update(row(id, "new")));

        assert_eq!(second, Applied::Unchanged(id));
        assert_eq!(once, twice);
    }

    #[test]
    fn delete_of_unknown_id_leaves_collection_identical() {
        let mut collection = SessionCollection::new();
        collection.replace_all(vec![
            Session::from_row(row(SessionId::new(), "a")).unwrap(),
            Session::from_row(row(SessionId::new(), "b")).unwrap(),
        ]);
        let before = collection.clone();

        let missing = SessionId::new();
        assert_eq!(collection.apply(ChangeEvent::Delete(missing)), Applied::Unchanged(missing));
        assert_eq!(collection, before);
    }

    #[test]
    fn delete_removes_entry_and_preserves_order() {
        let (a, b, c) = (SessionId::new(), SessionId::new(), SessionId::new());
        let mut collection = SessionCollection::new();
        collection.replace_all(vec![
            Session::from_row(row(a, "a")).unwrap(),
            Session::from_row(row(b, "b")).unwrap(),
            Session::from_row(row(c, "c")).unwrap(),
        ]);

        assert_eq!(collection.apply(ChangeEvent::Delete(b)), Applied::Removed(b));
        let ids: Vec<_> = collection.as_slice().iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![a, c]);
    }

    #[test]
    fn malformed_and_unrecognized_events_are_ignored() {
        let id = SessionId::new();
        let mut collection = SessionCollection::new();
        let mut bad = row(id, "a");
        bad.status = Some("archived".into());

        assert_eq!(collection.apply(ChangeEvent::Insert(bad.clone())), Applied::Ignored);
        assert_eq!(collection.apply(ChangeEvent::Update(bad)), Applied::Ignored);
        assert_eq!(
            collection.apply(ChangeEvent::Unrecognized { kind: "TRUNCATE".into() }),
            Applied::Ignored
        );
        assert!(collection.is_empty());
    }

    #[test]
    fn replace_all_drops_repeated_ids() {
        let id = SessionId::new();
        let mut collection = SessionCollection::new();
        collection.replace_all(vec![
            Session::from_row(row(id, "first")).unwrap(),
            Session::from_row(row(id, "second")).unwrap(),
        ]);
        assert_eq!(collection.len(), 1);
        assert_eq!(collection.get(id).unwrap().topic, "first");
    }
}
