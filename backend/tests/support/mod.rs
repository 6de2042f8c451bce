#![allow(dead_code)]
use std::time::Duration;

use careerhub_backend::{
    config::Config,
    models::{
        identity::{Identity, UserRole},
        session::{MentorRef, SessionRow},
    },
    types::{MentorId, SessionId, UserId},
    utils::jwt::create_access_token,
};
use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::watch;

pub const TEST_JWT_SECRET: &str = "test-secret";

pub fn test_config() -> Config {
    Config::from_lookup(|key| match key {
        "JWT_SECRET" => Some(TEST_JWT_SECRET.to_string()),
        "SESSION_SWEEP_INTERVAL_SECONDS" => Some("60".to_string()),
        _ => None,
    })
    .expect("test config")
}

pub fn create_test_token(identity: &Identity) -> String {
    create_access_token(identity.user_id, identity.role, TEST_JWT_SECRET, 1).expect("create token")
}

pub fn admin() -> Identity {
    Identity::new(UserId::new(), UserRole::Admin)
}

pub fn student() -> Identity {
    Identity::new(UserId::new(), UserRole::Student)
}

/// 2024-01-01 at the given UTC time.
pub fn jan1(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, hour, minute, 0).unwrap()
}

pub fn mentor(name: &str) -> MentorRef {
    MentorRef {
        id: Some(MentorId::new()),
        name: name.to_string(),
        expertise: "Interview prep".to_string(),
    }
}

/// A scheduled, open-to-all, 60 minute session without a join link.
pub fn scheduled_row(mentor: &MentorRef, topic: &str, start: DateTime<Utc>) -> SessionRow {
    SessionRow {
        topic: Some(topic.to_string()),
        mentor_id: mentor.id,
        session_datetime: Some(start),
        duration: Some(60),
        status: Some("scheduled".to_string()),
        for_all_students: Some(true),
        created_at: Some(jan1(0, 0)),
        updated_at: Some(jan1(0, 0)),
        ..SessionRow::bare(SessionId::new())
    }
}

/// Waits for a watched value to satisfy `predicate`, failing the test after
/// five (possibly paused) seconds.
pub async fn wait_for<T, F>(rx: &mut watch::Receiver<T>, predicate: F) -> T
where
    T: Clone,
    F: FnMut(&T) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(predicate))
        .await
        .expect("timed out waiting for live view")
        .expect("live view dropped")
        .clone()
}
