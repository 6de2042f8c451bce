use std::{sync::Arc, time::Duration};

use careerhub_backend::{
    models::{
        identity::Identity,
        session::{Session, SessionStatus, SessionWrite},
        session_event::ChangeEvent,
    },
    services::{
        live_sessions::{FeedStatus, LiveSessions, LiveSessionsConfig},
        memory_backend::MemorySessionBackend,
        session_backend::{BackendError, SessionBackend},
        session_status::{evaluate, SessionLabel},
    },
    types::{SessionId, UserId},
    utils::time::{Clock, FixedClock},
};

mod support;

use support::{admin, jan1, mentor, scheduled_row, student, wait_for};

const TICK: Duration = Duration::from_secs(60);

fn start(backend: &MemorySessionBackend, clock: &FixedClock, identity: Identity) -> LiveSessions {
    LiveSessions::start(
        Arc::new(backend.clone()),
        Arc::new(clock.clone()),
        identity,
        LiveSessionsConfig {
            sweep_interval: TICK,
            sweeper_enabled: true,
        },
    )
}

fn status_of(sessions: &[Session], id: SessionId) -> Option<SessionStatus> {
    sessions.iter().find(|s| s.id == id).map(|s| s.status)
}

#[tokio::test(start_paused = true)]
async fn scheduled_session_moves_from_join_now_to_completed() {
    let backend = MemorySessionBackend::new();
    let asha = mentor("Asha");
    backend.add_mentor(asha.clone());
    let s1 = scheduled_row(&asha, "Mock interview", jan1(10, 0));
    backend.seed(s1.clone());

    let clock = FixedClock::new(jan1(10, 30));
    let mut live = start(&backend, &clock, admin());
    let reader = live.reader();
    wait_for(&mut reader.watch_status(), FeedStatus::is_live).await;

    let snapshot = reader.snapshot();
    assert_eq!(snapshot.len(), 1);
    let action = evaluate(&snapshot[0], clock.now());
    assert_eq!(action.label, SessionLabel::JoinNow);
    assert!(!action.joinable);
    assert!(backend.update_calls().is_empty());

    clock.set(jan1(11, 30));
    assert_eq!(evaluate(&snapshot[0], clock.now()).label, SessionLabel::Ended);

    tokio::time::advance(TICK).await;
    let snapshot = wait_for(&mut reader.watch_snapshot(), |sessions| {
        status_of(sessions, s1.id) == Some(SessionStatus::Completed)
    })
    .await;

    let calls = backend.update_calls();
    assert_eq!(calls.len(), 1);
    let (id, record) = &calls[0];
    assert_eq!(*id, s1.id);
    let mut expected = snapshot[0].to_write();
    expected.status = SessionStatus::Completed;
    assert_eq!(record, &expected);
    assert_eq!(record.topic, "Mock interview");
    assert_eq!(record.mentor_id, asha.id);
    assert_eq!(record.scheduled_at, Some(jan1(10, 0)));
    assert_eq!(record.duration_minutes, 60);
    assert!(record.for_all_students);
    assert_eq!(evaluate(&snapshot[0], clock.now()).label, SessionLabel::Completed);

    live.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn expired_sessions_are_completed_on_mount() {
    let backend = MemorySessionBackend::new();
    let asha = mentor("Asha");
    let s1 = scheduled_row(&asha, "Resume review", jan1(10, 0));
    backend.seed(s1.clone());

    let clock = FixedClock::new(jan1(11, 30));
    let mut live = start(&backend, &clock, admin());
    let reader = live.reader();

    wait_for(&mut reader.watch_snapshot(), |sessions| {
        status_of(sessions, s1.id) == Some(SessionStatus::Completed)
    })
    .await;
    // The echoed UPDATE triggers another sweep, which finds nothing to do.
    assert_eq!(backend.update_calls().len(), 1);
    assert_eq!(
        backend.row(s1.id).and_then(|row| row.status).as_deref(),
        Some("completed")
    );

    live.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn repeated_and_unknown_events_leave_collection_consistent() {
    let backend = MemorySessionBackend::new();
    let asha = mentor("Asha");
    let clock = FixedClock::new(jan1(9, 0));
    let mut live = start(&backend, &clock, admin());
    let reader = live.reader();
    wait_for(&mut reader.watch_status(), FeedStatus::is_live).await;

    let s1 = scheduled_row(&asha, "Mock interview", jan1(10, 0));
    backend.push(Ok(ChangeEvent::Insert(s1.clone())));
    backend.push(Ok(ChangeEvent::Insert(s1.clone())));
    backend.push(Ok(ChangeEvent::Update(s1.clone())));
    backend.push(Ok(ChangeEvent::Update(s1.clone())));
    backend.push(Ok(ChangeEvent::Delete(SessionId::new())));
    backend.push(Ok(ChangeEvent::Unrecognized {
        kind: "TRUNCATE".into(),
    }));
    backend.push(Err(BackendError::Malformed("not json".into())));

    // A trailing marker proves every earlier event has been processed.
    let marker = scheduled_row(&asha, "Marker", jan1(12, 0));
    backend.push(Ok(ChangeEvent::Insert(marker.clone())));
    let snapshot = wait_for(&mut reader.watch_snapshot(), |sessions| {
        sessions.iter().any(|s| s.id == marker.id)
    })
    .await;

    assert_eq!(snapshot.len(), 2);
    assert_eq!(snapshot.iter().filter(|s| s.id == s1.id).count(), 1);
    assert!(reader.status().is_live());

    live.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn update_after_bulk_load_replaces_the_entry() {
    let backend = MemorySessionBackend::new();
    let asha = mentor("Asha");
    let s1 = scheduled_row(&asha, "Resume review", jan1(10, 0));
    backend.seed(s1.clone());

    let clock = FixedClock::new(jan1(9, 0));
    let mut live = start(&backend, &clock, admin());
    let reader = live.reader();
    wait_for(&mut reader.watch_status(), FeedStatus::is_live).await;

    let mut renamed = s1.clone();
    renamed.topic = Some("Portfolio review".into());
    backend.push(Ok(ChangeEvent::Update(renamed)));

    let snapshot = wait_for(&mut reader.watch_snapshot(), |sessions| {
        sessions.iter().any(|s| s.topic == "Portfolio review")
    })
    .await;
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].id, s1.id);

    live.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn failed_completion_does_not_block_siblings_and_retries_next_tick() {
    let backend = MemorySessionBackend::new();
    let asha = mentor("Asha");
    let first = scheduled_row(&asha, "First", jan1(8, 0));
    let second = scheduled_row(&asha, "Second", jan1(8, 30));
    let third = scheduled_row(&asha, "Third", jan1(9, 0));
    for row in [&first, &second, &third] {
        backend.seed(row.clone());
    }
    backend.fail_updates_for(second.id);

    let clock = FixedClock::new(jan1(12, 0));
    let mut live = start(&backend, &clock, admin());
    let reader = live.reader();

    let snapshot = wait_for(&mut reader.watch_snapshot(), |sessions| {
        status_of(sessions, first.id) == Some(SessionStatus::Completed)
            && status_of(sessions, third.id) == Some(SessionStatus::Completed)
    })
    .await;
    assert_eq!(status_of(&snapshot, second.id), Some(SessionStatus::Scheduled));
    assert!(backend
        .update_calls()
        .iter()
        .any(|(id, _)| *id == second.id));

    backend.clear_update_failures();
    tokio::time::advance(TICK).await;
    wait_for(&mut reader.watch_snapshot(), |sessions| {
        status_of(sessions, second.id) == Some(SessionStatus::Completed)
    })
    .await;

    live.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn shutdown_closes_subscription_and_clears_state() {
    let backend = MemorySessionBackend::new();
    backend.seed(scheduled_row(&mentor("Asha"), "Mock interview", jan1(10, 0)));

    let clock = FixedClock::new(jan1(9, 0));
    let mut live = start(&backend, &clock, admin());
    let reader = live.reader();
    wait_for(&mut reader.watch_status(), FeedStatus::is_live).await;
    assert_eq!(backend.open_subscriptions(), 1);
    assert_eq!(reader.snapshot().len(), 1);

    live.shutdown().await;
    assert_eq!(backend.open_subscriptions(), 0);
    assert_eq!(reader.status(), FeedStatus::Stopped);
    assert!(reader.snapshot().is_empty());

    live.shutdown().await;
    assert_eq!(reader.status(), FeedStatus::Stopped);
}

#[tokio::test(start_paused = true)]
async fn dropping_the_owner_clears_published_state() {
    let backend = MemorySessionBackend::new();
    backend.seed(scheduled_row(&mentor("Asha"), "Mock interview", jan1(10, 0)));

    let clock = FixedClock::new(jan1(9, 0));
    let live = start(&backend, &clock, admin());
    let reader = live.reader();
    wait_for(&mut reader.watch_status(), FeedStatus::is_live).await;

    drop(live);
    assert_eq!(reader.status(), FeedStatus::Stopped);
    assert!(reader.snapshot().is_empty());
}

#[tokio::test(start_paused = true)]
async fn switching_identity_rebuilds_the_view() {
    let backend = MemorySessionBackend::new();
    let asha = mentor("Asha");
    let kai = student();
    let mia = student();

    let mut for_kai = scheduled_row(&asha, "Kai only", jan1(10, 0));
    for_kai.for_all_students = Some(false);
    for_kai.student_id = Some(kai.user_id);
    let mut for_mia = scheduled_row(&asha, "Mia only", jan1(10, 0));
    for_mia.for_all_students = Some(false);
    for_mia.student_id = Some(mia.user_id);
    let open = scheduled_row(&asha, "Everyone", jan1(10, 0));
    for row in [&for_kai, &for_mia, &open] {
        backend.seed(row.clone());
    }

    let clock = FixedClock::new(jan1(9, 0));
    let mut live = start(&backend, &clock, kai.clone());
    let reader = live.reader();
    wait_for(&mut reader.watch_status(), FeedStatus::is_live).await;

    let mut topics: Vec<_> = reader.snapshot().iter().map(|s| s.topic.clone()).collect();
    topics.sort();
    assert_eq!(topics, vec!["Everyone", "Kai only"]);

    live.switch_identity(mia.clone()).await;
    assert_eq!(live.identity(), Some(&mia));
    wait_for(&mut reader.watch_status(), FeedStatus::is_live).await;

    let mut topics: Vec<_> = reader.snapshot().iter().map(|s| s.topic.clone()).collect();
    topics.sort();
    assert_eq!(topics, vec!["Everyone", "Mia only"]);
    assert_eq!(backend.subscribe_calls(), 2);
    assert_eq!(backend.open_subscriptions(), 1);

    live.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn dropped_feed_waits_for_explicit_retry() {
    let backend = MemorySessionBackend::new();
    let asha = mentor("Asha");
    backend.seed(scheduled_row(&asha, "Before drop", jan1(10, 0)));

    let clock = FixedClock::new(jan1(9, 0));
    let mut live = start(&backend, &clock, admin());
    let reader = live.reader();
    wait_for(&mut reader.watch_status(), FeedStatus::is_live).await;

    backend.disconnect_all();
    let status = wait_for(&mut reader.watch_status(), |status| {
        matches!(status, FeedStatus::Disconnected { .. })
    })
    .await;
    assert_eq!(
        status,
        FeedStatus::Disconnected {
            reason: "change feed ended".into()
        }
    );

    // Written while nobody is listening; only a reload can pick it up.
    let created = backend
        .insert_session(SessionWrite {
            topic: "While away".into(),
            mentor_id: asha.id,
            scheduled_at: Some(jan1(11, 0)),
            duration_minutes: 60,
            join_link: None,
            status: SessionStatus::Scheduled,
            student_id: None,
            for_all_students: true,
            notes: None,
        })
        .await
        .unwrap();
    assert_eq!(reader.snapshot().len(), 1);

    reader.request_retry();
    let snapshot = wait_for(&mut reader.watch_snapshot(), |sessions| {
        sessions.iter().any(|s| s.id == created.id)
    })
    .await;
    assert_eq!(snapshot.len(), 2);
    assert!(reader.status().is_live());
    assert_eq!(backend.subscribe_calls(), 2);

    live.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn fatal_feed_error_reports_reason() {
    let backend = MemorySessionBackend::new();
    let clock = FixedClock::new(jan1(9, 0));
    let mut live = start(&backend, &clock, admin());
    let reader = live.reader();
    wait_for(&mut reader.watch_status(), FeedStatus::is_live).await;

    backend.push(Err(BackendError::FeedClosed("listener connection lost".into())));
    let status = wait_for(&mut reader.watch_status(), |status| {
        matches!(status, FeedStatus::Disconnected { .. })
    })
    .await;
    assert_eq!(
        status,
        FeedStatus::Disconnected {
            reason: "change feed closed: listener connection lost".into()
        }
    );
    assert_eq!(backend.open_subscriptions(), 0);

    live.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn failed_bulk_load_can_be_retried() {
    let backend = MemorySessionBackend::new();
    backend.seed(scheduled_row(&mentor("Asha"), "Mock interview", jan1(10, 0)));
    backend.fail_fetch_with(Some(BackendError::Transient("timeout".into())));

    let clock = FixedClock::new(jan1(9, 0));
    let mut live = start(&backend, &clock, admin());
    let reader = live.reader();
    let status = wait_for(&mut reader.watch_status(), |status| {
        matches!(status, FeedStatus::Failed { .. })
    })
    .await;
    assert_eq!(
        status,
        FeedStatus::Failed {
            reason: "backend unavailable: timeout".into()
        }
    );
    assert_eq!(backend.open_subscriptions(), 0);
    assert!(reader.snapshot().is_empty());

    backend.fail_fetch_with(None);
    reader.request_retry();
    wait_for(&mut reader.watch_status(), FeedStatus::is_live).await;
    assert_eq!(reader.snapshot().len(), 1);

    live.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn disabled_sweeper_never_writes() {
    let backend = MemorySessionBackend::new();
    backend.seed(scheduled_row(&mentor("Asha"), "Mock interview", jan1(8, 0)));

    let clock = FixedClock::new(jan1(12, 0));
    let mut live = LiveSessions::start(
        Arc::new(backend.clone()),
        Arc::new(clock.clone()),
        Identity::admin(UserId::new()),
        LiveSessionsConfig {
            sweep_interval: TICK,
            sweeper_enabled: false,
        },
    );
    let reader = live.reader();
    wait_for(&mut reader.watch_status(), FeedStatus::is_live).await;

    tokio::time::advance(TICK * 2).await;
    tokio::task::yield_now().await;
    assert!(backend.update_calls().is_empty());
    assert_eq!(reader.snapshot()[0].status, SessionStatus::Scheduled);

    live.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn start_time_at_the_calendar_edge_does_not_stop_the_view() {
    let backend = MemorySessionBackend::new();
    let asha = mentor("Asha");
    backend.add_mentor(asha.clone());
    let edge = scheduled_row(
        &asha,
        "Far future",
        chrono::DateTime::<chrono::Utc>::MAX_UTC - chrono::Duration::minutes(30),
    );
    let expired = scheduled_row(&asha, "Resume review", jan1(8, 0));
    backend.seed(edge.clone());
    backend.seed(expired.clone());

    let clock = FixedClock::new(jan1(11, 30));
    let mut live = start(&backend, &clock, admin());
    let reader = live.reader();

    wait_for(&mut reader.watch_snapshot(), |sessions| {
        status_of(sessions, expired.id) == Some(SessionStatus::Completed)
    })
    .await;
    tokio::time::advance(TICK).await;
    tokio::time::advance(TICK).await;

    let late = backend
        .insert_session(SessionWrite {
            topic: "Added later".into(),
            mentor_id: asha.id,
            scheduled_at: Some(jan1(15, 0)),
            duration_minutes: 60,
            join_link: None,
            status: SessionStatus::Scheduled,
            student_id: None,
            for_all_students: true,
            notes: None,
        })
        .await
        .unwrap();
    let snapshot = wait_for(&mut reader.watch_snapshot(), |sessions| {
        sessions.iter().any(|s| s.id == late.id)
    })
    .await;

    assert!(reader.status().is_live());
    assert_eq!(status_of(&snapshot, edge.id), Some(SessionStatus::Scheduled));
    let edge_session = snapshot.iter().find(|s| s.id == edge.id).unwrap();
    assert_eq!(
        evaluate(edge_session, clock.now()).label,
        SessionLabel::InvalidDate
    );
    assert!(backend.update_calls().iter().all(|(id, _)| *id != edge.id));

    live.shutdown().await;
}
