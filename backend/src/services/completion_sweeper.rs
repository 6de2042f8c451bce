//! Promotes `scheduled` sessions whose window has elapsed to `completed`.
//!
//! The sweeper never touches the held collection. Each successful write
//! comes back through the change feed as an UPDATE event and is applied by
//! the reconciler like any other change.

use chrono::{DateTime, Utc};
use futures::future::join_all;

use crate::models::{
    identity::Identity,
    session::{Session, SessionStatus, SessionWrite},
};
use crate::services::{
    session_backend::{BackendError, SessionBackend},
    session_status::is_expired,
};
use crate::types::SessionId;

/// A full-record replace that marks one session completed.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub id: SessionId,
    pub record: SessionWrite,
}

impl CompletionRequest {
    fn for_session(session: &Session) -> Self {
        let mut record = session.to_write();
        record.status = SessionStatus::Completed;
        Self {
            id: session.id,
            record,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SweepPlan {
    pub requests: Vec<CompletionRequest>,
    /// Scheduled sessions without a usable start time, including ones whose
    /// window end is out of range.
    pub anomalies: Vec<SessionId>,
}

impl SweepPlan {
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty() && self.anomalies.is_empty()
    }
}

/// Outcome of one sweep run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SweepReport {
    pub completed: Vec<SessionId>,
    pub failed: Vec<(SessionId, BackendError)>,
    pub skipped: Vec<SessionId>,
}

/// Decides which sessions to complete. Pure.
pub fn plan_completions<'a, I>(sessions: I, identity: &Identity, now: DateTime<Utc>) -> SweepPlan
where
    I: IntoIterator<Item = &'a Session>,
{
    let mut plan = SweepPlan::default();
    for session in sessions {
        if !identity.can_see(session) || session.status != SessionStatus::Scheduled {
            continue;
        }
        if session.window_end().is_none() {
            plan.anomalies.push(session.id);
        } else if is_expired(session, now) {
            plan.requests.push(CompletionRequest::for_session(session));
        }
    }
    plan
}

/// Issues every completion write concurrently.
///
/// A failed write is logged and reported but never stops its siblings; the
/// session stays `scheduled` and is picked up again by the next sweep.
pub async fn run_completions(backend: &dyn SessionBackend, plan: SweepPlan) -> SweepReport {
    for id in &plan.anomalies {
        tracing::warn!(session_id = %id, "scheduled session has no usable start time; skipping");
    }

    let writes = plan.requests.into_iter().map(|request| async move {
        let id = request.id;
        let result = backend.update_session(id, request.record).await;
        (id, result)
    });

    let mut report = SweepReport {
        skipped: plan.anomalies,
        ..SweepReport::default()
    };
    for (id, result) in join_all(writes).await {
        match result {
            Ok(_) => {
                tracing::info!(session_id = %id, "session marked completed");
                report.completed.push(id);
            }
            Err(err) => {
                tracing::error!(session_id = %id, error = %err, "failed to mark session completed");
                report.failed.push((id, err));
            }
        }
    }
    report
}

/// Plans and runs one sweep over `sessions`.
pub async fn sweep(
    backend: &dyn SessionBackend,
    sessions: &[Session],
    identity: &Identity,
    now: DateTime<Utc>,
) -> SweepReport {
    let plan = plan_completions(sessions, identity, now);
    if plan.is_empty() {
        return SweepReport::default();
    }

    let report = run_completions(backend, plan).await;
    tracing::debug!(
        completed = report.completed.len(),
        failed = report.failed.len(),
        skipped = report.skipped.len(),
        "completion sweep finished"
    );
    report
}
