//! The live session view: one task owning the held collection, the change
//! feed subscription and the sweep timer.
//!
//! ```text
//!   LiveSessionsReader (Clone)      watch       LiveSessionsTask (tokio::spawn)
//!   ┌──────────────────────┐  ◀────────────  ┌──────────────────────────────┐
//!   │ .snapshot()          │   snapshot +    │ SessionCollection            │
//!   │ .status()            │   feed status   │ SessionSubscription          │
//!   │ .request_retry()     │  ────────────▶  │ sweep interval               │
//!   └──────────────────────┘     Notify      └──────────────────────────────┘
//! ```
//!
//! Feed events, timer ticks, retry requests and shutdown are multiplexed
//! with `select!` and handled one at a time, so sweeps never overlap and
//! the collection needs no lock. Observers only ever see immutable
//! snapshots.

use std::{sync::Arc, time::Duration};

use serde::Serialize;
use tokio::{
    sync::{oneshot, watch, Notify},
    task::JoinHandle,
    time::{interval_at, Instant, MissedTickBehavior},
};
use tracing::Instrument;
use utoipa::ToSchema;

use crate::models::{identity::Identity, session::Session};
use crate::services::{
    completion_sweeper,
    reconciler::SessionCollection,
    session_backend::{FeedItem, SessionBackend, SessionSubscription},
};
use crate::utils::time::Clock;

pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiveSessionsConfig {
    pub sweep_interval: Duration,
    /// When false the view reconciles but never writes completions.
    pub sweeper_enabled: bool,
}

impl Default for LiveSessionsConfig {
    fn default() -> Self {
        Self {
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            sweeper_enabled: true,
        }
    }
}

/// Connection state of the change feed as seen by observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum FeedStatus {
    /// Subscribing and running the bulk load.
    Loading,
    Live,
    /// The feed dropped after loading; waiting for an explicit retry.
    Disconnected { reason: String },
    /// Subscribing or loading failed; waiting for an explicit retry.
    Failed { reason: String },
    Stopped,
}

impl FeedStatus {
    pub fn is_live(&self) -> bool {
        matches!(self, FeedStatus::Live)
    }
}

struct Shared {
    snapshot: watch::Sender<Arc<Vec<Session>>>,
    status: watch::Sender<FeedStatus>,
    retry: Notify,
}

impl Shared {
    fn reset(&self) {
        self.snapshot.send_replace(Arc::new(Vec::new()));
        self.status.send_replace(FeedStatus::Stopped);
    }
}

/// Read side of the live view. Cheap to clone; survives identity switches.
#[derive(Clone)]
pub struct LiveSessionsReader {
    shared: Arc<Shared>,
}

impl LiveSessionsReader {
    /// Sessions visible to the view's identity, as of the last change.
    pub fn snapshot(&self) -> Arc<Vec<Session>> {
        self.shared.snapshot.borrow().clone()
    }

    pub fn status(&self) -> FeedStatus {
        self.shared.status.borrow().clone()
    }

    pub fn watch_snapshot(&self) -> watch::Receiver<Arc<Vec<Session>>> {
        self.shared.snapshot.subscribe()
    }

    pub fn watch_status(&self) -> watch::Receiver<FeedStatus> {
        self.shared.status.subscribe()
    }

    /// Asks the view to resubscribe and reload. Ignored while the feed is
    /// live.
    pub fn request_retry(&self) {
        self.shared.retry.notify_one();
    }
}

struct Running {
    identity: Identity,
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// Owner of the live view task.
///
/// Dropping the owner aborts the task and clears the published state; use
/// [`LiveSessions::shutdown`] to wait for a clean stop.
pub struct LiveSessions {
    shared: Arc<Shared>,
    backend: Arc<dyn SessionBackend>,
    clock: Arc<dyn Clock>,
    config: LiveSessionsConfig,
    running: Option<Running>,
}

impl LiveSessions {
    /// Starts a view for `identity`.
    pub fn start(
        backend: Arc<dyn SessionBackend>,
        clock: Arc<dyn Clock>,
        identity: Identity,
        config: LiveSessionsConfig,
    ) -> Self {
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));
        let (status, _) = watch::channel(FeedStatus::Stopped);
        let mut live = Self {
            shared: Arc::new(Shared {
                snapshot,
                status,
                retry: Notify::new(),
            }),
            backend,
            clock,
            config,
            running: None,
        };
        live.spawn(identity);
        live
    }

    pub fn reader(&self) -> LiveSessionsReader {
        LiveSessionsReader {
            shared: self.shared.clone(),
        }
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.running.as_ref().map(|running| &running.identity)
    }

    fn spawn(&mut self, identity: Identity) {
        // Published before the task runs so observers never see a stale
        // `Stopped` from the previous run.
        self.shared.status.send_replace(FeedStatus::Loading);

        let (stop, stop_rx) = oneshot::channel();
        let span = tracing::info_span!(
            "live_sessions",
            user_id = %identity.user_id,
            role = identity.role.as_str()
        );
        let task = LiveSessionsTask {
            shared: self.shared.clone(),
            backend: self.backend.clone(),
            clock: self.clock.clone(),
            config: self.config,
            identity: identity.clone(),
            collection: SessionCollection::new(),
            subscription: None,
        };
        let handle = tokio::spawn(task.run(stop_rx).instrument(span));
        self.running = Some(Running {
            identity,
            stop,
            handle,
        });
    }

    /// Stops the task and waits for it: the subscription is closed, the
    /// timer stopped, and the collection discarded. Safe to call twice.
    pub async fn shutdown(&mut self) {
        if let Some(running) = self.running.take() {
            let _ = running.stop.send(());
            if let Err(err) = running.handle.await {
                if !err.is_cancelled() {
                    tracing::error!(error = %err, "live session task ended abnormally");
                }
            }
        }
        self.shared.reset();
    }

    /// Tears down the current view completely, then starts one for
    /// `identity`.
    pub async fn switch_identity(&mut self, identity: Identity) {
        self.shutdown().await;
        self.spawn(identity);
    }
}

impl Drop for LiveSessions {
    fn drop(&mut self) {
        if let Some(running) = self.running.take() {
            running.handle.abort();
            self.shared.reset();
        }
    }
}

struct LiveSessionsTask {
    shared: Arc<Shared>,
    backend: Arc<dyn SessionBackend>,
    clock: Arc<dyn Clock>,
    config: LiveSessionsConfig,
    identity: Identity,
    collection: SessionCollection,
    subscription: Option<SessionSubscription>,
}

impl LiveSessionsTask {
    async fn run(mut self, mut stop: oneshot::Receiver<()>) {
        self.connect().await;

        let period = self.config.sweep_interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = &mut stop => break,
                item = next_item(&mut self.subscription) => self.on_feed_item(item).await,
                _ = ticker.tick() => self.on_tick().await,
                _ = self.shared.retry.notified() => self.on_retry().await,
            }
        }

        if let Some(mut subscription) = self.subscription.take() {
            subscription.close();
        }
        self.collection.clear();
        self.shared.reset();
        tracing::debug!("live session view stopped");
    }

    /// Subscribes first, then bulk loads, so no change between the two is
    /// lost. Events for rows already loaded are absorbed by the reconciler.
    async fn connect(&mut self) {
        self.shared.status.send_replace(FeedStatus::Loading);

        let mut subscription = match self.backend.subscribe().await {
            Ok(subscription) => subscription,
            Err(err) => {
                tracing::error!(error = %err, "failed to subscribe to session changes");
                self.shared
                    .status
                    .send_replace(FeedStatus::Failed { reason: err.to_string() });
                return;
            }
        };

        match self.backend.fetch_sessions().await {
            Ok(sessions) => {
                tracing::info!(count = sessions.len(), "loaded sessions");
                self.collection.replace_all(sessions);
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to load sessions");
                subscription.close();
                self.shared
                    .status
                    .send_replace(FeedStatus::Failed { reason: err.to_string() });
                return;
            }
        }

        self.subscription = Some(subscription);
        self.publish_snapshot();
        self.shared.status.send_replace(FeedStatus::Live);
        self.sweep().await;
    }

    async fn on_feed_item(&mut self, item: Option<FeedItem>) {
        match item {
            Some(Ok(event)) => {
                let kind = event.kind().to_string();
                let applied = self.collection.apply(event);
                tracing::debug!(kind = %kind, applied = ?applied, "applied session change");
                if applied.changed() {
                    self.publish_snapshot();
                }
                if applied.is_recognized() {
                    self.sweep().await;
                }
            }
            Some(Err(err)) if !err.is_feed_fatal() => {
                tracing::warn!(error = %err, "ignoring undecodable session change");
            }
            Some(Err(err)) => self.disconnect(err.to_string()),
            None => self.disconnect("change feed ended".to_string()),
        }
    }

    fn disconnect(&mut self, reason: String) {
        tracing::warn!(reason = %reason, "session change feed disconnected");
        if let Some(mut subscription) = self.subscription.take() {
            subscription.close();
        }
        self.shared
            .status
            .send_replace(FeedStatus::Disconnected { reason });
    }

    async fn on_tick(&mut self) {
        // A stale collection would repeat writes whose echo can never arrive.
        if self.subscription.is_some() {
            self.sweep().await;
        }
    }

    async fn on_retry(&mut self) {
        if self.subscription.is_some() {
            tracing::debug!("retry requested while feed is live; ignoring");
            return;
        }
        tracing::info!("retrying session change feed");
        self.connect().await;
    }

    async fn sweep(&mut self) {
        if !self.config.sweeper_enabled {
            return;
        }
        let now = self.clock.now();
        let report = completion_sweeper::sweep(
            self.backend.as_ref(),
            self.collection.as_slice(),
            &self.identity,
            now,
        )
        .await;
        if !report.failed.is_empty() {
            tracing::warn!(failed = report.failed.len(), "some completions failed; will retry next sweep");
        }
    }

    fn publish_snapshot(&self) {
        let visible: Vec<Session> = self
            .collection
            .as_slice()
            .iter()
            .filter(|session| self.identity.can_see(session))
            .cloned()
            .collect();
        self.shared.snapshot.send_replace(Arc::new(visible));
    }
}

/// Next feed item, or never while there is no subscription.
async fn next_item(subscription: &mut Option<SessionSubscription>) -> Option<FeedItem> {
    match subscription {
        Some(subscription) => subscription.next_event().await,
        None => std::future::pending().await,
    }
}
