//! Pull, merge and push of the local snapshot against the remote document.
//!
//! Only one sync pass runs at a time; a caller that finds one in flight gets
//! [`SyncOutcome::AlreadyRunning`] back instead of waiting. Local mutations are
//! queued as [`PendingChange`]s and replayed on top of the merged snapshot, so
//! an offline delete is not undone by the remote copy still holding the
//! record. A failed pass puts its changes back at the front of the queue; the
//! next trigger (connectivity, login, manual sync, mutation) is the retry.

use crate::clock::Clock;
use crate::errors::{RemoteError, SyncError};
use crate::events::AppEvent;
use crate::merge::merge;
use crate::models::{ChangeKind, PendingChange, RemoteSnapshot};
use crate::remote::BlobStore;
use crate::state::SharedSnapshot;
use crate::storage::LocalStore;
use crate::tracker::{apply_change, refresh_derived};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SyncOutcome {
    /// No remote backend configured.
    LocalOnly,
    Offline,
    SignedOut,
    AlreadyRunning,
    /// Remote already matched the merged snapshot; nothing was written.
    Unchanged,
    Pushed,
    Created { id: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncStatus {
    pub backend: Option<String>,
    pub online: bool,
    pub authenticated: bool,
    pub pending: usize,
    pub remote_id: Option<String>,
    pub migration_done: bool,
    pub last_sync: Option<i64>,
}

pub struct SyncOrchestrator {
    store: LocalStore,
    data: SharedSnapshot,
    remote: Option<Arc<dyn BlobStore>>,
    clock: Arc<dyn Clock>,
    pending: Mutex<VecDeque<PendingChange>>,
    in_flight: tokio::sync::Mutex<()>,
    online: AtomicBool,
    authenticated: AtomicBool,
    last_sync: AtomicI64,
}

impl SyncOrchestrator {
    pub fn new(
        store: LocalStore,
        data: SharedSnapshot,
        remote: Option<Arc<dyn BlobStore>>,
        clock: Arc<dyn Clock>,
        online: bool,
    ) -> Self {
        Self {
            store,
            data,
            remote,
            clock,
            pending: Mutex::new(VecDeque::new()),
            in_flight: tokio::sync::Mutex::new(()),
            online: AtomicBool::new(online),
            authenticated: AtomicBool::new(false),
            last_sync: AtomicI64::new(0),
        }
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::SeqCst)
    }

    pub fn set_authenticated(&self, authenticated: bool) {
        self.authenticated.store(authenticated, Ordering::SeqCst);
    }

    pub fn pending_len(&self) -> usize {
        self.pending.lock().map(|queue| queue.len()).unwrap_or(0)
    }

    pub fn pending(&self) -> Vec<PendingChange> {
        self.pending
            .lock()
            .map(|queue| queue.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn clear_pending(&self) {
        if let Ok(mut queue) = self.pending.lock() {
            queue.clear();
        }
    }

    fn take_pending(&self) -> Vec<PendingChange> {
        self.pending
            .lock()
            .map(|mut queue| queue.drain(..).collect())
            .unwrap_or_default()
    }

    /// Put failed changes back ahead of anything queued meanwhile.
    fn requeue_front(&self, changes: Vec<PendingChange>) {
        if let Ok(mut queue) = self.pending.lock() {
            for change in changes.into_iter().rev() {
                queue.push_front(change);
            }
        }
    }

    /// Queue a local mutation stamped at `timestamp`, then flush right away
    /// when online and signed in. Returns the number of changes still waiting
    /// afterwards.
    pub async fn enqueue(&self, kind: ChangeKind, timestamp: i64) -> usize {
        if self.remote.is_none() {
            return 0;
        }

        let change = PendingChange { kind, timestamp };
        if let Ok(mut queue) = self.pending.lock() {
            queue.push_back(change);
        }

        if self.is_online() && self.is_authenticated() {
            match self.sync_all().await {
                Ok(outcome) => debug!("flushed pending changes: {outcome:?}"),
                Err(err) => warn!("flush failed, keeping changes queued: {err}"),
            }
        }
        self.pending_len()
    }

    pub async fn sync_all(&self) -> Result<SyncOutcome, SyncError> {
        let Some(remote) = self.remote.as_deref() else {
            return Ok(SyncOutcome::LocalOnly);
        };
        if !self.is_online() {
            return Ok(SyncOutcome::Offline);
        }
        if !self.is_authenticated() {
            return Ok(SyncOutcome::SignedOut);
        }
        let Ok(_guard) = self.in_flight.try_lock() else {
            debug!("sync already in progress");
            return Ok(SyncOutcome::AlreadyRunning);
        };

        let replay = self.take_pending();
        match self.sync_pass(remote, &replay).await {
            Ok(outcome) => {
                self.last_sync.store(self.clock.now_millis(), Ordering::SeqCst);
                info!("sync finished: {outcome:?}");
                Ok(outcome)
            }
            Err(err) => {
                warn!(
                    "sync failed, re-queueing {} change(s): {err}",
                    replay.len()
                );
                self.requeue_front(replay);
                Err(err)
            }
        }
    }

    async fn sync_pass(
        &self,
        remote: &dyn BlobStore,
        replay: &[PendingChange],
    ) -> Result<SyncOutcome, SyncError> {
        let remote_id = self.store.remote_id().await;
        let fetched = match &remote_id {
            Some(id) => match remote.read(id).await {
                Ok(doc) => Some(
                    serde_json::from_value::<RemoteSnapshot>(doc)
                        .map_err(|err| RemoteError::Decode(err.to_string()))?,
                ),
                Err(RemoteError::NotFound(_)) => {
                    info!("remote document {id} is gone, a new one will be created");
                    None
                }
                Err(err) => return Err(err.into()),
            },
            None => None,
        };

        let merged = {
            let mut data = self.data.lock().await;
            let mut merged = merge(fetched.as_ref(), &data, self.clock.today());
            for change in replay {
                apply_change(&mut merged, &change.kind, change.timestamp);
            }
            refresh_derived(&mut merged, self.clock.today(), self.clock.now_millis());
            if merged != *data {
                self.store.save_snapshot(&merged).await?;
                *data = merged.clone();
            }
            merged
        };

        let doc = RemoteSnapshot::from(&merged);
        match (remote_id, fetched) {
            (Some(id), Some(existing)) => {
                if existing == doc {
                    return Ok(SyncOutcome::Unchanged);
                }
                let payload = serde_json::to_value(&doc)
                    .map_err(|err| RemoteError::Decode(err.to_string()))?;
                remote.update(&id, &payload).await?;
                Ok(SyncOutcome::Pushed)
            }
            _ => {
                let payload = serde_json::to_value(&doc)
                    .map_err(|err| RemoteError::Decode(err.to_string()))?;
                let id = remote.create(&payload).await?;
                self.store.set_remote_id(Some(&id)).await?;
                if !self.store.migration_done().await {
                    self.store.mark_migration_done().await?;
                    info!("uploaded local data to new remote document {id}");
                }
                Ok(SyncOutcome::Created { id })
            }
        }
    }

    /// Delete the remote document and forget its id. Local data is kept.
    pub async fn reset_remote(&self) -> Result<Option<String>, SyncError> {
        let remote = self.remote.as_deref().ok_or(RemoteError::NotConfigured)?;
        let _guard = self.in_flight.lock().await;
        let Some(id) = self.store.remote_id().await else {
            return Ok(None);
        };

        match remote.delete(&id).await {
            Ok(()) | Err(RemoteError::NotFound(_)) => {}
            Err(err) => return Err(err.into()),
        }
        self.store.set_remote_id(None).await?;
        info!("removed remote document {id}");
        Ok(Some(id))
    }

    pub async fn handle_event(&self, event: &AppEvent) {
        match event {
            AppEvent::Online => {
                self.set_online(true);
                self.sync_logged("connectivity restored").await;
            }
            AppEvent::Offline => self.set_online(false),
            AppEvent::LoggedIn { user_id } => {
                self.set_authenticated(true);
                self.sync_logged(&format!("{user_id} logged in")).await;
            }
            AppEvent::LoggedOut => {
                // Already applied when the handler delivered it directly.
                if !self.authenticated.swap(false, Ordering::SeqCst) {
                    return;
                }
                let dropped = self.pending_len();
                self.clear_pending();
                if dropped > 0 {
                    info!("logged out, dropped {dropped} pending change(s)");
                }
            }
        }
    }

    async fn sync_logged(&self, reason: &str) {
        match self.sync_all().await {
            Ok(outcome) => debug!("sync after {reason}: {outcome:?}"),
            Err(err) => warn!("sync after {reason} failed: {err}"),
        }
    }

    pub fn spawn_event_loop(self: Arc<Self>, mut events: broadcast::Receiver<AppEvent>) {
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => self.handle_event(&event).await,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("sync listener skipped {skipped} event(s)");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    pub fn spawn_periodic(self: Arc<Self>, period: Duration) {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                interval.tick().await;
                self.sync_logged("interval").await;
            }
        });
    }

    pub async fn status(&self) -> SyncStatus {
        let last_sync = self.last_sync.load(Ordering::SeqCst);
        SyncStatus {
            backend: self
                .remote
                .as_ref()
                .map(|remote| remote.backend_name().to_string()),
            online: self.is_online(),
            authenticated: self.is_authenticated(),
            pending: self.pending_len(),
            remote_id: self.store.remote_id().await,
            migration_done: self.store.migration_done().await,
            last_sync: (last_sync > 0).then_some(last_sync),
        }
    }
}
