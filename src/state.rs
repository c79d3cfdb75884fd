use crate::clock::Clock;
use crate::config::Config;
use crate::errors::StoreError;
use crate::events::EventBus;
use crate::models::Snapshot;
use crate::remote::BlobStore;
use crate::session::SessionService;
use crate::storage::LocalStore;
use crate::sync::SyncOrchestrator;
use crate::tracker::RecordTracker;
use std::{path::PathBuf, sync::Arc};
use tokio::sync::Mutex;
use tracing::info;

/// In-memory copy of the persisted snapshot, shared by the tracker, the
/// session service and the sync orchestrator.
pub type SharedSnapshot = Arc<Mutex<Snapshot>>;

/// Services constructed once at startup and handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub tracker: Arc<RecordTracker>,
    pub sync: Arc<SyncOrchestrator>,
    pub session: Arc<SessionService>,
    pub remote: Option<Arc<dyn BlobStore>>,
    pub clock: Arc<dyn Clock>,
    pub static_dir: PathBuf,
}

impl AppState {
    /// Load local data, wire the services together and start the event
    /// listener (plus the periodic sync task when configured).
    pub async fn start(
        config: &Config,
        remote: Option<Arc<dyn BlobStore>>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, StoreError> {
        let store = LocalStore::open(&config.data_dir).await?;
        let snapshot = store.load_snapshot().await;
        info!(
            "loaded {} records from {}",
            snapshot.records.len(),
            store.dir().display()
        );
        let data: SharedSnapshot = Arc::new(Mutex::new(snapshot));
        let events = EventBus::default();

        let sync = Arc::new(SyncOrchestrator::new(
            store.clone(),
            Arc::clone(&data),
            remote.clone(),
            Arc::clone(&clock),
            !config.start_offline,
        ));
        let tracker = Arc::new(RecordTracker::new(
            store.clone(),
            Arc::clone(&data),
            Arc::clone(&sync),
            Arc::clone(&clock),
        ));
        let session = Arc::new(SessionService::new(
            store,
            Arc::clone(&data),
            events.clone(),
            Arc::clone(&clock),
        ));

        tracker.roll_over().await?;

        Arc::clone(&sync).spawn_event_loop(events.subscribe());
        if let Some(period) = config.sync_interval {
            Arc::clone(&sync).spawn_periodic(period);
        }
        session.restore().await;

        Ok(Self {
            tracker,
            sync,
            session,
            remote,
            clock,
            static_dir: config.static_dir.clone(),
        })
    }
}
