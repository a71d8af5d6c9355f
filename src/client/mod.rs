//! # Field Client
//!
//! Offline-first client for field technicians.
//!
//! ## Architecture
//!
//! Every user action commits to the local store first. Records are then
//! queued for delivery and sent right away when the server is reachable, or
//! later by the background agent.
//!
//! - **`local_db`**: SQLite store for jobs, time logs, media, parts usage,
//!   the sync queue and cached HTTP responses
//! - **`offline`**: sync queue manager and retry policy
//! - **`sync`**: connectivity monitor, background sync agent, metrics
//! - **`timer`**: time tracking state machine
//! - **`media`**: camera sessions, photo/video processing and upload
//! - **`parts`**: barcode scanning and parts usage
//! - **`cache`**: caching strategies for HTTP resources
//! - **`remote`**: server RPCs
//! - **`config`**: configuration sources
//! - **`state`**, **`views`**: the egui desktop shell
//!
//! [`FieldClient`] wires them together.

pub mod cache;
pub mod config;
pub mod error;
pub mod local_db;
pub mod media;
pub mod offline;
pub mod parts;
pub mod remote;
pub mod state;
pub mod sync;
pub mod timer;
pub mod views;

pub use config::Config;
pub use error::FieldError;

use crate::client::cache::{CacheEngine, CacheRules, HttpFetcher};
use crate::client::local_db::LocalDatabase;
use crate::client::media::{Camera, MediaPipeline, UnavailableCamera};
use crate::client::offline::{DrainReport, SyncQueueManager};
use crate::client::parts::{BarcodeDecoder, PartsService};
use crate::client::remote::{HttpRemote, RemoteApi};
use crate::client::sync::{AgentMessage, BackgroundSyncAgent, ConnectivityMonitor, SyncState, TaskScheduler};
use crate::client::timer::{SystemClock, TimeTracker};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Device capabilities supplied by the host platform
#[derive(Clone, Default)]
pub struct Devices {
    pub camera: Option<Arc<dyn Camera>>,
    pub decoder: Option<Arc<dyn BarcodeDecoder>>,
}

/// The assembled client
pub struct FieldClient {
    config: Config,
    db: LocalDatabase,
    remote: Arc<dyn RemoteApi>,
    connectivity: ConnectivityMonitor,
    scheduler: TaskScheduler,
    sync: SyncQueueManager,
    timer: TimeTracker,
    media: MediaPipeline,
    parts: PartsService,
    cache: CacheEngine,
    agent_messages: broadcast::Receiver<AgentMessage>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl FieldClient {
    /// Build the client against the configured server
    pub async fn start(config: Config, devices: Devices) -> Result<Self, FieldError> {
        let remote: Arc<dyn RemoteApi> = Arc::new(HttpRemote::new(config.clone())?);
        Self::start_with_remote(config, remote, devices).await
    }

    /// Build the client with a caller-supplied remote
    pub async fn start_with_remote(
        config: Config,
        remote: Arc<dyn RemoteApi>,
        devices: Devices,
    ) -> Result<Self, FieldError> {
        let app = config.app().clone();
        let db = LocalDatabase::open_or_degrade(&config.database_path()).await?;
        let connectivity = ConnectivityMonitor::new(true);
        let scheduler = TaskScheduler::new();

        let sync = SyncQueueManager::new(db.clone(), Arc::clone(&remote), connectivity.clone(), &app)
            .with_scheduler(scheduler.clone());
        let timer = TimeTracker::new(db.clone(), sync.clone(), Arc::new(SystemClock));
        let camera = devices.camera.unwrap_or_else(|| Arc::new(UnavailableCamera));
        let media = MediaPipeline::new(camera, db.clone(), sync.clone(), &app);
        let parts = PartsService::new(devices.decoder, Arc::clone(&remote), db.clone(), sync.clone(), &app);
        let cache = CacheEngine::new(
            CacheRules::new(app.cache.clone()),
            Arc::new(HttpFetcher::new(app.request_timeout)?),
            db.clone(),
        );

        let agent = BackgroundSyncAgent::new(
            db.clone(),
            Arc::clone(&remote),
            connectivity.clone(),
            scheduler.clone(),
            &app,
        );
        let agent_messages = agent.subscribe();

        let state = timer.restore().await?;
        match media.evict_expired().await {
            Ok(0) => {}
            Ok(evicted) => tracing::info!(evicted, "expired media payloads evicted"),
            Err(e) => tracing::warn!(error = %e, "media retention sweep failed"),
        }

        let tasks = vec![
            connectivity.spawn_heartbeat(Arc::clone(&remote), app.heartbeat_interval, app.heartbeat_timeout),
            agent.spawn(),
            timer.spawn_ticker(),
        ];
        scheduler.register(crate::client::sync::SYNC_TAG);

        tracing::info!(
            server = %config.server_url(),
            durable = db.is_durable(),
            timer = %state,
            "field client started"
        );

        Ok(Self {
            config,
            db,
            remote,
            connectivity,
            scheduler,
            sync,
            timer,
            media,
            parts,
            cache,
            agent_messages,
            tasks: Mutex::new(tasks),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn database(&self) -> &LocalDatabase {
        &self.db
    }

    pub fn remote(&self) -> Arc<dyn RemoteApi> {
        Arc::clone(&self.remote)
    }

    pub fn connectivity(&self) -> &ConnectivityMonitor {
        &self.connectivity
    }

    pub fn scheduler(&self) -> &TaskScheduler {
        &self.scheduler
    }

    pub fn sync(&self) -> &SyncQueueManager {
        &self.sync
    }

    pub fn timer(&self) -> &TimeTracker {
        &self.timer
    }

    pub fn media(&self) -> &MediaPipeline {
        &self.media
    }

    pub fn parts(&self) -> &PartsService {
        &self.parts
    }

    pub fn cache(&self) -> &CacheEngine {
        &self.cache
    }

    /// Progress of the background agent
    pub fn agent_messages(&self) -> broadcast::Receiver<AgentMessage> {
        self.agent_messages.resubscribe()
    }

    /// Drain the queue from the foreground
    pub async fn sync_now(&self) -> Result<DrainReport, FieldError> {
        Ok(self.sync.drain().await?)
    }

    pub async fn sync_state(&self) -> Result<SyncState, FieldError> {
        Ok(SyncState {
            network_status: self.connectivity.status(),
            counts: self.sync.counts().await?,
            problems: self.sync.problems().await?,
            last_sync: self.db.get_last_sync_time().await?,
            durable: self.db.is_durable(),
        })
    }

    /// Stop the background tasks. Queued items stay queued.
    pub fn shutdown(&self) {
        let mut tasks = self.tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        for task in tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for FieldClient {
    fn drop(&mut self) {
        self.shutdown();
    }
}
