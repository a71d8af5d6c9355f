//! Desktop shell state
//!
//! The UI thread never awaits. Every client call is spawned on the tokio
//! runtime and its result comes back over a channel polled once per frame.

use crate::client::sync::{AgentMessage, NetworkStatus, SyncState};
use crate::client::timer::TimerSnapshot;
use crate::client::{Config, Devices, FieldClient};
use crate::shared::{BreakKind, Job};
use std::future::Future;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::sync::{broadcast, watch};
use uuid::Uuid;

const SYNC_REFRESH: Duration = Duration::from_secs(2);

enum UiEvent {
    Started(Arc<FieldClient>),
    SyncState(SyncState),
    Jobs(Vec<Job>),
    Info(String),
    Error(String),
}

/// Central application state shared across views
pub struct AppState {
    runtime: Handle,
    client: Option<Arc<FieldClient>>,
    events_tx: Sender<UiEvent>,
    events_rx: Receiver<UiEvent>,
    timer_rx: Option<watch::Receiver<TimerSnapshot>>,
    agent_rx: Option<broadcast::Receiver<AgentMessage>>,
    last_refresh: Option<Instant>,

    pub timer: TimerSnapshot,
    pub sync_state: SyncState,
    pub jobs: Vec<Job>,
    pub selected_job: Option<String>,
    pub status_message: Option<(bool, String)>,

    pub break_kind: BreakKind,
    pub break_reason_input: String,
    pub manual_minutes_input: String,
    pub manual_reason_input: String,
    pub part_code_input: String,
    pub part_quantity_input: String,
    pub part_notes_input: String,
}

impl AppState {
    pub fn new(runtime: Handle, config: Config) -> Self {
        let (events_tx, events_rx) = channel();
        let state = Self {
            runtime,
            client: None,
            events_tx,
            events_rx,
            timer_rx: None,
            agent_rx: None,
            last_refresh: None,
            timer: TimerSnapshot::default(),
            sync_state: SyncState::default(),
            jobs: Vec::new(),
            selected_job: None,
            status_message: None,
            break_kind: BreakKind::Rest,
            break_reason_input: String::new(),
            manual_minutes_input: String::new(),
            manual_reason_input: String::new(),
            part_code_input: String::new(),
            part_quantity_input: "1".to_string(),
            part_notes_input: String::new(),
        };

        let tx = state.events_tx.clone();
        state.runtime.spawn(async move {
            let event = match FieldClient::start(config, Devices::default()).await {
                Ok(client) => UiEvent::Started(Arc::new(client)),
                Err(e) => UiEvent::Error(format!("Could not start: {e}")),
            };
            let _ = tx.send(event);
        });
        state
    }

    pub fn is_ready(&self) -> bool {
        self.client.is_some()
    }

    pub fn is_online(&self) -> bool {
        self.sync_state.network_status == NetworkStatus::Online
    }

    /// Apply results of finished tasks. Called once per frame.
    pub fn poll(&mut self) {
        while let Ok(event) = self.events_rx.try_recv() {
            match event {
                UiEvent::Started(client) => {
                    self.timer_rx = Some(client.timer().watch());
                    self.agent_rx = Some(client.agent_messages());
                    self.client = Some(client);
                    self.load_jobs();
                }
                UiEvent::SyncState(sync_state) => self.sync_state = sync_state,
                UiEvent::Jobs(jobs) => {
                    if self.selected_job.is_none() {
                        self.selected_job = jobs.first().map(|job| job.id.clone());
                    }
                    self.jobs = jobs;
                }
                UiEvent::Info(message) => self.status_message = Some((false, message)),
                UiEvent::Error(message) => self.status_message = Some((true, message)),
            }
        }

        if let Some(timer_rx) = &self.timer_rx {
            self.timer = timer_rx.borrow().clone();
        }

        let mut refresh = self.last_refresh.map_or(true, |at| at.elapsed() >= SYNC_REFRESH);
        if let Some(agent_rx) = &mut self.agent_rx {
            while let Ok(message) = agent_rx.try_recv() {
                if let AgentMessage::ItemFailed { record_id, error, .. } = message {
                    self.status_message = Some((true, format!("{record_id}: {error}")));
                }
                refresh = true;
            }
        }
        if refresh {
            self.refresh_sync_state();
        }
    }

    /// Run `task` against the client and report its outcome
    fn spawn<F, Fut>(&self, task: F)
    where
        F: FnOnce(Arc<FieldClient>) -> Fut,
        Fut: Future<Output = Result<Option<String>, String>> + Send + 'static,
    {
        let Some(client) = self.client.clone() else {
            return;
        };
        let tx = self.events_tx.clone();
        let fut = task(client);
        self.runtime.spawn(async move {
            let event = match fut.await {
                Ok(Some(message)) => UiEvent::Info(message),
                Ok(None) => return,
                Err(message) => UiEvent::Error(message),
            };
            let _ = tx.send(event);
        });
    }

    fn refresh_sync_state(&mut self) {
        self.last_refresh = Some(Instant::now());
        let Some(client) = self.client.clone() else {
            return;
        };
        let tx = self.events_tx.clone();
        self.runtime.spawn(async move {
            match client.sync_state().await {
                Ok(state) => {
                    let _ = tx.send(UiEvent::SyncState(state));
                }
                Err(e) => tracing::warn!(error = %e, "could not read sync state"),
            }
        });
    }

    pub fn load_jobs(&self) {
        let Some(client) = self.client.clone() else {
            return;
        };
        let tx = self.events_tx.clone();
        self.runtime.spawn(async move {
            if client.connectivity().is_online() {
                if let Err(e) = client.sync().pull_jobs().await {
                    tracing::warn!(error = %e, "job refresh failed, showing cached jobs");
                }
            }
            match client.database().get_all::<Job>(crate::client::local_db::IndexQuery::All).await {
                Ok(jobs) => {
                    let _ = tx.send(UiEvent::Jobs(jobs));
                }
                Err(e) => {
                    let _ = tx.send(UiEvent::Error(format!("Could not load jobs: {e}")));
                }
            }
        });
    }

    pub fn start_timer(&self) {
        let Some(job_id) = self.selected_job.clone() else {
            return;
        };
        self.spawn(|client| async move {
            client.timer().start(&job_id).await.map_err(|e| e.to_string())?;
            Ok(None)
        });
    }

    pub fn pause_timer(&self) {
        self.spawn(|client| async move {
            client.timer().pause().await.map_err(|e| e.to_string())?;
            Ok(None)
        });
    }

    pub fn resume_timer(&self) {
        self.spawn(|client| async move {
            client.timer().resume().await.map_err(|e| e.to_string())?;
            Ok(None)
        });
    }

    pub fn start_break(&mut self) {
        let kind = self.break_kind;
        let reason = Some(std::mem::take(&mut self.break_reason_input)).filter(|r| !r.trim().is_empty());
        self.spawn(move |client| async move {
            client.timer().start_break(kind, reason).await.map_err(|e| e.to_string())?;
            Ok(None)
        });
    }

    pub fn end_break(&self) {
        self.spawn(|client| async move {
            client.timer().end_break().await.map_err(|e| e.to_string())?;
            Ok(None)
        });
    }

    pub fn stop_timer(&self) {
        self.spawn(|client| async move {
            let log = client.timer().stop().await.map_err(|e| e.to_string())?;
            Ok(Some(format!("Stopped: {} min worked", log.work_secs / 60)))
        });
    }

    pub fn manual_entry(&mut self) {
        let minutes = match self.manual_minutes_input.trim().parse::<u64>() {
            Ok(minutes) if minutes > 0 => minutes,
            _ => {
                self.status_message = Some((true, "Enter the minutes worked".to_string()));
                return;
            }
        };
        let reason = std::mem::take(&mut self.manual_reason_input);
        let job_id = self.selected_job.clone();
        self.manual_minutes_input.clear();
        self.spawn(move |client| async move {
            client
                .timer()
                .manual_entry(Duration::from_secs(minutes * 60), &reason, job_id.as_deref())
                .await
                .map_err(|e| e.to_string())?;
            Ok(Some(format!("Added {minutes} min")))
        });
    }

    pub fn record_part(&mut self) {
        let Some(job_id) = self.selected_job.clone() else {
            self.status_message = Some((true, "Select a job first".to_string()));
            return;
        };
        let quantity = match self.part_quantity_input.trim().parse::<f64>() {
            Ok(quantity) => quantity,
            Err(_) => {
                self.status_message = Some((true, "Quantity must be a number".to_string()));
                return;
            }
        };
        let code = std::mem::take(&mut self.part_code_input);
        let notes = Some(std::mem::take(&mut self.part_notes_input));
        self.spawn(move |client| async move {
            let usage = client
                .parts()
                .record_usage(&job_id, &code, quantity, notes)
                .await
                .map_err(|e| e.to_string())?;
            Ok(Some(format!("Recorded {} x {}", usage.quantity, usage.code)))
        });
    }

    pub fn sync_now(&self) {
        self.spawn(|client| async move {
            let report = client.sync_now().await.map_err(|e| e.to_string())?;
            Ok(Some(format!("Synced {} of {}", report.synced, report.attempted)))
        });
    }

    pub fn retry_item(&self, item_id: Uuid) {
        self.spawn(move |client| async move {
            client.sync().retry(item_id).await.map_err(|e| e.to_string())?;
            Ok(None)
        });
    }

    pub fn acknowledge_item(&self, item_id: Uuid) {
        self.spawn(move |client| async move {
            client.sync().acknowledge(item_id).await.map_err(|e| e.to_string())?;
            Ok(None)
        });
    }

    /// Simulate losing or regaining the network link
    pub fn set_online(&self, online: bool) {
        if let Some(client) = &self.client {
            client.connectivity().report_platform(online);
        }
    }
}
