//! In-process server double
//!
//! Records every delivery and can be switched offline, made to fail, or
//! made to drop the connection after a number of deliveries.

use async_trait::async_trait;
use chrono::Utc;
use fieldops::client::remote::{DeliveryError, RemoteApi, TimeLogAck};
use fieldops::shared::{Job, JobStatus, Media, PartInfo, PartsUsage, Priority, TimeLog};
use std::collections::VecDeque;
use std::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct MockState {
    offline: bool,
    offline_after: Option<usize>,
    fail_next: VecDeque<DeliveryError>,
    fail_always: Option<DeliveryError>,
    attempts: usize,
    time_logs: Vec<TimeLog>,
    uploads: Vec<Uuid>,
    parts: Vec<PartsUsage>,
    lookups: usize,
}

#[derive(Default)]
pub struct MockRemote {
    state: Mutex<MockState>,
}

impl MockRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_online(&self, online: bool) {
        let mut state = self.state.lock().unwrap();
        state.offline = !online;
        state.offline_after = None;
    }

    /// Lose the connection once `n` more deliveries have succeeded
    pub fn go_offline_after(&self, n: usize) {
        self.state.lock().unwrap().offline_after = Some(n);
    }

    pub fn fail_next(&self, error: DeliveryError) {
        self.state.lock().unwrap().fail_next.push_back(error);
    }

    pub fn fail_always(&self, error: Option<DeliveryError>) {
        self.state.lock().unwrap().fail_always = error;
    }

    /// Delivery calls received, successful or not
    pub fn attempts(&self) -> usize {
        self.state.lock().unwrap().attempts
    }

    pub fn time_logs(&self) -> Vec<TimeLog> {
        self.state.lock().unwrap().time_logs.clone()
    }

    pub fn uploads(&self) -> Vec<Uuid> {
        self.state.lock().unwrap().uploads.clone()
    }

    pub fn parts(&self) -> Vec<PartsUsage> {
        self.state.lock().unwrap().parts.clone()
    }

    pub fn lookups(&self) -> usize {
        self.state.lock().unwrap().lookups
    }

    fn deliver(&self, record: impl FnOnce(&mut MockState)) -> Result<(), DeliveryError> {
        let mut state = self.state.lock().unwrap();
        state.attempts += 1;
        if state.offline {
            return Err(DeliveryError::Offline("connection refused".to_string()));
        }
        if let Some(error) = state.fail_next.pop_front() {
            return Err(error);
        }
        if let Some(error) = state.fail_always.clone() {
            return Err(error);
        }
        record(&mut state);
        if let Some(left) = state.offline_after.as_mut() {
            *left = left.saturating_sub(1);
            if *left == 0 {
                state.offline = true;
                state.offline_after = None;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteApi for MockRemote {
    async fn send_time_log(&self, log: &TimeLog) -> Result<TimeLogAck, DeliveryError> {
        self.deliver(|state| state.time_logs.push(log.clone()))?;
        Ok(TimeLogAck {
            server_timestamp: Some(Utc::now()),
        })
    }

    async fn upload_media(&self, media: &Media) -> Result<String, DeliveryError> {
        self.deliver(|state| state.uploads.push(media.id))?;
        Ok(format!("/files/{}.jpg", media.id))
    }

    async fn send_parts_usage(&self, usage: &PartsUsage) -> Result<(), DeliveryError> {
        self.deliver(|state| state.parts.push(usage.clone()))
    }

    async fn fetch_jobs(&self) -> Result<Vec<Job>, DeliveryError> {
        if self.state.lock().unwrap().offline {
            return Err(DeliveryError::Offline("connection refused".to_string()));
        }
        Ok(vec![Job {
            id: "JOB-1".to_string(),
            title: "Replace brake pads".to_string(),
            customer: Some("Acme Fleet".to_string()),
            vehicle: Some("VAN-12".to_string()),
            status: JobStatus::Open,
            priority: Priority::High,
            fetched_at: Utc::now(),
        }])
    }

    async fn lookup_part(&self, code: &str) -> Result<Option<PartInfo>, DeliveryError> {
        let mut state = self.state.lock().unwrap();
        state.lookups += 1;
        if state.offline {
            return Err(DeliveryError::Offline("connection refused".to_string()));
        }
        Ok(Some(PartInfo {
            code: code.to_string(),
            name: "Brake pad set".to_string(),
            price: Some(42.0),
            stock: Some(12.0),
        }))
    }

    async fn ping(&self) -> Result<(), DeliveryError> {
        if self.state.lock().unwrap().offline {
            return Err(DeliveryError::Offline("connection refused".to_string()));
        }
        Ok(())
    }
}
