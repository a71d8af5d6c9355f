//! HTTP remote against a wiremock server

use assert_matches::assert_matches;
use chrono::Utc;
use fieldops::client::remote::{DeliveryError, HttpRemote, RemoteApi};
use fieldops::client::Config;
use fieldops::shared::{AppConfig, Media, MediaKind, MediaMetadata, PartsUsage, TimeAction, TimeLog};
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn remote(server_url: &str) -> HttpRemote {
    let config = Config::with_builder(
        AppConfig::builder()
            .server_url(server_url)
            .credentials("field-key", "field-secret"),
    )
    .unwrap();
    HttpRemote::new(config).unwrap()
}

fn time_log() -> TimeLog {
    TimeLog {
        id: Uuid::new_v4(),
        job_id: "JOB-1".to_string(),
        action: TimeAction::Start,
        timestamp: Utc::now(),
        elapsed_secs: 0,
        work_secs: 0,
        break_secs: 0,
        breaks: Vec::new(),
        reason: None,
        synced: false,
        server_timestamp: None,
    }
}

fn usage() -> PartsUsage {
    PartsUsage {
        id: Uuid::new_v4(),
        job_id: "JOB-1".to_string(),
        code: "123456".to_string(),
        quantity: 1.0,
        notes: None,
        timestamp: Utc::now(),
        synced: false,
        attempts: 0,
        part: None,
    }
}

#[tokio::test]
async fn test_time_log_is_posted_with_token() {
    let server = MockServer::start().await;
    let log = time_log();
    Mock::given(method("POST"))
        .and(path("/api/method/fieldops.api.sync_time_log"))
        .and(header("Authorization", "token field-key:field-secret"))
        .and(header("X-Idempotency-Key", log.id.to_string().as_str()))
        .and(body_partial_json(json!({ "job_id": "JOB-1", "action": "start" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "message": { "server_timestamp": "2024-05-01T08:30:00Z" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let ack = remote(&server.uri()).send_time_log(&log).await.unwrap();
    assert_eq!(ack.server_timestamp.unwrap().to_rfc3339(), "2024-05-01T08:30:00+00:00");
}

#[tokio::test]
async fn test_status_codes_are_classified() {
    let server = MockServer::start().await;
    Mock::given(path("/api/method/fieldops.api.sync_parts_usage"))
        .respond_with(ResponseTemplate::new(422).set_body_string("quantity must be positive"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(path("/api/method/fieldops.api.sync_parts_usage"))
        .respond_with(ResponseTemplate::new(409))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(path("/api/method/fieldops.api.sync_parts_usage"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let remote = remote(&server.uri());
    assert_matches!(
        remote.send_parts_usage(&usage()).await,
        Err(DeliveryError::Permanent { status: 422, .. })
    );
    assert_matches!(remote.send_parts_usage(&usage()).await, Err(DeliveryError::Conflict(_)));
    assert_matches!(remote.send_parts_usage(&usage()).await, Err(DeliveryError::Transient(_)));
}

#[tokio::test]
async fn test_media_upload_returns_file_url() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/method/fieldops.api.upload_media"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "message": { "file_url": "/files/brakes.jpg" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let media = Media {
        id: Uuid::new_v4(),
        job_id: "JOB-1".to_string(),
        kind: MediaKind::Photo,
        payload: vec![0xFF, 0xD8, 0xFF],
        size_bytes: 3,
        mime_type: "image/jpeg".to_string(),
        captured_at: Utc::now(),
        synced: false,
        attempts: 0,
        remote_url: None,
        needs_compression: false,
        metadata: MediaMetadata::default(),
        evicted: false,
    };
    let url = remote(&server.uri()).upload_media(&media).await.unwrap();
    assert_eq!(url, "/files/brakes.jpg");
}

#[tokio::test]
async fn test_unknown_part_is_none() {
    let server = MockServer::start().await;
    Mock::given(path("/api/method/fieldops.api.lookup_part"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    assert_eq!(remote(&server.uri()).lookup_part("999").await.unwrap(), None);
}

#[tokio::test]
async fn test_unreachable_server_is_offline() {
    let remote = remote("http://127.0.0.1:9");
    assert_matches!(remote.send_time_log(&time_log()).await, Err(DeliveryError::Offline(_)));
    assert!(remote.ping().await.is_err());
}

#[tokio::test]
async fn test_jobs_are_fetched() {
    let server = MockServer::start().await;
    Mock::given(path("/api/method/fieldops.api.get_assigned_jobs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "message": [
                { "id": "JOB-1", "title": "Brakes", "customer": null, "vehicle": "VAN-12", "status": "In Progress" }
            ]
        })))
        .mount(&server)
        .await;

    let jobs = remote(&server.uri()).fetch_jobs().await.unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].status, fieldops::shared::JobStatus::InProgress);
}
