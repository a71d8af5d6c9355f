//! Capture while offline, deliver on reconnect

use crate::common::*;
use chrono::Utc;
use fieldops::client::media::{Facing, MediaPipeline};
use fieldops::client::parts::PartsService;
use fieldops::shared::{Job, JobStatus, Media, PartsUsage, PayloadType, Priority};
use pretty_assertions::assert_eq;
use std::sync::Arc;

fn job() -> Job {
    Job {
        id: "JOB-1".to_string(),
        title: "Replace brake pads".to_string(),
        customer: Some("Acme Fleet".to_string()),
        vehicle: Some("VAN-12".to_string()),
        status: JobStatus::InProgress,
        priority: Priority::Normal,
        fetched_at: Utc::now(),
    }
}

#[tokio::test]
async fn test_offline_photo_uploads_once_on_reconnect() {
    let fixture = TestDatabase::new().await;
    let remote = Arc::new(MockRemote::new());
    let sync = manager(&fixture.db, remote.clone(), false);
    let pipeline = MediaPipeline::new(Arc::new(StillCamera::png(640, 480)), fixture.db.clone(), sync.clone(), &test_config());

    let media = pipeline.capture_photo(&job(), Facing::Back).await.unwrap();
    assert!(remote.uploads().is_empty());
    let item = fixture
        .db
        .queue_item_for_record(PayloadType::Media, &media.id.to_string())
        .await
        .unwrap()
        .expect("photo should be queued");
    assert_eq!(item.attempts, 0);

    sync.connectivity().report_platform(true);
    let report = sync.drain().await.unwrap();
    assert_eq!(report.synced, 1);
    assert_eq!(sync.drain().await.unwrap().attempted, 0);
    assert_eq!(remote.uploads(), vec![media.id]);

    let stored: Media = fixture.db.get(&media.id.to_string()).await.unwrap().unwrap();
    assert!(stored.synced);
    assert_eq!(stored.remote_url, Some(format!("/files/{}.jpg", media.id)));
    assert_eq!(stored.payload.len() as u64, media.size_bytes);
}

#[tokio::test]
async fn test_offline_scan_delivered_without_lookup() {
    let fixture = TestDatabase::new().await;
    let remote = Arc::new(MockRemote::new());
    let sync = manager(&fixture.db, remote.clone(), false);
    let parts = PartsService::new(None, remote.clone(), fixture.db.clone(), sync.clone(), &test_config());

    let usage = parts.record_usage("JOB-1", "123456", 1.0, None).await.unwrap();
    assert_eq!(remote.lookups(), 0);
    assert!(remote.parts().is_empty());

    sync.connectivity().report_platform(true);
    assert_eq!(sync.drain().await.unwrap().synced, 1);

    let delivered = remote.parts();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].code, "123456");
    assert_eq!(delivered[0].part, None);
    assert_eq!(remote.lookups(), 0);

    let stored: PartsUsage = fixture.db.get(&usage.id.to_string()).await.unwrap().unwrap();
    assert!(stored.synced);
}

#[tokio::test]
async fn test_online_scan_is_annotated_after_delivery() {
    let fixture = TestDatabase::new().await;
    let remote = Arc::new(MockRemote::new());
    let sync = manager(&fixture.db, remote.clone(), true);
    let parts = PartsService::new(None, remote.clone(), fixture.db.clone(), sync, &test_config());

    let usage = parts.record_usage("JOB-1", "4006381333931", 2.0, Some("front axle".into())).await.unwrap();
    assert_eq!(remote.parts().len(), 1);

    let db = fixture.db.clone();
    let id = usage.id.to_string();
    let annotated = eventually(|| {
        let db = db.clone();
        let id = id.clone();
        async move {
            let stored: PartsUsage = db.get(&id).await.unwrap().unwrap();
            stored.part.is_some() && stored.synced
        }
    })
    .await;
    assert!(annotated);
}
