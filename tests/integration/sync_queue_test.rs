//! Sync queue delivery over a durable store

use crate::common::*;
use assert_matches::assert_matches;
use fieldops::client::offline::{ItemOutcome, SyncError};
use fieldops::client::parts::PartsService;
use fieldops::client::remote::DeliveryError;
use fieldops::shared::{PartsUsage, PayloadType, QueueState};
use pretty_assertions::assert_eq;
use std::collections::HashSet;
use std::sync::Arc;

#[tokio::test]
async fn test_enqueue_is_idempotent() {
    let fixture = TestDatabase::new().await;
    let remote = Arc::new(MockRemote::new());
    let manager = manager(&fixture.db, remote, false);
    let usage = committed_usage(&fixture.db, "123456").await;

    let first = manager.enqueue(PayloadType::PartsUsage, &usage.id.to_string()).await.unwrap();
    let second = manager.enqueue(PayloadType::PartsUsage, &usage.id.to_string()).await.unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(manager.counts().await.unwrap().pending, 1);
}

#[tokio::test]
async fn test_drain_interrupted_after_two_of_five() {
    let fixture = TestDatabase::new().await;
    let remote = Arc::new(MockRemote::new());
    let manager = manager(&fixture.db, remote.clone(), false);

    let mut ids = Vec::new();
    for n in 0..5 {
        let usage = committed_usage(&fixture.db, &format!("P-{n}")).await;
        let outcome = manager.submit(PayloadType::PartsUsage, &usage.id.to_string()).await.unwrap();
        assert_eq!(outcome, ItemOutcome::Deferred);
        ids.push(usage.id);
    }

    remote.go_offline_after(2);
    manager.connectivity().report_platform(true);
    let report = manager.drain().await.unwrap();
    assert_eq!(report.synced, 2);
    assert!(report.stopped_offline);

    let pending = manager.pending().await.unwrap();
    assert_eq!(pending.len(), 3);
    assert!(pending.iter().all(|item| item.attempts == 0));

    remote.set_online(true);
    manager.connectivity().report_platform(true);
    let report = manager.drain().await.unwrap();
    assert_eq!(report.synced, 3);
    assert_eq!(manager.counts().await.unwrap().total(), 0);

    let delivered: HashSet<_> = remote.parts().iter().map(|usage| usage.id).collect();
    assert_eq!(remote.parts().len(), 5);
    assert_eq!(delivered, ids.into_iter().collect::<HashSet<_>>());

    for usage in remote.parts() {
        let stored: PartsUsage = fixture.db.get(&usage.id.to_string()).await.unwrap().unwrap();
        assert!(stored.synced);
    }
    assert!(fixture.db.get_last_sync_time().await.unwrap().is_some());
}

#[tokio::test]
async fn test_persistent_failure_stops_at_three_attempts() {
    let fixture = TestDatabase::new().await;
    let remote = Arc::new(MockRemote::new());
    remote.fail_always(Some(DeliveryError::Transient("503 service unavailable".into())));
    let manager = manager(&fixture.db, remote.clone(), true);
    let mut notices = manager.subscribe();

    let usage = committed_usage(&fixture.db, "123456").await;
    let outcome = manager.submit(PayloadType::PartsUsage, &usage.id.to_string()).await.unwrap();
    assert_eq!(outcome, ItemOutcome::Retrying { attempts: 1 });

    assert_eq!(manager.drain().await.unwrap().retrying, 1);
    assert_eq!(manager.drain().await.unwrap().exhausted, 1);
    assert_eq!(manager.drain().await.unwrap().attempted, 0);
    assert_eq!(remote.attempts(), 3);

    let problems = manager.problems().await.unwrap();
    assert_eq!(problems.len(), 1);
    assert_eq!(problems[0].state, QueueState::Exhausted);
    assert_eq!(problems[0].attempts, 3);
    assert_matches!(notices.try_recv(), Ok(fieldops::client::offline::SyncNotice::NeedsAttention { .. }));

    let stored: PartsUsage = fixture.db.get(&usage.id.to_string()).await.unwrap().unwrap();
    assert_eq!(stored.attempts, 3);
    assert!(!stored.synced);

    remote.fail_always(None);
    let outcome = manager.retry(problems[0].id).await.unwrap();
    assert_eq!(outcome, ItemOutcome::Synced);
    assert_eq!(remote.parts().len(), 1);
}

#[tokio::test]
async fn test_rejected_item_waits_for_acknowledgement() {
    let fixture = TestDatabase::new().await;
    let remote = Arc::new(MockRemote::new());
    remote.fail_next(DeliveryError::Permanent {
        status: 422,
        message: "quantity must be positive".into(),
    });
    let manager = manager(&fixture.db, remote.clone(), true);

    let usage = committed_usage(&fixture.db, "123456").await;
    let outcome = manager.submit(PayloadType::PartsUsage, &usage.id.to_string()).await.unwrap();
    assert_matches!(outcome, ItemOutcome::Rejected { .. });
    assert_eq!(remote.attempts(), 1);

    let counts = manager.counts().await.unwrap();
    assert_eq!(counts.rejected, 1);
    assert_eq!(manager.drain().await.unwrap().attempted, 0);

    let item = manager.problems().await.unwrap().remove(0);
    manager.acknowledge(item.id).await.unwrap();
    assert_eq!(manager.counts().await.unwrap().total(), 0);

    let stored: PartsUsage = fixture.db.get(&usage.id.to_string()).await.unwrap().unwrap();
    assert!(!stored.synced);
}

#[tokio::test]
async fn test_pending_item_cannot_be_acknowledged() {
    let fixture = TestDatabase::new().await;
    let manager = manager(&fixture.db, Arc::new(MockRemote::new()), false);
    let usage = committed_usage(&fixture.db, "123456").await;
    let item = manager.enqueue(PayloadType::PartsUsage, &usage.id.to_string()).await.unwrap();

    assert_matches!(manager.acknowledge(item.id).await, Err(SyncError::StillPending(_)));
}

#[tokio::test]
async fn test_missing_record_is_dropped() {
    let fixture = TestDatabase::new().await;
    let remote = Arc::new(MockRemote::new());
    let manager = manager(&fixture.db, remote.clone(), true);

    manager.enqueue(PayloadType::TimeLog, "0b1d3f9e-0000-4000-8000-000000000000").await.unwrap();
    let report = manager.drain().await.unwrap();

    assert_eq!(report.dropped, 1);
    assert_eq!(remote.attempts(), 0);
    assert_eq!(manager.counts().await.unwrap().total(), 0);
}

#[tokio::test]
async fn test_queue_survives_restart() {
    let fixture = TestDatabase::new().await;
    let remote = Arc::new(MockRemote::new());
    let usage = committed_usage(&fixture.db, "123456").await;
    manager(&fixture.db, remote.clone(), false)
        .submit(PayloadType::PartsUsage, &usage.id.to_string())
        .await
        .unwrap();
    fixture.db.close().await;

    let reopened = fieldops::client::local_db::LocalDatabase::open(&fixture.dir.path().join("field.db"))
        .await
        .unwrap();
    let report = manager(&reopened, remote.clone(), true).drain().await.unwrap();
    assert_eq!(report.synced, 1);
    assert_eq!(remote.parts()[0].id, usage.id);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_part_lookups_and_delivery_both_stick() {
    let fixture = TestDatabase::new().await;
    let remote = Arc::new(MockRemote::new());
    remote.fail_always(Some(DeliveryError::Transient("503 service unavailable".into())));
    let manager = manager(&fixture.db, remote.clone(), true);
    let parts = PartsService::new(None, remote.clone(), fixture.db.clone(), manager.clone(), &test_config());

    // Each usage fails its first delivery and starts a lookup in the background
    let mut ids = Vec::new();
    for n in 0..10 {
        let usage = parts.record_usage("JOB-1", &format!("P-{n}"), 1.0, None).await.unwrap();
        ids.push(usage.id.to_string());
    }

    remote.fail_always(None);
    let report = manager.drain().await.unwrap();
    assert_eq!(report.synced, 10);

    let db = fixture.db.clone();
    let settled = eventually(|| {
        let db = db.clone();
        let ids = ids.clone();
        async move {
            for id in &ids {
                let stored: PartsUsage = db.get(id).await.unwrap().unwrap();
                if stored.part.is_none() {
                    return false;
                }
            }
            true
        }
    })
    .await;
    assert!(settled);

    for id in &ids {
        let stored: PartsUsage = fixture.db.get(id).await.unwrap().unwrap();
        assert!(stored.synced, "usage {id} lost its delivery mark");
        assert_eq!(stored.attempts, 1);
        assert_eq!(stored.part.map(|part| part.name), Some("Brake pad set".to_string()));
    }
    assert_eq!(fixture.db.count_unsynced::<PartsUsage>().await.unwrap(), 0);
}
