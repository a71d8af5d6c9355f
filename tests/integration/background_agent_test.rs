//! Background agent draining a queue filled by the foreground

use crate::common::*;
use assert_matches::assert_matches;
use fieldops::client::remote::DeliveryError;
use fieldops::client::sync::{AgentMessage, BackgroundSyncAgent, ConnectivityMonitor, TaskScheduler};
use fieldops::shared::{PayloadType, QueueState};
use std::collections::HashSet;
use std::sync::Arc;

#[tokio::test]
async fn test_agent_delivers_foreground_queue() {
    let fixture = TestDatabase::new().await;
    let remote = Arc::new(MockRemote::new());
    let foreground = manager(&fixture.db, remote.clone(), false);

    for code in ["111", "222"] {
        let usage = committed_usage(&fixture.db, code).await;
        foreground.enqueue(PayloadType::PartsUsage, &usage.id.to_string()).await.unwrap();
    }

    let agent = BackgroundSyncAgent::new(
        fixture.db.clone(),
        remote.clone(),
        ConnectivityMonitor::new(true),
        TaskScheduler::new(),
        &test_config(),
    );
    let mut messages = agent.subscribe();

    let report = agent.run_once().await.unwrap();
    assert_eq!(report.synced, 2);
    assert_eq!(remote.parts().len(), 2);
    assert_eq!(foreground.counts().await.unwrap().total(), 0);

    assert_matches!(messages.recv().await.unwrap(), AgentMessage::ItemSynced { .. });
    assert_matches!(messages.recv().await.unwrap(), AgentMessage::ItemSynced { .. });
    assert_matches!(
        messages.recv().await.unwrap(),
        AgentMessage::DrainFinished(finished) if finished.synced == 2
    );

    let metrics = agent.metrics();
    let metrics = metrics.lock().unwrap();
    assert_eq!(metrics.total_items_synced, 2);
    assert_eq!(metrics.success_rate(), 1.0);
}

#[tokio::test]
async fn test_agent_reports_rejected_item() {
    let fixture = TestDatabase::new().await;
    let remote = Arc::new(MockRemote::new());
    remote.fail_next(DeliveryError::Permanent {
        status: 422,
        message: "unknown job".to_string(),
    });

    let usage = committed_usage(&fixture.db, "333").await;
    manager(&fixture.db, remote.clone(), false)
        .enqueue(PayloadType::PartsUsage, &usage.id.to_string())
        .await
        .unwrap();

    let agent = BackgroundSyncAgent::new(
        fixture.db.clone(),
        remote,
        ConnectivityMonitor::new(true),
        TaskScheduler::new(),
        &test_config(),
    );
    let mut messages = agent.subscribe();

    let report = agent.run_once().await.unwrap();
    assert_eq!(report.rejected, 1);
    assert_matches!(
        messages.recv().await.unwrap(),
        AgentMessage::ItemFailed { state: QueueState::Rejected, record_id, .. } if record_id == usage.id.to_string()
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_drains_deliver_each_item_once() {
    let fixture = TestDatabase::new().await;
    let remote = Arc::new(MockRemote::new());
    let foreground = manager(&fixture.db, remote.clone(), true);

    let mut ids = HashSet::new();
    for n in 0..20 {
        let usage = committed_usage(&fixture.db, &format!("P-{n}")).await;
        foreground.enqueue(PayloadType::PartsUsage, &usage.id.to_string()).await.unwrap();
        ids.insert(usage.id);
    }

    let agent = BackgroundSyncAgent::new(
        fixture.db.clone(),
        remote.clone(),
        ConnectivityMonitor::new(true),
        TaskScheduler::new(),
        &test_config(),
    );

    let (foreground_report, agent_report) = tokio::join!(foreground.drain(), agent.run_once());
    let foreground_report = foreground_report.unwrap();
    let agent_report = agent_report.unwrap();
    assert_eq!(foreground_report.synced + agent_report.synced, 20);

    let delivered = remote.parts();
    assert_eq!(remote.attempts(), 20);
    assert_eq!(delivered.len(), 20);
    assert_eq!(delivered.iter().map(|usage| usage.id).collect::<HashSet<_>>(), ids);
    assert_eq!(foreground.counts().await.unwrap().total(), 0);
    assert_eq!(fixture.db.count_unsynced::<fieldops::shared::PartsUsage>().await.unwrap(), 0);
}
