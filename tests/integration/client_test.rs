//! The assembled client

use crate::common::*;
use fieldops::client::sync::NetworkStatus;
use fieldops::client::{Config, Devices, FieldClient};
use fieldops::shared::AppConfig;
use std::sync::Arc;
use std::time::Duration;

async fn client(remote: Arc<MockRemote>, dir: &std::path::Path) -> FieldClient {
    let config = Config::with_builder(
        AppConfig::builder()
            .data_dir(dir)
            .retry(Duration::ZERO, 3)
            .heartbeat(Duration::from_secs(60), Duration::from_secs(1)),
    )
    .unwrap();
    FieldClient::start_with_remote(config, remote, Devices::default()).await.unwrap()
}

#[tokio::test]
async fn test_client_delivers_timer_events() {
    let dir = tempfile::tempdir().unwrap();
    let remote = Arc::new(MockRemote::new());
    let client = client(remote.clone(), dir.path()).await;

    client.timer().start("JOB-1").await.unwrap();

    let delivered = eventually(|| {
        let remote = remote.clone();
        async move { remote.time_logs().len() == 1 }
    })
    .await;
    assert!(delivered);
    let state = client.sync_state().await.unwrap();
    assert!(state.durable);
    assert_eq!(state.network_status, NetworkStatus::Online);
    assert!(dir.path().join("field.db").exists());
    client.shutdown();
}

#[tokio::test]
async fn test_offline_work_syncs_after_reconnect() {
    let dir = tempfile::tempdir().unwrap();
    let remote = Arc::new(MockRemote::new());
    let client = client(remote.clone(), dir.path()).await;

    client.connectivity().report_platform(false);
    client.parts().record_usage("JOB-1", "123456", 1.0, None).await.unwrap();
    assert_eq!(client.sync_state().await.unwrap().unsynced(), 1);

    client.connectivity().report_platform(true);
    let delivered = eventually(|| {
        let remote = remote.clone();
        async move { remote.parts().len() == 1 }
    })
    .await;
    assert!(delivered);

    let db = client.database().clone();
    let synced = eventually(|| {
        let db = db.clone();
        async move { db.queue_counts().await.unwrap().total() == 0 }
    })
    .await;
    assert!(synced);
    assert_eq!(remote.parts().len(), 1);
    client.shutdown();
}

#[tokio::test]
async fn test_timer_restored_by_new_client() {
    let dir = tempfile::tempdir().unwrap();
    let remote = Arc::new(MockRemote::new());

    let first = client(remote.clone(), dir.path()).await;
    first.timer().start("JOB-1").await.unwrap();
    first.shutdown();
    first.database().close().await;
    drop(first);

    let second = client(remote, dir.path()).await;
    assert_eq!(second.timer().state().await, fieldops::client::timer::TimerState::Running);
    second.shutdown();
}
