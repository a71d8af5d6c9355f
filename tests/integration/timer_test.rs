//! Time tracking end to end

use crate::common::*;
use chrono::Utc;
use fieldops::client::timer::{ManualClock, TimeTracker, TimerState};
use fieldops::shared::{BreakKind, TimeAction, TimeLog};
use fieldops::client::local_db::IndexQuery;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

#[tokio::test]
async fn test_work_and_break_are_logged_and_delivered() {
    let fixture = TestDatabase::new().await;
    let remote = Arc::new(MockRemote::new());
    let sync = manager(&fixture.db, remote.clone(), false);
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let tracker = TimeTracker::new(fixture.db.clone(), sync.clone(), clock.clone());

    assert_ok!(tracker.start("JOB-1").await);
    clock.advance_secs(10);
    tracker.start_break(BreakKind::Lunch, None).await.unwrap();
    clock.advance_secs(5);
    tracker.end_break().await.unwrap();
    let stop = tracker.stop().await.unwrap();

    assert_eq!(stop.elapsed_secs, 15);
    assert_eq!(stop.break_secs, 5);
    assert_eq!(stop.work_secs, 10);
    assert_eq!(tracker.state().await, TimerState::Stopped);
    assert_eq!(sync.counts().await.unwrap().pending, 4);

    sync.connectivity().report_platform(true);
    assert_eq!(sync.drain().await.unwrap().synced, 4);

    let actions: Vec<TimeAction> = remote.time_logs().iter().map(|log| log.action).collect();
    assert_eq!(
        actions,
        vec![TimeAction::Start, TimeAction::BreakStart, TimeAction::BreakEnd, TimeAction::Stop]
    );

    let stored: Vec<TimeLog> = fixture.db.get_all(IndexQuery::ByJob("JOB-1".into())).await.unwrap();
    assert!(stored.iter().all(|log| log.synced && log.server_timestamp.is_some()));
}

#[tokio::test]
async fn test_running_timer_survives_restart() {
    let fixture = TestDatabase::new().await;
    let remote = Arc::new(MockRemote::new());
    let clock = Arc::new(ManualClock::new(Utc::now()));

    let tracker = TimeTracker::new(fixture.db.clone(), manager(&fixture.db, remote.clone(), false), clock.clone());
    tracker.start("JOB-1").await.unwrap();
    clock.advance_secs(30);
    tracker.start_break(BreakKind::Rest, Some("coffee".into())).await.unwrap();
    clock.advance_secs(60);
    drop(tracker);

    let restarted = TimeTracker::new(fixture.db.clone(), manager(&fixture.db, remote, false), clock.clone());
    assert_eq!(restarted.restore().await.unwrap(), TimerState::OnBreak);

    let snapshot = restarted.snapshot().await;
    assert_eq!(snapshot.elapsed_secs, 90);
    assert_eq!(snapshot.break_secs, 60);
    assert_eq!(snapshot.work_secs, 30);

    restarted.end_break().await.unwrap();
    assert_eq!(restarted.state().await, TimerState::Running);
}

#[tokio::test]
async fn test_manual_entry_needs_reason() {
    let fixture = TestDatabase::new().await;
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let tracker = TimeTracker::new(
        fixture.db.clone(),
        manager(&fixture.db, Arc::new(MockRemote::new()), false),
        clock,
    );

    assert_err!(tracker.manual_entry(Duration::from_secs(1800), "  ", Some("JOB-1")).await);

    let log = tracker
        .manual_entry(Duration::from_secs(1800), "forgot to start timer", Some("JOB-1"))
        .await
        .unwrap();
    assert_eq!(log.action, TimeAction::ManualEntry);
    assert_eq!(log.work_secs, 1800);
    assert_eq!(log.reason.as_deref(), Some("forgot to start timer"));
}
