//! # Sync
//!
//! Connectivity tracking and the background side of delivery.
//!
//! ## Architecture
//!
//! - **Network Monitor**: platform link reports plus a heartbeat probe
//! - **Background Agent**: drains the queue on its own task when the
//!   scheduler says so
//! - **Sync State**: snapshot for the UI
//! - **Metrics**: counters for agent runs
//!
//! The foreground path (submit, manual retry) lives in `client::offline`.

pub mod background;
pub mod metrics;
pub mod network_monitor;
pub mod sync_state;

pub use background::{AgentMessage, BackgroundSyncAgent, TaskScheduler, SYNC_TAG};
pub use metrics::SyncMetrics;
pub use network_monitor::{ConnectivityEvent, ConnectivityMonitor, NetworkStatus};
pub use sync_state::SyncState;
