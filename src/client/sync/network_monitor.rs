//! # Network Monitor
//!
//! Tracks whether the server is reachable. Two signals feed it:
//!
//! - **Platform reports**: the OS or shell saying the link is up or down
//! - **Heartbeat probe**: a periodic `ping` to the server, bounded by a
//!   timeout; a failing probe overrides a platform "online" (captive portals,
//!   dead upstream)
//!
//! Transitions are published as [`ConnectivityEvent`]s; repeated reports of
//! the same state publish nothing.

use crate::client::remote::RemoteApi;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkStatus {
    Online,
    /// Link is up but the server does not answer
    Limited,
    Offline,
}

impl NetworkStatus {
    pub fn is_online(&self) -> bool {
        *self == NetworkStatus::Online
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityEvent {
    WentOnline,
    WentOffline,
}

#[derive(Debug)]
struct Signals {
    platform_online: bool,
    probe_ok: bool,
}

impl Signals {
    fn status(&self) -> NetworkStatus {
        match (self.platform_online, self.probe_ok) {
            (false, _) => NetworkStatus::Offline,
            (true, false) => NetworkStatus::Limited,
            (true, true) => NetworkStatus::Online,
        }
    }
}

#[derive(Debug)]
struct Inner {
    signals: Mutex<Signals>,
    status: watch::Sender<NetworkStatus>,
    events: broadcast::Sender<ConnectivityEvent>,
}

/// Shared connectivity state. Clones observe the same state.
#[derive(Debug, Clone)]
pub struct ConnectivityMonitor {
    inner: Arc<Inner>,
}

impl ConnectivityMonitor {
    pub fn new(initially_online: bool) -> Self {
        let signals = Signals {
            platform_online: initially_online,
            probe_ok: true,
        };
        let (status, _) = watch::channel(signals.status());
        let (events, _) = broadcast::channel(16);
        Self {
            inner: Arc::new(Inner {
                signals: Mutex::new(signals),
                status,
                events,
            }),
        }
    }

    pub fn status(&self) -> NetworkStatus {
        *self.inner.status.borrow()
    }

    pub fn is_online(&self) -> bool {
        self.status().is_online()
    }

    /// Receive online/offline transitions
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectivityEvent> {
        self.inner.events.subscribe()
    }

    /// Observe the current status
    pub fn watch(&self) -> watch::Receiver<NetworkStatus> {
        self.inner.status.subscribe()
    }

    /// Platform link state changed
    pub fn report_platform(&self, online: bool) {
        self.update(|signals| {
            signals.platform_online = online;
            // A fresh link gets the benefit of the doubt until the next probe.
            if online {
                signals.probe_ok = true;
            }
        });
    }

    /// Result of a reachability probe
    pub fn report_probe(&self, reachable: bool) {
        self.update(|signals| signals.probe_ok = reachable);
    }

    fn update(&self, change: impl FnOnce(&mut Signals)) {
        let mut signals = self
            .inner
            .signals
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let was_online = signals.status().is_online();
        change(&mut signals);
        let status = signals.status();
        self.inner.status.send_replace(status);

        let event = match (was_online, status.is_online()) {
            (false, true) => Some(ConnectivityEvent::WentOnline),
            (true, false) => Some(ConnectivityEvent::WentOffline),
            _ => None,
        };
        drop(signals);

        if let Some(event) = event {
            tracing::info!(?status, ?event, "connectivity changed");
            // No receivers is fine.
            let _ = self.inner.events.send(event);
        }
    }

    /// Probe the server every `interval` until the returned task is aborted.
    ///
    /// Probes are skipped while the platform reports no link.
    pub fn spawn_heartbeat(
        &self,
        remote: Arc<dyn RemoteApi>,
        interval: Duration,
        timeout: Duration,
    ) -> JoinHandle<()> {
        let monitor = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if monitor.status() == NetworkStatus::Offline {
                    continue;
                }
                let reachable = matches!(tokio::time::timeout(timeout, remote.ping()).await, Ok(Ok(())));
                if !reachable {
                    tracing::debug!("heartbeat probe failed");
                }
                monitor.report_probe(reachable);
            }
        })
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new(true)
    }
}
