//! Online/metered reporting to the backend.
//!
//! The host OS tells us when the default network's capabilities change or
//! when it is lost.  The monitor turns each notification into two calls on
//! its [`ConnectivitySink`] (normally the backend lifecycle):
//!
//! 1. `using_mobile_data_changed()` so the backend re-reads the metered flag,
//! 2. `set_online(bool)` with the computed reachability.
//!
//! # Why is `Lost` delayed? (for beginners)
//!
//! A "network lost" notification can arrive while the OS is still switching
//! networks.  Sampling immediately would often see a half-torn-down network
//! and report the wrong state.  The monitor therefore waits a short, fixed
//! delay (250 ms by default) before sampling again.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use devbridge_core::{ConnectivityState, NetworkCapabilities};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Delay between a `Lost` notification and the re-check.
pub const DEFAULT_LOST_DEBOUNCE: Duration = Duration::from_millis(250);

/// Samples the host's active network.
pub trait NetworkProbe: Send + Sync {
    /// Capabilities of the active network, or `None` if there is none.
    fn active_network(&self) -> Option<NetworkCapabilities>;
}

/// Receives connectivity reports.
pub trait ConnectivitySink: Send + Sync {
    fn set_online(&self, online: bool);
    fn using_mobile_data_changed(&self);
}

/// Notification from the host's network callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkEvent {
    CapabilitiesChanged(NetworkCapabilities),
    Lost,
}

pub struct ConnectivityMonitor {
    probe: Option<Arc<dyn NetworkProbe>>,
    sink: Arc<dyn ConnectivitySink>,
    lost_debounce: Duration,
    runtime: Handle,
    registered: AtomicBool,
    last_state: Mutex<Option<ConnectivityState>>,
}

impl ConnectivityMonitor {
    /// `probe` is `None` on hosts without a connectivity service; the monitor
    /// then always reports online.
    pub fn new(
        probe: Option<Arc<dyn NetworkProbe>>,
        sink: Arc<dyn ConnectivitySink>,
        lost_debounce: Duration,
        runtime: Handle,
    ) -> Arc<Self> {
        Arc::new(Self {
            probe,
            sink,
            lost_debounce,
            runtime,
            registered: AtomicBool::new(true),
            last_state: Mutex::new(None),
        })
    }

    /// Starts reacting to network events again (host came to the foreground).
    pub fn register(&self) {
        self.registered.store(true, Ordering::SeqCst);
        debug!("network callback registered");
    }

    /// Stops reacting to network events (host went to the background).
    pub fn unregister(&self) {
        self.registered.store(false, Ordering::SeqCst);
        debug!("network callback unregistered");
    }

    pub fn is_registered(&self) -> bool {
        self.registered.load(Ordering::SeqCst)
    }

    /// The state most recently reported to the sink.
    pub fn last_state(&self) -> Option<ConnectivityState> {
        *self.last_state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Samples the active network and reports the result.
    pub fn check_connectivity(&self) -> ConnectivityState {
        match &self.probe {
            None => {
                let state = ConnectivityState { online: true, metered: false };
                self.sink.set_online(true);
                self.record(state);
                state
            }
            Some(probe) => {
                let capabilities = probe.active_network();
                self.report(capabilities.as_ref())
            }
        }
    }

    fn report(&self, capabilities: Option<&NetworkCapabilities>) -> ConnectivityState {
        self.sink.using_mobile_data_changed();
        if capabilities.is_none() {
            debug!("no active network");
        }
        let state = ConnectivityState::from_network(capabilities);
        self.sink.set_online(state.online);
        self.record(state);
        state
    }

    fn record(&self, state: ConnectivityState) {
        let previous = self
            .last_state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(state);
        if previous != Some(state) {
            info!(online = state.online, metered = state.metered, "connectivity changed");
        }
    }

    /// Handles one network notification.
    ///
    /// Returns the debounce task for `Lost`, so callers can await it.
    /// Events arriving while unregistered are ignored.
    pub fn on_network_changed(self: &Arc<Self>, event: NetworkEvent) -> Option<JoinHandle<()>> {
        if !self.is_registered() {
            debug!(?event, "network event ignored while unregistered");
            return None;
        }
        match event {
            NetworkEvent::CapabilitiesChanged(capabilities) => {
                self.report(Some(&capabilities));
                None
            }
            NetworkEvent::Lost => {
                let monitor = Arc::clone(self);
                let delay = self.lost_debounce;
                Some(self.runtime.spawn(async move {
                    tokio::time::sleep(delay).await;
                    monitor.check_connectivity();
                    monitor.sink.using_mobile_data_changed();
                }))
            }
        }
    }

    /// `true` while the active network is cellular.
    pub fn using_metered_connection(&self) -> bool {
        self.probe
            .as_ref()
            .and_then(|probe| probe.active_network())
            .map_or(false, |caps| caps.cellular)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::network::mock::MockNetworkProbe;

    #[derive(Default)]
    struct RecordingSink {
        online: Mutex<Vec<bool>>,
        metered_changes: Mutex<u32>,
    }

    impl ConnectivitySink for RecordingSink {
        fn set_online(&self, online: bool) {
            self.online.lock().unwrap().push(online);
        }
        fn using_mobile_data_changed(&self) {
            *self.metered_changes.lock().unwrap() += 1;
        }
    }

    fn monitor(
        probe: Option<Arc<MockNetworkProbe>>,
        sink: &Arc<RecordingSink>,
    ) -> Arc<ConnectivityMonitor> {
        ConnectivityMonitor::new(
            probe.map(|p| p as Arc<dyn NetworkProbe>),
            Arc::clone(sink) as Arc<dyn ConnectivitySink>,
            Duration::from_millis(20),
            Handle::current(),
        )
    }

    #[tokio::test]
    async fn test_validated_network_reports_online() {
        // Arrange
        let probe = Arc::new(MockNetworkProbe::new(Some(NetworkCapabilities::unmetered())));
        let sink = Arc::new(RecordingSink::default());
        let monitor = monitor(Some(probe), &sink);

        // Act
        let state = monitor.check_connectivity();

        // Assert
        assert!(state.online);
        assert_eq!(*sink.online.lock().unwrap(), vec![true]);
        assert_eq!(*sink.metered_changes.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unvalidated_network_reports_offline() {
        let caps = NetworkCapabilities { internet: true, validated: false, cellular: false };
        let probe = Arc::new(MockNetworkProbe::new(Some(caps)));
        let sink = Arc::new(RecordingSink::default());
        let monitor = monitor(Some(probe), &sink);

        assert!(!monitor.check_connectivity().online);
    }

    #[tokio::test]
    async fn test_no_active_network_reports_offline() {
        let probe = Arc::new(MockNetworkProbe::new(None));
        let sink = Arc::new(RecordingSink::default());
        let monitor = monitor(Some(probe), &sink);

        monitor.check_connectivity();

        assert_eq!(*sink.online.lock().unwrap(), vec![false]);
    }

    #[tokio::test]
    async fn test_missing_probe_reports_online() {
        let sink = Arc::new(RecordingSink::default());
        let monitor = monitor(None, &sink);

        let state = monitor.check_connectivity();

        assert!(state.online);
        assert_eq!(*sink.online.lock().unwrap(), vec![true]);
        assert!(!monitor.using_metered_connection());
    }

    #[tokio::test]
    async fn test_capabilities_changed_uses_supplied_capabilities() {
        // Arrange: the probe says offline, the event says online
        let probe = Arc::new(MockNetworkProbe::new(None));
        let sink = Arc::new(RecordingSink::default());
        let monitor = monitor(Some(probe), &sink);

        // Act
        let task = monitor.on_network_changed(NetworkEvent::CapabilitiesChanged(
            NetworkCapabilities::cellular(),
        ));

        // Assert
        assert!(task.is_none());
        assert_eq!(*sink.online.lock().unwrap(), vec![true]);
        assert_eq!(monitor.last_state(), Some(ConnectivityState { online: true, metered: true }));
    }

    #[tokio::test]
    async fn test_lost_is_debounced_before_recheck() {
        // Arrange
        let probe = Arc::new(MockNetworkProbe::new(Some(NetworkCapabilities::unmetered())));
        let sink = Arc::new(RecordingSink::default());
        let monitor = monitor(Some(Arc::clone(&probe)), &sink);

        // Act
        let task = monitor.on_network_changed(NetworkEvent::Lost).unwrap();
        assert!(sink.online.lock().unwrap().is_empty());
        probe.set_active_network(None);
        task.await.unwrap();

        // Assert: the sample taken after the delay sees the final state
        assert_eq!(*sink.online.lock().unwrap(), vec![false]);
        assert_eq!(*sink.metered_changes.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_events_ignored_while_unregistered() {
        let probe = Arc::new(MockNetworkProbe::new(Some(NetworkCapabilities::unmetered())));
        let sink = Arc::new(RecordingSink::default());
        let monitor = monitor(Some(probe), &sink);

        monitor.unregister();
        let task = monitor.on_network_changed(NetworkEvent::Lost);

        assert!(task.is_none());
        assert!(sink.online.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_metered_connection_follows_cellular_transport() {
        let probe = Arc::new(MockNetworkProbe::new(Some(NetworkCapabilities::cellular())));
        let sink = Arc::new(RecordingSink::default());
        let monitor = monitor(Some(Arc::clone(&probe)), &sink);

        assert!(monitor.using_metered_connection());
        probe.set_active_network(Some(NetworkCapabilities::unmetered()));
        assert!(!monitor.using_metered_connection());
    }
}
