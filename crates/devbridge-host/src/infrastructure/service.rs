//! Long-lived host service: builds and owns every host component.
//!
//! # Wiring order (for beginners)
//!
//! The components reference each other, so they are created bottom-up:
//!
//! ```text
//! ShutdownToken ─┬─► DeviceRegistry (owns the ActiveDeviceCell)
//!                │
//! RpcBridge ─────┼─► BackendLifecycle ◄── observer of the registry
//!                │          ▲
//!                │          └── sink of the ConnectivityMonitor
//!                │
//!                └─► BridgeEnvironment (registry + monitor + bridge + platform)
//! ```
//!
//! The service, not the client, owns the lifecycle.  The [`ClientContext`]
//! returned by [`HostService::new`] can be dropped and the backend keeps
//! running until [`HostService::shutdown`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use devbridge_core::{
    BackendLauncher, Environment, LifecycleError, NativeCommunication, QueryId, RpcError,
    ShutdownToken, UriError,
};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::info;

use crate::application::active_device::ActiveDeviceCell;
use crate::application::backend_lifecycle::{BackendLifecycle, ShutdownReport, StartOutcome};
use crate::application::connectivity_monitor::{
    ConnectivityMonitor, ConnectivitySink, NetworkEvent, NetworkProbe,
};
use crate::application::device_registry::{DeviceEvent, DeviceRegistry};
use crate::application::rpc_bridge::RpcBridge;
use crate::application::usb_host::UsbHost;
use crate::infrastructure::platform::{BridgeEnvironment, PlatformServices};
use crate::infrastructure::storage::config::BridgeConfig;
use crate::infrastructure::ui_bridge::ClientContext;

/// The host-specific adapters the service is built from.
pub struct HostAdapters {
    pub usb_host: Arc<dyn UsbHost>,
    /// `None` on hosts without a connectivity service.
    pub network_probe: Option<Arc<dyn NetworkProbe>>,
    pub platform: Arc<dyn PlatformServices>,
    pub launcher: Arc<dyn BackendLauncher>,
}

pub struct HostService {
    storage_dir: PathBuf,
    config: BridgeConfig,
    shutdown: ShutdownToken,
    registry: Arc<DeviceRegistry>,
    bridge: Arc<RpcBridge>,
    lifecycle: Arc<BackendLifecycle>,
    monitor: Arc<ConnectivityMonitor>,
    environment: Arc<BridgeEnvironment>,
}

impl HostService {
    /// Wires all components.  Nothing is started until [`start`](Self::start).
    ///
    /// `runtime` runs the connectivity monitor's debounce tasks.
    pub fn new(
        storage_dir: &Path,
        config: BridgeConfig,
        adapters: HostAdapters,
        runtime: Handle,
    ) -> (Self, ClientContext) {
        let shutdown = ShutdownToken::new();
        let registry = Arc::new(DeviceRegistry::new(
            adapters.usb_host,
            config.device_filter(),
            ActiveDeviceCell::new(),
            config.transfer_timeout(),
            shutdown.clone(),
        ));
        let (bridge, events) = RpcBridge::new();
        let lifecycle = BackendLifecycle::new(
            adapters.launcher,
            Arc::clone(&bridge),
            Arc::clone(&registry),
            shutdown.clone(),
            config.deep_link_policy(),
        );
        let monitor = ConnectivityMonitor::new(
            adapters.network_probe,
            Arc::clone(&lifecycle) as Arc<dyn ConnectivitySink>,
            config.lost_debounce(),
            runtime,
        );
        let environment = Arc::new(BridgeEnvironment::new(
            adapters.platform,
            Arc::clone(&registry),
            Arc::clone(&monitor),
            Arc::clone(&bridge),
        ));

        let service = Self {
            storage_dir: storage_dir.to_path_buf(),
            config,
            shutdown,
            registry,
            bridge,
            lifecycle,
            monitor,
            environment,
        };
        (service, ClientContext::new(events))
    }

    /// Starts the backend, then selects a device and reports connectivity
    /// so the backend sees the current state right away.
    ///
    /// Calling `start` again while running is a logged no-op.
    ///
    /// # Errors
    ///
    /// See [`BackendLifecycle::start`].
    pub fn start(&self) -> Result<StartOutcome, LifecycleError> {
        let outcome = self.lifecycle.start(
            &self.storage_dir,
            Arc::clone(&self.environment) as Arc<dyn Environment>,
            Arc::clone(&self.bridge) as Arc<dyn NativeCommunication>,
        )?;
        if outcome == StartOutcome::Started {
            self.registry.select_device();
            self.monitor.register();
            self.monitor.check_connectivity();
        }
        Ok(outcome)
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    pub fn bridge(&self) -> &Arc<RpcBridge> {
        &self.bridge
    }

    pub fn lifecycle(&self) -> &Arc<BackendLifecycle> {
        &self.lifecycle
    }

    pub fn monitor(&self) -> &Arc<ConnectivityMonitor> {
        &self.monitor
    }

    pub fn shutdown_token(&self) -> ShutdownToken {
        self.shutdown.clone()
    }

    // ── Host notifications ────────────────────────────────────────────────────

    pub fn handle_device_event(&self, event: DeviceEvent) {
        self.registry.handle_event(event);
    }

    pub fn on_network_changed(&self, event: NetworkEvent) -> Option<JoinHandle<()>> {
        self.monitor.on_network_changed(event)
    }

    /// The host went to the background: stop reacting to network events.
    pub fn pause(&self) {
        self.monitor.unregister();
    }

    /// The host came back: re-register and re-check devices and network.
    pub fn resume(&self) {
        self.monitor.register();
        self.monitor.check_connectivity();
        self.registry.select_device();
    }

    // ── Client entry points ───────────────────────────────────────────────────

    /// # Errors
    ///
    /// See [`RpcBridge::call`].
    pub fn call(&self, query_id: QueryId, payload: impl Into<String>) -> Result<(), RpcError> {
        self.bridge.call(query_id, payload)
    }

    /// # Errors
    ///
    /// [`UriError`] if the deep link is rejected.
    pub fn handle_uri(&self, uri: &str) -> Result<(), UriError> {
        self.lifecycle.handle_uri(uri)
    }

    /// Stops the backend.  The service cannot be started again afterwards.
    pub fn shutdown(&self) -> ShutdownReport {
        self.monitor.unregister();
        let report = self.lifecycle.shutdown();
        if report.was_running {
            info!(abandoned = report.abandoned_queries.len(), "host service stopped");
        }
        report
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
