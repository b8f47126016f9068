//! Start-once, entry-point forwarding and shutdown of the backend.
//!
//! The lifecycle is owned by the long-lived host service, not by the client
//! context, so the backend keeps running while the client is detached.
//!
//! ```text
//!   Idle ──start──► Running ──shutdown──► ShutDown
//!    │                 │ ▲                  │
//!    │ shutdown: no-op │ └─ start: logged,  └─ start: LifecycleError::ShutDown
//!                      │    returns Ok
//! ```
//!
//! The phase mutex is held across the launch itself, so two racing `start`
//! calls produce exactly one backend.  Entry points (`trigger_auth`,
//! `usb_update`, …) clone the backend handle under the lock and call it
//! after releasing it; while no backend is running they are logged no-ops.

use std::mem;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use devbridge_core::{
    Backend, BackendError, BackendLauncher, Environment, LifecycleError, NativeCommunication,
    QueryId, ShutdownToken, StartContext, UriError,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::connectivity_monitor::ConnectivitySink;
use super::deep_link::DeepLinkPolicy;
use super::device_registry::{DeviceObserver, DeviceRegistry};
use super::rpc_bridge::{ClientEvent, RpcBridge};

/// What a successful `start` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    /// A backend was already running; nothing changed.
    AlreadyRunning,
}

/// Summary of a shutdown.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// `false` if there was nothing to shut down.
    pub was_running: bool,
    /// Calls that never received a response, in ascending order.
    pub abandoned_queries: Vec<QueryId>,
    /// The device that was active when shutdown began.
    pub released_device: Option<String>,
    pub backend_close_error: Option<BackendError>,
}

enum Phase {
    Idle,
    Running(Arc<dyn Backend>),
    ShutDown,
}

pub struct BackendLifecycle {
    launcher: Arc<dyn BackendLauncher>,
    bridge: Arc<RpcBridge>,
    registry: Arc<DeviceRegistry>,
    shutdown: ShutdownToken,
    deep_links: DeepLinkPolicy,
    phase: Mutex<Phase>,
}

impl BackendLifecycle {
    /// Creates the lifecycle and registers it as the registry's observer.
    pub fn new(
        launcher: Arc<dyn BackendLauncher>,
        bridge: Arc<RpcBridge>,
        registry: Arc<DeviceRegistry>,
        shutdown: ShutdownToken,
        deep_links: DeepLinkPolicy,
    ) -> Arc<Self> {
        let lifecycle = Arc::new(Self {
            launcher,
            bridge,
            registry: Arc::clone(&registry),
            shutdown,
            deep_links,
            phase: Mutex::new(Phase::Idle),
        });
        let observer: Weak<dyn DeviceObserver> =
            Arc::downgrade(&(Arc::clone(&lifecycle) as Arc<dyn DeviceObserver>));
        registry.set_observer(observer);
        lifecycle
    }

    fn lock_phase(&self) -> MutexGuard<'_, Phase> {
        self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts the backend unless one is already running.
    ///
    /// # Errors
    ///
    /// - [`LifecycleError::ShutDown`] after [`shutdown`](Self::shutdown).
    /// - [`LifecycleError::LaunchFailed`] if the launcher fails.  The
    ///   lifecycle stays idle and a later `start` may retry.
    pub fn start(
        &self,
        storage_path: &Path,
        environment: Arc<dyn Environment>,
        communication: Arc<dyn NativeCommunication>,
    ) -> Result<StartOutcome, LifecycleError> {
        let mut phase = self.lock_phase();
        match &*phase {
            Phase::Running(_) => {
                info!("{}; ignoring start", LifecycleError::AlreadyStarted);
                return Ok(StartOutcome::AlreadyRunning);
            }
            Phase::ShutDown => return Err(LifecycleError::ShutDown),
            Phase::Idle => {}
        }

        let context = StartContext {
            storage_path: storage_path.to_path_buf(),
            session_token: Uuid::new_v4().simple().to_string(),
            environment,
            communication,
            shutdown: self.shutdown.clone(),
        };
        let backend = self.launcher.launch(context)?;
        self.bridge.attach_backend(Arc::clone(&backend));
        *phase = Phase::Running(backend);

        info!(storage = %storage_path.display(), "backend started");
        Ok(StartOutcome::Started)
    }

    pub fn is_running(&self) -> bool {
        matches!(*self.lock_phase(), Phase::Running(_))
    }

    pub fn is_shut_down(&self) -> bool {
        matches!(*self.lock_phase(), Phase::ShutDown)
    }

    fn backend(&self) -> Option<Arc<dyn Backend>> {
        match &*self.lock_phase() {
            Phase::Running(backend) => Some(Arc::clone(backend)),
            _ => None,
        }
    }

    fn with_backend(&self, entry_point: &str, f: impl FnOnce(&dyn Backend)) {
        match self.backend() {
            Some(backend) => f(backend.as_ref()),
            None => debug!(entry_point, "backend not running; ignoring"),
        }
    }

    // ── Entry points ──────────────────────────────────────────────────────────

    pub fn trigger_auth(&self) {
        self.with_backend("trigger_auth", |b| b.trigger_auth());
    }

    pub fn cancel_auth(&self) {
        self.with_backend("cancel_auth", |b| b.cancel_auth());
        self.bridge.post(ClientEvent::AuthClosed);
    }

    pub fn auth_result(&self, ok: bool) {
        self.with_backend("auth_result", |b| b.auth_result(ok));
        self.bridge.post(ClientEvent::AuthClosed);
    }

    /// Forwards a deep link that passes the scheme allow-list.
    ///
    /// # Errors
    ///
    /// [`UriError`] if the URI is malformed or its scheme is not allowed.
    /// Validation happens even while the backend is not running.
    pub fn handle_uri(&self, uri: &str) -> Result<(), UriError> {
        let scheme = self.deep_links.check(uri).map_err(|e| {
            warn!(error = %e, "rejected deep link");
            e
        })?;
        debug!(scheme, "forwarding deep link");
        self.with_backend("handle_uri", |b| b.handle_uri(uri));
        Ok(())
    }

    /// The metered status of the network may have changed.
    pub fn connectivity_changed(&self) {
        self.with_backend("using_mobile_data_changed", |b| b.using_mobile_data_changed());
    }

    pub fn set_online(&self, online: bool) {
        self.with_backend("set_online", |b| b.set_online(online));
    }

    pub fn usb_update(&self) {
        self.with_backend("usb_update", |b| b.usb_update());
    }

    pub fn manual_reconnect(&self) {
        self.with_backend("manual_reconnect", |b| b.manual_reconnect());
    }

    // ── Shutdown ──────────────────────────────────────────────────────────────

    /// Stops the backend for good.
    ///
    /// In order: cancels the shared token, releases the active device (which
    /// closes its transports), closes the bridge, then closes the backend.
    /// A no-op if the backend never started or is already shut down.
    pub fn shutdown(&self) -> ShutdownReport {
        let backend = {
            let mut phase = self.lock_phase();
            match mem::replace(&mut *phase, Phase::ShutDown) {
                Phase::Running(backend) => backend,
                Phase::Idle => {
                    *phase = Phase::Idle;
                    debug!("shutdown before start; nothing to do");
                    return ShutdownReport::default();
                }
                Phase::ShutDown => {
                    debug!("already shut down");
                    return ShutdownReport::default();
                }
            }
        };

        self.shutdown.cancel();
        let released_device = self.registry.release_active().map(|d| d.identifier().to_string());
        let abandoned_queries = self.bridge.close();
        if !abandoned_queries.is_empty() {
            warn!(?abandoned_queries, "abandoning outstanding queries");
        }

        let backend_close_error = backend.close().err();
        if let Some(e) = &backend_close_error {
            warn!(error = %e, "backend close failed");
        }

        info!("backend shut down");
        ShutdownReport { was_running: true, abandoned_queries, released_device, backend_close_error }
    }
}

impl DeviceObserver for BackendLifecycle {
    fn active_device_changed(&self) {
        self.usb_update();
    }
}

impl ConnectivitySink for BackendLifecycle {
    fn set_online(&self, online: bool) {
        BackendLifecycle::set_online(self, online);
    }

    fn using_mobile_data_changed(&self) {
        self.connectivity_changed();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
