//! Integration tests for the backend lifecycle.
//!
//! A `mockall` backend verifies which entry points reach the backend and how
//! often; the loopback launcher covers racing `start` calls.

use std::path::PathBuf;
use std::sync::{Arc, Barrier, Mutex};
use std::thread;

use devbridge_core::{
    ApiQuery, Backend, BackendError, BackendLauncher, DeviceFilter, LifecycleError,
    NativeCommunication, QueryId, ShutdownToken, StartContext,
};
use devbridge_host::application::active_device::ActiveDeviceCell;
use devbridge_host::application::backend_lifecycle::{BackendLifecycle, StartOutcome};
use devbridge_host::application::deep_link::DeepLinkPolicy;
use devbridge_host::application::device_registry::{DeviceEvent, DeviceRegistry};
use devbridge_host::application::rpc_bridge::{ClientEvent, RpcBridge};
use devbridge_host::application::transport::DEFAULT_TRANSFER_TIMEOUT;
use devbridge_host::application::usb_host::UsbHost;
use devbridge_host::infrastructure::backend::loopback::LoopbackLauncher;
use devbridge_host::infrastructure::platform::mock::MockEnvironment;
use devbridge_host::infrastructure::usb::mock::{supported_descriptor, MockUsbHost};
use mockall::mock;
use tokio::sync::mpsc::UnboundedReceiver;

mock! {
    pub Wallet {}

    impl Backend for Wallet {
        fn handle_call(&self, query_id: QueryId, query: ApiQuery);
        fn handle_uri(&self, uri: &str);
        fn trigger_auth(&self);
        fn cancel_auth(&self);
        fn auth_result(&self, ok: bool);
        fn usb_update(&self);
        fn set_online(&self, online: bool);
        fn using_mobile_data_changed(&self);
        fn manual_reconnect(&self);
        fn close(&self) -> Result<(), BackendError>;
    }
}

/// Hands out one prepared backend.
struct PreparedLauncher {
    backend: Mutex<Option<Arc<dyn Backend>>>,
}

impl PreparedLauncher {
    fn new(backend: MockWallet) -> Self {
        Self { backend: Mutex::new(Some(Arc::new(backend))) }
    }
}

impl BackendLauncher for PreparedLauncher {
    fn launch(&self, _context: StartContext) -> Result<Arc<dyn Backend>, LifecycleError> {
        self.backend
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| LifecycleError::LaunchFailed("already launched".to_string()))
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

struct Fixture {
    lifecycle: Arc<BackendLifecycle>,
    bridge: Arc<RpcBridge>,
    registry: Arc<DeviceRegistry>,
    host: Arc<MockUsbHost>,
    events: UnboundedReceiver<ClientEvent>,
}

fn fixture(launcher: Arc<dyn BackendLauncher>) -> Fixture {
    let host = Arc::new(MockUsbHost::new());
    let shutdown = ShutdownToken::new();
    let registry = Arc::new(DeviceRegistry::new(
        Arc::clone(&host) as Arc<dyn UsbHost>,
        DeviceFilter::default(),
        ActiveDeviceCell::new(),
        DEFAULT_TRANSFER_TIMEOUT,
        shutdown.clone(),
    ));
    let (bridge, events) = RpcBridge::new();
    let lifecycle = BackendLifecycle::new(
        launcher,
        Arc::clone(&bridge),
        Arc::clone(&registry),
        shutdown,
        DeepLinkPolicy::default(),
    );
    Fixture { lifecycle, bridge, registry, host, events }
}

fn start(f: &Fixture) -> Result<StartOutcome, LifecycleError> {
    f.lifecycle.start(
        &PathBuf::from("/tmp/devbridge-lifecycle"),
        Arc::new(MockEnvironment::default()),
        Arc::clone(&f.bridge) as Arc<dyn NativeCommunication>,
    )
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[test]
fn test_concurrent_start_launches_exactly_one_backend() {
    // Arrange
    let launcher = Arc::new(LoopbackLauncher::new());
    let f = Arc::new(fixture(Arc::clone(&launcher) as Arc<dyn BackendLauncher>));
    let barrier = Arc::new(Barrier::new(2));

    // Act
    let outcomes: Vec<StartOutcome> = (0..2)
        .map(|_| {
            let f = Arc::clone(&f);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                start(&f).unwrap()
            })
        })
        .collect::<Vec<_>>()
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .collect();

    // Assert
    assert_eq!(launcher.launch_count(), 1);
    assert!(outcomes.contains(&StartOutcome::Started));
    assert!(outcomes.contains(&StartOutcome::AlreadyRunning));
}

#[test]
fn test_active_device_change_reaches_backend() {
    // Arrange
    let mut wallet = MockWallet::new();
    wallet.expect_usb_update().times(1).return_const(());
    wallet.expect_close().times(1).returning(|| Ok(()));
    let f = fixture(Arc::new(PreparedLauncher::new(wallet)));
    start(&f).unwrap();

    // Act
    f.host.attach(supported_descriptor("wallet"), true);
    f.registry.handle_event(DeviceEvent::Attached { device_id: "wallet".into() });

    // Assert (expectations are checked when the mock drops)
    let report = f.lifecycle.shutdown();
    assert_eq!(report.released_device.as_deref(), Some("wallet"));
}

#[test]
fn test_rejected_deep_link_never_reaches_backend() {
    // Arrange
    let mut wallet = MockWallet::new();
    wallet
        .expect_handle_uri()
        .withf(|uri| uri == "bitcoin:bc1qexample?amount=1")
        .times(1)
        .return_const(());
    wallet.expect_close().returning(|| Ok(()));
    let f = fixture(Arc::new(PreparedLauncher::new(wallet)));
    start(&f).unwrap();

    // Act
    let rejected = f.lifecycle.handle_uri("file:///etc/passwd");
    let accepted = f.lifecycle.handle_uri("bitcoin:bc1qexample?amount=1");

    // Assert
    assert!(rejected.is_err());
    assert!(accepted.is_ok());
    f.lifecycle.shutdown();
}

#[test]
fn test_auth_result_closes_prompt() {
    // Arrange
    let mut wallet = MockWallet::new();
    wallet.expect_auth_result().withf(|ok| *ok).times(1).return_const(());
    wallet.expect_close().returning(|| Ok(()));
    let mut f = fixture(Arc::new(PreparedLauncher::new(wallet)));
    start(&f).unwrap();

    // Act
    f.lifecycle.auth_result(true);

    // Assert
    assert_eq!(f.events.try_recv().unwrap(), ClientEvent::AuthClosed);
    f.lifecycle.shutdown();
}

#[test]
fn test_shutdown_reports_abandoned_queries_and_close_failure() {
    // Arrange
    let mut wallet = MockWallet::new();
    wallet.expect_handle_call().return_const(());
    wallet
        .expect_close()
        .times(1)
        .returning(|| Err(BackendError::CloseFailed("database busy".to_string())));
    let mut f = fixture(Arc::new(PreparedLauncher::new(wallet)));
    start(&f).unwrap();
    f.bridge.call(3, r#"{"method":"GET","endpoint":"accounts"}"#).unwrap();
    f.bridge.call(1, r#"{"method":"GET","endpoint":"config"}"#).unwrap();

    // Act
    let report = f.lifecycle.shutdown();
    f.bridge.respond(1, "\"late\"".to_string());

    // Assert
    assert!(report.was_running);
    assert_eq!(report.abandoned_queries, vec![1, 3]);
    assert_eq!(report.backend_close_error, Some(BackendError::CloseFailed("database busy".into())));
    assert!(f.events.try_recv().is_err());
}

#[test]
fn test_entry_points_after_shutdown_do_not_reach_backend() {
    // Arrange: only `close` is expected; any other call would panic.
    let mut wallet = MockWallet::new();
    wallet.expect_close().times(1).returning(|| Ok(()));
    let f = fixture(Arc::new(PreparedLauncher::new(wallet)));
    start(&f).unwrap();
    f.lifecycle.shutdown();

    // Act
    f.lifecycle.usb_update();
    f.lifecycle.set_online(false);
    f.lifecycle.trigger_auth();
    f.lifecycle.manual_reconnect();

    // Assert
    assert!(f.lifecycle.is_shut_down());
    assert_eq!(start(&f), Err(LifecycleError::ShutDown));
}
