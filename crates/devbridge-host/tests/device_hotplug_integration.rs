//! Integration tests for device selection, the permission handshake and
//! hot-plug handling.
//!
//! The registry, the active-device cell and the transport are exercised
//! together through the in-memory USB host.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Weak};
use std::thread;
use std::time::Duration;

use devbridge_core::{DeviceDescriptor, DeviceFilter, ShutdownToken, TransportError};
use devbridge_host::application::active_device::ActiveDeviceCell;
use devbridge_host::application::device_registry::{
    DeviceEvent, DeviceObserver, DeviceRegistry, RegistryState,
};
use devbridge_host::application::transport::DEFAULT_TRANSFER_TIMEOUT;
use devbridge_host::application::usb_host::{UsbConnection, UsbHost};
use devbridge_host::infrastructure::usb::mock::{
    foreign_descriptor, supported_descriptor, MockUsbHost,
};

// ── Helpers ───────────────────────────────────────────────────────────────────

#[derive(Default)]
struct ChangeCounter(AtomicUsize);

impl DeviceObserver for ChangeCounter {
    fn active_device_changed(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

impl ChangeCounter {
    fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

struct Fixture {
    host: Arc<MockUsbHost>,
    cell: ActiveDeviceCell,
    registry: DeviceRegistry,
    changes: Arc<ChangeCounter>,
}

fn fixture() -> Fixture {
    let host = Arc::new(MockUsbHost::new());
    let cell = ActiveDeviceCell::new();
    let registry = DeviceRegistry::new(
        Arc::clone(&host) as Arc<dyn UsbHost>,
        DeviceFilter::default(),
        cell.clone(),
        DEFAULT_TRANSFER_TIMEOUT,
        ShutdownToken::new(),
    );
    let changes = Arc::new(ChangeCounter::default());
    let observer: Weak<dyn DeviceObserver> =
        Arc::downgrade(&(Arc::clone(&changes) as Arc<dyn DeviceObserver>));
    registry.set_observer(observer);
    Fixture { host, cell, registry, changes }
}

/// Wraps the in-memory host so one `devices()` call can be held open after
/// taking its snapshot.
struct GatedUsbHost {
    inner: Arc<MockUsbHost>,
    armed: AtomicBool,
    paused: Barrier,
    resume: Barrier,
}

impl GatedUsbHost {
    fn new(inner: Arc<MockUsbHost>) -> Self {
        Self { inner, armed: AtomicBool::new(false), paused: Barrier::new(2), resume: Barrier::new(2) }
    }

    /// Holds the next enumeration until the test passes `resume`.
    fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }
}

impl UsbHost for GatedUsbHost {
    fn devices(&self) -> Vec<DeviceDescriptor> {
        let snapshot = self.inner.devices();
        if self.armed.swap(false, Ordering::SeqCst) {
            self.paused.wait();
            self.resume.wait();
        }
        snapshot
    }

    fn has_permission(&self, identifier: &str) -> bool {
        self.inner.has_permission(identifier)
    }

    fn request_permission(&self, identifier: &str) {
        self.inner.request_permission(identifier);
    }

    fn open_device(&self, identifier: &str) -> Result<Arc<dyn UsbConnection>, TransportError> {
        self.inner.open_device(identifier)
    }
}

struct GatedFixture {
    host: Arc<MockUsbHost>,
    gate: Arc<GatedUsbHost>,
    cell: ActiveDeviceCell,
    registry: Arc<DeviceRegistry>,
}

fn gated_fixture() -> GatedFixture {
    let host = Arc::new(MockUsbHost::new());
    let gate = Arc::new(GatedUsbHost::new(Arc::clone(&host)));
    let cell = ActiveDeviceCell::new();
    let registry = Arc::new(DeviceRegistry::new(
        Arc::clone(&gate) as Arc<dyn UsbHost>,
        DeviceFilter::default(),
        cell.clone(),
        DEFAULT_TRANSFER_TIMEOUT,
        ShutdownToken::new(),
    ));
    GatedFixture { host, gate, cell, registry }
}

/// Runs `event` on a worker, detaches `device_id` after the worker has taken
/// its device snapshot, and delivers the detach from a second worker.
fn detach_during_enumeration(f: &GatedFixture, event: DeviceEvent, device_id: &str) {
    f.gate.arm();
    let registry = Arc::clone(&f.registry);
    let racing = thread::spawn(move || registry.handle_event(event));
    f.gate.paused.wait();

    f.host.detach(device_id);
    let registry = Arc::clone(&f.registry);
    let detached = DeviceEvent::Detached { device_id: device_id.to_string() };
    let detach = thread::spawn(move || registry.handle_event(detached));
    thread::sleep(Duration::from_millis(50));

    f.gate.resume.wait();
    racing.join().unwrap();
    detach.join().unwrap();
}

fn active(id: &str) -> RegistryState {
    RegistryState::Active { device_id: id.to_string() }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[test]
fn test_swap_devices_closes_old_transport_exactly_once() {
    // Arrange
    let f = fixture();
    f.host.attach(supported_descriptor("old"), true);
    f.registry.select_device();
    let info = f.registry.device_info().expect("old device active");
    let transport = info.open().expect("transport opens");
    let old_connection = f.host.connection("old").unwrap();

    // Act
    f.host.detach("old");
    f.registry.handle_event(DeviceEvent::Detached { device_id: "old".into() });
    f.host.attach(supported_descriptor("new"), true);
    f.registry.handle_event(DeviceEvent::Attached { device_id: "new".into() });

    // Assert
    assert_eq!(f.registry.state(), active("new"));
    assert_eq!(old_connection.close_count(), 1);
    assert!(matches!(transport.read(64), Err(TransportError::Closed { .. })));
    transport.close().expect("close after detach is a no-op");
    drop(transport);
    assert_eq!(old_connection.close_count(), 1);
}

#[test]
fn test_stale_handle_cannot_open_after_swap() {
    // Arrange
    let f = fixture();
    f.host.attach(supported_descriptor("old"), true);
    f.registry.select_device();
    let stale = f.registry.device_info().unwrap();

    // Act
    f.host.detach("old");
    f.registry.handle_event(DeviceEvent::Detached { device_id: "old".into() });
    f.host.attach(supported_descriptor("new"), true);
    f.registry.handle_event(DeviceEvent::Attached { device_id: "new".into() });
    let result = stale.open();

    // Assert
    assert!(matches!(result, Err(TransportError::DeviceNotActive { .. })));
    assert_eq!(f.registry.device_info().unwrap().identifier(), "new");
}

#[test]
fn test_foreign_devices_never_request_permission() {
    let f = fixture();
    f.host.attach(foreign_descriptor("mouse"), false);

    f.registry.handle_event(DeviceEvent::Attached { device_id: "mouse".into() });
    f.registry.handle_event(DeviceEvent::PermissionResult {
        device_id: "mouse".into(),
        granted: true,
    });

    assert!(f.host.permission_requests().is_empty());
    assert_eq!(f.registry.state(), RegistryState::NoDevice);
    assert!(f.cell.current().is_none());
}

#[test]
fn test_consent_flow_activates_device_once_granted() {
    // Arrange
    let f = fixture();
    f.host.attach(supported_descriptor("wallet"), false);

    // Act: attach, user is prompted, user grants
    f.registry.handle_event(DeviceEvent::Attached { device_id: "wallet".into() });
    let pending = f.registry.state();
    f.registry.select_device();
    f.host.set_permission("wallet", true);
    f.registry.handle_event(DeviceEvent::PermissionResult {
        device_id: "wallet".into(),
        granted: true,
    });

    // Assert
    assert_eq!(pending, RegistryState::PermissionRequested { device_id: "wallet".into() });
    assert_eq!(f.host.permission_requests(), vec!["wallet".to_string()]);
    assert_eq!(f.registry.state(), active("wallet"));
    assert_eq!(f.changes.count(), 1);
    assert!(f.registry.device_info().unwrap().open().is_ok());
}

#[test]
fn test_denied_permission_leaves_no_device() {
    let f = fixture();
    f.host.attach(supported_descriptor("wallet"), false);
    f.registry.select_device();

    f.registry.handle_event(DeviceEvent::PermissionResult {
        device_id: "wallet".into(),
        granted: false,
    });

    assert_eq!(f.registry.state(), RegistryState::NoDevice);
    assert!(f.registry.device_info().is_none());
    assert_eq!(f.changes.count(), 0);
}

#[test]
fn test_at_most_one_device_is_active() {
    // Arrange
    let f = fixture();
    f.host.attach(supported_descriptor("first"), true);
    f.host.attach(supported_descriptor("second"), true);

    // Act
    f.registry.select_device();
    let first = f.cell.current().map(|d| d.identifier().to_string());
    f.host.detach("first");
    f.registry.handle_event(DeviceEvent::Detached { device_id: "first".into() });
    let second = f.cell.current().map(|d| d.identifier().to_string());

    // Assert
    assert_eq!(first.as_deref(), Some("first"));
    assert_eq!(second.as_deref(), Some("second"));
    assert_eq!(f.registry.state(), active("second"));
}

#[test]
fn test_detaching_unrelated_device_keeps_active_transport_open() {
    // Arrange
    let f = fixture();
    f.host.attach(supported_descriptor("wallet"), true);
    f.host.attach(foreign_descriptor("keyboard"), true);
    f.registry.select_device();
    let transport = f.registry.device_info().unwrap().open().unwrap();

    // Act
    f.host.detach("keyboard");
    f.registry.handle_event(DeviceEvent::Detached { device_id: "keyboard".into() });

    // Assert
    assert_eq!(f.registry.state(), active("wallet"));
    assert_eq!(transport.write(&[0x01, 0x02]).unwrap(), 2);
    assert_eq!(f.host.connection("wallet").unwrap().close_count(), 0);
}

#[test]
fn test_detach_during_permission_grant_leaves_no_device() {
    // Arrange
    let f = gated_fixture();
    f.host.attach(supported_descriptor("wallet"), false);
    f.registry.select_device();
    f.host.set_permission("wallet", true);

    // Act
    detach_during_enumeration(
        &f,
        DeviceEvent::PermissionResult { device_id: "wallet".into(), granted: true },
        "wallet",
    );

    // Assert
    assert_eq!(f.registry.state(), RegistryState::NoDevice);
    assert!(f.cell.current().is_none());
    assert!(f.registry.device_info().is_none());
}

#[test]
fn test_detach_during_attach_does_not_leave_stale_prompt() {
    // Arrange
    let f = gated_fixture();
    f.host.attach(supported_descriptor("wallet"), false);

    // Act
    detach_during_enumeration(
        &f,
        DeviceEvent::Attached { device_id: "wallet".into() },
        "wallet",
    );
    let after_detach = f.registry.state();
    f.host.attach(supported_descriptor("wallet"), false);
    f.registry.handle_event(DeviceEvent::Attached { device_id: "wallet".into() });

    // Assert: the re-plugged device is prompted for again
    assert_eq!(after_detach, RegistryState::NoDevice);
    assert_eq!(
        f.registry.state(),
        RegistryState::PermissionRequested { device_id: "wallet".into() }
    );
    assert_eq!(f.host.permission_requests().last().map(String::as_str), Some("wallet"));
}

#[test]
fn test_events_after_shutdown_select_nothing() {
    // Arrange
    let host = Arc::new(MockUsbHost::new());
    let shutdown = ShutdownToken::new();
    let registry = DeviceRegistry::new(
        Arc::clone(&host) as Arc<dyn UsbHost>,
        DeviceFilter::default(),
        ActiveDeviceCell::new(),
        DEFAULT_TRANSFER_TIMEOUT,
        shutdown.clone(),
    );
    host.attach(supported_descriptor("wallet"), false);
    registry.select_device();
    shutdown.cancel();
    registry.release_active();

    // Act
    host.set_permission("wallet", true);
    registry.handle_event(DeviceEvent::PermissionResult {
        device_id: "wallet".into(),
        granted: true,
    });
    host.attach(supported_descriptor("second"), true);
    registry.handle_event(DeviceEvent::Attached { device_id: "second".into() });

    // Assert
    assert_eq!(registry.state(), RegistryState::NoDevice);
    assert!(registry.active_device().is_none());
    assert_eq!(host.permission_requests(), vec!["wallet".to_string()]);
}
