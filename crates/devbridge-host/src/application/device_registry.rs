//! Device enumeration, the permission handshake and hot-plug handling.
//!
//! # State machine
//!
//! ```text
//!                 Attached (permission held)
//!   NoDevice ─────────────────────────────────────────────► Active
//!      │                                                     ▲
//!      │ Attached (no permission)                            │ PermissionResult(granted)
//!      ▼                                                     │
//!   DeviceFoundNoPermission ──request_permission──► PermissionRequested
//!
//!   Denied or any Detached ──► NoDevice (then re-select)
//! ```
//!
//! Once the [`ShutdownToken`] is cancelled every event leaves the registry in
//! `NoDevice`.
//!
//! Only one supported device is tracked at a time: the first attached device
//! matching the [`DeviceFilter`].  Every time the active device changes, the
//! registered [`DeviceObserver`] is told so it can forward `usb_update` to
//! the backend.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use devbridge_core::{
    Device, DeviceDescriptor, DeviceFilter, DeviceInfo, PermissionState, ShutdownToken,
};
use tracing::{debug, info};

use super::active_device::{ActiveDeviceCell, DeviceHandle};
use super::usb_host::UsbHost;

/// Where the registry stands for the single supported device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryState {
    NoDevice,
    DeviceFoundNoPermission { device_id: String },
    PermissionRequested { device_id: String },
    Active { device_id: String },
}

impl RegistryState {
    /// The device this state is about, if any.
    pub fn device_id(&self) -> Option<&str> {
        match self {
            RegistryState::NoDevice => None,
            RegistryState::DeviceFoundNoPermission { device_id }
            | RegistryState::PermissionRequested { device_id }
            | RegistryState::Active { device_id } => Some(device_id),
        }
    }
}

/// Hot-plug and consent notifications from the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    Attached { device_id: String },
    Detached { device_id: String },
    PermissionResult { device_id: String, granted: bool },
}

/// Told whenever the active device changes.
pub trait DeviceObserver: Send + Sync {
    fn active_device_changed(&self);
}

pub struct DeviceRegistry {
    host: Arc<dyn UsbHost>,
    filter: DeviceFilter,
    cell: ActiveDeviceCell,
    timeout: Duration,
    shutdown: ShutdownToken,
    state: Mutex<RegistryState>,
    observer: Mutex<Option<Weak<dyn DeviceObserver>>>,
}

/// Side effects computed under the state lock and run after releasing it.
#[derive(Default)]
struct Followup {
    request_permission: Option<String>,
    active_changed: bool,
}

impl DeviceRegistry {
    pub fn new(
        host: Arc<dyn UsbHost>,
        filter: DeviceFilter,
        cell: ActiveDeviceCell,
        timeout: Duration,
        shutdown: ShutdownToken,
    ) -> Self {
        Self {
            host,
            filter,
            cell,
            timeout,
            shutdown,
            state: Mutex::new(RegistryState::NoDevice),
            observer: Mutex::new(None),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers the observer.  Held weakly; the lifecycle owns itself.
    pub fn set_observer(&self, observer: Weak<dyn DeviceObserver>) {
        *self.observer.lock().unwrap_or_else(PoisonError::into_inner) = Some(observer);
    }

    pub fn state(&self) -> RegistryState {
        self.lock_state().clone()
    }

    /// The active device, if any.
    pub fn active_device(&self) -> Option<Device> {
        self.cell.current()
    }

    /// A [`DeviceInfo`] handle to the active device, if any.
    pub fn device_info(&self) -> Option<Arc<dyn DeviceInfo>> {
        self.cell.current().map(|device| {
            Arc::new(DeviceHandle::new(
                device,
                self.cell.clone(),
                Arc::clone(&self.host),
                self.timeout,
                self.shutdown.clone(),
            )) as Arc<dyn DeviceInfo>
        })
    }

    /// Attached devices matching the vendor/product filter.
    pub fn enumerate(&self) -> Vec<DeviceDescriptor> {
        self.host
            .devices()
            .into_iter()
            .filter(|d| self.filter.matches(d))
            .collect()
    }

    /// Re-evaluates which device should be active.
    ///
    /// The active device is kept if it is still the first match and still
    /// permitted.  Otherwise it is cleared (closing its transports) before
    /// the first match is considered: with permission it becomes active,
    /// without permission the consent prompt is started.
    pub fn select_device(&self) {
        let followup = {
            let mut state = self.lock_state();
            let candidate = self.enumerate().into_iter().next();
            self.select_locked(&mut state, candidate)
        };
        self.run(followup);
    }

    /// Callers enumerate while holding the state lock, so a snapshot can
    /// never be applied after a later detach has already been handled.
    fn select_locked(
        &self,
        state: &mut RegistryState,
        candidate: Option<DeviceDescriptor>,
    ) -> Followup {
        let mut followup = Followup::default();

        if self.shutdown.is_cancelled() {
            debug!("shut down; not selecting a device");
            if self.cell.clear().is_some() {
                followup.active_changed = true;
            }
            *state = RegistryState::NoDevice;
            return followup;
        }

        let Some(descriptor) = candidate else {
            if self.cell.clear().is_some() {
                followup.active_changed = true;
            }
            *state = RegistryState::NoDevice;
            return followup;
        };

        let device_id = descriptor.identifier.clone();
        let permitted = self.host.has_permission(&device_id);

        if permitted && self.cell.is_active(&device_id) {
            *state = RegistryState::Active { device_id };
            return followup;
        }

        if self.cell.clear().is_some() {
            followup.active_changed = true;
        }

        if permitted {
            info!(device = %device_id, "device active");
            self.cell.replace(Device::new(descriptor, PermissionState::Granted));
            *state = RegistryState::Active { device_id };
            followup.active_changed = true;
        } else if *state == (RegistryState::PermissionRequested { device_id: device_id.clone() }) {
            debug!(device = %device_id, "permission request already pending");
        } else {
            *state = RegistryState::DeviceFoundNoPermission { device_id: device_id.clone() };
            followup.request_permission = Some(device_id);
        }
        followup
    }

    /// Starts the host consent flow for `device_id`.
    ///
    /// Only moves `DeviceFoundNoPermission` for the same device to
    /// `PermissionRequested`.  If the device was detached or another
    /// transition won in the meantime the request is dropped.
    pub fn request_permission(&self, device_id: &str) {
        {
            let mut state = self.lock_state();
            let found = RegistryState::DeviceFoundNoPermission { device_id: device_id.to_string() };
            if self.shutdown.is_cancelled() || *state != found {
                debug!(device = %device_id, state = ?*state, "dropping stale permission request");
                return;
            }
            *state = RegistryState::PermissionRequested { device_id: device_id.to_string() };
        }
        info!(device = %device_id, "requesting device permission");
        self.host.request_permission(device_id);
    }

    /// Applies one host notification.
    pub fn handle_event(&self, event: DeviceEvent) {
        debug!(?event, "device event");
        match event {
            DeviceEvent::Attached { .. } => self.select_device(),
            DeviceEvent::Detached { device_id } => {
                let followup = {
                    let mut state = self.lock_state();
                    let mut followup = Followup::default();
                    if self.cell.is_active(&device_id) {
                        self.cell.clear();
                        followup.active_changed = true;
                    }
                    if state.device_id() == Some(device_id.as_str()) {
                        *state = RegistryState::NoDevice;
                    }
                    let candidate = self.enumerate().into_iter().next();
                    let next = self.select_locked(&mut state, candidate);
                    followup.active_changed |= next.active_changed;
                    followup.request_permission = next.request_permission;
                    followup
                };
                self.run(followup);
            }
            DeviceEvent::PermissionResult { device_id, granted } => {
                self.handle_permission_result(&device_id, granted)
            }
        }
    }

    fn handle_permission_result(&self, device_id: &str, granted: bool) {
        let followup = {
            let mut state = self.lock_state();
            let mut followup = Followup::default();
            if self.shutdown.is_cancelled() {
                debug!(device = %device_id, "shut down; ignoring permission result");
                self.cell.clear();
                *state = RegistryState::NoDevice;
                return;
            }
            let Some(descriptor) =
                self.enumerate().into_iter().find(|d| d.identifier == device_id)
            else {
                debug!(device = %device_id, "ignoring permission result for absent device");
                return;
            };
            if granted {
                info!(device = %device_id, "permission granted; device active");
                self.cell.replace(Device::new(descriptor, PermissionState::Granted));
                *state = RegistryState::Active { device_id: device_id.to_string() };
                followup.active_changed = true;
            } else {
                info!(device = %device_id, "permission denied");
                if self.cell.is_active(device_id) {
                    self.cell.clear();
                    followup.active_changed = true;
                }
                *state = RegistryState::NoDevice;
            }
            followup
        };
        self.run(followup);
    }

    /// Clears the active device without notifying the observer.  Used by
    /// shutdown, after which no backend is listening.
    pub fn release_active(&self) -> Option<Device> {
        let mut state = self.lock_state();
        *state = RegistryState::NoDevice;
        self.cell.clear()
    }

    fn run(&self, followup: Followup) {
        if let Some(device_id) = followup.request_permission {
            self.request_permission(&device_id);
        }
        if followup.active_changed {
            let observer = self
                .observer
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .as_ref()
                .and_then(Weak::upgrade);
            if let Some(observer) = observer {
                observer.active_device_changed();
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
