//! The single "active device" slot and the handle the backend sees.
//!
//! [`ActiveDeviceCell`] is shared between the device registry (which
//! replaces or clears the device on hot-plug) and the backend (which opens
//! transports to it through [`DeviceHandle`]).  The cell remembers every
//! transport opened to the current device so that replacing or clearing the
//! device closes them; in-flight I/O against a removed device then fails
//! instead of reaching the wrong hardware.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use devbridge_core::{
    Device, DeviceInfo, ReadWriteCloser, ShutdownToken, TransferOp, TransportError,
};
use tracing::debug;

use super::transport::{Transport, TransportHandle};
use super::usb_host::UsbHost;

struct ActiveSlot {
    device: Device,
    transports: Vec<Weak<Transport>>,
}

/// Shared, mutex-guarded slot holding at most one active device.
#[derive(Clone, Default)]
pub struct ActiveDeviceCell {
    inner: Arc<Mutex<Option<ActiveSlot>>>,
}

impl ActiveDeviceCell {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<ActiveSlot>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of the active device.
    pub fn current(&self) -> Option<Device> {
        self.lock().as_ref().map(|slot| slot.device.clone())
    }

    pub fn is_active(&self, identifier: &str) -> bool {
        self.lock()
            .as_ref()
            .map_or(false, |slot| slot.device.identifier() == identifier)
    }

    /// Makes `device` the active device and closes every transport opened
    /// to the previous one.  Returns the previous device.
    pub fn replace(&self, device: Device) -> Option<Device> {
        let previous = self.lock().replace(ActiveSlot { device, transports: Vec::new() });
        previous.map(close_slot)
    }

    /// Clears the active device, closing its transports.
    pub fn clear(&self) -> Option<Device> {
        let previous = self.lock().take();
        previous.map(close_slot)
    }

    /// Registers `transport` with the active device so it is closed when the
    /// device goes away.
    ///
    /// # Errors
    ///
    /// If the transport's device is no longer active the transport is closed
    /// and [`TransportError::DeviceNotActive`] is returned.
    pub fn adopt(&self, transport: &Arc<Transport>) -> Result<(), TransportError> {
        let mut guard = self.lock();
        match guard.as_mut() {
            Some(slot) if slot.device.identifier() == transport.device_id() => {
                slot.transports.retain(|weak| weak.strong_count() > 0);
                slot.transports.push(Arc::downgrade(transport));
                Ok(())
            }
            _ => {
                drop(guard);
                transport.close();
                Err(TransportError::DeviceNotActive { device: transport.device_id().to_string() })
            }
        }
    }

    /// Number of transports to the active device that are still open.
    pub fn open_transport_count(&self) -> usize {
        self.lock().as_ref().map_or(0, |slot| {
            slot.transports
                .iter()
                .filter_map(Weak::upgrade)
                .filter(|t| !t.is_closed())
                .count()
        })
    }
}

/// Closes the transports of a slot that has already been removed from the cell.
fn close_slot(slot: ActiveSlot) -> Device {
    let mut closed = 0usize;
    for transport in slot.transports.iter().filter_map(Weak::upgrade) {
        if !transport.is_closed() {
            transport.close();
            closed += 1;
        }
    }
    debug!(device = %slot.device.identifier(), closed, "active device released");
    slot.device
}

// ── DeviceInfo handle ─────────────────────────────────────────────────────────

/// What the backend receives from `Environment::device_info`.
///
/// The descriptor fields are a snapshot; [`DeviceInfo::open`] checks the
/// cell again so a handle to a replaced device cannot open anything.
pub struct DeviceHandle {
    device: Device,
    cell: ActiveDeviceCell,
    host: Arc<dyn UsbHost>,
    timeout: Duration,
    shutdown: ShutdownToken,
}

impl DeviceHandle {
    pub fn new(
        device: Device,
        cell: ActiveDeviceCell,
        host: Arc<dyn UsbHost>,
        timeout: Duration,
        shutdown: ShutdownToken,
    ) -> Self {
        Self { device, cell, host, timeout, shutdown }
    }
}

impl DeviceInfo for DeviceHandle {
    fn identifier(&self) -> String {
        self.device.descriptor.identifier.clone()
    }

    fn interface(&self) -> u8 {
        self.device.descriptor.interface
    }

    fn vendor_id(&self) -> u16 {
        self.device.descriptor.vendor_id
    }

    fn product_id(&self) -> u16 {
        self.device.descriptor.product_id
    }

    fn product(&self) -> String {
        self.device.descriptor.product.clone()
    }

    fn manufacturer(&self) -> String {
        self.device.descriptor.manufacturer.clone()
    }

    fn serial(&self) -> String {
        self.device.descriptor.serial.clone()
    }

    fn open(&self) -> Result<Box<dyn ReadWriteCloser>, TransportError> {
        if self.shutdown.is_cancelled() {
            return Err(TransportError::Cancelled { op: TransferOp::Open });
        }
        let current = self
            .cell
            .current()
            .filter(|d| d.identifier() == self.device.identifier())
            .ok_or_else(|| TransportError::DeviceNotActive {
                device: self.device.identifier().to_string(),
            })?;

        let transport =
            Transport::open(self.host.as_ref(), &current, self.timeout, self.shutdown.clone())?;
        self.cell.adopt(&transport)?;
        Ok(Box::new(TransportHandle::new(transport)))
    }
}
