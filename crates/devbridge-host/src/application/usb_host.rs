//! Ports to the host USB stack.
//!
//! The registry and the transport only ever talk to USB through these two
//! traits.  A real host adapter wraps the platform's USB manager; tests use
//! `infrastructure::usb::mock`.

use std::sync::Arc;
use std::time::Duration;

use devbridge_core::{DeviceDescriptor, TransportError};

/// The host's view of attached USB devices.
pub trait UsbHost: Send + Sync {
    /// Every device currently attached, supported or not.
    fn devices(&self) -> Vec<DeviceDescriptor>;

    /// `true` if the application already holds access to `identifier`.
    fn has_permission(&self, identifier: &str) -> bool;

    /// Starts the host consent prompt.  The answer arrives later as a
    /// `DeviceEvent::PermissionResult`.
    fn request_permission(&self, identifier: &str);

    /// Opens a connection to the device.  Called only after the endpoint
    /// layout has been validated and permission is granted.
    fn open_device(&self, identifier: &str) -> Result<Arc<dyn UsbConnection>, TransportError>;
}

/// An opened device connection.
///
/// Transfer methods mirror the host's bulk transfer primitive: they return
/// the number of bytes moved, or a negative status on failure.
pub trait UsbConnection: Send + Sync {
    /// Claims `interface` for exclusive use.  Returns `false` if the host refuses.
    fn claim_interface(&self, interface: u8) -> bool;

    fn release_interface(&self, interface: u8) -> bool;

    fn bulk_in(&self, endpoint: u8, buf: &mut [u8], timeout: Duration) -> i32;

    fn bulk_out(&self, endpoint: u8, buf: &[u8], timeout: Duration) -> i32;

    fn close(&self);
}
