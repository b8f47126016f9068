//! Blocking byte-stream transport over one opened USB device.
//!
//! # How the transport talks to the device (for beginners)
//!
//! The supported device exposes one interface with exactly two *bulk*
//! endpoints: one carries bytes from the host to the device (`Out`), the
//! other from the device to the host (`In`).  Opening the transport:
//!
//! 1. checks that the host has granted permission,
//! 2. classifies the two endpoints by direction (no I/O yet),
//! 3. opens the host connection and claims the interface.
//!
//! After that, [`Transport::read`] and [`Transport::write`] each issue a
//! single blocking bulk transfer.  A read either returns exactly the
//! requested number of bytes or fails; partial buffers never escape.
//!
//! # Closing
//!
//! [`Transport::close`] is idempotent.  It is called by whoever finishes
//! first: the backend, the device registry on detach or replacement, the
//! lifecycle on shutdown, or `Drop`.  Once closed, every operation fails
//! with [`TransportError::Closed`]; the handle is never reused.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use devbridge_core::{
    Device, DeviceDescriptor, EndpointDirection, ReadWriteCloser, ShutdownToken, TransferOp,
    TransportError,
};
use tracing::{debug, warn};

use super::usb_host::{UsbConnection, UsbHost};

/// Timeout for a single bulk transfer.  Long enough to wait for the user to
/// confirm on the device.
pub const DEFAULT_TRANSFER_TIMEOUT: Duration = Duration::from_secs(5_000);

/// Resolved endpoint addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointPair {
    pub inbound: u8,
    pub outbound: u8,
}

/// Classifies the first two endpoints of the device's interface.
///
/// # Errors
///
/// Returns [`TransportError::Configuration`] unless exactly one of the two
/// is inbound and the other outbound.
pub fn classify_endpoints(descriptor: &DeviceDescriptor) -> Result<EndpointPair, TransportError> {
    let configuration_error = |detail: String| TransportError::Configuration {
        device: descriptor.identifier.clone(),
        detail,
    };

    let (first, second) = match descriptor.endpoints.as_slice() {
        [first, second, ..] => (first, second),
        other => {
            return Err(configuration_error(format!(
                "expected two bulk endpoints, found {}",
                other.len()
            )))
        }
    };

    match (first.direction, second.direction) {
        (EndpointDirection::Out, EndpointDirection::In) => {
            Ok(EndpointPair { inbound: second.address, outbound: first.address })
        }
        (EndpointDirection::In, EndpointDirection::Out) => {
            Ok(EndpointPair { inbound: first.address, outbound: second.address })
        }
        (direction, _) => Err(configuration_error(format!(
            "both endpoints are {direction:?}"
        ))),
    }
}

/// An opened, claimed device.
pub struct Transport {
    device_id: String,
    interface: u8,
    endpoints: EndpointPair,
    connection: Arc<dyn UsbConnection>,
    timeout: Duration,
    shutdown: ShutdownToken,
    closed: AtomicBool,
}

impl Transport {
    /// Opens `device` through `host`.
    ///
    /// # Errors
    ///
    /// - [`TransportError::PermissionNotGranted`] unless permission is `Granted`.
    /// - [`TransportError::Cancelled`] if shutdown has begun.
    /// - [`TransportError::Configuration`] for an unusable endpoint layout.
    ///   The host connection is not opened in that case.
    /// - [`TransportError::OpenFailed`] if the host refuses the connection or
    ///   the interface claim.
    pub fn open(
        host: &dyn UsbHost,
        device: &Device,
        timeout: Duration,
        shutdown: ShutdownToken,
    ) -> Result<Arc<Self>, TransportError> {
        let device_id = device.identifier().to_string();

        if !device.is_openable() {
            return Err(TransportError::PermissionNotGranted { device: device_id });
        }
        if shutdown.is_cancelled() {
            return Err(TransportError::Cancelled { op: TransferOp::Open });
        }

        let endpoints = classify_endpoints(&device.descriptor)?;
        let interface = device.descriptor.interface;

        let connection = host.open_device(&device_id)?;
        if !connection.claim_interface(interface) {
            connection.close();
            return Err(TransportError::OpenFailed {
                device: device_id,
                reason: format!("could not claim interface {interface}"),
            });
        }

        debug!(
            device = %device_id,
            interface,
            inbound = endpoints.inbound,
            outbound = endpoints.outbound,
            "transport opened"
        );

        Ok(Arc::new(Self {
            device_id,
            interface,
            endpoints,
            connection,
            timeout,
            shutdown,
            closed: AtomicBool::new(false),
        }))
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn endpoints(&self) -> EndpointPair {
        self.endpoints
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_usable(&self, op: TransferOp) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed { op });
        }
        if self.shutdown.is_cancelled() {
            return Err(TransportError::Cancelled { op });
        }
        Ok(())
    }

    fn transfer_error(&self, op: TransferOp, code: i32) -> TransportError {
        // A detach closes the connection under an in-flight transfer.
        if self.is_closed() {
            TransportError::Closed { op }
        } else {
            TransportError::TransferFailed { op, code }
        }
    }

    /// Reads exactly `n` bytes from the inbound endpoint.
    ///
    /// # Errors
    ///
    /// Any negative transfer status, short transfer, closed handle or
    /// cancelled shutdown token.
    pub fn read(&self, n: usize) -> Result<Vec<u8>, TransportError> {
        self.ensure_usable(TransferOp::Read)?;

        let mut buf = vec![0u8; n];
        let code = self.connection.bulk_in(self.endpoints.inbound, &mut buf, self.timeout);
        if code < 0 {
            return Err(self.transfer_error(TransferOp::Read, code));
        }

        let actual = code as usize;
        if actual != n {
            return Err(TransportError::ShortTransfer { op: TransferOp::Read, expected: n, actual });
        }
        Ok(buf)
    }

    /// Writes `buf` to the outbound endpoint and returns the bytes transferred.
    ///
    /// # Errors
    ///
    /// Any negative transfer status, closed handle or cancelled shutdown token.
    pub fn write(&self, buf: &[u8]) -> Result<usize, TransportError> {
        self.ensure_usable(TransferOp::Write)?;

        let code = self.connection.bulk_out(self.endpoints.outbound, buf, self.timeout);
        if code < 0 {
            return Err(self.transfer_error(TransferOp::Write, code));
        }
        Ok(code as usize)
    }

    /// Releases the interface and closes the connection.  Only the first
    /// call does anything.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if !self.connection.release_interface(self.interface) {
            warn!(device = %self.device_id, interface = self.interface, "failed to release interface");
        }
        self.connection.close();
        debug!(device = %self.device_id, "transport closed");
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("device_id", &self.device_id)
            .field("interface", &self.interface)
            .field("endpoints", &self.endpoints)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// The [`ReadWriteCloser`] handed to the backend.
#[derive(Debug, Clone)]
pub struct TransportHandle(Arc<Transport>);

impl TransportHandle {
    pub fn new(transport: Arc<Transport>) -> Self {
        Self(transport)
    }
}

impl ReadWriteCloser for TransportHandle {
    fn read(&self, n: usize) -> Result<Vec<u8>, TransportError> {
        self.0.read(n)
    }

    fn write(&self, buf: &[u8]) -> Result<usize, TransportError> {
        self.0.write(buf)
    }

    fn close(&self) -> Result<(), TransportError> {
        self.0.close();
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
