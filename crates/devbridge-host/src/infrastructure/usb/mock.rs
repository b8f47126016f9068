//! In-memory USB host for tests and the headless demo.
//!
//! Lets tests attach and detach devices, script bulk-in results, and inspect
//! what the transport wrote, without a real USB stack.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use devbridge_core::{
    DeviceDescriptor, EndpointDescriptor, TransportError, DEFAULT_PRODUCT_ID, DEFAULT_VENDOR_ID,
};

use crate::application::usb_host::{UsbConnection, UsbHost};

/// Descriptor of a supported device with the usual OUT/IN endpoint pair.
pub fn supported_descriptor(identifier: &str) -> DeviceDescriptor {
    DeviceDescriptor {
        identifier: identifier.to_string(),
        vendor_id: DEFAULT_VENDOR_ID,
        product_id: DEFAULT_PRODUCT_ID,
        product: "BitBox02".to_string(),
        manufacturer: "Shift Crypto AG".to_string(),
        serial: format!("serial-{identifier}"),
        interface: 0,
        endpoints: vec![EndpointDescriptor::outbound(0x01), EndpointDescriptor::inbound(0x82)],
    }
}

/// Descriptor of an unrelated device the registry must ignore.
pub fn foreign_descriptor(identifier: &str) -> DeviceDescriptor {
    DeviceDescriptor {
        vendor_id: 0x046d,
        product_id: 0xc52b,
        product: "Unifying Receiver".to_string(),
        manufacturer: "Logitech".to_string(),
        ..supported_descriptor(identifier)
    }
}

// ── Connection ────────────────────────────────────────────────────────────────

enum ScriptedRead {
    Data(Vec<u8>),
    Status(i32),
}

/// A scripted connection that records every call.
pub struct MockUsbConnection {
    reads: Mutex<VecDeque<ScriptedRead>>,
    writes: Mutex<Vec<(u8, Vec<u8>)>>,
    refuse_claim: bool,
    closed: AtomicBool,
    close_count: AtomicUsize,
    release_count: AtomicUsize,
}

impl MockUsbConnection {
    fn new(refuse_claim: bool) -> Self {
        Self {
            reads: Mutex::new(VecDeque::new()),
            writes: Mutex::new(Vec::new()),
            refuse_claim,
            closed: AtomicBool::new(false),
            close_count: AtomicUsize::new(0),
            release_count: AtomicUsize::new(0),
        }
    }

    /// Queues bytes for the next bulk-in transfer.
    pub fn queue_read(&self, bytes: Vec<u8>) {
        self.reads.lock().expect("lock poisoned").push_back(ScriptedRead::Data(bytes));
    }

    /// Queues a raw status code for the next bulk-in transfer.
    pub fn queue_read_status(&self, code: i32) {
        self.reads.lock().expect("lock poisoned").push_back(ScriptedRead::Status(code));
    }

    /// Every `(endpoint, bytes)` pair written so far.
    pub fn writes(&self) -> Vec<(u8, Vec<u8>)> {
        self.writes.lock().expect("lock poisoned").clone()
    }

    pub fn close_count(&self) -> usize {
        self.close_count.load(Ordering::SeqCst)
    }

    pub fn release_count(&self) -> usize {
        self.release_count.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl UsbConnection for MockUsbConnection {
    fn claim_interface(&self, _interface: u8) -> bool {
        !self.refuse_claim
    }

    fn release_interface(&self, _interface: u8) -> bool {
        self.release_count.fetch_add(1, Ordering::SeqCst);
        true
    }

    fn bulk_in(&self, _endpoint: u8, buf: &mut [u8], _timeout: Duration) -> i32 {
        if self.is_closed() {
            return -1;
        }
        match self.reads.lock().expect("lock poisoned").pop_front() {
            Some(ScriptedRead::Data(bytes)) => {
                let n = bytes.len().min(buf.len());
                buf[..n].copy_from_slice(&bytes[..n]);
                n as i32
            }
            Some(ScriptedRead::Status(code)) => code,
            // Nothing scripted behaves like a timeout.
            None => -1,
        }
    }

    fn bulk_out(&self, endpoint: u8, buf: &[u8], _timeout: Duration) -> i32 {
        if self.is_closed() {
            return -1;
        }
        self.writes.lock().expect("lock poisoned").push((endpoint, buf.to_vec()));
        buf.len() as i32
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.close_count.fetch_add(1, Ordering::SeqCst);
    }
}

// ── Host ──────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct HostState {
    attached: Vec<(DeviceDescriptor, bool)>,
    permission_requests: Vec<String>,
    connections: HashMap<String, Arc<MockUsbConnection>>,
    open_count: usize,
    refuse_claim: bool,
}

/// A mock implementation of [`UsbHost`].
#[derive(Default)]
pub struct MockUsbHost {
    state: Mutex<HostState>,
}

impl MockUsbHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches a device.  `permitted` sets whether access was granted earlier.
    pub fn attach(&self, descriptor: DeviceDescriptor, permitted: bool) {
        let mut state = self.state.lock().expect("lock poisoned");
        state.attached.retain(|(d, _)| d.identifier != descriptor.identifier);
        state.attached.push((descriptor, permitted));
    }

    /// Removes a device and breaks any open connection to it.
    pub fn detach(&self, identifier: &str) {
        let mut state = self.state.lock().expect("lock poisoned");
        state.attached.retain(|(d, _)| d.identifier != identifier);
        if let Some(connection) = state.connections.get(identifier) {
            connection.closed.store(true, Ordering::SeqCst);
        }
    }

    /// Records the user's answer to a consent prompt.
    pub fn set_permission(&self, identifier: &str, permitted: bool) {
        let mut state = self.state.lock().expect("lock poisoned");
        for (d, p) in state.attached.iter_mut() {
            if d.identifier == identifier {
                *p = permitted;
            }
        }
    }

    pub fn refuse_claim(&self, refuse: bool) {
        self.state.lock().expect("lock poisoned").refuse_claim = refuse;
    }

    pub fn permission_requests(&self) -> Vec<String> {
        self.state.lock().expect("lock poisoned").permission_requests.clone()
    }

    /// Number of successful `open_device` calls.
    pub fn open_count(&self) -> usize {
        self.state.lock().expect("lock poisoned").open_count
    }

    /// The most recent connection opened to `identifier`.
    pub fn connection(&self, identifier: &str) -> Option<Arc<MockUsbConnection>> {
        self.state.lock().expect("lock poisoned").connections.get(identifier).cloned()
    }
}

impl UsbHost for MockUsbHost {
    fn devices(&self) -> Vec<DeviceDescriptor> {
        let state = self.state.lock().expect("lock poisoned");
        state.attached.iter().map(|(d, _)| d.clone()).collect()
    }

    fn has_permission(&self, identifier: &str) -> bool {
        let state = self.state.lock().expect("lock poisoned");
        state.attached.iter().any(|(d, p)| d.identifier == identifier && *p)
    }

    fn request_permission(&self, identifier: &str) {
        let mut state = self.state.lock().expect("lock poisoned");
        state.permission_requests.push(identifier.to_string());
    }

    fn open_device(&self, identifier: &str) -> Result<Arc<dyn UsbConnection>, TransportError> {
        let mut state = self.state.lock().expect("lock poisoned");
        if !state.attached.iter().any(|(d, _)| d.identifier == identifier) {
            return Err(TransportError::OpenFailed {
                device: identifier.to_string(),
                reason: "device not attached".to_string(),
            });
        }
        let connection = Arc::new(MockUsbConnection::new(state.refuse_claim));
        state.connections.insert(identifier.to_string(), Arc::clone(&connection));
        state.open_count += 1;
        Ok(connection)
    }
}
