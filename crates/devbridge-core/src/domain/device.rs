//! USB device descriptors and the single-device selection filter.
//!
//! # What is a descriptor? (for beginners)
//!
//! When a USB device is plugged in, the host learns a few facts about it
//! before any application opens it: the vendor ID and product ID assigned
//! by the USB consortium, human-readable product and manufacturer strings,
//! a serial number, and the list of *interfaces* and *endpoints* the device
//! exposes.  An endpoint is a one-way pipe: `In` endpoints carry data from
//! the device to the host, `Out` endpoints carry data from the host to the
//! device.
//!
//! [`DeviceDescriptor`] is a snapshot of those facts.  [`Device`] pairs a
//! descriptor with the host permission state, which decides whether the
//! application may open it.

use serde::{Deserialize, Serialize};

/// HID usage page reported for every bridged device.
///
/// The backend uses it to tell vendor-defined interfaces apart; on the
/// mobile host only the vendor interface is ever bridged.
pub const USAGE_PAGE: u16 = 0xFFFF;

/// Vendor ID of the supported hardware device (`0x03eb`).
pub const DEFAULT_VENDOR_ID: u16 = 0x03eb;

/// Product ID of the supported hardware device (`0x2403`).
pub const DEFAULT_PRODUCT_ID: u16 = 0x2403;

/// Direction of a USB endpoint, seen from the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EndpointDirection {
    /// Device → host.
    In,
    /// Host → device.
    Out,
}

/// A single bulk endpoint on the bridged interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointDescriptor {
    /// Endpoint address as reported by the host.
    pub address: u8,
    /// Transfer direction.
    pub direction: EndpointDirection,
}

impl EndpointDescriptor {
    /// Creates an inbound (device → host) endpoint.
    pub fn inbound(address: u8) -> Self {
        Self { address, direction: EndpointDirection::In }
    }

    /// Creates an outbound (host → device) endpoint.
    pub fn outbound(address: u8) -> Self {
        Self { address, direction: EndpointDirection::Out }
    }
}

/// Host-visible facts about an attached USB device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    /// Host-assigned identifier, stable for as long as the device stays attached.
    pub identifier: String,
    pub vendor_id: u16,
    pub product_id: u16,
    pub product: String,
    pub manufacturer: String,
    pub serial: String,
    /// Index of the interface that carries the bulk endpoints.
    pub interface: u8,
    /// Endpoints of `interface`, in the order the host reports them.
    pub endpoints: Vec<EndpointDescriptor>,
}

/// Host consent state for opening a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PermissionState {
    /// Never asked.
    #[default]
    Unknown,
    /// A consent prompt is pending; the result arrives later as an event.
    Requested,
    /// The user (or a persisted grant) allowed access.
    Granted,
    /// The user refused access.
    Denied,
}

/// A tracked device: its descriptor plus the permission the host holds for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub descriptor: DeviceDescriptor,
    pub permission: PermissionState,
}

impl Device {
    pub fn new(descriptor: DeviceDescriptor, permission: PermissionState) -> Self {
        Self { descriptor, permission }
    }

    pub fn identifier(&self) -> &str {
        &self.descriptor.identifier
    }

    /// `true` once the host has granted access.  Only such devices may be opened.
    pub fn is_openable(&self) -> bool {
        self.permission == PermissionState::Granted
    }
}

/// Vendor/product pair that selects the supported device among everything
/// attached to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceFilter {
    pub vendor_id: u16,
    pub product_id: u16,
}

impl DeviceFilter {
    pub fn new(vendor_id: u16, product_id: u16) -> Self {
        Self { vendor_id, product_id }
    }

    /// Returns `true` if `descriptor` carries exactly this vendor/product pair.
    pub fn matches(&self, descriptor: &DeviceDescriptor) -> bool {
        descriptor.vendor_id == self.vendor_id && descriptor.product_id == self.product_id
    }
}

impl Default for DeviceFilter {
    fn default() -> Self {
        Self::new(DEFAULT_VENDOR_ID, DEFAULT_PRODUCT_ID)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
