//! Application layer use cases for the devbridge host.
//!
//! # What is the "application" layer? (for beginners)
//!
//! In Clean Architecture the *application* layer sits between the domain
//! (pure data in `devbridge-core`) and the infrastructure (the OS USB stack,
//! the network probe, the file system).
//!
//! Use cases in this layer:
//!
//! - **Orchestrate** domain objects to fulfil a goal (e.g., "keep exactly one
//!   supported device active while devices come and go").
//! - **Depend on abstractions** (traits such as [`usb_host::UsbHost`] and
//!   [`connectivity_monitor::NetworkProbe`]) rather than concrete
//!   implementations, so the infrastructure can be swapped without changing
//!   this code.
//! - **Contain no OS calls**.  Blocking USB transfers happen behind the
//!   `UsbConnection` trait.
//!
//! # Sub-modules
//!
//! - **`usb_host`** – ports to the host USB stack.
//! - **`transport`** – blocking read/write/close over one opened device.
//! - **`active_device`** – the single shared "active device" cell and the
//!   `DeviceInfo` handle the backend sees.
//! - **`device_registry`** – enumeration, the permission handshake, and
//!   hot-plug handling.
//! - **`rpc_bridge`** – call/response/push correlation between client and
//!   backend.
//! - **`backend_lifecycle`** – start-once, entry-point forwarding and
//!   shutdown.
//! - **`deep_link`** – the URI scheme allow-list.
//! - **`connectivity_monitor`** – online/metered reporting.

pub mod active_device;
pub mod backend_lifecycle;
pub mod connectivity_monitor;
pub mod deep_link;
pub mod device_registry;
pub mod rpc_bridge;
pub mod transport;
pub mod usb_host;
