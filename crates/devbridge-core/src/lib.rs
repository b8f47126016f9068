//! # devbridge-core
//!
//! Shared library for devbridge containing the device, query and
//! connectivity domain types, the error taxonomy, and the capability traits
//! through which the host and the hardware-communicating backend talk to
//! each other.
//!
//! This crate has zero dependencies on USB stacks, async runtimes, or UI
//! frameworks.
//!
//! # Architecture overview (for beginners)
//!
//! devbridge sits between a user-facing *client* (a web view, a UI shell)
//! and a *backend* process that owns all wallet logic and speaks to a
//! USB-attached hardware device.  Three things cross this bridge:
//!
//! - **Calls and responses** – the client issues `call(query_id, payload)`;
//!   some time later the backend answers with `respond(query_id, payload)`.
//! - **Push notifications** – unsolicited events from the backend.
//! - **Device and network state** – hot-plug and connectivity changes flow
//!   from the host into the backend.
//!
//! This crate defines the vocabulary for all three:
//!
//! - **`domain`** – plain data: device descriptors, permission states,
//!   queries, responses, connectivity snapshots.
//! - **`capability`** – the named interfaces (`DeviceInfo`, `Environment`,
//!   `NativeCommunication`, `Backend`) handed across the boundary at start
//!   time.
//! - **`error`** – the typed failures each layer can surface.
//! - **`shutdown`** – the cooperative cancellation token shared by the
//!   transport and the backend.

pub mod capability;
pub mod domain;
pub mod error;
pub mod shutdown;

pub use capability::{
    Backend, BackendLauncher, DeviceInfo, Environment, NativeCommunication, ReadWriteCloser,
    StartContext,
};
pub use domain::connectivity::{ConnectivityState, NetworkCapabilities};
pub use domain::device::{
    Device, DeviceDescriptor, DeviceFilter, EndpointDescriptor, EndpointDirection,
    PermissionState, DEFAULT_PRODUCT_ID, DEFAULT_VENDOR_ID, USAGE_PAGE,
};
pub use domain::query::{ApiMethod, ApiQuery, PushNotification, Query, QueryId, Response};
pub use error::{
    BackendError, EnvironmentError, LifecycleError, QueryError, RpcError, TransferOp,
    TransportError, UriError,
};
pub use shutdown::ShutdownToken;
