//! Error taxonomy shared by the host and the backend.
//!
//! Each layer has its own enum so callers can match on exactly the failures
//! that layer can produce:
//!
//! | Enum               | Raised by                                   |
//! |--------------------|---------------------------------------------|
//! | [`TransportError`] | opening or transferring on a USB device     |
//! | [`RpcError`]       | the call/response bridge                    |
//! | [`LifecycleError`] | starting or shutting down the backend       |
//! | [`QueryError`]     | parsing a call payload                      |
//! | [`UriError`]       | deep-link validation                        |
//! | [`EnvironmentError`] | host services (open URL, auth prompt, …)  |
//! | [`BackendError`]   | the backend itself                          |

use std::fmt;

use thiserror::Error;

use crate::domain::query::QueryId;

/// The transport operation that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferOp {
    Open,
    Read,
    Write,
    Close,
}

impl fmt::Display for TransferOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransferOp::Open => "open",
            TransferOp::Read => "read",
            TransferOp::Write => "write",
            TransferOp::Close => "close",
        };
        f.write_str(name)
    }
}

/// Failures while opening a device or moving bytes over its bulk endpoints.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The device does not expose the expected one-in/one-out endpoint pair.
    #[error("device {device} has an unusable endpoint configuration: {detail}")]
    Configuration { device: String, detail: String },

    /// The host has not granted access to the device.
    #[error("permission to open device {device} has not been granted")]
    PermissionNotGranted { device: String },

    /// The device is no longer the active device, or was never selected.
    #[error("device {device} is not the active device")]
    DeviceNotActive { device: String },

    /// The host refused to open the device or claim its interface.
    #[error("failed to open device {device}: {reason}")]
    OpenFailed { device: String, reason: String },

    /// The underlying bulk transfer reported an error status.
    #[error("bulk {op} failed with status {code}")]
    TransferFailed { op: TransferOp, code: i32 },

    /// The transfer completed with fewer bytes than requested.
    #[error("short bulk {op}: expected {expected} bytes, transferred {actual}")]
    ShortTransfer { op: TransferOp, expected: usize, actual: usize },

    /// The transport was closed before or during the operation.
    #[error("transport closed during {op}")]
    Closed { op: TransferOp },

    /// The shared shutdown token was cancelled.
    #[error("{op} cancelled by shutdown")]
    Cancelled { op: TransferOp },
}

impl TransportError {
    /// `true` for failures that happened while bytes were in flight, as
    /// opposed to setup failures.  The backend reports these as I/O errors.
    pub fn is_io(&self) -> bool {
        matches!(
            self,
            TransportError::TransferFailed { .. }
                | TransportError::ShortTransfer { .. }
                | TransportError::Closed { .. }
                | TransportError::Cancelled { .. }
        )
    }

    /// `true` if a fresh `open` on the same device may succeed.
    ///
    /// A closed transport can be reopened while the device stays active;
    /// permission and endpoint problems need user or hardware action.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TransportError::TransferFailed { .. }
                | TransportError::ShortTransfer { .. }
                | TransportError::Closed { .. }
                | TransportError::OpenFailed { .. }
        )
    }
}

/// Call payload could not be understood.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("invalid query json: {0}")]
    Json(String),

    #[error("method must be POST or GET, got {0:?}")]
    UnsupportedMethod(String),
}

/// Failures of the call/response bridge.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RpcError {
    /// A query with this ID is still waiting for its response.
    #[error("query {0} is already outstanding")]
    DuplicateQuery(QueryId),

    /// The bridge has been shut down.
    #[error("bridge is closed")]
    BridgeClosed,

    /// No backend has been started yet.
    #[error("backend is not running")]
    BackendNotRunning,

    #[error("invalid query {id}: {source}")]
    InvalidQuery {
        id: QueryId,
        #[source]
        source: QueryError,
    },

    /// The worker that runs the backend handler could not be started.
    #[error("failed to dispatch query {id}: {reason}")]
    Dispatch { id: QueryId, reason: String },
}

/// Failures while starting or stopping the backend.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LifecycleError {
    /// A second `start` raced or followed the first.  `start` logs and
    /// swallows this one; it never reaches the caller.
    #[error("backend already started")]
    AlreadyStarted,

    /// `start` was called after `shutdown`.  The lifecycle does not restart.
    #[error("backend has been shut down")]
    ShutDown,

    #[error("backend failed to launch: {0}")]
    LaunchFailed(String),
}

/// Deep-link URI validation failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UriError {
    #[error("malformed uri {0:?}")]
    Malformed(String),

    #[error("unsupported uri scheme {0:?}")]
    UnsupportedScheme(String),
}

/// Failures of host services the backend calls through `Environment`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EnvironmentError {
    #[error("could not open {target:?}: {reason}")]
    OpenFailed { target: String, reason: String },

    #[error("invalid file name {0:?}")]
    InvalidFileName(String),

    #[error("host service unavailable: {0}")]
    Unavailable(String),
}

/// Failures reported by the backend itself.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    #[error("backend close failed: {0}")]
    CloseFailed(String),

    #[error("backend error: {0}")]
    Other(String),
}
