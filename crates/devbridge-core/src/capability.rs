//! Capability traits handed across the host ↔ backend boundary.
//!
//! The backend never reaches into host globals.  Instead, when the
//! lifecycle starts it, the backend receives a [`StartContext`] holding
//! trait objects for everything it may ask of the host:
//!
//! - [`Environment`] – host services (notifications, opening URLs, the
//!   authentication prompt, theme, locale) plus access to the active
//!   device through [`Environment::device_info`].
//! - [`NativeCommunication`] – the return path for responses and push
//!   notifications.
//!
//! In the other direction the host drives the backend through [`Backend`].
//!
//! All traits are `Send + Sync` because the backend calls them from its own
//! worker threads.

use std::path::PathBuf;
use std::sync::Arc;

use crate::domain::device::USAGE_PAGE;
use crate::domain::query::{ApiQuery, QueryId};
use crate::error::{BackendError, EnvironmentError, LifecycleError, TransportError};
use crate::shutdown::ShutdownToken;

// ── Device access ─────────────────────────────────────────────────────────────

/// Blocking byte stream over an opened device.
pub trait ReadWriteCloser: Send + Sync {
    /// Reads exactly `n` bytes.  Never returns a shorter buffer.
    fn read(&self, n: usize) -> Result<Vec<u8>, TransportError>;

    /// Writes `buf`, returning the number of bytes the device accepted.
    fn write(&self, buf: &[u8]) -> Result<usize, TransportError>;

    /// Releases the device.  Safe to call more than once.
    fn close(&self) -> Result<(), TransportError>;
}

/// Read-only view of the active device, plus the ability to open it.
pub trait DeviceInfo: Send + Sync {
    fn identifier(&self) -> String;
    fn interface(&self) -> u8;
    fn vendor_id(&self) -> u16;
    fn product_id(&self) -> u16;
    fn product(&self) -> String;
    fn manufacturer(&self) -> String;
    fn serial(&self) -> String;

    fn usage_page(&self) -> u16 {
        USAGE_PAGE
    }

    /// Devices bridged by this host are always USB-attached.
    fn is_bluetooth(&self) -> bool {
        false
    }

    /// Opens a new transport to the device.
    ///
    /// # Errors
    ///
    /// Fails if permission is missing, the endpoint layout is unusable, the
    /// device is no longer active, or the host refuses to open it.
    fn open(&self) -> Result<Box<dyn ReadWriteCloser>, TransportError>;
}

// ── Host services ─────────────────────────────────────────────────────────────

/// Host services the backend may call.
pub trait Environment: Send + Sync {
    /// Shows a user-visible notification.
    fn notify_user(&self, text: &str);

    /// The active device, if any.
    fn device_info(&self) -> Option<Arc<dyn DeviceInfo>>;

    /// Opens `url` with the host's default handler.
    fn system_open(&self, url: &str) -> Result<(), EnvironmentError>;

    /// Asks the client to present its authentication prompt.
    fn auth(&self);

    /// Returns a writable path for a file the backend wants to export.
    fn get_save_filename(&self, suggested_name: &str) -> Result<PathBuf, EnvironmentError>;

    fn on_auth_setting_changed(&self, enabled: bool);

    /// BCP 47 tag of the host's UI locale, e.g. `"de-CH"`.
    fn native_locale(&self) -> String;

    fn set_dark_theme(&self, is_dark: bool);

    fn detect_dark_theme(&self) -> bool;

    /// `true` while the active network is metered.
    fn using_mobile_data(&self) -> bool;
}

/// Return path from the backend to the client.
pub trait NativeCommunication: Send + Sync {
    /// Answers the call `query_id`.  Only the first answer per ID is delivered.
    fn respond(&self, query_id: QueryId, payload: String);

    fn push_notify(&self, payload: String);
}

// ── Backend ───────────────────────────────────────────────────────────────────

/// The hardware-communicating backend, as seen by the host.
///
/// Every method returns promptly; long-running work happens on the
/// backend's own threads and reports back through [`NativeCommunication`].
pub trait Backend: Send + Sync {
    /// Handles one client call.  The answer goes through
    /// [`NativeCommunication::respond`] with the same `query_id`.
    fn handle_call(&self, query_id: QueryId, query: ApiQuery);

    /// Handles a deep link that passed the host's scheme allow-list.
    fn handle_uri(&self, uri: &str);

    fn trigger_auth(&self);
    fn cancel_auth(&self);
    fn auth_result(&self, ok: bool);

    /// The active device changed (attached, detached, or permission granted).
    fn usb_update(&self);

    fn set_online(&self, online: bool);

    /// The metered status of the network may have changed.
    fn using_mobile_data_changed(&self);

    fn manual_reconnect(&self);

    /// Stops all backend work.  Called once, from shutdown.
    fn close(&self) -> Result<(), BackendError> {
        Ok(())
    }
}

/// Everything a backend receives when it is started.
#[derive(Clone)]
pub struct StartContext {
    /// Directory for the backend's persisted state.
    pub storage_path: PathBuf,
    /// Fresh random token for this start.
    pub session_token: String,
    pub environment: Arc<dyn Environment>,
    pub communication: Arc<dyn NativeCommunication>,
    pub shutdown: ShutdownToken,
}

impl std::fmt::Debug for StartContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StartContext")
            .field("storage_path", &self.storage_path)
            .field("session_token", &"<redacted>")
            .field("shutdown", &self.shutdown)
            .finish_non_exhaustive()
    }
}

/// Creates the backend.  Called at most once per host process.
pub trait BackendLauncher: Send + Sync {
    fn launch(&self, context: StartContext) -> Result<Arc<dyn Backend>, LifecycleError>;
}
