//! Host services exposed to the backend through [`Environment`].
//!
//! [`BridgeEnvironment`] is the one `Environment` the host hands to the
//! backend.  It combines three sources:
//!
//! - the device registry, for `device_info`;
//! - the connectivity monitor, for `using_mobile_data`;
//! - a [`PlatformServices`] adapter for everything that needs the OS or UI
//!   shell (notifications, opening URLs, locale, theme, export directory).
//!
//! Client-visible state changes (`auth`, `on_auth_setting_changed`,
//! `set_dark_theme`) are posted through the RPC bridge so they reach the
//! client on its own execution context, in order with responses.

pub mod headless;
pub mod mock;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use devbridge_core::{DeviceInfo, Environment, EnvironmentError};
use tracing::debug;

use crate::application::connectivity_monitor::ConnectivityMonitor;
use crate::application::device_registry::DeviceRegistry;
use crate::application::rpc_bridge::{ClientEvent, RpcBridge};

/// OS / UI-shell facilities the environment delegates to.
pub trait PlatformServices: Send + Sync {
    fn show_notification(&self, text: &str);

    fn open_url(&self, url: &str) -> Result<(), EnvironmentError>;

    /// BCP 47 locale tag.
    fn locale(&self) -> String;

    fn prefers_dark_theme(&self) -> bool;

    /// Directory exported files are written to.
    fn export_dir(&self) -> PathBuf;
}

pub struct BridgeEnvironment {
    platform: Arc<dyn PlatformServices>,
    registry: Arc<DeviceRegistry>,
    monitor: Arc<ConnectivityMonitor>,
    bridge: Arc<RpcBridge>,
}

impl BridgeEnvironment {
    pub fn new(
        platform: Arc<dyn PlatformServices>,
        registry: Arc<DeviceRegistry>,
        monitor: Arc<ConnectivityMonitor>,
        bridge: Arc<RpcBridge>,
    ) -> Self {
        Self { platform, registry, monitor, bridge }
    }
}

impl Environment for BridgeEnvironment {
    fn notify_user(&self, text: &str) {
        self.platform.show_notification(text);
    }

    fn device_info(&self) -> Option<Arc<dyn DeviceInfo>> {
        self.registry.device_info()
    }

    fn system_open(&self, url: &str) -> Result<(), EnvironmentError> {
        debug!(url, "opening url");
        self.platform.open_url(url)
    }

    fn auth(&self) {
        self.bridge.post(ClientEvent::AuthRequested);
    }

    /// Only the final path component of `suggested_name` is used, so the
    /// backend cannot escape the export directory.
    fn get_save_filename(&self, suggested_name: &str) -> Result<PathBuf, EnvironmentError> {
        let file_name = Path::new(suggested_name)
            .file_name()
            .ok_or_else(|| EnvironmentError::InvalidFileName(suggested_name.to_string()))?;
        Ok(self.platform.export_dir().join(file_name))
    }

    fn on_auth_setting_changed(&self, enabled: bool) {
        self.bridge.post(ClientEvent::AuthSettingChanged(enabled));
    }

    fn native_locale(&self) -> String {
        self.platform.locale()
    }

    fn set_dark_theme(&self, is_dark: bool) {
        self.bridge.post(ClientEvent::DarkThemeChanged(is_dark));
    }

    fn detect_dark_theme(&self) -> bool {
        self.platform.prefers_dark_theme()
    }

    fn using_mobile_data(&self) -> bool {
        self.monitor.using_metered_connection()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
