//! Recording test doubles for the platform and the environment.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use devbridge_core::{DeviceInfo, Environment, EnvironmentError};

use super::PlatformServices;

/// A mock implementation of [`PlatformServices`] that records every call.
pub struct MockPlatform {
    notifications: Mutex<Vec<String>>,
    opened_urls: Mutex<Vec<String>>,
    dark: bool,
}

impl MockPlatform {
    pub fn new() -> Self {
        Self {
            notifications: Mutex::new(Vec::new()),
            opened_urls: Mutex::new(Vec::new()),
            dark: false,
        }
    }

    pub fn with_dark_theme(mut self, dark: bool) -> Self {
        self.dark = dark;
        self
    }

    pub fn notifications(&self) -> Vec<String> {
        self.notifications.lock().expect("lock poisoned").clone()
    }

    pub fn opened_urls(&self) -> Vec<String> {
        self.opened_urls.lock().expect("lock poisoned").clone()
    }
}

impl Default for MockPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl PlatformServices for MockPlatform {
    fn show_notification(&self, text: &str) {
        self.notifications.lock().expect("lock poisoned").push(text.to_string());
    }

    fn open_url(&self, url: &str) -> Result<(), EnvironmentError> {
        self.opened_urls.lock().expect("lock poisoned").push(url.to_string());
        Ok(())
    }

    fn locale(&self) -> String {
        "en-US".to_string()
    }

    fn prefers_dark_theme(&self) -> bool {
        self.dark
    }

    fn export_dir(&self) -> PathBuf {
        std::env::temp_dir().join("devbridge-exports")
    }
}

/// A standalone [`Environment`] with a fixed device and no client.
///
/// Used where a test needs an environment but not the full host wiring.
#[derive(Default)]
pub struct MockEnvironment {
    device: Option<Arc<dyn DeviceInfo>>,
    auth_requests: Mutex<u32>,
    metered: bool,
}

impl MockEnvironment {
    pub fn with_device(device: Arc<dyn DeviceInfo>) -> Self {
        Self { device: Some(device), ..Self::default() }
    }

    pub fn auth_requests(&self) -> u32 {
        *self.auth_requests.lock().expect("lock poisoned")
    }
}

impl Environment for MockEnvironment {
    fn notify_user(&self, _text: &str) {}

    fn device_info(&self) -> Option<Arc<dyn DeviceInfo>> {
        self.device.clone()
    }

    fn system_open(&self, _url: &str) -> Result<(), EnvironmentError> {
        Ok(())
    }

    fn auth(&self) {
        *self.auth_requests.lock().expect("lock poisoned") += 1;
    }

    fn get_save_filename(&self, suggested_name: &str) -> Result<PathBuf, EnvironmentError> {
        Ok(std::env::temp_dir().join(suggested_name))
    }

    fn on_auth_setting_changed(&self, _enabled: bool) {}

    fn native_locale(&self) -> String {
        "en-US".to_string()
    }

    fn set_dark_theme(&self, _is_dark: bool) {}

    fn detect_dark_theme(&self) -> bool {
        false
    }

    fn using_mobile_data(&self) -> bool {
        self.metered
    }
}
