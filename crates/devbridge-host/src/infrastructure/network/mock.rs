//! Scriptable network probe for tests and the headless demo.

use std::sync::{Mutex, PoisonError};

use devbridge_core::NetworkCapabilities;

use crate::application::connectivity_monitor::NetworkProbe;

/// A mock implementation of [`NetworkProbe`] whose active network can be
/// swapped at any time.
pub struct MockNetworkProbe {
    active: Mutex<Option<NetworkCapabilities>>,
}

impl MockNetworkProbe {
    pub fn new(active: Option<NetworkCapabilities>) -> Self {
        Self { active: Mutex::new(active) }
    }

    pub fn set_active_network(&self, active: Option<NetworkCapabilities>) {
        *self.active.lock().unwrap_or_else(PoisonError::into_inner) = active;
    }
}

impl Default for MockNetworkProbe {
    fn default() -> Self {
        Self::new(Some(NetworkCapabilities::unmetered()))
    }
}

impl NetworkProbe for MockNetworkProbe {
    fn active_network(&self) -> Option<NetworkCapabilities> {
        *self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
