//! Network reachability snapshots.

use serde::{Deserialize, Serialize};

/// Capabilities of the host's active network, as sampled from the OS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NetworkCapabilities {
    /// The network claims to provide internet access.
    pub internet: bool,
    /// The OS has verified that internet access actually works.
    pub validated: bool,
    /// The network runs over a cellular transport (metered).
    pub cellular: bool,
}

impl NetworkCapabilities {
    /// A validated, unmetered network (Wi-Fi, Ethernet).
    pub fn unmetered() -> Self {
        Self { internet: true, validated: true, cellular: false }
    }

    /// A validated cellular network.
    pub fn cellular() -> Self {
        Self { internet: true, validated: true, cellular: true }
    }

    /// Online only if the network both claims and has validated internet access.
    pub fn has_internet_connectivity(&self) -> bool {
        self.internet && self.validated
    }
}

/// What the backend is told about the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConnectivityState {
    pub online: bool,
    pub metered: bool,
}

impl ConnectivityState {
    /// Derives the reported state from the active network, if any.
    pub fn from_network(capabilities: Option<&NetworkCapabilities>) -> Self {
        match capabilities {
            Some(caps) => Self {
                online: caps.has_internet_connectivity(),
                metered: caps.cellular,
            },
            None => Self { online: false, metered: false },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_internet_without_validation_is_offline() {
        let caps = NetworkCapabilities { internet: true, validated: false, cellular: false };
        assert!(!caps.has_internet_connectivity());
    }

    #[test]
    fn test_validated_network_is_online() {
        assert!(NetworkCapabilities::unmetered().has_internet_connectivity());
    }

    #[test]
    fn test_state_from_missing_network_is_offline_and_unmetered() {
        let state = ConnectivityState::from_network(None);
        assert_eq!(state, ConnectivityState { online: false, metered: false });
    }

    #[test]
    fn test_state_from_cellular_network_is_metered() {
        let state = ConnectivityState::from_network(Some(&NetworkCapabilities::cellular()));
        assert!(state.online);
        assert!(state.metered);
    }
}
