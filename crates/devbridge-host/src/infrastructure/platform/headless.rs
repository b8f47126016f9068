//! [`PlatformServices`] for a host without a UI shell.
//!
//! Notifications go to the log, URLs cannot be opened, and the locale is
//! taken from the POSIX locale environment variables.

use std::path::PathBuf;

use devbridge_core::EnvironmentError;
use tracing::info;

use super::PlatformServices;

pub struct HeadlessPlatform {
    export_dir: PathBuf,
}

impl HeadlessPlatform {
    pub fn new(export_dir: PathBuf) -> Self {
        Self { export_dir }
    }
}

impl PlatformServices for HeadlessPlatform {
    fn show_notification(&self, text: &str) {
        info!(notification = text, "user notification");
    }

    fn open_url(&self, url: &str) -> Result<(), EnvironmentError> {
        Err(EnvironmentError::OpenFailed {
            target: url.to_string(),
            reason: "no url handler on a headless host".to_string(),
        })
    }

    fn locale(&self) -> String {
        ["LC_ALL", "LC_MESSAGES", "LANG"]
            .iter()
            .filter_map(|var| std::env::var(var).ok())
            .find_map(|value| posix_to_bcp47(&value))
            .unwrap_or_else(|| "en".to_string())
    }

    fn prefers_dark_theme(&self) -> bool {
        false
    }

    fn export_dir(&self) -> PathBuf {
        self.export_dir.clone()
    }
}

/// `de_CH.UTF-8@euro` → `de-CH`.  `C` and `POSIX` carry no language.
fn posix_to_bcp47(value: &str) -> Option<String> {
    let base = value.split(['.', '@']).next().unwrap_or_default();
    if base.is_empty() || base == "C" || base == "POSIX" {
        return None;
    }
    Some(base.replace('_', "-"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_posix_locale_with_region_and_encoding() {
        assert_eq!(posix_to_bcp47("de_CH.UTF-8"), Some("de-CH".to_string()));
    }

    #[test]
    fn test_posix_locale_with_modifier() {
        assert_eq!(posix_to_bcp47("fr_FR@euro"), Some("fr-FR".to_string()));
    }

    #[test]
    fn test_c_locale_has_no_language() {
        assert_eq!(posix_to_bcp47("C.UTF-8"), None);
        assert_eq!(posix_to_bcp47("POSIX"), None);
        assert_eq!(posix_to_bcp47(""), None);
    }

    #[test]
    fn test_open_url_fails_on_headless_host() {
        let platform = HeadlessPlatform::new(PathBuf::from("/tmp"));
        assert!(matches!(
            platform.open_url("https://example.com"),
            Err(EnvironmentError::OpenFailed { .. })
        ));
    }
}
