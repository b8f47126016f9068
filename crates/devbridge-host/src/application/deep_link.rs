//! Allow-list for deep links forwarded to the backend.
//!
//! The host receives URIs from outside the application (a tapped payment
//! link, an address-ownership proof request).  Only URIs whose scheme is on
//! the allow-list reach the backend.

use devbridge_core::UriError;

/// Schemes accepted when no configuration overrides them.
pub const DEFAULT_SCHEMES: &[&str] = &["aopp", "bitcoin", "litecoin", "ethereum"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeepLinkPolicy {
    schemes: Vec<String>,
}

impl DeepLinkPolicy {
    /// Builds a policy from scheme names.  Names are compared case-insensitively.
    pub fn new<I, S>(schemes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            schemes: schemes.into_iter().map(|s| s.as_ref().to_ascii_lowercase()).collect(),
        }
    }

    pub fn schemes(&self) -> &[String] {
        &self.schemes
    }

    /// Validates `uri` and returns its lower-cased scheme.
    ///
    /// # Errors
    ///
    /// [`UriError::Malformed`] if there is no valid scheme or nothing follows
    /// it; [`UriError::UnsupportedScheme`] if the scheme is not allowed.
    pub fn check(&self, uri: &str) -> Result<String, UriError> {
        let scheme = parse_scheme(uri)?;
        if self.schemes.iter().any(|s| *s == scheme) {
            Ok(scheme)
        } else {
            Err(UriError::UnsupportedScheme(scheme))
        }
    }
}

impl Default for DeepLinkPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_SCHEMES)
    }
}

/// `scheme = ALPHA *( ALPHA / DIGIT / "+" / "-" / "." )`, followed by `:`.
fn parse_scheme(uri: &str) -> Result<String, UriError> {
    let malformed = || UriError::Malformed(uri.to_string());

    let (scheme, rest) = uri.split_once(':').ok_or_else(malformed)?;
    let mut chars = scheme.chars();
    let starts_alpha = chars.next().map_or(false, |c| c.is_ascii_alphabetic());
    let valid_tail = chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));

    if !starts_alpha || !valid_tail || rest.is_empty() {
        return Err(malformed());
    }
    Ok(scheme.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aopp_uri_is_accepted() {
        let policy = DeepLinkPolicy::default();
        let scheme = policy
            .check("aopp:?v=0&msg=hello&asset=btc&format=any&callback=https://example.com")
            .unwrap();
        assert_eq!(scheme, "aopp");
    }

    #[test]
    fn test_scheme_match_is_case_insensitive() {
        let policy = DeepLinkPolicy::default();
        assert_eq!(policy.check("BITCOIN:bc1qexample").unwrap(), "bitcoin");
    }

    #[test]
    fn test_http_scheme_is_unsupported() {
        let policy = DeepLinkPolicy::default();
        assert_eq!(
            policy.check("https://example.com").unwrap_err(),
            UriError::UnsupportedScheme("https".into())
        );
    }

    #[test]
    fn test_uri_without_scheme_is_malformed() {
        let policy = DeepLinkPolicy::default();
        assert!(matches!(policy.check("no scheme here"), Err(UriError::Malformed(_))));
    }

    #[test]
    fn test_scheme_starting_with_digit_is_malformed() {
        let policy = DeepLinkPolicy::default();
        assert!(matches!(policy.check("1btc:abc"), Err(UriError::Malformed(_))));
    }

    #[test]
    fn test_bare_scheme_is_malformed() {
        let policy = DeepLinkPolicy::default();
        assert!(matches!(policy.check("aopp:"), Err(UriError::Malformed(_))));
    }

    #[test]
    fn test_custom_policy_replaces_defaults() {
        let policy = DeepLinkPolicy::new(["Aopp"]);
        assert!(policy.check("aopp:x").is_ok());
        assert!(policy.check("bitcoin:x").is_err());
    }
}
