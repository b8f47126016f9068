//! Client queries, backend responses and push notifications.
//!
//! A client call carries an opaque string payload.  The bridge itself only
//! needs the query ID to correlate the eventual response, but before handing
//! the payload to the backend it parses it as an [`ApiQuery`] envelope:
//!
//! ```json
//! { "method": "GET", "endpoint": "devices/registered", "body": "" }
//! ```
//!
//! Only `GET` and `POST` are accepted.  A payload that fails to parse is
//! rejected up front and never registered as outstanding.

use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::QueryError;

/// Client-chosen identifier that correlates a call with its response.
pub type QueryId = u64;

/// A call that has been accepted and is waiting for a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub id: QueryId,
    pub payload: String,
    /// When the bridge accepted the call.  Used for diagnostics only.
    pub created_at: Instant,
}

impl Query {
    pub fn new(id: QueryId, payload: impl Into<String>) -> Self {
        Self { id, payload: payload.into(), created_at: Instant::now() }
    }
}

/// The backend's answer to exactly one [`Query`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub id: QueryId,
    pub payload: String,
}

/// Unsolicited backend → client message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushNotification {
    pub payload: String,
}

/// HTTP-style verb carried by a query envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ApiMethod {
    Get,
    Post,
}

impl ApiMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApiMethod::Get => "GET",
            ApiMethod::Post => "POST",
        }
    }
}

impl fmt::Display for ApiMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parsed form of a call payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiQuery {
    pub method: ApiMethod,
    pub endpoint: String,
    /// Raw request body; empty for most `GET` requests.
    pub body: String,
}

#[derive(Deserialize)]
struct RawQuery {
    method: String,
    endpoint: String,
    #[serde(default)]
    body: String,
}

impl ApiQuery {
    /// Parses a call payload.
    ///
    /// # Errors
    ///
    /// - [`QueryError::Json`] if the payload is not a JSON object with
    ///   string `method` and `endpoint` fields.
    /// - [`QueryError::UnsupportedMethod`] for any verb other than `GET` or
    ///   `POST`.  The comparison is exact, as HTTP method names are.
    pub fn parse(payload: &str) -> Result<Self, QueryError> {
        let raw: RawQuery =
            serde_json::from_str(payload).map_err(|e| QueryError::Json(e.to_string()))?;

        let method = match raw.method.as_str() {
            "GET" => ApiMethod::Get,
            "POST" => ApiMethod::Post,
            other => return Err(QueryError::UnsupportedMethod(other.to_string())),
        };

        trace!(%method, endpoint = %raw.endpoint, "parsed api query");
        Ok(Self { method, endpoint: raw.endpoint, body: raw.body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_get_without_body_defaults_to_empty_body() {
        // Act
        let query = ApiQuery::parse(r#"{"method":"GET","endpoint":"version"}"#).unwrap();

        // Assert
        assert_eq!(query.method, ApiMethod::Get);
        assert_eq!(query.endpoint, "version");
        assert!(query.body.is_empty());
    }

    #[test]
    fn test_parse_post_keeps_body_verbatim() {
        let query = ApiQuery::parse(
            r#"{"method":"POST","endpoint":"devices/x/exchange","body":"{\"a\":1}"}"#,
        )
        .unwrap();

        assert_eq!(query.method, ApiMethod::Post);
        assert_eq!(query.body, r#"{"a":1}"#);
    }

    #[test]
    fn test_parse_rejects_delete_method() {
        let err = ApiQuery::parse(r#"{"method":"DELETE","endpoint":"x"}"#).unwrap_err();
        assert_eq!(err, QueryError::UnsupportedMethod("DELETE".to_string()));
    }

    #[test]
    fn test_parse_rejects_lowercase_method() {
        let err = ApiQuery::parse(r#"{"method":"get","endpoint":"x"}"#).unwrap_err();
        assert!(matches!(err, QueryError::UnsupportedMethod(_)));
    }

    #[test]
    fn test_parse_rejects_non_json_payload() {
        let err = ApiQuery::parse("ping").unwrap_err();
        assert!(matches!(err, QueryError::Json(_)));
    }

    #[test]
    fn test_parse_rejects_missing_endpoint() {
        let err = ApiQuery::parse(r#"{"method":"GET"}"#).unwrap_err();
        assert!(matches!(err, QueryError::Json(_)));
    }

    #[test]
    fn test_api_method_display_matches_wire_form() {
        assert_eq!(ApiMethod::Get.to_string(), "GET");
        assert_eq!(ApiMethod::Post.to_string(), "POST");
    }
}
